#![allow(dead_code)]

use anyhow::{Context, Result};
use async_recursion::async_recursion;

async fn create_temp_dir() -> Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rdrive_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

/// Creates a small folder tree for exercising sync and transfer paths:
///
/// ```text
/// foo
/// |- 0.txt
/// |- bar
///    |- 1.txt
///    |- 2.txt
/// |- baz
///    |- 3.bin   (non-UTF-8 contents)
/// ```
pub async fn setup_test_dir() -> Result<std::path::PathBuf> {
    let tmp_dir = create_temp_dir().await?;
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("3.bin"), [0u8, 255, 254, 7]).await?;
    Ok(tmp_dir)
}

/// Asserts that every entry below `src` exists below `dst` with the same
/// type and, for files, identical bytes. Call with the arguments swapped to
/// assert full equality.
#[async_recursion]
pub async fn check_dirs_identical(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let mut src_entries = tokio::fs::read_dir(src).await?;
    while let Some(src_entry) = src_entries.next_entry().await? {
        let src_entry_path = src_entry.path();
        let src_entry_name = src_entry_path.file_name().unwrap();
        let dst_entry_path = dst.join(src_entry_name);
        let src_md = tokio::fs::symlink_metadata(&src_entry_path)
            .await
            .context(format!("Source file {:?} is missing!", &src_entry_path))?;
        let dst_md = tokio::fs::symlink_metadata(&dst_entry_path)
            .await
            .context(format!(
                "Destination file {:?} is missing!",
                &dst_entry_path
            ))?;
        assert_eq!(src_md.file_type(), dst_md.file_type());
        if src_md.is_file() {
            let src_contents = tokio::fs::read(&src_entry_path).await?;
            let dst_contents = tokio::fs::read(&dst_entry_path).await?;
            assert_eq!(
                src_contents, dst_contents,
                "contents differ for {src_entry_path:?} {dst_entry_path:?}"
            );
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path).await?;
        }
    }
    Ok(())
}
