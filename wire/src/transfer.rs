//! Whole-folder upload and download used by the onboarding handshakes.
//!
//! The sender walks the folder and emits, for every regular file,
//! `relative_path\n`, `size\n` (ASCII decimal) and then exactly `size`
//! content bytes. Empty directories are not transmitted; the receiver
//! reconstructs directories implicitly from file paths. The sender shuts
//! down its write half when done; EOF between files ends the transfer, EOF
//! mid-file is an error.

use anyhow::{Context, Result};
use async_recursion::async_recursion;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_CHUNK_SIZE;

/// Maps a transfer-header path to a safe path below the receiving root.
///
/// Both `/` and `\` separators are accepted; `.` segments collapse and
/// `..` segments are rejected outright.
pub fn sanitize_relative(name: &str) -> Result<std::path::PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = std::path::PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => anyhow::bail!("path {name:?} escapes the folder root"),
            _ => out.push(segment),
        }
    }
    if out.as_os_str().is_empty() {
        anyhow::bail!("empty path in transfer header");
    }
    Ok(out)
}

async fn send_file<W: AsyncWrite + Unpin>(
    root: &std::path::Path,
    file: &std::path::Path,
    size: u64,
    writer: &mut W,
) -> Result<()> {
    let relative = file
        .strip_prefix(root)
        .with_context(|| format!("{file:?} is not below {root:?}"))?;
    let Some(name) = relative.to_str() else {
        tracing::warn!("skipping {relative:?}: name is not valid UTF-8");
        return Ok(());
    };
    tracing::debug!("sending {name} ({size} bytes)");
    writer
        .write_all(format!("{name}\n{size}\n").as_bytes())
        .await
        .with_context(|| format!("failed sending header for {name}"))?;
    let mut reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("cannot open {file:?} for reading"))?;
    let mut remaining = size;
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = reader
            .read(&mut buf[..want])
            .await
            .with_context(|| format!("failed reading {file:?}"))?;
        anyhow::ensure!(n > 0, "{file:?} shrank below its announced size");
        writer
            .write_all(&buf[..n])
            .await
            .with_context(|| format!("failed sending data for {name}"))?;
        remaining -= n as u64;
    }
    Ok(())
}

#[async_recursion]
async fn send_tree<W: AsyncWrite + Unpin + Send>(
    root: &std::path::Path,
    dir: &std::path::Path,
    writer: &mut W,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot open directory {dir:?} for reading"))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {dir:?}"))?
    {
        let entry_path = entry.path();
        let metadata = tokio::fs::symlink_metadata(&entry_path)
            .await
            .with_context(|| format!("failed reading metadata from {entry_path:?}"))?;
        if metadata.is_dir() {
            send_tree(root, &entry_path, writer).await?;
        } else if metadata.is_file() {
            send_file(root, &entry_path, metadata.len(), writer).await?;
        }
        // symlinks and special files are not replicated
    }
    Ok(())
}

/// Streams every regular file below `root` to the writer.
pub async fn send_folder<W: AsyncWrite + Unpin + Send>(
    root: &std::path::Path,
    writer: &mut W,
) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("cannot create folder {root:?}"))?;
    send_tree(root, root, writer).await?;
    writer.flush().await.context("failed flushing transfer")?;
    Ok(())
}

/// Receives a folder transfer into `root`, creating missing parents as
/// files arrive. Returns once the sender closes its write half.
pub async fn receive_folder<R: AsyncRead + Unpin>(
    root: &std::path::Path,
    reader: R,
) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("cannot create folder {root:?}"))?;
    let mut reader = tokio::io::BufReader::new(reader);
    loop {
        let mut path_line = String::new();
        let n = reader
            .read_line(&mut path_line)
            .await
            .context("failed reading transfer path header")?;
        if n == 0 {
            // clean end of transfer
            return Ok(());
        }
        let mut size_line = String::new();
        let n = reader
            .read_line(&mut size_line)
            .await
            .context("failed reading transfer size header")?;
        anyhow::ensure!(n > 0, "transfer ended mid-header");
        let name = path_line.trim_end_matches(['\n', '\r']);
        let size = size_line
            .trim()
            .parse::<u64>()
            .with_context(|| format!("malformed size for {name:?}"))?;
        let target = root.join(sanitize_relative(name)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create directory {parent:?}"))?;
        }
        tracing::debug!("receiving {name} ({size} bytes)");
        let mut file = tokio::fs::File::create(&target)
            .await
            .with_context(|| format!("cannot open {target:?} for writing"))?;
        let mut remaining = size;
        let mut buf = vec![0u8; MAX_CHUNK_SIZE];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = reader
                .read(&mut buf[..want])
                .await
                .with_context(|| format!("failed receiving data for {name}"))?;
            anyhow::ensure!(n > 0, "transfer ended mid-file at {name:?}");
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("failed writing {target:?}"))?;
            remaining -= n as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("failed flushing {target:?}"))?;
    }
}
