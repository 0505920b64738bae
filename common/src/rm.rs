use anyhow::{Context, Result};
use async_recursion::async_recursion;

/// Recursively removes `path`. A target that is already gone counts as
/// removed, since delete commands replay across devices.
#[async_recursion]
pub async fn rm(path: &std::path::Path) -> Result<()> {
    tracing::debug!("remove: {:?}", path);
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(error).with_context(|| format!("failed reading metadata from {path:?}"));
        }
        Ok(metadata) => metadata,
    };
    if !metadata.is_dir() {
        return match tokio::fs::remove_file(path).await {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.with_context(|| format!("failed removing {path:?}")),
        };
    }
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("cannot open directory {path:?} for reading"))?;
    let mut join_set = tokio::task::JoinSet::new();
    let mut errors = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {path:?}"))?
    {
        let entry_path = entry.path();
        let do_rm = || async move { rm(&entry_path).await };
        join_set.spawn(do_rm());
    }
    while let Some(res) = join_set.join_next().await {
        if let Err(error) = res? {
            errors.push(error);
        }
    }
    if !errors.is_empty() {
        tracing::debug!("remove: {:?} failed with: {:?}", path, &errors);
        return Err(anyhow::anyhow!("{:?}", &errors));
    }
    match tokio::fs::remove_dir(path).await {
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other.with_context(|| format!("failed removing directory {path:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_nested_tree() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("old");
        tokio::fs::create_dir_all(root.join("a/b")).await?;
        tokio::fs::write(root.join("a/x.txt"), "x").await?;
        tokio::fs::write(root.join("a/b/y.txt"), "y").await?;
        rm(&root).await?;
        assert!(!root.exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_target_is_success() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        rm(&tmp.path().join("never-existed")).await?;
        Ok(())
    }
}
