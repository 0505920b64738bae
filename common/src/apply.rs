//! Interpreter for replicated change commands.
//!
//! Applies one decoded [`Command`] to a folder rooted at a caller-supplied
//! path. Every operation is idempotent with respect to replays of terminal
//! states: the same command applied twice leaves the folder in the same
//! state as applying it once, which is what makes at-least-once delivery
//! safe without a dedup key.

use anyhow::{Context, Result};
use wire::Command;

/// Resolves a wire path below `root`, rejecting `..` escapes and absolute
/// paths.
pub fn resolve(root: &std::path::Path, path: &str) -> Result<std::path::PathBuf> {
    Ok(root.join(wire::transfer::sanitize_relative(path)?))
}

async fn ensure_parent(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create directory {parent:?}"))?;
    }
    Ok(())
}

/// Applies one command under `root`.
pub async fn apply_command(root: &std::path::Path, command: &Command) -> Result<()> {
    tracing::debug!("apply: {:?} under {:?}", command, root);
    match command {
        Command::Create { is_dir: true, path } => {
            let target = resolve(root, path)?;
            tokio::fs::create_dir_all(&target)
                .await
                .with_context(|| format!("cannot create directory {target:?}"))?;
        }
        Command::Create {
            is_dir: false,
            path,
        } => {
            let target = resolve(root, path)?;
            ensure_parent(&target).await?;
            // create without truncating: an existing file is left untouched
            tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&target)
                .await
                .with_context(|| format!("cannot create file {target:?}"))?;
        }
        Command::Delete { is_dir: true, path } => {
            crate::rm::rm(&resolve(root, path)?).await?;
        }
        Command::Delete {
            is_dir: false,
            path,
        } => {
            let target = resolve(root, path)?;
            match tokio::fs::remove_file(&target).await {
                // already deleted by a peer
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                other => other.with_context(|| format!("failed removing {target:?}"))?,
            }
        }
        Command::Modify { path, contents } => {
            let target = resolve(root, path)?;
            ensure_parent(&target).await?;
            tokio::fs::write(&target, contents)
                .await
                .with_context(|| format!("failed writing {target:?}"))?;
        }
        Command::Move { from, to } => {
            let source = resolve(root, from)?;
            let target = resolve(root, to)?;
            if let Err(error) = tokio::fs::rename(&source, &target).await {
                // a source already moved by a peer is not an error
                let source_gone = matches!(
                    tokio::fs::symlink_metadata(&source).await,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound
                );
                if !source_gone {
                    return Err(error)
                        .with_context(|| format!("failed moving {source:?} to {target:?}"));
                }
            }
        }
    }
    Ok(())
}
