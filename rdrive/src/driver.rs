//! Periodic sync rounds against the server.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::queue::OutboundQueue;

/// Everything one device needs to run its rounds.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// `host:port` of the server.
    pub server_addr: String,
    /// Local mirror root.
    pub folder: std::path::PathBuf,
    pub user_id: String,
    pub device_id: u32,
    /// Pause between rounds.
    pub period: std::time::Duration,
}

/// Opens a connection to the server under the protocol connect timeout.
pub async fn connect(addr: &str) -> Result<tokio::net::TcpStream> {
    let stream = tokio::time::timeout(wire::CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr))
        .await
        .with_context(|| format!("timed out connecting to {addr}"))?
        .with_context(|| format!("failed connecting to {addr}"))?;
    Ok(stream)
}

/// Runs sync rounds forever on the configured period. A failed round leaves
/// the outbound queue intact; events keep accumulating and the next tick
/// retries the whole round.
pub async fn run(config: SyncConfig, queue: OutboundQueue) -> Result<()> {
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match sync_round(&config, &queue).await {
            Ok(applied) => {
                tracing::debug!("sync round done, {applied} peer commands applied");
            }
            Err(error) => {
                tracing::warn!("sync round failed, will retry next tick: {error:#}");
            }
        }
    }
}

/// One request/response round: upload a snapshot of the outbound queue,
/// apply the peer batch, wait for the acknowledgement byte, then prune
/// exactly the snapshot. Returns the number of peer commands received.
pub async fn sync_round(config: &SyncConfig, queue: &OutboundQueue) -> Result<usize> {
    let snapshot = queue.snapshot().await;
    let mut stream = connect(&config.server_addr).await?;
    wire::frame::write_user_id(&mut stream, &config.user_id).await?;
    wire::frame::write_device_id(&mut stream, Some(config.device_id)).await?;
    wire::command::write_batch(&mut stream, &snapshot).await?;
    stream.flush().await.context("failed flushing the upload")?;

    let applied = tokio::time::timeout(wire::REPLY_TIMEOUT, async {
        let peer_commands = wire::command::read_batch(&mut stream).await?;
        for command in &peer_commands {
            if let Err(error) = common::apply::apply_command(&config.folder, command).await {
                // skipped, not fatal: the failed command is already drained
                // from our server-side queue and a later terminal state will
                // converge the mirror
                tracing::error!("failed applying peer command {command:?}: {error:#}");
            }
        }
        let mut ack = [0u8; 1];
        stream
            .read_exact(&mut ack)
            .await
            .context("connection closed before acknowledgement")?;
        anyhow::ensure!(
            ack[0] == wire::ACK,
            "unexpected acknowledgement byte {:?}",
            char::from(ack[0])
        );
        anyhow::Ok(peer_commands.len())
    })
    .await
    .context("timed out waiting for the server reply")??;

    // only now is the uploaded snapshot safe to forget
    queue.prune(snapshot.len()).await;
    Ok(applied)
}
