//! Server side of the protocol: accept, classify, execute one round.

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::registry::Registry;
use wire::Command;

const LISTEN_BACKLOG: i32 = 7;

/// Builds the TCP listener with a fixed accept backlog. Port 0 binds an
/// ephemeral port; callers read the bound address off the listener.
pub fn bind_listener(port: u16) -> Result<tokio::net::TcpListener> {
    let address =
        std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, port));
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .context("failed creating the listen socket")?;
    socket
        .set_reuse_address(true)
        .context("failed configuring the listen socket")?;
    socket
        .bind(&address.into())
        .with_context(|| format!("failed binding {address}"))?;
    socket
        .listen(LISTEN_BACKLOG)
        .context("failed listening on the socket")?;
    socket
        .set_nonblocking(true)
        .context("failed configuring the listen socket")?;
    let listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(listener)
        .context("failed registering the listener with the runtime")
}

/// Accepts connections forever, one spawned task per connection.
pub async fn serve(listener: tokio::net::TcpListener, registry: Registry) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed accepting a connection")?;
        tracing::debug!("connection from {peer}");
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(stream, registry).await {
                tracing::warn!("connection from {peer} failed: {error:#}");
            }
        });
    }
}

/// Performs exactly one round with one device: reads the uniform request
/// header, then dispatches on the sentinel ids.
pub async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    registry: Registry,
) -> Result<()> {
    let user_id = wire::frame::read_user_id(&mut stream).await?;
    let device_id = wire::frame::read_device_id(&mut stream).await?;
    let commands = wire::command::read_batch(&mut stream).await?;
    if wire::is_unassigned_user_id(&user_id) {
        onboard_user(stream, registry).await
    } else if let Some(device) = device_id {
        sync_round(stream, registry, &user_id, device, commands).await
    } else {
        onboard_device(stream, registry, &user_id).await
    }
}

async fn onboard_user(mut stream: tokio::net::TcpStream, registry: Registry) -> Result<()> {
    let (user_id, state) = registry.register_user().await?;
    let state = state.lock().await;
    wire::frame::write_user_id(&mut stream, &user_id).await?;
    wire::transfer::receive_folder(&state.root, stream)
        .await
        .context("failed receiving the initial folder")?;
    tracing::info!("new user {user_id} onboarded as device 0");
    Ok(())
}

async fn onboard_device(
    mut stream: tokio::net::TcpStream,
    registry: Registry,
    user_id: &str,
) -> Result<()> {
    let state = registry
        .lookup(user_id)
        .await
        .with_context(|| format!("unknown user {user_id}"))?;
    let mut state = state.lock().await;
    let device = state.register_device();
    wire::frame::write_device_id(&mut stream, Some(device)).await?;
    wire::transfer::send_folder(&state.root, &mut stream)
        .await
        .context("failed sending the authoritative folder")?;
    stream
        .shutdown()
        .await
        .context("failed closing the transfer stream")?;
    tracing::info!("user {user_id}: enrolled device {device}");
    Ok(())
}

/// The normal round. The whole sequence - apply uploads, fan out to peers,
/// emit this device's pending queue, acknowledge - runs under the user's
/// lock, so no peer ever observes a partial round.
async fn sync_round(
    mut stream: tokio::net::TcpStream,
    registry: Registry,
    user_id: &str,
    device: u32,
    commands: Vec<Command>,
) -> Result<()> {
    let state = registry
        .lookup(user_id)
        .await
        .with_context(|| format!("unknown user {user_id}"))?;
    let mut state = state.lock().await;
    anyhow::ensure!(
        state.knows_device(device),
        "unknown device {device} for user {user_id}"
    );
    for command in &commands {
        if let Err(error) = common::apply::apply_command(&state.root, command).await {
            // skipped, not fatal: the device still gets its reply and ack,
            // and a later terminal state converges the folder
            tracing::error!("user {user_id}: failed applying {command:?}: {error:#}");
        }
    }
    state.enqueue_for_peers(device, &commands);
    let reply = state.take_pending(device);
    wire::command::write_batch(&mut stream, &reply).await?;
    stream.write_all(&[wire::ACK]).await?;
    stream.flush().await?;
    tracing::debug!(
        "user {user_id}: device {device} round complete ({} up, {} down)",
        commands.len(),
        reply.len()
    );
    Ok(())
}
