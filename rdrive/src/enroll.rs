//! Client side of the onboarding handshakes.
//!
//! Both handshakes open with the uniform request header (user id, device
//! id, empty command batch) so the server parses every connection the same
//! way; the folder transfer that follows is self-delimiting, so neither
//! handshake carries an acknowledgement byte.

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::driver;

/// Registers a brand-new user: uploads the local folder as the initial
/// authoritative copy and returns the server-assigned user id. This device
/// becomes device 0.
pub async fn register_user(server_addr: &str, folder: &std::path::Path) -> Result<String> {
    let mut stream = driver::connect(server_addr).await?;
    wire::frame::write_user_id(&mut stream, &wire::unassigned_user_id()).await?;
    wire::frame::write_device_id(&mut stream, None).await?;
    wire::command::write_batch(&mut stream, &[]).await?;
    let user_id = wire::frame::read_user_id(&mut stream)
        .await
        .context("failed reading the assigned user id")?;
    anyhow::ensure!(
        !wire::is_unassigned_user_id(&user_id),
        "server answered with the sentinel user id"
    );
    wire::transfer::send_folder(folder, &mut stream)
        .await
        .context("failed uploading the initial folder")?;
    stream
        .shutdown()
        .await
        .context("failed closing the upload stream")?;
    tracing::info!("registered new user {user_id}, this device is 0");
    Ok(user_id)
}

/// Enrols this device with an existing user: downloads the authoritative
/// folder into the local mirror and returns the assigned device id.
pub async fn register_device(
    server_addr: &str,
    user_id: &str,
    folder: &std::path::Path,
) -> Result<u32> {
    let mut stream = driver::connect(server_addr).await?;
    wire::frame::write_user_id(&mut stream, user_id).await?;
    wire::frame::write_device_id(&mut stream, None).await?;
    wire::command::write_batch(&mut stream, &[]).await?;
    let device_id = wire::frame::read_device_id(&mut stream)
        .await
        .context("failed reading the assigned device id")?
        .context("server answered with the sentinel device id")?;
    wire::transfer::receive_folder(folder, stream)
        .await
        .context("failed downloading the folder")?;
    tracing::info!("enrolled as device {device_id} of user {user_id}");
    Ok(device_id)
}
