//! Per-user replication state held by the server.
//!
//! The registry map sits behind a short-lived lock taken only to look up or
//! insert a user; each user's state has its own mutex that serialises that
//! user's rounds while different users proceed in parallel. Nothing here is
//! persisted: a server restart forgets every user (the authoritative
//! folders remain on disk but are no longer reachable through the
//! protocol).

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::HashMap;

use wire::Command;

type SharedUserState = std::sync::Arc<tokio::sync::Mutex<UserState>>;

/// State for one user: the authoritative folder and one pending command
/// queue per enrolled device. Device ids are dense indices into `pending`,
/// assigned in registration order and never reused.
#[derive(Debug)]
pub struct UserState {
    pub root: std::path::PathBuf,
    pub pending: Vec<Vec<Command>>,
}

impl UserState {
    /// True if `device` has been enrolled.
    pub fn knows_device(&self, device: u32) -> bool {
        (device as usize) < self.pending.len()
    }

    /// Enrols another device and returns its id.
    pub fn register_device(&mut self) -> u32 {
        self.pending.push(Vec::new());
        (self.pending.len() - 1) as u32
    }

    /// Queues `commands` for every device except the one that produced
    /// them: a device never receives its own commands echoed back.
    pub fn enqueue_for_peers(&mut self, source_device: u32, commands: &[Command]) {
        for (device, queue) in self.pending.iter_mut().enumerate() {
            if device as u32 == source_device {
                continue;
            }
            queue.extend(commands.iter().cloned());
        }
    }

    /// Drains the device's pending queue for delivery, bounded by what one
    /// reply batch can carry; any excess stays queued for the next round.
    pub fn take_pending(&mut self, device: u32) -> Vec<Command> {
        let queue = &mut self.pending[device as usize];
        if queue.len() <= wire::MAX_BATCH_COMMANDS {
            std::mem::take(queue)
        } else {
            queue.drain(..wire::MAX_BATCH_COMMANDS).collect()
        }
    }
}

/// In-memory registry of every user the server has seen this run.
#[derive(Clone, Debug)]
pub struct Registry {
    remotes_root: std::path::PathBuf,
    users: std::sync::Arc<tokio::sync::Mutex<HashMap<String, SharedUserState>>>,
}

impl Registry {
    pub fn new(remotes_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            remotes_root: remotes_root.into(),
            users: std::sync::Arc::default(),
        }
    }

    fn generate_user_id() -> String {
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(wire::USER_ID_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Creates a fresh user with one enrolled device (device 0) and an
    /// authoritative folder under the remotes root.
    pub async fn register_user(&self) -> Result<(String, SharedUserState)> {
        let mut users = self.users.lock().await;
        let user_id = loop {
            let candidate = Self::generate_user_id();
            // reject collisions and the reserved sentinel rather than
            // overwrite; at 62^128 ids the loop effectively runs once
            if !users.contains_key(&candidate) && !wire::is_unassigned_user_id(&candidate) {
                break candidate;
            }
        };
        let root = self.remotes_root.join(&user_id);
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("cannot create user folder {root:?}"))?;
        let state = std::sync::Arc::new(tokio::sync::Mutex::new(UserState {
            root,
            pending: vec![Vec::new()],
        }));
        users.insert(user_id.clone(), state.clone());
        Ok((user_id, state))
    }

    pub async fn lookup(&self, user_id: &str) -> Option<SharedUserState> {
        self.users.lock().await.get(user_id).cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }
}
