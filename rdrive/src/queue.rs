//! Outbound command queue shared by the change capturer and the sync
//! driver.

use std::collections::VecDeque;

use wire::Command;

/// Mutex-guarded FIFO: the capturer appends, the driver snapshots a batch
/// and prunes it only once the server has acknowledged the round. Commands
/// captured while a round is in flight survive a prune untouched.
#[derive(Clone, Debug, Default)]
pub struct OutboundQueue {
    inner: std::sync::Arc<tokio::sync::Mutex<VecDeque<Command>>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, command: Command) {
        tracing::trace!("queueing {:?}", command);
        self.inner.lock().await.push_back(command);
    }

    /// Clones up to [`wire::MAX_BATCH_COMMANDS`] commands off the front in
    /// capture order; the queue itself is left untouched.
    pub async fn snapshot(&self) -> Vec<Command> {
        let queue = self.inner.lock().await;
        queue
            .iter()
            .take(wire::MAX_BATCH_COMMANDS)
            .cloned()
            .collect()
    }

    /// Removes exactly the first `count` commands after an acknowledged
    /// round.
    pub async fn prune(&self, count: usize) {
        let mut queue = self.inner.lock().await;
        let count = count.min(queue.len());
        queue.drain(..count);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(path: &str) -> Command {
        Command::Create {
            is_dir: false,
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn snapshot_keeps_queue_and_prune_removes_front() {
        let queue = OutboundQueue::new();
        queue.push(create("a")).await;
        queue.push(create("b")).await;
        let snapshot = queue.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        // a command captured mid-round must survive the prune
        queue.push(create("c")).await;
        queue.prune(snapshot.len()).await;
        assert_eq!(queue.snapshot().await, vec![create("c")]);
    }

    #[tokio::test]
    async fn snapshot_is_capped_at_batch_size() {
        let queue = OutboundQueue::new();
        for i in 0..wire::MAX_BATCH_COMMANDS + 20 {
            queue.push(create(&format!("f{i}"))).await;
        }
        assert_eq!(queue.snapshot().await.len(), wire::MAX_BATCH_COMMANDS);
        queue.prune(wire::MAX_BATCH_COMMANDS).await;
        assert_eq!(queue.len().await, 20);
        assert_eq!(queue.snapshot().await[0], create("f99"));
    }
}
