//! Change-capture tests against the real filesystem watcher.

use rdrive_tools_rdrive::{queue::OutboundQueue, watcher::ChangeCapturer};
use wire::Command;

async fn wait_for_command<F: Fn(&Command) -> bool>(queue: &OutboundQueue, what: &str, predicate: F) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        if queue.snapshot().await.iter().any(&predicate) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!(
        "timed out waiting for {what}; captured: {:?}",
        queue.snapshot().await
    );
}

async fn start_capturer(root: &std::path::Path) -> OutboundQueue {
    let queue = OutboundQueue::new();
    let capturer = ChangeCapturer::new(root, queue.clone()).unwrap();
    tokio::spawn(capturer.run());
    // give the watch a moment to establish on slower backends
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    queue
}

#[tokio::test]
async fn file_creation_and_contents_are_captured() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = start_capturer(tmp.path()).await;

    std::fs::write(tmp.path().join("hello.txt"), "hi").unwrap();
    wait_for_command(&queue, "create of hello.txt", |command| {
        matches!(command, Command::Create { is_dir: false, path } if path == "hello.txt")
    })
    .await;
    wait_for_command(&queue, "contents of hello.txt", |command| {
        matches!(
            command,
            Command::Modify { path, contents } if path == "hello.txt" && contents == b"hi"
        )
    })
    .await;
}

#[tokio::test]
async fn directory_creation_is_captured() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = start_capturer(tmp.path()).await;

    std::fs::create_dir(tmp.path().join("sub")).unwrap();
    wait_for_command(&queue, "create of sub/", |command| {
        matches!(command, Command::Create { is_dir: true, path } if path == "sub")
    })
    .await;

    // nested paths arrive relative to the root with forward slashes
    std::fs::write(tmp.path().join("sub/inner.txt"), "deep").unwrap();
    wait_for_command(&queue, "create of sub/inner.txt", |command| {
        matches!(command, Command::Create { is_dir: false, path } if path == "sub/inner.txt")
    })
    .await;
}

#[tokio::test]
async fn deletion_is_captured() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("doomed.txt"), "x").unwrap();
    let queue = start_capturer(tmp.path()).await;

    std::fs::remove_file(tmp.path().join("doomed.txt")).unwrap();
    wait_for_command(&queue, "delete of doomed.txt", |command| {
        matches!(command, Command::Delete { path, .. } if path == "doomed.txt")
    })
    .await;
}

#[tokio::test]
async fn rename_is_captured_as_a_move() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("draft.md"), "d").unwrap();
    let queue = start_capturer(tmp.path()).await;

    std::fs::rename(tmp.path().join("draft.md"), tmp.path().join("final.md")).unwrap();
    wait_for_command(&queue, "move draft.md -> final.md", |command| {
        matches!(
            command,
            Command::Move { from, to } if from == "draft.md" && to == "final.md"
        )
    })
    .await;
}
