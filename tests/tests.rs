//! Black-box tests speaking the raw protocol against the built `rdrived`.

use std::io::{BufRead, BufReader, Read, Write};

struct ServerGuard(std::process::Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(tmp: &std::path::Path) -> (ServerGuard, u16) {
    let bin = assert_cmd::cargo::cargo_bin("rdrived");
    let mut child = std::process::Command::new(bin)
        .arg("0")
        .arg("--remotes-root")
        .arg(tmp.join("remotes"))
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("failed to start rdrived");
    // the server prints its bound address once the listener is up
    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    let addr = lines
        .next()
        .expect("rdrived exited before printing its address")
        .unwrap();
    let addr: std::net::SocketAddr = addr.trim().parse().unwrap();
    (ServerGuard(child), addr.port())
}

fn connect(port: u16) -> std::net::TcpStream {
    let stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(10)))
        .unwrap();
    stream
}

fn sentinel_user_id() -> String {
    "0".repeat(128)
}

fn register_user(port: u16, files: &[(&str, &str)]) -> String {
    let mut stream = connect(port);
    // uniform request header: sentinel ids, empty command batch
    stream.write_all(sentinel_user_id().as_bytes()).unwrap();
    stream.write_all(b"-1").unwrap();
    stream.write_all(b"00").unwrap();
    let mut user_id = [0u8; 128];
    stream.read_exact(&mut user_id).unwrap();
    let user_id = String::from_utf8(user_id.to_vec()).unwrap();
    for (path, contents) in files {
        stream
            .write_all(format!("{path}\n{}\n", contents.len()).as_bytes())
            .unwrap();
        stream.write_all(contents.as_bytes()).unwrap();
    }
    stream.shutdown(std::net::Shutdown::Write).unwrap();
    // EOF on our read half confirms the server finished the transfer
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {rest:?}");
    user_id
}

fn wait_for_file(path: &std::path::Path) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        if path.exists() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    panic!("timed out waiting for {path:?}");
}

#[test]
fn new_user_handshake_seeds_the_server() {
    let tmp = tempfile::tempdir().unwrap();
    let (_server, port) = spawn_server(tmp.path());

    let user_id = register_user(port, &[("a.txt", "hi"), ("sub/b.txt", "x")]);
    assert_ne!(user_id, sentinel_user_id());
    assert!(user_id.bytes().all(|b| b.is_ascii_alphanumeric()));

    let remote = tmp.path().join("remotes").join(&user_id);
    wait_for_file(&remote.join("a.txt"));
    wait_for_file(&remote.join("sub/b.txt"));
    assert_eq!(std::fs::read(remote.join("a.txt")).unwrap(), b"hi");
    assert_eq!(std::fs::read(remote.join("sub/b.txt")).unwrap(), b"x");
}

#[test]
fn new_device_handshake_downloads_the_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let (_server, port) = spawn_server(tmp.path());
    let user_id = register_user(port, &[("a.txt", "hi")]);
    let remote = tmp.path().join("remotes").join(&user_id);
    wait_for_file(&remote.join("a.txt"));

    let mut stream = connect(port);
    stream.write_all(user_id.as_bytes()).unwrap();
    stream.write_all(b"-1").unwrap();
    stream.write_all(b"00").unwrap();
    let mut device_id = [0u8; 2];
    stream.read_exact(&mut device_id).unwrap();
    assert_eq!(&device_id, b"01");
    // the folder transfer follows, terminated by the server closing
    let mut transfer = Vec::new();
    stream.read_to_end(&mut transfer).unwrap();
    assert_eq!(transfer, b"a.txt\n2\nhi");
}

#[test]
fn a_sync_round_applies_commands_and_acknowledges() {
    let tmp = tempfile::tempdir().unwrap();
    let (_server, port) = spawn_server(tmp.path());
    let user_id = register_user(port, &[]);

    let mut stream = connect(port);
    stream.write_all(user_id.as_bytes()).unwrap();
    stream.write_all(b"00").unwrap();
    // one create-file command: 8-char length, tag '1', flag '0', path
    let record = "0000001510c.txt";
    assert_eq!(record.len(), 15);
    stream.write_all(b"01").unwrap();
    stream.write_all(record.as_bytes()).unwrap();
    // reply: empty pending batch, then the acknowledgement byte
    let mut reply = [0u8; 3];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"00A");

    wait_for_file(&tmp.path().join("remotes").join(&user_id).join("c.txt"));
}
