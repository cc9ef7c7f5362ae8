//! End-to-end tests of the `wgctrl` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn wgctrl() -> Command {
    let mut cmd = Command::cargo_bin("wgctrl").expect("binary");
    cmd.env_remove("WGCTRL_SOCKET_DIR").env_remove("RUST_LOG");
    cmd
}

#[test]
fn genkey_prints_base64_key() {
    wgctrl()
        .arg("genkey")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9+/]{43}=\n$").expect("regex"));
}

#[test]
fn pubkey_of_known_private_key() {
    // RFC 7748 section 6.1, Alice.
    wgctrl()
        .arg("pubkey")
        .write_stdin("dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=\n")
        .assert()
        .success()
        .stdout("hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=\n");
}

#[test]
fn pubkey_rejects_invalid_input() {
    wgctrl()
        .arg("pubkey")
        .write_stdin("hello\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid input"));
}

#[test]
fn unknown_backend_is_a_usage_error() {
    wgctrl()
        .args(["--backend", "wintun", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[cfg(unix)]
mod userspace {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixListener;
    use std::thread;

    use super::*;

    const RESPONSE: &str = "private_key=e84b5a6d2717c1003a13b431570353dbaca9146cf150c5f8575680feba52027a\n\
        listen_port=12912\n\
        public_key=b85996fecc9c7f1fc6d2572a76eda11d59bcd20be8e543b15ce4bd85a8e75a33\n\
        endpoint=[abcd:23::33%2]:51820\n\
        allowed_ip=192.168.4.4/32\n\
        rx_bytes=1024\n\
        tx_bytes=2048\n\
        protocol_version=1\n\
        errno=0\n\n";

    fn serve_once(path: std::path::PathBuf) -> thread::JoinHandle<()> {
        let listener = UnixListener::bind(path).expect("bind");
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            while reader.read_line(&mut line).expect("read") > 0 && !line.ends_with("\n\n") {}
            stream.write_all(RESPONSE.as_bytes()).expect("write");
        })
    }

    #[test]
    fn show_device_over_uapi() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve_once(dir.path().join("wg0.sock"));

        wgctrl()
            .args(["--backend", "userspace", "--socket-dir"])
            .arg(dir.path())
            .args(["show", "wg0"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("interface: wg0\n"))
            .stdout(predicate::str::contains("  private key: (hidden)\n"))
            .stdout(predicate::str::contains("  listening port: 12912\n"))
            .stdout(predicate::str::contains("  endpoint: [abcd:23::33%2]:51820\n"))
            .stdout(predicate::str::contains("  allowed ips: 192.168.4.4/32\n"))
            .stdout(predicate::str::contains("  transfer: 1.00 KiB received, 2.00 KiB sent\n"));

        server.join().expect("server");
    }

    #[test]
    fn show_json_lists_nothing_in_empty_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        wgctrl()
            .args(["--format", "json", "--backend", "userspace", "--socket-dir"])
            .arg(dir.path())
            .arg("show")
            .assert()
            .success()
            .stdout("[]\n");
    }

    #[test]
    fn show_missing_device_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        wgctrl()
            .env("WGCTRL_SOCKET_DIR", dir.path())
            .args(["--backend", "userspace", "show", "wg7"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no such device: wg7"));
    }
}
