//! UAPI client against in-process socket servers.

#![cfg(unix)]

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use wgctrl_types::{Backend, Config, DeviceType, Key, PeerConfig, WgError};
use wgctrl_uapi::UserspaceClient;

/// Serves one connection per entry in `responses`, reporting each request.
fn serve<R>(path: &Path, responses: Vec<R>) -> (JoinHandle<()>, mpsc::Receiver<String>)
where
    R: AsRef<[u8]> + Send + 'static,
{
    let listener = UnixListener::bind(path).expect("bind");
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));

            let mut request = String::new();
            loop {
                let start = request.len();
                let n = reader.read_line(&mut request).expect("read");
                if n == 0 || &request[start..] == "\n" {
                    break;
                }
            }
            // The test may not care about the request.
            let _ = tx.send(request);
            stream.write_all(response.as_ref()).expect("write");
        }
    });

    (handle, rx)
}

#[test]
fn device_by_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (server, requests) = serve(
        &dir.path().join("wg0.sock"),
        vec!["listen_port=51820\nerrno=0\n\n"],
    );

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    let device = client.device("wg0").expect("device");

    assert_eq!(device.name, "wg0");
    assert_eq!(device.device_type, DeviceType::Userspace);
    assert_eq!(device.listen_port, 51820);
    assert_eq!(requests.recv().expect("request"), "get=1\n\n");
    server.join().expect("server");
}

#[test]
fn unknown_device_is_not_exist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);

    let err = client.device("wg9").expect_err("missing");
    assert!(err.is_not_exist());
    let err = client
        .configure_device("wg9", &Config::new())
        .expect_err("missing");
    assert!(err.is_not_exist());
}

#[test]
fn devices_queries_every_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (a, _) = serve(&dir.path().join("wg0.sock"), vec!["fwmark=1\nerrno=0\n\n"]);
    let (b, _) = serve(&dir.path().join("wg1.sock"), vec!["fwmark=2\nerrno=0\n\n"]);

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    let devices = client.devices().expect("devices");

    let summary: Vec<(String, u32)> = devices
        .into_iter()
        .map(|d| (d.name, d.firewall_mark))
        .collect();
    assert_eq!(summary, vec![("wg0".into(), 1), ("wg1".into(), 2)]);

    a.join().expect("server a");
    b.join().expect("server b");
}

#[test]
fn stale_socket_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    // The socket file outlives the listener, so connecting is refused.
    drop(UnixListener::bind(dir.path().join("wg0.sock")).expect("bind"));

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    assert!(client.devices().expect("devices").is_empty());
    assert!(client.device("wg0").expect_err("stale").is_not_exist());
}

#[test]
fn configure_sends_set_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (server, requests) = serve(&dir.path().join("wg0.sock"), vec!["errno=0\n\n"]);

    let peer = Key::from_array([7; 32]);
    let cfg = Config::new()
        .with_listen_port(4000)
        .with_peer(PeerConfig::new(peer).with_allowed_ip("10.0.0.1/32".parse().expect("cidr")));

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    client.configure_device("wg0", &cfg).expect("configure");

    let want = format!(
        "set=1\nlisten_port=4000\npublic_key={}\nallowed_ip=10.0.0.1/32\n\n",
        "07".repeat(32)
    );
    assert_eq!(requests.recv().expect("request"), want);
    server.join().expect("server");
}

#[test]
fn configure_reports_errno() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (server, _) = serve(&dir.path().join("wg0.sock"), vec!["errno=22\n\n"]);

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    let err = client
        .configure_device("wg0", &Config::new().with_listen_port(1))
        .expect_err("errno");
    assert!(matches!(err, WgError::Errno { op: "set", errno: 22 }));
    server.join().expect("server");
}

#[test]
fn non_utf8_response_is_decode_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (server, _) = serve(
        &dir.path().join("wg0.sock"),
        vec![b"listen_port=\xff\xfe\nerrno=0\n\n".to_vec()],
    );

    let mut client = UserspaceClient::new(vec![dir.path().to_path_buf()]);
    let err = client.device("wg0").expect_err("not utf-8");
    assert!(matches!(err, WgError::Decode(_)));
    server.join().expect("server");
}
