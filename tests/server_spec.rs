//! End-to-end protocol tests: a real listener, the JSON registry in a
//! scratch directory, and a minimal wire-level client.

use ipstash::Registry;
use ipstash::config::Config;
use ipstash::models::FileEntry;
use ipstash::net::server;
use ipstash::proto::{
    Command, ERR_FILE_NOT_FOUND, Reply, STATUS_NOTOK, encode_size, encode_status, read_reply,
};
use ipstash::store::{ClientStore, JsonFileStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct TestServer {
    addr: SocketAddr,
    registry: Arc<Registry>,
    _tmp: tempfile::TempDir,
}

async fn start_server(default_quota: i64) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Arc::new(Config {
        listen_addr: "127.0.0.1:0".to_string(),
        data_root: tmp.path().join("data"),
        registry_path: tmp.path().join("clients.json"),
        default_quota,
    });
    let store = Arc::new(JsonFileStore::new(cfg.registry_path.clone()));
    let registry = Arc::new(Registry::new(store, cfg));
    registry.vault.ensure_root().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reg = registry.clone();
    tokio::spawn(async move {
        let _ = server::run(listener, reg).await;
    });

    TestServer {
        addr,
        registry,
        _tmp: tmp,
    }
}

/// Connect and consume the admission handshake. The very first connection
/// of a server instance also receives the directory-creation message.
async fn connect(addr: SocketAddr, first: bool) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    if first {
        let mut msg = [0u8; 20];
        stream.read_exact(&mut msg).await.unwrap();
        assert_eq!(&msg, b"OK Directory created");
    }
    let mut ack = [0u8; 3];
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack, encode_status(true));
    stream
}

/// Drain until the server closes; the request counter is committed before
/// the connection drops.
async fn wait_close(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {rest:?}");
}

async fn put(addr: SocketAddr, name: &str, body: &[u8], first: bool) -> bool {
    let mut s = connect(addr, first).await;
    s.write_all(&Command::Put { name: name.into() }.encode()).await.unwrap();
    s.write_all(&encode_size(body.len() as u32)).await.unwrap();

    match read_reply(&mut s).await.unwrap() {
        Reply::Status(true) => {}
        Reply::Status(false) => {
            wait_close(&mut s).await;
            return false;
        }
        other => panic!("unexpected PUT admission reply: {other:?}"),
    }
    s.write_all(body).await.unwrap();
    assert_eq!(read_reply(&mut s).await.unwrap(), Reply::Status(true));
    wait_close(&mut s).await;
    true
}

async fn get(addr: SocketAddr, name: &str, first: bool) -> Result<Vec<u8>, u8> {
    let mut s = connect(addr, first).await;
    s.write_all(&Command::Get { name: name.into() }.encode()).await.unwrap();

    match read_reply(&mut s).await.unwrap() {
        Reply::Size(n) => {
            s.write_all(&encode_status(true)).await.unwrap();
            let mut body = vec![0u8; n as usize];
            s.read_exact(&mut body).await.unwrap();
            s.write_all(&encode_status(true)).await.unwrap();
            wait_close(&mut s).await;
            Ok(body)
        }
        Reply::Error(code) => {
            wait_close(&mut s).await;
            Err(code)
        }
        other => panic!("unexpected GET reply: {other:?}"),
    }
}

async fn list(addr: SocketAddr, first: bool) -> Vec<FileEntry> {
    let mut s = connect(addr, first).await;
    s.write_all(&Command::List.encode()).await.unwrap();
    let mut body = Vec::new();
    s.read_to_end(&mut body).await.unwrap();
    ipstash::proto::decode_listing(&body).unwrap()
}

async fn delete(addr: SocketAddr, name: &str, first: bool) -> Result<(), u8> {
    let mut s = connect(addr, first).await;
    s.write_all(&Command::Delete { name: name.into() }.encode()).await.unwrap();
    match read_reply(&mut s).await.unwrap() {
        Reply::Status(true) => {
            wait_close(&mut s).await;
            Ok(())
        }
        Reply::Error(code) => {
            wait_close(&mut s).await;
            Err(code)
        }
        other => panic!("unexpected DELETE reply: {other:?}"),
    }
}

async fn record(server: &TestServer) -> ipstash::models::ClientRecord {
    server.registry.store.load().await.unwrap()["127.0.0.1"].clone()
}

#[tokio::test]
async fn first_connection_bootstraps_record_and_directory() {
    let server = start_server(1000).await;

    let mut s = connect(server.addr, true).await;
    drop(s.shutdown().await);

    let rec = record(&server).await;
    assert_eq!(rec.occupied_space, 0);
    assert_eq!(rec.request_count, 0);
    assert!(!rec.blocked);
    assert_eq!(rec.quota, 1000);
    assert!(server.registry.vault.root().join("127.0.0.1").is_dir());

    // second connection: no bootstrap message, handshake comes first
    let mut s = connect(server.addr, false).await;
    drop(s.shutdown().await);
}

#[tokio::test]
async fn put_then_get_roundtrips() {
    let server = start_server(1_000_000).await;
    // spans multiple transfer chunks
    let body: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();

    assert!(put(server.addr, "blob.bin", &body, true).await);
    assert_eq!(record(&server).await.occupied_space, body.len() as i64);

    let fetched = get(server.addr, "blob.bin", false).await.unwrap();
    assert_eq!(fetched, body);

    // one PUT plus one GET, each counted once
    assert_eq!(record(&server).await.request_count, 2);
}

#[tokio::test]
async fn get_of_absent_file_sends_no_bytes() {
    let server = start_server(1000).await;
    let err = get(server.addr, "nope.txt", true).await.unwrap_err();
    assert_eq!(err, ERR_FILE_NOT_FOUND);

    // a declared error still counts as a served request
    assert_eq!(record(&server).await.request_count, 1);
}

#[tokio::test]
async fn quota_scenario() {
    let server = start_server(1000).await;

    assert!(put(server.addr, "a.txt", &[1u8; 500], true).await);
    assert_eq!(record(&server).await.occupied_space, 500);

    // 500 + 600 >= 1000: rejected, nothing committed, no bytes read
    assert!(!put(server.addr, "b.txt", &[2u8; 600], false).await);
    assert_eq!(record(&server).await.occupied_space, 500);

    assert_eq!(
        list(server.addr, false).await,
        vec![FileEntry { name: "a.txt".into(), size: 500 }]
    );

    delete(server.addr, "a.txt", false).await.unwrap();
    assert_eq!(record(&server).await.occupied_space, 0);
    assert!(list(server.addr, false).await.is_empty());
}

#[tokio::test]
async fn delete_of_absent_file_reports_not_found() {
    let server = start_server(1000).await;
    let err = delete(server.addr, "ghost.bin", true).await.unwrap_err();
    assert_eq!(err, ERR_FILE_NOT_FOUND);
}

#[tokio::test]
async fn repeated_list_is_stable_as_a_set() {
    let server = start_server(1_000_000).await;
    assert!(put(server.addr, "one.txt", b"11", true).await);
    assert!(put(server.addr, "two.txt", b"222", false).await);

    let as_set = |mut v: Vec<FileEntry>| {
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    };
    let a = as_set(list(server.addr, false).await);
    let b = as_set(list(server.addr, false).await);
    assert_eq!(a, b);
    assert_eq!(a.len(), 2);
}

#[tokio::test]
async fn get_aborts_without_bytes_when_peer_not_ready() {
    let server = start_server(1_000_000).await;
    assert!(put(server.addr, "kept.bin", &[9u8; 400], true).await);

    let mut s = connect(server.addr, false).await;
    s.write_all(&Command::Get { name: "kept.bin".into() }.encode()).await.unwrap();
    assert_eq!(read_reply(&mut s).await.unwrap(), Reply::Size(400));

    // decline the transfer: the server must close without one body byte
    s.write_all(&encode_status(false)).await.unwrap();
    wait_close(&mut s).await;

    // the identified command still counts (PUT then the aborted GET)
    assert_eq!(record(&server).await.request_count, 2);
}

#[tokio::test]
async fn broken_put_drops_partial_file_and_releases_reservation() {
    let server = start_server(1_000_000).await;

    let mut s = connect(server.addr, true).await;
    s.write_all(&Command::Put { name: "half.bin".into() }.encode()).await.unwrap();
    s.write_all(&encode_size(1000)).await.unwrap();
    assert_eq!(read_reply(&mut s).await.unwrap(), Reply::Status(true));

    // send part of the body, then hang up mid-transfer
    s.write_all(&[5u8; 100]).await.unwrap();
    s.shutdown().await.unwrap();

    // best-effort not-ok, then close
    assert_eq!(read_reply(&mut s).await.unwrap(), Reply::Status(false));
    wait_close(&mut s).await;

    let rec = record(&server).await;
    assert_eq!(rec.occupied_space, 0, "reservation must be released");
    assert_eq!(rec.request_count, 1);
    assert!(
        !server.registry.vault.root().join("127.0.0.1").join("half.bin").exists(),
        "partial file must be dropped"
    );
    assert!(list(server.addr, false).await.is_empty());
}

#[tokio::test]
async fn blocked_client_is_rejected_before_any_command() {
    let server = start_server(1000).await;

    // bootstrap the record, then block it behind the server's back
    let mut s = connect(server.addr, true).await;
    drop(s.shutdown().await);
    let mut clients = server.registry.store.load().await.unwrap();
    clients.get_mut("127.0.0.1").unwrap().blocked = true;
    server.registry.store.save(&clients).await.unwrap();

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let mut rejection = [0u8; 3];
    stream.read_exact(&mut rejection).await.unwrap();
    assert_eq!(rejection, encode_status(false));
    assert_eq!(rejection[2], STATUS_NOTOK);
    wait_close(&mut stream).await;

    // nothing was served, so nothing was counted
    assert_eq!(record(&server).await.request_count, 0);
}

#[tokio::test]
async fn traversal_filenames_are_refused() {
    let server = start_server(1000).await;

    let mut s = connect(server.addr, true).await;
    s.write_all(&[ipstash::proto::TAG_GET, 0, 9]).await.unwrap();
    s.write_all(b"../escape").await.unwrap();
    assert_eq!(read_reply(&mut s).await.unwrap(), Reply::Status(false));
    wait_close(&mut s).await;

    // the command was never identified, so it was not counted
    assert_eq!(record(&server).await.request_count, 0);
}
