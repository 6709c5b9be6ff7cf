//! Shared harness: an in-process server on an ephemeral port, plus an
//! inspector connection onto the same SQLite file for log assertions.

// Each test binary uses its own subset of the harness.
#![allow(dead_code)]

use radar_core::Event;
use radar_server::{Db, EventFilter, Hub, PhotoStore, listener};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestServer {
    pub addr: SocketAddr,
    /// Second connection onto the server's database file.
    pub db: Db,
    pub photo_dir: PathBuf,
    _scratch: TempDir,
}

pub async fn start_server() -> TestServer {
    start_server_with_cap(64).await
}

pub async fn start_server_with_cap(write_queue_cap: usize) -> TestServer {
    let scratch = tempfile::tempdir().expect("tempdir");
    let db_path = scratch.path().join("teamradar.sqlite3");
    let photo_dir = scratch.path().join("photos");

    let db = Db::open(&db_path).expect("open db");
    let photos = PhotoStore::new(&photo_dir).expect("photo store");
    let hub = Hub::new(db, photos).spawn();

    let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = socket.local_addr().expect("local addr");
    tokio::spawn(listener::serve_on(socket, hub, write_queue_cap));

    let inspector = Db::open(&db_path).expect("open inspector");
    TestServer { addr, db: inspector, photo_dir, _scratch: scratch }
}

/// `(event_type, parameters)` log rows for one user, oldest first.
pub fn log_rows(db: &Db, user: &str) -> Vec<(String, String)> {
    db.events(&EventFilter { users: vec![user.to_owned()], ..EventFilter::default() })
        .expect("log query")
        .into_iter()
        .map(|e| (e.event_type, e.parameters))
        .collect()
}

pub fn seed_event(db: &Db, user: &str, event_type: &str, parameters: &str, time: &str) {
    let time = Event::parse_time(time).expect("seed time");
    db.append_event(&Event::at(user, event_type, parameters, time)).expect("seed");
}

/// Poll `cond` until it holds or ten seconds pass.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
