//! Fan-out behavior: project-scoped broadcast, source exclusion, chat
//! unicast, identity registration, disconnect notification.

mod common;

use common::{log_rows, start_server, wait_until};
use radar_protocol::{Frame, Tag, split_fields, split_pair};
use radar_test_utils::MockClient;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(300);

async fn ready(server_addr: std::net::SocketAddr, name: &str, project: &[u8]) -> MockClient {
    let (mut client, reply) = MockClient::greet(server_addr, name).await.expect("greet");
    assert_eq!(reply, "OK, CONNECTED");
    client
        .send(Frame::new(Tag::JoinProject, project.to_vec()))
        .await
        .expect("join project");
    client
}

fn event_fields(frame: &Frame) -> Vec<String> {
    split_fields(&frame.body)
        .into_iter()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect()
}

/// Wait for an EVENT broadcast about `user` doing `event_type`.
async fn expect_event(client: &mut MockClient, user: &str, event_type: &str) -> Vec<String> {
    let frame = client.recv().await.expect("broadcast");
    assert_eq!(frame.tag, Tag::Event);
    let fields = event_fields(&frame);
    assert_eq!(fields[0], user);
    assert_eq!(fields[1], event_type);
    fields
}

#[tokio::test]
async fn events_reach_project_mates_and_never_the_source() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    let mut carol = ready(server.addr, "carol", b"other").await;

    // bob's join reaching alice proves the hub has processed it.
    expect_event(&mut alice, "bob", "JOINED").await;

    alice
        .send(Frame::joined(Tag::Event, &[&b"SAVE"[..], b"foo.cpp"]))
        .await
        .expect("send event");

    let fields = expect_event(&mut bob, "alice", "SAVE").await;
    assert_eq!(fields.len(), 4, "user # type # parameters # timestamp");
    assert_eq!(fields[2], "foo.cpp");

    assert!(alice.recv_within(QUIET).await.is_none(), "source must not hear its own event");
    assert!(carol.recv_within(QUIET).await.is_none(), "other projects must not hear it");

    let rows = log_rows(&server.db, "alice");
    assert!(rows.contains(&("SAVE".to_owned(), "foo.cpp".to_owned())), "event was logged");
}

#[tokio::test]
async fn chat_is_unicast_to_recipients_and_unlogged() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    let mut carol = ready(server.addr, "carol", b"demo").await;
    expect_event(&mut alice, "bob", "JOINED").await;
    expect_event(&mut alice, "carol", "JOINED").await;
    expect_event(&mut bob, "carol", "JOINED").await;

    alice
        .send(Frame::joined(Tag::Chat, &[&b"bob;carol"[..], b"hi"]))
        .await
        .expect("send chat");

    for client in [&mut bob, &mut carol] {
        let frame = client.recv().await.expect("chat");
        assert_eq!(frame.tag, Tag::Chat);
        assert_eq!(frame.body.as_ref(), b"alice#hi");
    }
    assert!(alice.recv_within(QUIET).await.is_none(), "chat is not echoed");

    let rows = log_rows(&server.db, "alice");
    assert!(
        !rows.iter().any(|(event_type, _)| event_type == "CHAT"),
        "chat must not produce a log row"
    );
}

#[tokio::test]
async fn chat_skips_offline_recipients() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    expect_event(&mut alice, "bob", "JOINED").await;

    alice
        .send(Frame::joined(Tag::Chat, &[&b"bob;ghost"[..], b"hi"]))
        .await
        .expect("send chat");

    let frame = bob.recv().await.expect("chat");
    assert_eq!(frame.body.as_ref(), b"alice#hi");
}

#[tokio::test]
async fn color_registration_updates_directory_and_broadcasts() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    expect_event(&mut alice, "bob", "JOINED").await;

    alice.send(Frame::new(Tag::RegColor, &b"#FF0000"[..])).await.expect("send color");

    let frame = bob.recv().await.expect("color broadcast");
    assert_eq!(frame.tag, Tag::ColorReply);
    let (user, color) = split_pair(&frame.body);
    assert_eq!(user, b"alice");
    assert_eq!(color, b"#FF0000");

    wait_until(
        || server.db.color("alice").expect("color") == "#FF0000",
        "directory color update",
    )
    .await;
    let rows = log_rows(&server.db, "alice");
    assert!(rows.contains(&("Register Color".to_owned(), "#FF0000".to_owned())));
}

#[tokio::test]
async fn switching_projects_notifies_the_old_project() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    expect_event(&mut alice, "bob", "JOINED").await;

    alice.send(Frame::new(Tag::JoinProject, &b"skunkworks"[..])).await.expect("switch");

    let fields = expect_event(&mut bob, "alice", "DISCONNECTED").await;
    assert_eq!(fields[2], "demo", "departure names the old project");

    wait_until(
        || server.db.project("alice").expect("project") == "skunkworks",
        "project rebind",
    )
    .await;
    let rows = log_rows(&server.db, "alice");
    assert!(rows.contains(&("DISCONNECTED".to_owned(), "demo".to_owned())));
    assert!(rows.contains(&("JOINED".to_owned(), "skunkworks".to_owned())));
}

#[tokio::test]
async fn disconnect_broadcasts_to_project_mates_and_goes_offline() {
    let server = start_server().await;
    let alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;

    drop(alice);

    let fields = expect_event(&mut bob, "alice", "DISCONNECTED").await;
    assert_eq!(fields[2], "", "synthetic disconnect carries no parameters");
    wait_until(|| !server.db.online("alice").expect("online"), "alice offline").await;
}

#[tokio::test]
async fn photo_registration_stores_the_blob_and_broadcasts() {
    let server = start_server().await;
    let mut alice = ready(server.addr, "alice", b"demo").await;
    let mut bob = ready(server.addr, "bob", b"demo").await;
    expect_event(&mut alice, "bob", "JOINED").await;

    let photo = b"\x89PNG#not#really#an#image";
    let mut body = b"png#".to_vec();
    body.extend_from_slice(photo);
    alice.send(Frame::new(Tag::RegPhoto, body)).await.expect("register photo");

    let frame = bob.recv().await.expect("photo broadcast");
    assert_eq!(frame.tag, Tag::PhotoReply);
    let (file_name, data) = split_pair(&frame.body);
    assert_eq!(file_name, b"alice.png");
    assert_eq!(data, photo, "binary body survives its own '#' bytes");

    assert_eq!(
        std::fs::read(server.photo_dir.join("alice.png")).expect("stored blob"),
        photo
    );
    let rows = log_rows(&server.db, "alice");
    assert!(rows.contains(&("Register Photo".to_owned(), String::new())));
}
