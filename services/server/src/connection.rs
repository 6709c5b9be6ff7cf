//! One task per accepted peer socket.
//!
//! The connection walks WaitingGreeting → ReadingGreeting → Ready as
//! straight-line control flow: read the first frame, demand a GREETING,
//! ask the hub for admission, then settle into the read loop. Greeting
//! replies are written directly to the socket — they are the only frames a
//! not-yet-ready connection may be sent. After admission a separate write
//! task drains the bounded outbound queue the hub enqueues into.

use crate::hub::HubMessage;
use bytes::BytesMut;
use radar_protocol::{Frame, FrameReader, Tag};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

pub const GREETING_OK: &[u8] = b"OK, CONNECTED";
pub const GREETING_WRONG_USER: &[u8] = b"WRONG_USER";

/// Drive one peer from accept to teardown.
pub async fn serve(
    socket: TcpStream,
    peer: SocketAddr,
    hub: mpsc::Sender<HubMessage>,
    write_queue_cap: usize,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = FrameReader::new(read_half);

    // WaitingGreeting: the first recognized frame decides the connection.
    let greeting = match reader.read_frame().await {
        Ok(Some(frame)) if frame.tag == Tag::Greeting => frame,
        Ok(Some(frame)) => {
            debug!(%peer, tag = %frame.tag, "first frame is not a greeting, aborting");
            return;
        }
        Ok(None) => return,
        Err(e) => {
            debug!(%peer, error = %e, "framing error before greeting");
            return;
        }
    };
    let user_name = greeting.body_text();

    // ReadingGreeting: ask the hub for the name.
    let (outbound_tx, outbound_rx) = mpsc::channel(write_queue_cap);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let (reply_tx, reply_rx) = oneshot::channel();
    let requested = !user_name.is_empty()
        && hub
            .send(HubMessage::Hello {
                user_name: user_name.clone(),
                peer,
                outbound: outbound_tx,
                shutdown: shutdown_tx,
                reply: reply_tx,
            })
            .await
            .is_ok();
    let admitted = requested && reply_rx.await.unwrap_or(false);

    if !admitted {
        debug!(%peer, user = %user_name, "rejected greeting");
        let _ = write_frame(&mut write_half, &Frame::new(Tag::Greeting, GREETING_WRONG_USER)).await;
        return;
    }
    if write_frame(&mut write_half, &Frame::new(Tag::Greeting, GREETING_OK)).await.is_err() {
        let _ = hub.send(HubMessage::Goodbye { user_name }).await;
        return;
    }

    // Ready.
    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                // A dropped sender means the hub already discarded us.
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(%peer, user = %user_name, "hub requested shutdown");
                    break;
                }
            }
            result = reader.read_frame() => match result {
                Ok(Some(frame)) => {
                    if !frame.tag.is_inbound() {
                        debug!(%peer, user = %user_name, tag = %frame.tag, "dropping outbound-only tag");
                        continue;
                    }
                    if hub
                        .send(HubMessage::Frame { user_name: user_name.clone(), frame })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(%peer, user = %user_name, "peer closed");
                    break;
                }
                Err(e) => {
                    warn!(%peer, user = %user_name, error = %e, "connection failed");
                    break;
                }
            }
        }
    }

    let _ = hub.send(HubMessage::Goodbye { user_name }).await;
    // Queued writes for a dead peer are discarded, not flushed.
    writer.abort();
}

async fn write_frame(write_half: &mut OwnedWriteHalf, frame: &Frame) -> std::io::Result<()> {
    let mut buf = BytesMut::new();
    frame.encode_into(&mut buf);
    write_half.write_all(&buf).await
}

/// Drain the outbound queue into the socket until the hub drops the sender
/// or the peer stops accepting bytes.
async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>) {
    let mut buf = BytesMut::new();
    while let Some(frame) = rx.recv().await {
        buf.clear();
        frame.encode_into(&mut buf);
        if write_half.write_all(&buf).await.is_err() {
            break;
        }
    }
}
