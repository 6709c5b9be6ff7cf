//! TCP accept loop with live rebinding.
//!
//! The admin surface can move the server to a new port at runtime: pushing
//! a port onto the watch channel drops the listening socket and binds the
//! new one. Established connections keep their sockets and are unaffected.

use crate::connection;
use crate::hub::HubMessage;
use std::net::Ipv4Addr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Bind the current port and accept until the port sender is dropped.
pub async fn run(
    mut port_rx: watch::Receiver<u16>,
    hub: mpsc::Sender<HubMessage>,
    write_queue_cap: usize,
) -> std::io::Result<()> {
    loop {
        let port = *port_rx.borrow_and_update();
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        info!(port = listener.local_addr()?.port(), "listening");
        tokio::select! {
            biased;
            changed = port_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                info!("port changed, rebinding");
            }
            () = serve_on(listener, hub.clone(), write_queue_cap) => return Ok(()),
        }
    }
}

/// Accept connections forever on an already-bound listener.
///
/// Split out so tests can bind port 0 themselves and learn the real port.
pub async fn serve_on(
    listener: TcpListener,
    hub: mpsc::Sender<HubMessage>,
    write_queue_cap: usize,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!(%peer, "peer connected");
                tokio::spawn(connection::serve(socket, peer, hub.clone(), write_queue_cap));
            }
            Err(e) => warn!(error = %e, "accept error"),
        }
    }
}
