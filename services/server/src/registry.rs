//! The directory of ready connections, keyed by user name.
//!
//! Owned exclusively by the hub task; name uniqueness under concurrent
//! greetings follows from the hub processing admissions one at a time.

use radar_protocol::Frame;
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

/// The hub's handle to one ready connection.
#[derive(Debug)]
pub struct ClientHandle {
    user_name: String,
    outbound: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
}

impl ClientHandle {
    pub fn new(
        user_name: impl Into<String>,
        outbound: mpsc::Sender<Frame>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self { user_name: user_name.into(), outbound, shutdown }
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Queue one frame without waiting. `false` means the peer's write
    /// queue is full or its connection task is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.try_send(frame).is_ok()
    }

    /// Ask the connection task to tear itself down.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<String, ClientHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is taken.
    pub fn try_insert(&mut self, handle: ClientHandle) -> bool {
        if self.clients.contains_key(handle.user_name()) {
            return false;
        }
        self.clients.insert(handle.user_name.clone(), handle);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ClientHandle> {
        self.clients.remove(name)
    }

    /// Re-key a connection. `false` if `old` is absent or `new` is taken.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.clients.contains_key(new) {
            return false;
        }
        let Some(mut handle) = self.clients.remove(old) else {
            return false;
        };
        handle.user_name = new.to_owned();
        self.clients.insert(new.to_owned(), handle);
        true
    }

    pub fn get(&self, name: &str) -> Option<&ClientHandle> {
        self.clients.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientHandle> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
