//! Central dispatch: every ready connection feeds its frames into one hub
//! task, which owns the registry, the event log, the user directory and the
//! photo store. Serializing all shared-state mutation here is what makes
//! greeting admission atomic and keeps per-user log order equal to wire
//! order.
//!
//! Fan-out rule: broadcasts go to the source user's project-mates, never
//! back to the source. Chat is the one exception (explicit recipient list).
//! A slow consumer (full write queue) is closed rather than awaited.

use crate::blob::PhotoStore;
use crate::db::{Db, DbError, EventFilter};
use crate::registry::{ClientHandle, Registry};
use radar_core::{Event, Phase, PhaseClusterer, TIME_FORMAT};
use radar_protocol::{Frame, Tag, split_fields, split_list, split_pair};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Depth of the inbound hub queue shared by all connections.
pub const HUB_QUEUE_DEPTH: usize = 1024;

/// What a connection task can tell the hub.
pub enum HubMessage {
    /// Greeting admission request. `reply` resolves to `false` when the
    /// name is empty or already held.
    Hello {
        user_name: String,
        peer: SocketAddr,
        outbound: mpsc::Sender<Frame>,
        shutdown: watch::Sender<bool>,
        reply: oneshot::Sender<bool>,
    },
    /// One inbound frame from a ready connection, in wire order.
    Frame { user_name: String, frame: Frame },
    /// The connection is gone (peer close, framing error, timeout or
    /// hub-requested shutdown). Sent exactly once per admitted connection.
    Goodbye { user_name: String },
}

#[derive(Debug, thiserror::Error)]
enum HubError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("photo store: {0}")]
    Blob(#[from] std::io::Error),
}

pub struct Hub {
    registry: Registry,
    db: Db,
    photos: PhotoStore,
}

impl Hub {
    pub fn new(db: Db, photos: PhotoStore) -> Self {
        Self { registry: Registry::new(), db, photos }
    }

    /// Spawn the hub task; the returned sender is cloned into every
    /// connection. The task exits when the last sender is dropped.
    pub fn spawn(self) -> mpsc::Sender<HubMessage> {
        let (tx, rx) = mpsc::channel(HUB_QUEUE_DEPTH);
        tokio::spawn(self.run(rx));
        tx
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<HubMessage>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
        debug!("hub queue drained");
    }

    fn handle(&mut self, msg: HubMessage) {
        match msg {
            HubMessage::Hello { user_name, peer, outbound, shutdown, reply } => {
                self.on_hello(user_name, peer, outbound, shutdown, reply);
            }
            HubMessage::Frame { user_name, frame } => {
                if let Err(e) = self.on_frame(&user_name, &frame) {
                    error!(user = %user_name, tag = %frame.tag, error = %e, "handler failed, closing connection");
                    if let Some(handle) = self.registry.get(&user_name) {
                        handle.close();
                    }
                }
            }
            HubMessage::Goodbye { user_name } => self.on_goodbye(&user_name),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    fn on_hello(
        &mut self,
        user_name: String,
        peer: SocketAddr,
        outbound: mpsc::Sender<Frame>,
        shutdown: watch::Sender<bool>,
        reply: oneshot::Sender<bool>,
    ) {
        if user_name.is_empty() || self.registry.contains(&user_name) {
            debug!(user = %user_name, %peer, "greeting refused");
            let _ = reply.send(false);
            return;
        }
        let recorded = self
            .db
            .upsert_user(&user_name)
            .and_then(|()| self.db.set_online(&user_name, true))
            .and_then(|()| self.db.append_event(&Event::new(&user_name, "Connected", "")));
        match recorded {
            Ok(_) => {
                self.registry.try_insert(ClientHandle::new(&user_name, outbound, shutdown));
                info!(user = %user_name, %peer, "client connected");
                let _ = reply.send(true);
            }
            Err(e) => {
                error!(user = %user_name, error = %e, "failed to record connect");
                let _ = reply.send(false);
            }
        }
    }

    fn on_goodbye(&mut self, user_name: &str) {
        if self.registry.remove(user_name).is_none() {
            return;
        }
        info!(user = %user_name, "client disconnected");
        let event = Event::new(user_name, "DISCONNECTED", "");
        match self.db.project(user_name) {
            Ok(project) => self.fan_out(&project, user_name, &event_frame(&event)),
            Err(e) => error!(user = %user_name, error = %e, "project lookup failed"),
        }
        if let Err(e) = self.db.set_online(user_name, false) {
            error!(user = %user_name, error = %e, "failed to mark offline");
        }
        if let Err(e) = self.db.append_event(&event) {
            error!(user = %user_name, error = %e, "failed to log disconnect");
        }
    }

    // -----------------------------------------------------------------------
    // Frame dispatch
    // -----------------------------------------------------------------------

    fn on_frame(&mut self, user: &str, frame: &Frame) -> Result<(), HubError> {
        match frame.tag {
            // Consumed during the handshake; a late greeting is noise.
            Tag::Greeting => Ok(()),
            Tag::Event => self.on_event(user, &frame.body),
            Tag::RegPhoto => self.on_register_photo(user, &frame.body),
            Tag::RegColor => self.on_register_color(user, &frame.body),
            Tag::JoinProject => self.on_join_project(user, &frame.body),
            Tag::Chat => self.on_chat(user, &frame.body),
            Tag::ReqTeamMembers => self.on_request_team_members(user),
            Tag::ReqOnline => self.on_request_online(user, &frame.body),
            Tag::ReqPhoto => self.on_request_photo(user, &frame.body),
            Tag::ReqColor => self.on_request_color(user, &frame.body),
            Tag::ReqEvents => self.on_request_events(user, &frame.body),
            Tag::ReqTimeSpan => self.on_request_time_span(user),
            Tag::ReqProjects => self.on_request_projects(user),
            Tag::ReqLocation => self.on_request_location(user, &frame.body),
            _ => {
                debug!(user, tag = %frame.tag, "ignoring outbound-only tag");
                Ok(())
            }
        }
    }

    fn on_event(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let (event_type, parameters) = split_pair(body);
        let event = Event::new(
            user,
            String::from_utf8_lossy(event_type),
            String::from_utf8_lossy(parameters),
        );
        self.db.append_event(&event)?;
        self.broadcast(user, &event_frame(&event))?;
        Ok(())
    }

    fn on_register_photo(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let (suffix, data) = split_pair(body);
        let file_name = format!("{user}.{}", String::from_utf8_lossy(suffix));
        let path = self.photos.put(&file_name, data)?;
        self.db.set_image(user, &path.to_string_lossy())?;
        self.db.append_event(&Event::new(user, "Register Photo", ""))?;
        self.broadcast(user, &Frame::joined(Tag::PhotoReply, &[file_name.as_bytes(), data]))?;
        Ok(())
    }

    fn on_register_color(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let color = String::from_utf8_lossy(body).into_owned();
        self.db.set_color(user, &color)?;
        self.db.append_event(&Event::new(user, "Register Color", &color))?;
        self.broadcast(user, &Frame::joined(Tag::ColorReply, &[user.as_bytes(), color.as_bytes()]))?;
        Ok(())
    }

    fn on_join_project(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let project = String::from_utf8_lossy(body).into_owned();
        let previous = self.db.project(user)?;
        if !previous.is_empty() && previous != project {
            let left = Event::new(user, "DISCONNECTED", &previous);
            self.fan_out(&previous, user, &event_frame(&left));
            self.db.append_event(&left)?;
        }
        self.db.set_project(user, &project)?;
        let joined = Event::new(user, "JOINED", &project);
        self.fan_out(&project, user, &event_frame(&joined));
        self.db.append_event(&joined)?;
        Ok(())
    }

    /// Chat is unicast to the listed recipients and never logged.
    fn on_chat(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let (recipients, content) = split_pair(body);
        let frame = Frame::joined(Tag::Chat, &[user.as_bytes(), content]);
        for recipient in split_list(recipients) {
            let name = String::from_utf8_lossy(recipient);
            let Some(handle) = self.registry.get(name.as_ref()) else {
                continue;
            };
            if !handle.send(frame.clone()) {
                warn!(user = %name, "write queue full, closing slow consumer");
                handle.close();
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn on_request_team_members(&mut self, user: &str) -> Result<(), HubError> {
        let project = self.db.project(user)?;
        let members = self.db.project_members(&project)?;
        let parts: Vec<&[u8]> = members.iter().map(|m| m.as_bytes()).collect();
        self.reply(user, Frame::joined(Tag::TeamMembersReply, &parts));
        self.db.append_event(&Event::new(user, "Request Team Members", ""))?;
        Ok(())
    }

    fn on_request_online(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let target = String::from_utf8_lossy(body).into_owned();
        let answer: &[u8] = if self.registry.contains(&target) { b"TRUE" } else { b"FALSE" };
        self.reply(user, Frame::joined(Tag::OnlineReply, &[target.as_bytes(), answer]));
        self.db.append_event(&Event::new(user, "Request Online", &target))?;
        Ok(())
    }

    fn on_request_photo(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let target = String::from_utf8_lossy(body).into_owned();
        let file_name = format!("{target}.png");
        match self.photos.get(&file_name) {
            Ok(Some(data)) => {
                self.reply(user, Frame::joined(Tag::PhotoReply, &[file_name.as_bytes(), &data]));
                self.db.append_event(&Event::new(user, "Request Photo", &target))?;
            }
            // A miss gets no reply at all, only a failure row.
            Ok(None) | Err(_) => {
                self.db.append_event(&Event::new(user, "Failed: Request Photo", &target))?;
            }
        }
        Ok(())
    }

    fn on_request_color(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let target = String::from_utf8_lossy(body).into_owned();
        let color = self.db.color(&target)?;
        self.reply(user, Frame::joined(Tag::ColorReply, &[target.as_bytes(), color.as_bytes()]));
        self.db.append_event(&Event::new(user, "Request Color", &target))?;
        Ok(())
    }

    fn on_request_events(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let (filter, phases, fuzziness) = parse_events_request(body);
        let events = self.db.events(&filter)?;
        let clusterer = PhaseClusterer::new(events, fuzziness);
        for event in clusterer.cluster(&phases) {
            self.reply(user, events_reply_frame(&event));
        }
        self.db.append_event(&Event::new(user, "Request Events", ""))?;
        Ok(())
    }

    fn on_request_time_span(&mut self, user: &str) -> Result<(), HubError> {
        let frame = match self.db.time_span()? {
            Some((min, max)) => {
                let min = min.format(TIME_FORMAT).to_string();
                let max = max.format(TIME_FORMAT).to_string();
                Frame::joined(Tag::TimeSpanReply, &[min.as_bytes(), max.as_bytes()])
            }
            None => Frame::empty(Tag::TimeSpanReply),
        };
        self.reply(user, frame);
        self.db.append_event(&Event::new(user, "Request Time Span", ""))?;
        Ok(())
    }

    fn on_request_projects(&mut self, user: &str) -> Result<(), HubError> {
        let projects = self.db.projects()?;
        let parts: Vec<&[u8]> = projects.iter().map(|p| p.as_bytes()).collect();
        self.reply(user, Frame::joined(Tag::ProjectsReply, &parts));
        self.db.append_event(&Event::new(user, "Request Projects", ""))?;
        Ok(())
    }

    /// The location answer is the target's most recent SAVE, replayed to the
    /// requester as a plain EVENT frame.
    fn on_request_location(&mut self, user: &str, body: &[u8]) -> Result<(), HubError> {
        let target = String::from_utf8_lossy(body).into_owned();
        match self.db.latest_event_of_type(&target, "SAVE")? {
            Some(event) => {
                self.reply(user, event_frame(&event));
                self.db.append_event(&Event::new(user, "Request Location", &target))?;
            }
            None => {
                self.db.append_event(&Event::new(user, "Failed: Request Location", &target))?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Send to every ready member of the source's project, except the source.
    fn broadcast(&self, source: &str, frame: &Frame) -> Result<(), HubError> {
        let project = self.db.project(source)?;
        self.fan_out(&project, source, frame);
        Ok(())
    }

    /// Send to every ready member of `project` except `source`. Offline
    /// members are skipped; slow consumers are closed.
    fn fan_out(&self, project: &str, source: &str, frame: &Frame) {
        let members = match self.db.project_members(project) {
            Ok(members) => members,
            Err(e) => {
                error!(project, error = %e, "member lookup failed, dropping broadcast");
                return;
            }
        };
        for member in members {
            if member == source {
                continue;
            }
            let Some(handle) = self.registry.get(&member) else {
                continue;
            };
            if !handle.send(frame.clone()) {
                warn!(user = %member, "write queue full, closing slow consumer");
                handle.close();
            }
        }
    }

    /// Unicast back to the requester.
    fn reply(&self, user: &str, frame: Frame) {
        let Some(handle) = self.registry.get(user) else {
            return;
        };
        if !handle.send(frame) {
            warn!(user, "write queue full, closing slow consumer");
            handle.close();
        }
    }
}

/// `user # eventType # parameters # timestamp`, shared by EVENT broadcasts
/// and the REQ_LOCATION reply.
fn event_frame(event: &Event) -> Frame {
    let time = event.format_time();
    Frame::joined(
        Tag::Event,
        &[
            event.user_name.as_bytes(),
            event.event_type.as_bytes(),
            event.parameters.as_bytes(),
            time.as_bytes(),
        ],
    )
}

fn events_reply_frame(event: &Event) -> Frame {
    let time = event.format_time();
    Frame::joined(
        Tag::EventsReply,
        &[
            event.user_name.as_bytes(),
            event.event_type.as_bytes(),
            event.parameters.as_bytes(),
            time.as_bytes(),
        ],
    )
}

/// Parse a REQ_EVENTS body: `users;… # types;… # start;end # phases;… # fuzziness`.
///
/// Empty segments impose no constraint; unparseable phases and times are
/// dropped; a missing or bad fuzziness is 0.
fn parse_events_request(body: &[u8]) -> (EventFilter, Vec<Phase>, u32) {
    let fields = split_fields(body);

    let string_list = |index: usize| -> Vec<String> {
        fields
            .get(index)
            .map(|field| {
                split_list(field)
                    .into_iter()
                    .map(|item| String::from_utf8_lossy(item).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    };

    let users = string_list(0);
    let types = string_list(1);

    let (start, end) = fields
        .get(2)
        .map(|window| {
            let mut bounds = window.split(|&b| b == radar_protocol::LIST_SEP);
            let parse = |part: Option<&[u8]>| {
                part.and_then(|text| Event::parse_time(&String::from_utf8_lossy(text)))
            };
            (parse(bounds.next()), parse(bounds.next()))
        })
        .unwrap_or((None, None));

    let phases: Vec<Phase> = fields
        .get(3)
        .map(|field| {
            split_list(field)
                .into_iter()
                .filter_map(|label| Phase::from_label(&String::from_utf8_lossy(label)))
                .collect()
        })
        .unwrap_or_default();

    let fuzziness = fields
        .get(4)
        .and_then(|field| std::str::from_utf8(field).ok())
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0);

    (EventFilter { users, types, start, end }, phases, fuzziness)
}
