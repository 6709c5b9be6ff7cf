//! The static header-tag table.
//!
//! Every frame on the wire starts with one of these tags. The table is the
//! single source of truth for header recognition: a header that does not
//! map to a `Tag` is dropped by the codec without aborting the connection.

/// A recognized frame header.
///
/// `GREETING`, `EVENT` and `CHAT` travel in both directions; the `REQ_*`
/// family is client-to-server only and the `*_REPLY` family server-to-client
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Greeting,
    Event,
    Chat,
    RegPhoto,
    RegColor,
    JoinProject,
    ReqTeamMembers,
    ReqOnline,
    ReqPhoto,
    ReqColor,
    ReqEvents,
    ReqTimeSpan,
    ReqProjects,
    ReqLocation,
    EventsReply,
    TeamMembersReply,
    OnlineReply,
    PhotoReply,
    ColorReply,
    TimeSpanReply,
    ProjectsReply,
    LocationReply,
}

impl Tag {
    /// The wire spelling of this tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::Event => "EVENT",
            Self::Chat => "CHAT",
            Self::RegPhoto => "REG_PHOTO",
            Self::RegColor => "REG_COLOR",
            Self::JoinProject => "JOIN_PROJECT",
            Self::ReqTeamMembers => "REQ_TEAMMEMBERS",
            Self::ReqOnline => "REQ_ONLINE",
            Self::ReqPhoto => "REQ_PHOTO",
            Self::ReqColor => "REQ_COLOR",
            Self::ReqEvents => "REQ_EVENTS",
            Self::ReqTimeSpan => "REQ_TIMESPAN",
            Self::ReqProjects => "REQ_PROJECTS",
            Self::ReqLocation => "REQ_LOCATION",
            Self::EventsReply => "EVENTS_REPLY",
            Self::TeamMembersReply => "TEAMMEMBERS_REPLY",
            Self::OnlineReply => "ONLINE_REPLY",
            Self::PhotoReply => "PHOTO_REPLY",
            Self::ColorReply => "COLOR_REPLY",
            Self::TimeSpanReply => "TIMESPAN_REPLY",
            Self::ProjectsReply => "PROJECTS_REPLY",
            Self::LocationReply => "LOCATION_REPLY",
        }
    }

    /// Look a raw header up in the tag table. `None` for unknown headers.
    pub fn from_bytes(header: &[u8]) -> Option<Self> {
        Some(match header {
            b"GREETING" => Self::Greeting,
            b"EVENT" => Self::Event,
            b"CHAT" => Self::Chat,
            b"REG_PHOTO" => Self::RegPhoto,
            b"REG_COLOR" => Self::RegColor,
            b"JOIN_PROJECT" => Self::JoinProject,
            b"REQ_TEAMMEMBERS" => Self::ReqTeamMembers,
            b"REQ_ONLINE" => Self::ReqOnline,
            b"REQ_PHOTO" => Self::ReqPhoto,
            b"REQ_COLOR" => Self::ReqColor,
            b"REQ_EVENTS" => Self::ReqEvents,
            b"REQ_TIMESPAN" => Self::ReqTimeSpan,
            b"REQ_PROJECTS" => Self::ReqProjects,
            b"REQ_LOCATION" => Self::ReqLocation,
            b"EVENTS_REPLY" => Self::EventsReply,
            b"TEAMMEMBERS_REPLY" => Self::TeamMembersReply,
            b"ONLINE_REPLY" => Self::OnlineReply,
            b"PHOTO_REPLY" => Self::PhotoReply,
            b"COLOR_REPLY" => Self::ColorReply,
            b"TIMESPAN_REPLY" => Self::TimeSpanReply,
            b"PROJECTS_REPLY" => Self::ProjectsReply,
            b"LOCATION_REPLY" => Self::LocationReply,
            _ => return None,
        })
    }

    /// True for tags a client may send to the server.
    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Greeting
                | Self::Event
                | Self::Chat
                | Self::RegPhoto
                | Self::RegColor
                | Self::JoinProject
                | Self::ReqTeamMembers
                | Self::ReqOnline
                | Self::ReqPhoto
                | Self::ReqColor
                | Self::ReqEvents
                | Self::ReqTimeSpan
                | Self::ReqProjects
                | Self::ReqLocation
        )
    }

    /// True for tags the server may send to a client.
    pub const fn is_outbound(self) -> bool {
        matches!(
            self,
            Self::Greeting
                | Self::Event
                | Self::Chat
                | Self::EventsReply
                | Self::TeamMembersReply
                | Self::OnlineReply
                | Self::PhotoReply
                | Self::ColorReply
                | Self::TimeSpanReply
                | Self::ProjectsReply
                | Self::LocationReply
        )
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Tag; 22] = [
        Tag::Greeting,
        Tag::Event,
        Tag::Chat,
        Tag::RegPhoto,
        Tag::RegColor,
        Tag::JoinProject,
        Tag::ReqTeamMembers,
        Tag::ReqOnline,
        Tag::ReqPhoto,
        Tag::ReqColor,
        Tag::ReqEvents,
        Tag::ReqTimeSpan,
        Tag::ReqProjects,
        Tag::ReqLocation,
        Tag::EventsReply,
        Tag::TeamMembersReply,
        Tag::OnlineReply,
        Tag::PhotoReply,
        Tag::ColorReply,
        Tag::TimeSpanReply,
        Tag::ProjectsReply,
        Tag::LocationReply,
    ];

    #[test]
    fn table_round_trips_every_tag() {
        for tag in ALL {
            assert_eq!(Tag::from_bytes(tag.as_str().as_bytes()), Some(tag));
        }
    }

    #[test]
    fn unknown_headers_are_rejected() {
        assert_eq!(Tag::from_bytes(b"PING"), None);
        assert_eq!(Tag::from_bytes(b"greeting"), None);
        assert_eq!(Tag::from_bytes(b""), None);
    }

    /// The direction sets overlap only on the bidirectional trio.
    #[test]
    fn direction_partition() {
        for tag in ALL {
            assert!(tag.is_inbound() || tag.is_outbound(), "{tag} has no direction");
            if tag.is_inbound() && tag.is_outbound() {
                assert!(
                    matches!(tag, Tag::Greeting | Tag::Event | Tag::Chat),
                    "{tag} must not be bidirectional"
                );
            }
        }
    }
}
