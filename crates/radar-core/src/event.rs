//! The activity event carried on the wire and persisted to the log.

use chrono::{Local, NaiveDateTime};

/// Timestamp format used on the wire and in the log table.
///
/// Sorts lexicographically, so stored text timestamps compare correctly.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One recorded activity: who did what, with what parameters, when.
///
/// Immutable once created; the hub either received it from a client or
/// synthesized it (connect, disconnect, join).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user_name: String,
    pub event_type: String,
    pub parameters: String,
    pub time: NaiveDateTime,
}

impl Event {
    /// An event stamped with the current local time.
    pub fn new(
        user_name: impl Into<String>,
        event_type: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self::at(user_name, event_type, parameters, Local::now().naive_local())
    }

    /// An event with an explicit timestamp (replayed history).
    pub fn at(
        user_name: impl Into<String>,
        event_type: impl Into<String>,
        parameters: impl Into<String>,
        time: NaiveDateTime,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            event_type: event_type.into(),
            parameters: parameters.into(),
            time,
        }
    }

    pub fn format_time(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }

    pub fn parse_time(text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, TIME_FORMAT).ok()
    }

    /// The development phase this event belongs to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self.event_type.as_str() {
            "MODE" => match self.parameters.as_str() {
                "Projects" => Some(Phase::Project),
                "Edit" => Some(Phase::Coding),
                "Design" => Some(Phase::Prototyping),
                "Debug" => Some(Phase::Testing),
                _ => None,
            },
            "SCM_COMMIT" => Some(Phase::Deployment),
            _ => None,
        }
    }
}

/// A lifecycle stage derived from event type + parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Project,
    Coding,
    Prototyping,
    Testing,
    Deployment,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Coding => "Coding",
            Self::Prototyping => "Prototyping",
            Self::Testing => "Testing",
            Self::Deployment => "Deployment",
        }
    }

    /// Parse a phase label as it appears in a REQ_EVENTS body.
    pub fn from_label(label: &str) -> Option<Self> {
        Some(match label {
            "Project" => Self::Project,
            "Coding" => Self::Coding,
            "Prototyping" => Self::Prototyping,
            "Testing" => Self::Testing,
            "Deployment" => Self::Deployment,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
