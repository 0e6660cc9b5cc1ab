//! Pipeline registry
//!
//! Static definition of the lead pipeline: the eleven stages in display order,
//! which of them are terminal, the three priorities, and the stage subsets the
//! dashboards use to decide affordances (meeting scheduling, call recording).
//!
//! Order is display/reporting order only. There is no transition graph: any
//! stage may be set from any other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::CoreError;

/// Pipeline stage a lead currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "New Lead")]
    NewLead,
    #[serde(rename = "Working")]
    Working,
    #[serde(rename = "Connected")]
    Connected,
    #[serde(rename = "Qualified")]
    Qualified,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    #[serde(rename = "Meeting Completed")]
    MeetingCompleted,
    #[serde(rename = "Proposal Sent")]
    ProposalSent,
    #[serde(rename = "Negotiation")]
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
    #[serde(rename = "Nurture")]
    Nurture,
}

/// All stages in display order.
pub const STAGES: [Stage; 11] = [
    Stage::NewLead,
    Stage::Working,
    Stage::Connected,
    Stage::Qualified,
    Stage::MeetingBooked,
    Stage::MeetingCompleted,
    Stage::ProposalSent,
    Stage::Negotiation,
    Stage::ClosedWon,
    Stage::ClosedLost,
    Stage::Nurture,
];

/// Stages after which no further progression is modeled.
pub const TERMINAL_STAGES: [Stage; 3] = [Stage::ClosedWon, Stage::ClosedLost, Stage::Nurture];

/// Stages where the meeting scheduler is offered.
pub const MEETING_STAGES: [Stage; 2] = [Stage::MeetingBooked, Stage::MeetingCompleted];

/// Stages where call recordings are flagged for review.
pub const RECORDING_FLAG_STAGES: [Stage; 2] = [Stage::Connected, Stage::MeetingCompleted];

/// Ordered stage keys. Fixed, never empty.
pub fn list_stages() -> &'static [Stage; 11] {
    &STAGES
}

pub fn is_terminal(stage: Stage) -> bool {
    TERMINAL_STAGES.contains(&stage)
}

impl Stage {
    /// Wire/display key, e.g. "Meeting Booked".
    pub fn key(&self) -> &'static str {
        match self {
            Stage::NewLead => "New Lead",
            Stage::Working => "Working",
            Stage::Connected => "Connected",
            Stage::Qualified => "Qualified",
            Stage::MeetingBooked => "Meeting Booked",
            Stage::MeetingCompleted => "Meeting Completed",
            Stage::ProposalSent => "Proposal Sent",
            Stage::Negotiation => "Negotiation",
            Stage::ClosedWon => "Closed Won",
            Stage::ClosedLost => "Closed Lost",
            Stage::Nurture => "Nurture",
        }
    }

    /// Index in display order.
    pub fn position(&self) -> usize {
        *self as usize
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(*self)
    }

    pub fn is_meeting_stage(&self) -> bool {
        MEETING_STAGES.contains(self)
    }

    pub fn flags_recording(&self) -> bool {
        RECORDING_FLAG_STAGES.contains(self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        STAGES
            .iter()
            .find(|stage| stage.key().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| CoreError::InvalidStage(s.to_string()))
    }
}

/// Lead priority used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "A", alias = "A - High")]
    High,
    #[serde(rename = "B", alias = "B - Medium")]
    Medium,
    #[serde(rename = "C", alias = "C - Low")]
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn key(&self) -> &'static str {
        match self {
            Priority::High => "A",
            Priority::Medium => "B",
            Priority::Low => "C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "A - High",
            Priority::Medium => "B - Medium",
            Priority::Low => "C - Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Priority::ALL
            .iter()
            .find(|p| p.key().eq_ignore_ascii_case(wanted) || p.label().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| CoreError::InvalidPriority(s.to_string()))
    }
}
