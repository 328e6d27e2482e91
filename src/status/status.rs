use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a stage, branch or step, declared in severity order
///
/// The derived `Ord` is the severity ordering: combining statuses keeps the maximum, so a
/// failure outranks success and a pending human input outranks everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotExecuted,
    Success,
    Unstable,
    Queued,
    InProgress,
    Failure,
    Aborted,
    PausedPendingInput,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::NotExecuted,
        Status::Success,
        Status::Unstable,
        Status::Queued,
        Status::InProgress,
        Status::Failure,
        Status::Aborted,
        Status::PausedPendingInput,
    ];

    /// Still waiting on the engine or a human
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::InProgress | Self::PausedPendingInput
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Worst of two statuses under severity ordering
    pub fn combine(self, other: Status) -> Status {
        self.max(other)
    }

    /// Worst status of a set, `None` for an empty set
    pub fn worst(statuses: impl IntoIterator<Item = Status>) -> Option<Status> {
        statuses.into_iter().max()
    }

    /// First API version whose consumers understand this status
    pub fn introduced_in(&self) -> StatusApiVersion {
        match self {
            Self::Queued => StatusApiVersion::V2,
            Self::NotExecuted
            | Self::Success
            | Self::Unstable
            | Self::InProgress
            | Self::Failure
            | Self::Aborted
            | Self::PausedPendingInput => StatusApiVersion::V1,
        }
    }

    /// Closest status from an older vocabulary, for statuses added after the first version
    pub fn legacy_equivalent(&self) -> Option<Status> {
        match self {
            Self::Queued => Some(Self::InProgress),
            Self::NotExecuted
            | Self::Success
            | Self::Unstable
            | Self::InProgress
            | Self::Failure
            | Self::Aborted
            | Self::PausedPendingInput => None,
        }
    }

    pub fn allowed_in(&self, version: StatusApiVersion) -> bool {
        version.statuses().contains(self)
    }

    /// Map this status into `version`'s vocabulary
    ///
    /// Pure and idempotent: legal values come back unchanged and a coerced value is legal.
    pub fn coerce_for(self, version: StatusApiVersion) -> Status {
        let mut status = self;
        while !status.allowed_in(version) {
            match status.legacy_equivalent() {
                Some(older) => status = older,
                None => break,
            }
        }
        status
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExecuted => write!(f, "NOT_EXECUTED"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Unstable => write!(f, "UNSTABLE"),
            Self::Queued => write!(f, "QUEUED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::PausedPendingInput => write!(f, "PAUSED_PENDING_INPUT"),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_EXECUTED" => Ok(Self::NotExecuted),
            "SUCCESS" => Ok(Self::Success),
            "UNSTABLE" => Ok(Self::Unstable),
            "QUEUED" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "FAILURE" => Ok(Self::Failure),
            "ABORTED" => Ok(Self::Aborted),
            "PAUSED_PENDING_INPUT" => Ok(Self::PausedPendingInput),
            _ => Err(format!("Invalid status: {s}")),
        }
    }
}

/// Status vocabularies understood by successive generations of consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusApiVersion {
    V1,
    V2,
}

const V1_STATUSES: &[Status] = &[
    Status::NotExecuted,
    Status::Success,
    Status::Unstable,
    Status::InProgress,
    Status::Failure,
    Status::Aborted,
    Status::PausedPendingInput,
];

impl StatusApiVersion {
    pub const MINIMUM: StatusApiVersion = StatusApiVersion::V1;
    pub const CURRENT: StatusApiVersion = StatusApiVersion::V2;

    pub fn all() -> [StatusApiVersion; 2] {
        [Self::V1, Self::V2]
    }

    /// The version table: statuses this version's consumers understand
    pub fn statuses(self) -> &'static [Status] {
        match self {
            Self::V1 => V1_STATUSES,
            Self::V2 => &Status::ALL,
        }
    }
}

impl Default for StatusApiVersion {
    fn default() -> Self {
        Self::MINIMUM
    }
}

impl fmt::Display for StatusApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}
