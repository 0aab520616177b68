//! Pipeline stages and the per-unit state machine

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Processing stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Download,
    Clean,
    Metadata,
    References,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::Clean,
        Stage::Metadata,
        Stage::References,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Clean => "clean",
            Self::Metadata => "metadata",
            Self::References => "references",
        }
    }

    /// Whether the stage talks to an upstream service (and so takes rate-limiter permits).
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Clean)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

/// Lifecycle of one work unit.
///
/// `Pending → Downloaded → Cleaned → MetadataExtracted → ReferencesFetched`,
/// with `Failed` absorbing from any stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Downloaded,
    Cleaned,
    MetadataExtracted,
    ReferencesFetched,
    Failed { stage: Stage, reason: String },
}

impl UnitState {
    /// State reached once `stage` has completed.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Download => Self::Downloaded,
            Stage::Clean => Self::Cleaned,
            Stage::Metadata => Self::MetadataExtracted,
            Stage::References => Self::ReferencesFetched,
        }
    }

    /// Furthest state backed by an unbroken prefix of completed stages.
    pub fn from_completed(done: &BTreeSet<Stage>) -> Self {
        let mut state = Self::Pending;
        for stage in Stage::ALL {
            if !done.contains(&stage) {
                break;
            }
            state = Self::after(stage);
        }
        state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::ReferencesFetched)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Downloaded => f.write_str("downloaded"),
            Self::Cleaned => f.write_str("cleaned"),
            Self::MetadataExtracted => f.write_str("metadata"),
            Self::ReferencesFetched => f.write_str("complete"),
            Self::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}
