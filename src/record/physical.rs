use std::convert::TryFrom;

use crate::error::TxnLogError;
use crate::record::link::{BackwardLink, RecordId};
use crate::types::{Epoch, Lsn, Psn, INVALID_LSN, INVALID_PSN};

/// Fields every physical (local, never replicated) record carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalFields {
    /// Only ever points at an EndCheckpoint, CompleteCheckpoint or TruncateHead.
    pub linked_physical: BackwardLink,
    /// Weak forward reference to the next physical record.
    pub next_physical: Option<RecordId>,
}

/// Marks a position the log head may later be truncated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingBody {
    pub physical: PhysicalFields,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[repr(i32)]
pub enum InformationEvent {
    Invalid = 0,
    Recovered = 1,
    CopyFinished = 2,
    ReplicationFinished = 3,
    Closed = 4,
    PrimarySwap = 5,
    RestoredFromBackup = 6,
    RemovingState = 7,
}

impl TryFrom<i32> for InformationEvent {
    type Error = TxnLogError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InformationEvent::Invalid),
            1 => Ok(InformationEvent::Recovered),
            2 => Ok(InformationEvent::CopyFinished),
            3 => Ok(InformationEvent::ReplicationFinished),
            4 => Ok(InformationEvent::Closed),
            5 => Ok(InformationEvent::PrimarySwap),
            6 => Ok(InformationEvent::RestoredFromBackup),
            7 => Ok(InformationEvent::RemovingState),
            other => Err(TxnLogError::Corrupted(format!(
                "Unknown information event: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationBody {
    pub physical: PhysicalFields,
    pub event: InformationEvent,
}

/// The log head (an Indexing record) as it was when the owning record was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeadFields {
    pub head_epoch: Epoch,
    pub head_lsn: Lsn,
    pub head_psn: Psn,
    pub head: BackwardLink,
}

impl LogHeadFields {
    pub fn new(head_epoch: Epoch, head_lsn: Lsn, head_psn: Psn) -> Self {
        Self {
            head_epoch,
            head_lsn,
            head_psn,
            head: BackwardLink::none(),
        }
    }
}

impl Default for LogHeadFields {
    fn default() -> Self {
        Self::new(Epoch::INVALID, INVALID_LSN, INVALID_PSN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateHeadBody {
    pub physical: PhysicalFields,
    pub log_head: LogHeadFields,
    pub is_stable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateTailBody {
    pub physical: PhysicalFields,
    pub log_head: LogHeadFields,
}
