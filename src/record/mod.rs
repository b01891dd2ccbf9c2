//! Log record model.
//!
//! A record is a common header ([`LogRecord`]) plus a closed set of per-kind bodies
//! ([`RecordBody`]). Records refer to each other through [`BackwardLink`]s whose
//! serialized form is a byte offset back from the record's own position.

pub mod checkpoint;
pub mod codec;
pub mod completion;
pub mod link;
pub mod logical;
pub mod physical;
pub mod transaction;

use std::convert::TryFrom;

pub use checkpoint::{BeginCheckpointBody, CheckpointState, CompleteCheckpointBody, EndCheckpointBody};
pub use codec::{decode_record, encode_record, size_on_wire, RECORD_LENGTH_FIELD_LEN};
pub use completion::{CompletionSignal, CompletionWaiter};
pub use link::{BackwardLink, LinkKind, LinkTarget, RecordId};
pub use logical::{BackupBody, BackupInfo, BarrierBody, UpdateEpochBody};
pub use physical::{
    IndexingBody, InformationBody, InformationEvent, LogHeadFields, PhysicalFields,
    TruncateHeadBody, TruncateTailBody,
};
pub use transaction::{
    BeginTransactionBody, EndTransactionBody, OperationBody, OperationData, TransactionFields,
};

use crate::error::{TxnLogError, TxnLogResult};
use crate::progress::ProgressVector;
use crate::types::{Epoch, Lsn, Psn, ReplicaId, TransactionId, INVALID_PSN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[repr(i32)]
pub enum LogRecordType {
    Invalid = 0,
    BeginTransaction = 1,
    Operation = 2,
    EndTransaction = 3,
    Barrier = 4,
    UpdateEpoch = 5,
    Backup = 6,
    BeginCheckpoint = 7,
    EndCheckpoint = 8,
    Indexing = 9,
    TruncateHead = 10,
    TruncateTail = 11,
    Information = 12,
    CompleteCheckpoint = 13,
}

impl TryFrom<i32> for LogRecordType {
    type Error = TxnLogError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LogRecordType::BeginTransaction),
            2 => Ok(LogRecordType::Operation),
            3 => Ok(LogRecordType::EndTransaction),
            4 => Ok(LogRecordType::Barrier),
            5 => Ok(LogRecordType::UpdateEpoch),
            6 => Ok(LogRecordType::Backup),
            7 => Ok(LogRecordType::BeginCheckpoint),
            8 => Ok(LogRecordType::EndCheckpoint),
            9 => Ok(LogRecordType::Indexing),
            10 => Ok(LogRecordType::TruncateHead),
            11 => Ok(LogRecordType::TruncateTail),
            12 => Ok(LogRecordType::Information),
            13 => Ok(LogRecordType::CompleteCheckpoint),
            other => Err(TxnLogError::Corrupted(format!(
                "Unknown log record type: {}",
                other
            ))),
        }
    }
}

impl LogRecordType {
    pub fn is_physical(self) -> bool {
        matches!(
            self,
            LogRecordType::BeginCheckpoint
                | LogRecordType::CompleteCheckpoint
                | LogRecordType::EndCheckpoint
                | LogRecordType::Indexing
                | LogRecordType::Information
                | LogRecordType::TruncateHead
                | LogRecordType::TruncateTail
        )
    }

    pub fn is_transaction(self) -> bool {
        matches!(
            self,
            LogRecordType::BeginTransaction
                | LogRecordType::Operation
                | LogRecordType::EndTransaction
        )
    }

    /// Shipped to secondaries. UpdateEpoch is logical but stays local.
    pub fn is_replicated(self) -> bool {
        !self.is_physical() && self != LogRecordType::UpdateEpoch && self != LogRecordType::Invalid
    }

    /// Kinds a linked-physical pointer may target.
    pub fn is_linkable_physical_target(self) -> bool {
        matches!(
            self,
            LogRecordType::EndCheckpoint
                | LogRecordType::CompleteCheckpoint
                | LogRecordType::TruncateHead
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RecordBody {
    BeginTransaction(Box<BeginTransactionBody>),
    Operation(Box<OperationBody>),
    EndTransaction(EndTransactionBody),
    Barrier(BarrierBody),
    UpdateEpoch(UpdateEpochBody),
    Backup(BackupBody),
    BeginCheckpoint(Box<BeginCheckpointBody>),
    EndCheckpoint(EndCheckpointBody),
    Indexing(IndexingBody),
    TruncateHead(TruncateHeadBody),
    TruncateTail(TruncateTailBody),
    Information(InformationBody),
    CompleteCheckpoint(CompleteCheckpointBody),
}

impl RecordBody {
    pub fn record_type(&self) -> LogRecordType {
        match self {
            RecordBody::BeginTransaction(_) => LogRecordType::BeginTransaction,
            RecordBody::Operation(_) => LogRecordType::Operation,
            RecordBody::EndTransaction(_) => LogRecordType::EndTransaction,
            RecordBody::Barrier(_) => LogRecordType::Barrier,
            RecordBody::UpdateEpoch(_) => LogRecordType::UpdateEpoch,
            RecordBody::Backup(_) => LogRecordType::Backup,
            RecordBody::BeginCheckpoint(_) => LogRecordType::BeginCheckpoint,
            RecordBody::EndCheckpoint(_) => LogRecordType::EndCheckpoint,
            RecordBody::Indexing(_) => LogRecordType::Indexing,
            RecordBody::TruncateHead(_) => LogRecordType::TruncateHead,
            RecordBody::TruncateTail(_) => LogRecordType::TruncateTail,
            RecordBody::Information(_) => LogRecordType::Information,
            RecordBody::CompleteCheckpoint(_) => LogRecordType::CompleteCheckpoint,
        }
    }

    pub fn physical(&self) -> Option<&PhysicalFields> {
        match self {
            RecordBody::BeginCheckpoint(b) => Some(&b.physical),
            RecordBody::EndCheckpoint(b) => Some(&b.physical),
            RecordBody::Indexing(b) => Some(&b.physical),
            RecordBody::TruncateHead(b) => Some(&b.physical),
            RecordBody::TruncateTail(b) => Some(&b.physical),
            RecordBody::Information(b) => Some(&b.physical),
            RecordBody::CompleteCheckpoint(b) => Some(&b.physical),
            _ => None,
        }
    }

    pub fn physical_mut(&mut self) -> Option<&mut PhysicalFields> {
        match self {
            RecordBody::BeginCheckpoint(b) => Some(&mut b.physical),
            RecordBody::EndCheckpoint(b) => Some(&mut b.physical),
            RecordBody::Indexing(b) => Some(&mut b.physical),
            RecordBody::TruncateHead(b) => Some(&mut b.physical),
            RecordBody::TruncateTail(b) => Some(&mut b.physical),
            RecordBody::Information(b) => Some(&mut b.physical),
            RecordBody::CompleteCheckpoint(b) => Some(&mut b.physical),
            _ => None,
        }
    }

    pub fn transaction(&self) -> Option<&TransactionFields> {
        match self {
            RecordBody::BeginTransaction(b) => Some(&b.transaction),
            RecordBody::Operation(b) => Some(&b.transaction),
            RecordBody::EndTransaction(b) => Some(&b.transaction),
            _ => None,
        }
    }

    pub fn transaction_mut(&mut self) -> Option<&mut TransactionFields> {
        match self {
            RecordBody::BeginTransaction(b) => Some(&mut b.transaction),
            RecordBody::Operation(b) => Some(&mut b.transaction),
            RecordBody::EndTransaction(b) => Some(&mut b.transaction),
            _ => None,
        }
    }

    pub fn log_head(&self) -> Option<&LogHeadFields> {
        match self {
            RecordBody::CompleteCheckpoint(b) => Some(&b.log_head),
            RecordBody::TruncateHead(b) => Some(&b.log_head),
            RecordBody::TruncateTail(b) => Some(&b.log_head),
            _ => None,
        }
    }

    pub fn log_head_mut(&mut self) -> Option<&mut LogHeadFields> {
        match self {
            RecordBody::CompleteCheckpoint(b) => Some(&mut b.log_head),
            RecordBody::TruncateHead(b) => Some(&mut b.log_head),
            RecordBody::TruncateTail(b) => Some(&mut b.log_head),
            _ => None,
        }
    }
}

/// A single log record: common header plus kind-specific body.
#[derive(Debug)]
pub struct LogRecord {
    pub lsn: Lsn,
    /// Assigned when the record is written to the local log.
    pub psn: Psn,
    record_length: Option<u32>,
    record_position: Option<u64>,
    /// Nearest preceding physical record.
    pub previous_physical: BackwardLink,
    pub applied: CompletionSignal,
    pub flushed: CompletionSignal,
    pub processed: CompletionSignal,
    pub body: RecordBody,
}

impl LogRecord {
    pub fn new(lsn: Lsn, body: RecordBody) -> Self {
        Self {
            lsn,
            psn: INVALID_PSN,
            record_length: None,
            record_position: None,
            previous_physical: BackwardLink::none(),
            applied: CompletionSignal::new(),
            flushed: CompletionSignal::new(),
            processed: CompletionSignal::new(),
            body,
        }
    }

    pub fn begin_transaction(
        lsn: Lsn,
        transaction_id: TransactionId,
        is_single_operation_transaction: bool,
        metadata: Option<OperationData>,
        redo: Option<OperationData>,
        undo: Option<OperationData>,
    ) -> Self {
        Self::new(
            lsn,
            RecordBody::BeginTransaction(Box::new(BeginTransactionBody {
                transaction: TransactionFields::new(transaction_id),
                is_single_operation_transaction,
                metadata,
                redo,
                undo,
            })),
        )
    }

    pub fn operation(
        lsn: Lsn,
        transaction_id: TransactionId,
        metadata: Option<OperationData>,
        redo: Option<OperationData>,
        undo: Option<OperationData>,
    ) -> Self {
        Self::new(
            lsn,
            RecordBody::Operation(Box::new(OperationBody {
                transaction: TransactionFields::new(transaction_id),
                is_redo_only: false,
                metadata,
                redo,
                undo,
            })),
        )
    }

    pub fn redo_only_operation(
        lsn: Lsn,
        transaction_id: TransactionId,
        metadata: Option<OperationData>,
        redo: Option<OperationData>,
    ) -> Self {
        Self::new(
            lsn,
            RecordBody::Operation(Box::new(OperationBody {
                transaction: TransactionFields::new(transaction_id),
                is_redo_only: true,
                metadata,
                redo,
                undo: None,
            })),
        )
    }

    pub fn end_transaction(lsn: Lsn, transaction_id: TransactionId, is_committed: bool) -> Self {
        Self::new(
            lsn,
            RecordBody::EndTransaction(EndTransactionBody {
                transaction: TransactionFields::new(transaction_id),
                is_committed,
            }),
        )
    }

    pub fn barrier(lsn: Lsn, last_stable_lsn: Lsn) -> Self {
        Self::new(lsn, RecordBody::Barrier(BarrierBody { last_stable_lsn }))
    }

    pub fn update_epoch(lsn: Lsn, epoch: Epoch, primary_replica_id: ReplicaId, timestamp_ticks: i64) -> Self {
        Self::new(
            lsn,
            RecordBody::UpdateEpoch(UpdateEpochBody {
                epoch,
                primary_replica_id,
                timestamp_ticks,
            }),
        )
    }

    pub fn backup(lsn: Lsn, backup: BackupInfo) -> Self {
        Self::new(lsn, RecordBody::Backup(BackupBody { backup }))
    }

    pub fn begin_checkpoint(
        lsn: Lsn,
        progress_vector: ProgressVector,
        epoch: Epoch,
        backup: BackupInfo,
        is_first_checkpoint_on_full_copy: bool,
    ) -> Self {
        Self::new(
            lsn,
            RecordBody::BeginCheckpoint(Box::new(BeginCheckpointBody::new(
                progress_vector,
                epoch,
                backup,
                is_first_checkpoint_on_full_copy,
            ))),
        )
    }

    pub fn end_checkpoint(lsn: Lsn, last_stable_lsn: Lsn) -> Self {
        Self::new(
            lsn,
            RecordBody::EndCheckpoint(EndCheckpointBody {
                physical: PhysicalFields::default(),
                last_stable_lsn,
                last_completed_begin_checkpoint: BackwardLink::none(),
            }),
        )
    }

    pub fn complete_checkpoint(lsn: Lsn) -> Self {
        Self::new(
            lsn,
            RecordBody::CompleteCheckpoint(CompleteCheckpointBody {
                physical: PhysicalFields::default(),
                log_head: LogHeadFields::default(),
            }),
        )
    }

    pub fn indexing(lsn: Lsn, epoch: Epoch) -> Self {
        Self::new(
            lsn,
            RecordBody::Indexing(IndexingBody {
                physical: PhysicalFields::default(),
                epoch,
            }),
        )
    }

    pub fn truncate_head(lsn: Lsn, is_stable: bool) -> Self {
        Self::new(
            lsn,
            RecordBody::TruncateHead(TruncateHeadBody {
                physical: PhysicalFields::default(),
                log_head: LogHeadFields::default(),
                is_stable,
            }),
        )
    }

    pub fn truncate_tail(lsn: Lsn) -> Self {
        Self::new(
            lsn,
            RecordBody::TruncateTail(TruncateTailBody {
                physical: PhysicalFields::default(),
                log_head: LogHeadFields::default(),
            }),
        )
    }

    pub fn information(lsn: Lsn, event: InformationEvent) -> Self {
        Self::new(
            lsn,
            RecordBody::Information(InformationBody {
                physical: PhysicalFields::default(),
                event,
            }),
        )
    }

    pub fn record_type(&self) -> LogRecordType {
        self.body.record_type()
    }

    pub fn is_physical(&self) -> bool {
        self.record_type().is_physical()
    }

    pub fn record_length(&self) -> Option<u32> {
        self.record_length
    }

    /// Latches the serialized length. Latching the same value again is allowed.
    pub fn set_record_length(&mut self, length: u32) -> TxnLogResult<()> {
        match self.record_length {
            Some(existing) if existing != length => Err(TxnLogError::InvalidState(format!(
                "record length already {} (lsn {}), cannot become {}",
                existing, self.lsn, length
            ))),
            _ => {
                self.record_length = Some(length);
                Ok(())
            }
        }
    }

    pub fn record_position(&self) -> Option<u64> {
        self.record_position
    }

    pub fn set_record_position(&mut self, position: u64) -> TxnLogResult<()> {
        match self.record_position {
            Some(existing) if existing != position => Err(TxnLogError::InvalidState(format!(
                "record position already {} (lsn {}), cannot become {}",
                existing, self.lsn, position
            ))),
            _ => {
                self.record_position = Some(position);
                Ok(())
            }
        }
    }

    /// Position, or an error naming `what` needed it.
    pub fn require_position(&self, what: &str) -> TxnLogResult<u64> {
        self.record_position.ok_or_else(|| {
            TxnLogError::InvalidState(format!(
                "{} needs the position of {} record lsn {}",
                what,
                self.record_type(),
                self.lsn
            ))
        })
    }

    pub fn link(&self, kind: LinkKind) -> Option<&BackwardLink> {
        match kind {
            LinkKind::PreviousPhysical => Some(&self.previous_physical),
            LinkKind::LinkedPhysical => self.body.physical().map(|p| &p.linked_physical),
            LinkKind::ParentTransaction => self.body.transaction().map(|t| &t.parent),
            LinkKind::LogHead => self.body.log_head().map(|h| &h.head),
            LinkKind::EarliestPendingTransaction => match &self.body {
                RecordBody::BeginCheckpoint(b) => Some(&b.earliest_pending_transaction),
                _ => None,
            },
            LinkKind::LastCompletedBeginCheckpoint => match &self.body {
                RecordBody::EndCheckpoint(b) => Some(&b.last_completed_begin_checkpoint),
                _ => None,
            },
        }
    }

    pub fn link_mut(&mut self, kind: LinkKind) -> Option<&mut BackwardLink> {
        match kind {
            LinkKind::PreviousPhysical => Some(&mut self.previous_physical),
            LinkKind::LinkedPhysical => self.body.physical_mut().map(|p| &mut p.linked_physical),
            LinkKind::ParentTransaction => self.body.transaction_mut().map(|t| &mut t.parent),
            LinkKind::LogHead => self.body.log_head_mut().map(|h| &mut h.head),
            LinkKind::EarliestPendingTransaction => match &mut self.body {
                RecordBody::BeginCheckpoint(b) => Some(&mut b.earliest_pending_transaction),
                _ => None,
            },
            LinkKind::LastCompletedBeginCheckpoint => match &mut self.body {
                RecordBody::EndCheckpoint(b) => Some(&mut b.last_completed_begin_checkpoint),
                _ => None,
            },
        }
    }

    /// Every backward link this kind of record carries.
    pub fn links(&self) -> impl Iterator<Item = (LinkKind, &BackwardLink)> + '_ {
        LinkKind::ALL
            .into_iter()
            .filter_map(move |kind| self.link(kind).map(|link| (kind, link)))
    }

    pub fn required_link(&self, kind: LinkKind) -> TxnLogResult<&BackwardLink> {
        self.link(kind).ok_or_else(|| {
            TxnLogError::Internal(format!("{} record has no {} link", self.record_type(), kind))
        })
    }

    pub fn required_link_mut(&mut self, kind: LinkKind) -> TxnLogResult<&mut BackwardLink> {
        let record_type = self.record_type();
        self.link_mut(kind).ok_or_else(|| {
            TxnLogError::Internal(format!("{} record has no {} link", record_type, kind))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn physical_kinds_are_a_closed_set() {
        let physical: Vec<_> = LogRecordType::iter().filter(|t| t.is_physical()).collect();
        assert_eq!(
            physical,
            vec![
                LogRecordType::BeginCheckpoint,
                LogRecordType::EndCheckpoint,
                LogRecordType::Indexing,
                LogRecordType::TruncateHead,
                LogRecordType::TruncateTail,
                LogRecordType::Information,
                LogRecordType::CompleteCheckpoint,
            ]
        );
        assert!(!LogRecordType::UpdateEpoch.is_replicated());
        assert!(LogRecordType::Barrier.is_replicated());
        assert!(LogRecordType::Backup.is_replicated());
        assert!(LogRecordType::try_from(0).is_err());
        assert!(LogRecordType::try_from(14).is_err());
    }

    #[test]
    fn record_length_and_position_are_set_once() {
        let mut record = LogRecord::barrier(10, 9);
        record.set_record_length(64).unwrap();
        record.set_record_length(64).unwrap();
        assert!(matches!(
            record.set_record_length(65),
            Err(TxnLogError::InvalidState(_))
        ));
        assert!(record.require_position("test").is_err());
        record.set_record_position(4096).unwrap();
        assert!(record.set_record_position(0).is_err());
        assert_eq!(record.record_position(), Some(4096));
    }

    #[test]
    fn links_follow_the_record_kind() {
        let kinds = |record: &LogRecord| record.links().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(kinds(&LogRecord::barrier(1, 1)), vec![LinkKind::PreviousPhysical]);
        assert_eq!(
            kinds(&LogRecord::operation(1, 7, None, None, None)),
            vec![LinkKind::PreviousPhysical, LinkKind::ParentTransaction]
        );
        assert_eq!(
            kinds(&LogRecord::truncate_head(1, true)),
            vec![LinkKind::PreviousPhysical, LinkKind::LinkedPhysical, LinkKind::LogHead]
        );
        assert_eq!(
            kinds(&LogRecord::begin_checkpoint(
                1,
                ProgressVector::zero(0),
                Epoch::ZERO,
                BackupInfo::none(),
                false
            )),
            vec![
                LinkKind::PreviousPhysical,
                LinkKind::LinkedPhysical,
                LinkKind::EarliestPendingTransaction
            ]
        );
        assert!(LogRecord::indexing(1, Epoch::ZERO)
            .required_link(LinkKind::ParentTransaction)
            .is_err());
    }

    #[test]
    fn fresh_record_signals_are_unset() {
        let record = LogRecord::end_transaction(5, 3, true);
        assert_eq!(record.applied.status(), None);
        assert_eq!(record.flushed.status(), None);
        assert_eq!(record.processed.status(), None);
        assert_eq!(record.psn, INVALID_PSN);
    }
}
