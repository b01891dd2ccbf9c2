use log::trace;

use crate::error::{TxnLogError, TxnLogResult};
use crate::progress::ProgressVector;
use crate::record::completion::{CompletionSignal, CompletionWaiter};
use crate::record::link::BackwardLink;
use crate::record::logical::BackupInfo;
use crate::record::physical::{LogHeadFields, PhysicalFields};
use crate::types::{Epoch, Lsn, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CheckpointState {
    Invalid,
    Ready,
    Applied,
    Completed,
    Faulted,
    Aborted,
}

impl CheckpointState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckpointState::Completed | CheckpointState::Faulted | CheckpointState::Aborted
        )
    }

    fn can_move_to(self, next: CheckpointState) -> bool {
        use CheckpointState::*;
        matches!(
            (self, next),
            (Invalid, Ready)
                | (Invalid, Faulted)
                | (Ready, Applied)
                | (Ready, Aborted)
                | (Ready, Faulted)
                | (Applied, Completed)
                | (Applied, Faulted)
        )
    }
}

#[derive(Debug)]
pub struct BeginCheckpointBody {
    pub physical: PhysicalFields,
    /// Snapshot taken when the checkpoint started.
    pub progress_vector: ProgressVector,
    pub earliest_pending_transaction: BackwardLink,
    pub epoch: Epoch,
    pub backup: BackupInfo,
    pub periodic_checkpoint_ticks: i64,
    pub periodic_truncation_ticks: i64,
    /// Not persisted.
    pub is_first_checkpoint_on_full_copy: bool,
    state: CheckpointState,
    first_checkpoint_phase1: CompletionSignal,
}

impl BeginCheckpointBody {
    pub fn new(
        progress_vector: ProgressVector,
        epoch: Epoch,
        backup: BackupInfo,
        is_first_checkpoint_on_full_copy: bool,
    ) -> Self {
        Self {
            physical: PhysicalFields::default(),
            progress_vector,
            earliest_pending_transaction: BackwardLink::none(),
            epoch,
            backup,
            periodic_checkpoint_ticks: 0,
            periodic_truncation_ticks: 0,
            is_first_checkpoint_on_full_copy,
            state: CheckpointState::Invalid,
            first_checkpoint_phase1: CompletionSignal::new(),
        }
    }

    pub fn state(&self) -> CheckpointState {
        self.state
    }

    pub fn set_state(&mut self, next: CheckpointState) -> TxnLogResult<()> {
        if !self.state.can_move_to(next) {
            return Err(TxnLogError::InvalidState(format!(
                "checkpoint cannot move from {} to {}",
                self.state, next
            )));
        }
        trace!("checkpoint state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn ensure_first_on_full_copy(&self) -> TxnLogResult<()> {
        if !self.is_first_checkpoint_on_full_copy {
            return Err(TxnLogError::InvalidState(
                "phase 1 gate exists only on the first checkpoint after a full copy".to_string(),
            ));
        }
        Ok(())
    }

    pub fn signal_completion_phase1(&self) -> TxnLogResult<()> {
        self.ensure_first_on_full_copy()?;
        self.first_checkpoint_phase1.complete(Status::SUCCESS)
    }

    pub fn signal_exception_phase1(&self, status: Status) -> TxnLogResult<()> {
        self.ensure_first_on_full_copy()?;
        self.first_checkpoint_phase1.complete(status)
    }

    pub fn phase1_waiter(&self) -> TxnLogResult<CompletionWaiter> {
        self.ensure_first_on_full_copy()?;
        Ok(self.first_checkpoint_phase1.waiter())
    }

    pub async fn await_completion_phase1(&self) -> TxnLogResult<Status> {
        self.phase1_waiter()?.wait().await
    }
}

// Runtime state and the phase 1 gate are not part of the record's identity.
impl PartialEq for BeginCheckpointBody {
    fn eq(&self, other: &Self) -> bool {
        self.physical == other.physical
            && self.progress_vector.entries() == other.progress_vector.entries()
            && self.earliest_pending_transaction == other.earliest_pending_transaction
            && self.epoch == other.epoch
            && self.backup == other.backup
            && self.periodic_checkpoint_ticks == other.periodic_checkpoint_ticks
            && self.periodic_truncation_ticks == other.periodic_truncation_ticks
    }
}

impl Eq for BeginCheckpointBody {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndCheckpointBody {
    pub physical: PhysicalFields,
    /// Never below the lsn of the begin checkpoint it completes.
    pub last_stable_lsn: Lsn,
    pub last_completed_begin_checkpoint: BackwardLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteCheckpointBody {
    pub physical: PhysicalFields,
    pub log_head: LogHeadFields,
}
