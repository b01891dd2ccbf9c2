use std::cmp::Ordering;
use std::fmt;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::TxnLogResult;
use crate::types::{Epoch, Lsn, ReplicaId, INVALID_LSN, INVALID_REPLICA_ID, UNIVERSAL_REPLICA_ID, ZERO_LSN};

/// Serialized size of one entry: epoch (2 x i64), lsn, primary id, timestamp ticks.
pub const PROGRESS_VECTOR_ENTRY_LEN: usize = 40;

/// One primary transition: from `lsn` on, `primary_replica_id` led `epoch`.
///
/// Equality looks at (epoch, lsn) only. Ordering is data loss number, then
/// configuration number, then lsn.
#[derive(Debug, Clone, Copy)]
pub struct ProgressVectorEntry {
    pub epoch: Epoch,
    pub lsn: Lsn,
    pub primary_replica_id: ReplicaId,
    pub timestamp_ticks: i64,
}

impl ProgressVectorEntry {
    pub fn new(epoch: Epoch, lsn: Lsn, primary_replica_id: ReplicaId, timestamp_ticks: i64) -> Self {
        Self {
            epoch,
            lsn,
            primary_replica_id,
            timestamp_ticks,
        }
    }

    pub fn zero() -> Self {
        Self::new(Epoch::ZERO, ZERO_LSN, UNIVERSAL_REPLICA_ID, 0)
    }

    pub fn invalid() -> Self {
        Self::new(Epoch::INVALID, INVALID_LSN, INVALID_REPLICA_ID, 0)
    }

    pub fn is_invalid(&self) -> bool {
        self.epoch.is_invalid() && self.lsn == INVALID_LSN
    }

    /// Data loss happened somewhere between `self` and the later entry `other`.
    pub fn is_data_loss_between(&self, other: &ProgressVectorEntry) -> bool {
        self.epoch.data_loss_number != other.epoch.data_loss_number
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_i64(self.epoch.data_loss_number);
        writer.write_i64(self.epoch.configuration_number);
        writer.write_i64(self.lsn);
        writer.write_i64(self.primary_replica_id);
        writer.write_i64(self.timestamp_ticks);
    }

    pub fn read(reader: &mut BinaryReader<'_>) -> TxnLogResult<Self> {
        let data_loss_number = reader.read_i64()?;
        let configuration_number = reader.read_i64()?;
        let lsn = reader.read_i64()?;
        let primary_replica_id = reader.read_i64()?;
        let timestamp_ticks = reader.read_i64()?;
        Ok(Self::new(
            Epoch::new(data_loss_number, configuration_number),
            lsn,
            primary_replica_id,
            timestamp_ticks,
        ))
    }
}

impl PartialEq for ProgressVectorEntry {
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch && self.lsn == other.lsn
    }
}

impl Eq for ProgressVectorEntry {}

impl PartialOrd for ProgressVectorEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProgressVectorEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.lsn.cmp(&other.lsn))
    }
}

impl fmt::Display for ProgressVectorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.epoch, self.lsn, self.primary_replica_id, self.timestamp_ticks
        )
    }
}
