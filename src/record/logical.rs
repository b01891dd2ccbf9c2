use uuid::Uuid;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::TxnLogResult;
use crate::types::{Epoch, Lsn, ReplicaId, INVALID_LSN};

/// Group-commit point: everything up to `last_stable_lsn` is quorum-acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierBody {
    pub last_stable_lsn: Lsn,
}

/// Start of a new epoch at this replica. Logical but never replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateEpochBody {
    pub epoch: Epoch,
    pub primary_replica_id: ReplicaId,
    pub timestamp_ticks: i64,
}

/// What the most recent backup covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupInfo {
    pub backup_id: Uuid,
    pub highest_backed_up_epoch: Epoch,
    pub highest_backed_up_lsn: Lsn,
    pub backup_log_record_count: u32,
    pub backup_log_size: u32,
}

pub(crate) const BACKUP_INFO_LEN: usize = 16 + 16 + 8 + 4 + 4;

impl BackupInfo {
    pub fn none() -> Self {
        Self {
            backup_id: Uuid::nil(),
            highest_backed_up_epoch: Epoch::INVALID,
            highest_backed_up_lsn: INVALID_LSN,
            backup_log_record_count: 0,
            backup_log_size: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.backup_id.is_nil()
    }

    pub(crate) fn write(&self, writer: &mut BinaryWriter) {
        writer.write_uuid(&self.backup_id);
        writer.write_i64(self.highest_backed_up_epoch.data_loss_number);
        writer.write_i64(self.highest_backed_up_epoch.configuration_number);
        writer.write_i64(self.highest_backed_up_lsn);
        writer.write_u32(self.backup_log_record_count);
        writer.write_u32(self.backup_log_size);
    }

    pub(crate) fn read(reader: &mut BinaryReader<'_>) -> TxnLogResult<Self> {
        let backup_id = reader.read_uuid()?;
        let data_loss_number = reader.read_i64()?;
        let configuration_number = reader.read_i64()?;
        Ok(Self {
            backup_id,
            highest_backed_up_epoch: Epoch::new(data_loss_number, configuration_number),
            highest_backed_up_lsn: reader.read_i64()?,
            backup_log_record_count: reader.read_u32()?,
            backup_log_size: reader.read_u32()?,
        })
    }
}

impl Default for BackupInfo {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupBody {
    pub backup: BackupInfo,
}
