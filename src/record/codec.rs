//! Record envelope and per-kind sections.
//!
//! ```text
//! [u32 N] [logical meta] [physical meta]? [physical record]? [kind sections...] [u32 N]
//! ```
//! N counts the bytes between the two length fields. Physical metadata is present only
//! in physical mode (the local log); logical mode is the replication wire form.

use bytes::Bytes;

use crate::codec::{BinaryReader, BinaryWriter, SECTION_HEADER_LEN};
use crate::error::{TxnLogError, TxnLogResult};
use crate::progress::{ProgressVector, PROGRESS_VECTOR_ENTRY_LEN};
use crate::record::checkpoint::{BeginCheckpointBody, CompleteCheckpointBody, EndCheckpointBody};
use crate::record::link::BackwardLink;
use crate::record::logical::{BackupBody, BackupInfo, BarrierBody, UpdateEpochBody, BACKUP_INFO_LEN};
use crate::record::physical::{
    IndexingBody, InformationBody, InformationEvent, LogHeadFields, PhysicalFields,
    TruncateHeadBody, TruncateTailBody,
};
use crate::record::transaction::{
    BeginTransactionBody, EndTransactionBody, OperationBody, OperationData, TransactionFields,
};
use crate::record::{LogRecord, LogRecordType, RecordBody};
use crate::types::{Epoch, INVALID_PSN};

pub const RECORD_LENGTH_FIELD_LEN: usize = 4;

const LOGICAL_METADATA_LEN: usize = 4 + 8;
const PHYSICAL_METADATA_LEN: usize = 8 + 8;
const EPOCH_LEN: usize = 16;
const LOG_HEAD_LEN: usize = EPOCH_LEN + 8 + 8;

/// Serializes `record` into a complete envelope.
pub fn encode_record(writer: &mut BinaryWriter, record: &LogRecord, is_physical: bool) -> TxnLogResult<Bytes> {
    writer.reset();
    let leading = writer.reserve(RECORD_LENGTH_FIELD_LEN);
    write_sections(writer, record, is_physical)?;
    let body_len = u32::try_from(writer.position() - RECORD_LENGTH_FIELD_LEN).map_err(|_| {
        TxnLogError::Internal(format!("record lsn {} longer than u32::MAX", record.lsn))
    })?;
    writer.write_u32(body_len);
    writer.patch_u32(leading, body_len)?;
    Ok(writer.take())
}

/// [`encode_record`], optionally latching the envelope length into the record.
pub fn write_record(
    writer: &mut BinaryWriter,
    record: &mut LogRecord,
    is_physical: bool,
    latch_length: bool,
) -> TxnLogResult<Bytes> {
    let bytes = encode_record(writer, record, is_physical)?;
    if latch_length {
        record.set_record_length(envelope_len(&bytes, record)?)?;
    }
    Ok(bytes)
}

fn envelope_len(bytes: &Bytes, record: &LogRecord) -> TxnLogResult<u32> {
    u32::try_from(bytes.len())
        .map_err(|_| TxnLogError::Internal(format!("record lsn {} longer than u32::MAX", record.lsn)))
}

/// Decodes one complete envelope. The record's length is latched; its position is
/// left for the caller, which knows where the bytes came from.
pub fn decode_record(bytes: &[u8], is_physical: bool) -> TxnLogResult<LogRecord> {
    let mut reader = BinaryReader::new(bytes);
    let leading = reader.read_u32()? as usize;
    let expected = leading + 2 * RECORD_LENGTH_FIELD_LEN;
    if bytes.len() != expected {
        return Err(TxnLogError::Corrupted(format!(
            "record envelope claims {} bytes, got {}",
            expected,
            bytes.len()
        )));
    }
    let body_end = RECORD_LENGTH_FIELD_LEN + leading;

    let end = reader.begin_section()?;
    let record_type = LogRecordType::try_from(reader.read_i32()?)?;
    let lsn = reader.read_i64()?;
    reader.end_section(end)?;

    let (psn, previous_physical) = if is_physical {
        let end = reader.begin_section()?;
        let psn = reader.read_i64()?;
        let offset = reader.read_u64()?;
        reader.end_section(end)?;
        (psn, BackwardLink::from_offset(offset))
    } else {
        (INVALID_PSN, BackwardLink::unknown())
    };

    let physical = if record_type.is_physical() {
        Some(read_physical_fields(&mut reader, is_physical)?)
    } else {
        None
    };
    let body = read_body(&mut reader, record_type, physical, is_physical)?;

    reader.end_section(body_end).map_err(|_| {
        TxnLogError::Corrupted(format!(
            "{} record lsn {} overran its envelope",
            record_type, lsn
        ))
    })?;
    let trailing = reader.read_u32()? as usize;
    if trailing != leading {
        return Err(TxnLogError::Corrupted(format!(
            "record lsn {} leading length {} differs from trailing length {}",
            lsn, leading, trailing
        )));
    }

    let mut record = LogRecord::new(lsn, body);
    record.psn = psn;
    record.previous_physical = previous_physical;
    record.set_record_length(expected as u32)?;
    Ok(record)
}

/// Envelope size `encode_record` produces, computed without encoding.
pub fn size_on_wire(record: &LogRecord, is_physical: bool) -> usize {
    let mut size = 2 * RECORD_LENGTH_FIELD_LEN + SECTION_HEADER_LEN + LOGICAL_METADATA_LEN;
    if is_physical {
        size += SECTION_HEADER_LEN + PHYSICAL_METADATA_LEN;
        if record.is_physical() {
            size += SECTION_HEADER_LEN + 8;
        }
    }
    let optional_offset = if is_physical { 8 } else { 0 };
    let transaction_common = SECTION_HEADER_LEN + 8 + optional_offset;
    let flag = SECTION_HEADER_LEN + 1;
    let blob = |data: &Option<OperationData>| SECTION_HEADER_LEN + OperationData::size_on_wire(data.as_ref());
    let log_head = SECTION_HEADER_LEN + LOG_HEAD_LEN + optional_offset;

    size + match &record.body {
        RecordBody::BeginTransaction(b) => {
            transaction_common + flag + blob(&b.metadata) + blob(&b.redo) + blob(&b.undo)
        }
        RecordBody::Operation(b) => {
            let undo = if b.is_redo_only { 0 } else { blob(&b.undo) };
            transaction_common + flag + blob(&b.metadata) + blob(&b.redo) + undo
        }
        RecordBody::EndTransaction(_) => transaction_common + flag,
        RecordBody::Barrier(_) => SECTION_HEADER_LEN + 8,
        RecordBody::UpdateEpoch(_) => SECTION_HEADER_LEN + EPOCH_LEN + 8 + 8,
        RecordBody::Backup(_) => SECTION_HEADER_LEN + BACKUP_INFO_LEN,
        RecordBody::BeginCheckpoint(b) => {
            SECTION_HEADER_LEN
                + 4
                + PROGRESS_VECTOR_ENTRY_LEN * b.progress_vector.len()
                + 8
                + EPOCH_LEN
                + BACKUP_INFO_LEN
                + 8
                + 8
        }
        RecordBody::EndCheckpoint(_) => SECTION_HEADER_LEN + 8 + optional_offset,
        RecordBody::Indexing(_) => SECTION_HEADER_LEN + EPOCH_LEN,
        RecordBody::TruncateHead(_) => log_head + flag,
        RecordBody::TruncateTail(_) | RecordBody::CompleteCheckpoint(_) => log_head,
        RecordBody::Information(_) => SECTION_HEADER_LEN + 4,
    }
}

fn write_sections(writer: &mut BinaryWriter, record: &LogRecord, is_physical: bool) -> TxnLogResult<()> {
    let marker = writer.begin_section();
    writer.write_i32(record.record_type() as i32);
    writer.write_i64(record.lsn);
    writer.end_section(marker)?;

    if is_physical {
        let marker = writer.begin_section();
        writer.write_i64(record.psn);
        writer.write_u64(record.previous_physical.offset());
        writer.end_section(marker)?;
        if let Some(physical) = record.body.physical() {
            let marker = writer.begin_section();
            writer.write_u64(physical.linked_physical.offset());
            writer.end_section(marker)?;
        }
    }

    match &record.body {
        RecordBody::BeginTransaction(b) => {
            write_transaction(writer, &b.transaction, is_physical)?;
            write_flag(writer, b.is_single_operation_transaction)?;
            write_blob(writer, b.metadata.as_ref())?;
            write_blob(writer, b.redo.as_ref())?;
            write_blob(writer, b.undo.as_ref())
        }
        RecordBody::Operation(b) => {
            write_transaction(writer, &b.transaction, is_physical)?;
            write_flag(writer, b.is_redo_only)?;
            write_blob(writer, b.metadata.as_ref())?;
            write_blob(writer, b.redo.as_ref())?;
            if !b.is_redo_only {
                write_blob(writer, b.undo.as_ref())?;
            }
            Ok(())
        }
        RecordBody::EndTransaction(b) => {
            write_transaction(writer, &b.transaction, is_physical)?;
            write_flag(writer, b.is_committed)
        }
        RecordBody::Barrier(b) => {
            let marker = writer.begin_section();
            writer.write_i64(b.last_stable_lsn);
            writer.end_section(marker)
        }
        RecordBody::UpdateEpoch(b) => {
            let marker = writer.begin_section();
            write_epoch(writer, b.epoch);
            writer.write_i64(b.primary_replica_id);
            writer.write_i64(b.timestamp_ticks);
            writer.end_section(marker)
        }
        RecordBody::Backup(b) => {
            let marker = writer.begin_section();
            b.backup.write(writer);
            writer.end_section(marker)
        }
        RecordBody::BeginCheckpoint(b) => {
            let marker = writer.begin_section();
            b.progress_vector.write(writer);
            writer.write_u64(b.earliest_pending_transaction.offset());
            write_epoch(writer, b.epoch);
            b.backup.write(writer);
            writer.write_i64(b.periodic_checkpoint_ticks);
            writer.write_i64(b.periodic_truncation_ticks);
            writer.end_section(marker)
        }
        RecordBody::EndCheckpoint(b) => {
            let marker = writer.begin_section();
            writer.write_i64(b.last_stable_lsn);
            if is_physical {
                writer.write_u64(b.last_completed_begin_checkpoint.offset());
            }
            writer.end_section(marker)
        }
        RecordBody::Indexing(b) => {
            let marker = writer.begin_section();
            write_epoch(writer, b.epoch);
            writer.end_section(marker)
        }
        RecordBody::TruncateHead(b) => {
            write_log_head(writer, &b.log_head, is_physical)?;
            write_flag(writer, b.is_stable)
        }
        RecordBody::TruncateTail(b) => write_log_head(writer, &b.log_head, is_physical),
        RecordBody::CompleteCheckpoint(b) => write_log_head(writer, &b.log_head, is_physical),
        RecordBody::Information(b) => {
            let marker = writer.begin_section();
            writer.write_i32(b.event as i32);
            writer.end_section(marker)
        }
    }
}

fn write_epoch(writer: &mut BinaryWriter, epoch: Epoch) {
    writer.write_i64(epoch.data_loss_number);
    writer.write_i64(epoch.configuration_number);
}

fn read_epoch(reader: &mut BinaryReader<'_>) -> TxnLogResult<Epoch> {
    let data_loss_number = reader.read_i64()?;
    let configuration_number = reader.read_i64()?;
    Ok(Epoch::new(data_loss_number, configuration_number))
}

fn write_flag(writer: &mut BinaryWriter, flag: bool) -> TxnLogResult<()> {
    let marker = writer.begin_section();
    writer.write_bool(flag);
    writer.end_section(marker)
}

fn read_flag(reader: &mut BinaryReader<'_>) -> TxnLogResult<bool> {
    let end = reader.begin_section()?;
    let flag = reader.read_bool()?;
    reader.end_section(end)?;
    Ok(flag)
}

fn write_blob(writer: &mut BinaryWriter, data: Option<&OperationData>) -> TxnLogResult<()> {
    let marker = writer.begin_section();
    OperationData::write(data, writer)?;
    writer.end_section(marker)
}

fn read_blob(reader: &mut BinaryReader<'_>) -> TxnLogResult<Option<OperationData>> {
    let end = reader.begin_section()?;
    let data = OperationData::read(reader)?;
    reader.end_section(end)?;
    Ok(data)
}

fn write_transaction(writer: &mut BinaryWriter, fields: &TransactionFields, is_physical: bool) -> TxnLogResult<()> {
    let marker = writer.begin_section();
    writer.write_i64(fields.transaction_id);
    if is_physical {
        writer.write_u64(fields.parent.offset());
    }
    writer.end_section(marker)
}

fn read_transaction(reader: &mut BinaryReader<'_>, is_physical: bool) -> TxnLogResult<TransactionFields> {
    let end = reader.begin_section()?;
    let mut fields = TransactionFields::new(reader.read_i64()?);
    fields.parent = if is_physical {
        BackwardLink::from_offset(reader.read_u64()?)
    } else {
        BackwardLink::unknown()
    };
    reader.end_section(end)?;
    Ok(fields)
}

fn write_log_head(writer: &mut BinaryWriter, head: &LogHeadFields, is_physical: bool) -> TxnLogResult<()> {
    let marker = writer.begin_section();
    write_epoch(writer, head.head_epoch);
    writer.write_i64(head.head_lsn);
    writer.write_i64(head.head_psn);
    if is_physical {
        writer.write_u64(head.head.offset());
    }
    writer.end_section(marker)
}

fn read_log_head(reader: &mut BinaryReader<'_>, is_physical: bool) -> TxnLogResult<LogHeadFields> {
    let end = reader.begin_section()?;
    let mut head = LogHeadFields::new(read_epoch(reader)?, reader.read_i64()?, reader.read_i64()?);
    head.head = if is_physical {
        BackwardLink::from_offset(reader.read_u64()?)
    } else {
        BackwardLink::unknown()
    };
    reader.end_section(end)?;
    Ok(head)
}

fn read_physical_fields(reader: &mut BinaryReader<'_>, is_physical: bool) -> TxnLogResult<PhysicalFields> {
    if !is_physical {
        return Ok(PhysicalFields {
            linked_physical: BackwardLink::unknown(),
            next_physical: None,
        });
    }
    let end = reader.begin_section()?;
    let linked_physical = BackwardLink::from_offset(reader.read_u64()?);
    reader.end_section(end)?;
    Ok(PhysicalFields {
        linked_physical,
        next_physical: None,
    })
}

fn missing_physical(record_type: LogRecordType) -> TxnLogError {
    TxnLogError::Internal(format!("{} decoded without physical fields", record_type))
}

fn read_body(
    reader: &mut BinaryReader<'_>,
    record_type: LogRecordType,
    physical: Option<PhysicalFields>,
    is_physical: bool,
) -> TxnLogResult<RecordBody> {
    let body = match record_type {
        LogRecordType::BeginTransaction => {
            let transaction = read_transaction(reader, is_physical)?;
            let is_single_operation_transaction = read_flag(reader)?;
            RecordBody::BeginTransaction(Box::new(BeginTransactionBody {
                transaction,
                is_single_operation_transaction,
                metadata: read_blob(reader)?,
                redo: read_blob(reader)?,
                undo: read_blob(reader)?,
            }))
        }
        LogRecordType::Operation => {
            let transaction = read_transaction(reader, is_physical)?;
            let is_redo_only = read_flag(reader)?;
            let metadata = read_blob(reader)?;
            let redo = read_blob(reader)?;
            let undo = if is_redo_only { None } else { read_blob(reader)? };
            RecordBody::Operation(Box::new(OperationBody {
                transaction,
                is_redo_only,
                metadata,
                redo,
                undo,
            }))
        }
        LogRecordType::EndTransaction => {
            let transaction = read_transaction(reader, is_physical)?;
            RecordBody::EndTransaction(EndTransactionBody {
                transaction,
                is_committed: read_flag(reader)?,
            })
        }
        LogRecordType::Barrier => {
            let end = reader.begin_section()?;
            let last_stable_lsn = reader.read_i64()?;
            reader.end_section(end)?;
            RecordBody::Barrier(BarrierBody { last_stable_lsn })
        }
        LogRecordType::UpdateEpoch => {
            let end = reader.begin_section()?;
            let epoch = read_epoch(reader)?;
            let primary_replica_id = reader.read_i64()?;
            let timestamp_ticks = reader.read_i64()?;
            reader.end_section(end)?;
            RecordBody::UpdateEpoch(UpdateEpochBody {
                epoch,
                primary_replica_id,
                timestamp_ticks,
            })
        }
        LogRecordType::Backup => {
            let end = reader.begin_section()?;
            let backup = BackupInfo::read(reader)?;
            reader.end_section(end)?;
            RecordBody::Backup(BackupBody { backup })
        }
        LogRecordType::BeginCheckpoint => {
            let end = reader.begin_section()?;
            let progress_vector = ProgressVector::read(reader, 0)?;
            let earliest_pending_transaction = BackwardLink::from_offset(reader.read_u64()?);
            let epoch = read_epoch(reader)?;
            let backup = BackupInfo::read(reader)?;
            let mut body = BeginCheckpointBody::new(progress_vector, epoch, backup, false);
            body.physical = physical.ok_or_else(|| missing_physical(record_type))?;
            body.earliest_pending_transaction = earliest_pending_transaction;
            // older writers stop before the periodic ticks
            if reader.has_more(end) {
                body.periodic_checkpoint_ticks = reader.read_i64()?;
                body.periodic_truncation_ticks = reader.read_i64()?;
            }
            reader.end_section(end)?;
            RecordBody::BeginCheckpoint(Box::new(body))
        }
        LogRecordType::EndCheckpoint => {
            let end = reader.begin_section()?;
            let last_stable_lsn = reader.read_i64()?;
            let last_completed_begin_checkpoint = if is_physical {
                BackwardLink::from_offset(reader.read_u64()?)
            } else {
                BackwardLink::unknown()
            };
            reader.end_section(end)?;
            RecordBody::EndCheckpoint(EndCheckpointBody {
                physical: physical.ok_or_else(|| missing_physical(record_type))?,
                last_stable_lsn,
                last_completed_begin_checkpoint,
            })
        }
        LogRecordType::Indexing => {
            let end = reader.begin_section()?;
            let epoch = read_epoch(reader)?;
            reader.end_section(end)?;
            RecordBody::Indexing(IndexingBody {
                physical: physical.ok_or_else(|| missing_physical(record_type))?,
                epoch,
            })
        }
        LogRecordType::TruncateHead => {
            let log_head = read_log_head(reader, is_physical)?;
            RecordBody::TruncateHead(TruncateHeadBody {
                physical: physical.ok_or_else(|| missing_physical(record_type))?,
                log_head,
                is_stable: read_flag(reader)?,
            })
        }
        LogRecordType::TruncateTail => RecordBody::TruncateTail(TruncateTailBody {
            physical: physical.ok_or_else(|| missing_physical(record_type))?,
            log_head: read_log_head(reader, is_physical)?,
        }),
        LogRecordType::CompleteCheckpoint => RecordBody::CompleteCheckpoint(CompleteCheckpointBody {
            physical: physical.ok_or_else(|| missing_physical(record_type))?,
            log_head: read_log_head(reader, is_physical)?,
        }),
        LogRecordType::Information => {
            let end = reader.begin_section()?;
            let event = InformationEvent::try_from(reader.read_i32()?)?;
            reader.end_section(end)?;
            RecordBody::Information(InformationBody {
                physical: physical.ok_or_else(|| missing_physical(record_type))?,
                event,
            })
        }
        LogRecordType::Invalid => {
            return Err(TxnLogError::Corrupted(
                "invalid log record type tag".to_string(),
            ))
        }
    };
    Ok(body)
}
