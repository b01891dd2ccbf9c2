use bytes::Bytes;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::{TxnLogError, TxnLogResult};
use crate::record::link::{BackwardLink, RecordId};
use crate::types::TransactionId;

/// Written in place of the buffer count when a payload is absent.
const ABSENT_PAYLOAD: i32 = -1;

/// Opaque operation payload, kept as the list of buffers the state provider handed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationData {
    buffers: Vec<Bytes>,
}

impl OperationData {
    pub fn new(buffers: Vec<Bytes>) -> Self {
        Self { buffers }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(vec![Bytes::copy_from_slice(data)])
    }

    pub fn buffers(&self) -> &[Bytes] {
        &self.buffers
    }

    pub fn byte_len(&self) -> usize {
        self.buffers.iter().map(Bytes::len).sum()
    }

    pub(crate) fn size_on_wire(data: Option<&OperationData>) -> usize {
        4 + data.map_or(0, |d| d.buffers.iter().map(|b| 4 + b.len()).sum())
    }

    pub(crate) fn write(data: Option<&OperationData>, writer: &mut BinaryWriter) -> TxnLogResult<()> {
        let Some(data) = data else {
            writer.write_i32(ABSENT_PAYLOAD);
            return Ok(());
        };
        writer.write_i32(to_i32(data.buffers.len(), "buffer count")?);
        for buffer in &data.buffers {
            writer.write_i32(to_i32(buffer.len(), "buffer length")?);
            writer.write_bytes(buffer);
        }
        Ok(())
    }

    pub(crate) fn read(reader: &mut BinaryReader<'_>) -> TxnLogResult<Option<OperationData>> {
        let count = reader.read_i32()?;
        if count == ABSENT_PAYLOAD {
            return Ok(None);
        }
        if count < 0 {
            return Err(TxnLogError::Corrupted(format!(
                "negative operation buffer count {}",
                count
            )));
        }
        let mut buffers = Vec::with_capacity((count as usize).min(reader.remaining() / 4));
        for _ in 0..count {
            let len = reader.read_i32()?;
            if len < 0 {
                return Err(TxnLogError::Corrupted(format!(
                    "negative operation buffer length {}",
                    len
                )));
            }
            buffers.push(Bytes::copy_from_slice(reader.read_slice(len as usize)?));
        }
        Ok(Some(OperationData::new(buffers)))
    }
}

fn to_i32(value: usize, what: &str) -> TxnLogResult<i32> {
    i32::try_from(value).map_err(|_| TxnLogError::Internal(format!("{} {} exceeds i32", what, value)))
}

/// Fields shared by the records of one transaction.
///
/// `parent` points at the previous record of the same transaction; `child` is the
/// weak forward counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFields {
    pub transaction_id: TransactionId,
    pub parent: BackwardLink,
    pub child: Option<RecordId>,
}

impl TransactionFields {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            parent: BackwardLink::none(),
            child: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginTransactionBody {
    pub transaction: TransactionFields,
    pub is_single_operation_transaction: bool,
    pub metadata: Option<OperationData>,
    pub redo: Option<OperationData>,
    pub undo: Option<OperationData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationBody {
    pub transaction: TransactionFields,
    /// Atomic operations carry no undo payload and cannot be rolled back.
    pub is_redo_only: bool,
    pub metadata: Option<OperationData>,
    pub redo: Option<OperationData>,
    pub undo: Option<OperationData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTransactionBody {
    pub transaction: TransactionFields,
    pub is_committed: bool,
}
