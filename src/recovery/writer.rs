use std::sync::Arc;

use bytes::Bytes;

use crate::codec::BinaryWriter;
use crate::error::{TxnLogError, TxnLogResult};
use crate::graph::LogGraph;
use crate::record::codec::write_record;
use crate::record::RecordId;
use crate::recovery::store::LogSink;
use crate::types::Psn;

/// Writes records from a [`LogGraph`] to the local log in physical form.
pub struct LogAppender<S> {
    store: Arc<S>,
    writer: BinaryWriter,
    next_psn: Psn,
    /// Last physical record written, with its position.
    last_physical: Option<(RecordId, u64)>,
}

impl<S: LogSink> LogAppender<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            writer: BinaryWriter::with_capacity(4096),
            next_psn: 0,
            last_physical: None,
        }
    }

    pub fn next_psn(&self) -> Psn {
        self.next_psn
    }

    pub fn last_physical(&self) -> Option<RecordId> {
        self.last_physical.map(|(id, _)| id)
    }

    /// Assigns PSN and position, links the previous physical record, freezes link
    /// offsets and appends the envelope. Returns the record's position.
    pub fn append(&mut self, graph: &mut LogGraph, id: RecordId, force_recompute: bool) -> TxnLogResult<u64> {
        let record = graph.record(id)?;
        if let Some(position) = record.record_position() {
            return Err(TxnLogError::InvalidState(format!(
                "{} record lsn {} was already written at {}",
                record.record_type(),
                record.lsn,
                position
            )));
        }

        let position = self.store.tail_position();
        let record = graph.record_mut(id)?;
        record.psn = self.next_psn;
        record.set_record_position(position)?;
        match self.last_physical {
            Some((previous, _)) if graph.contains(previous) => {
                graph.link_previous_physical(id, previous)?;
            }
            Some((_, previous_position)) => {
                graph
                    .record_mut(id)?
                    .previous_physical
                    .set_offset(position - previous_position);
            }
            None => {}
        }
        graph.freeze_offsets(id, force_recompute)?;

        let record = graph.record_mut(id)?;
        let bytes = write_record(&mut self.writer, record, true, true)?;
        let appended_at = self.store.append(&bytes)?;
        if appended_at != position {
            return Err(TxnLogError::Internal(format!(
                "record lsn {} expected at {} but landed at {}",
                record.lsn, position, appended_at
            )));
        }
        self.next_psn += 1;
        if record.is_physical() {
            self.last_physical = Some((id, position));
        }
        Ok(position)
    }

    /// Serializes an already written record again, after its links were rewired.
    pub fn reencode(&mut self, graph: &mut LogGraph, id: RecordId, force_recompute: bool) -> TxnLogResult<Bytes> {
        graph.freeze_offsets(id, force_recompute)?;
        let record = graph.record_mut(id)?;
        write_record(&mut self.writer, record, true, true)
    }
}
