//! Random-access reader over the physical log used during recovery.
//!
//! Records are decoded on demand into an owned [`LogGraph`] and memoized by position,
//! so following the same link twice reads the log once.

use std::collections::HashMap;
use std::io::SeekFrom;

use log::trace;
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

use crate::error::{TxnLogError, TxnLogResult};
use crate::graph::LogGraph;
use crate::record::{decode_record, LinkKind, LinkTarget, LogRecordType, RecordId};
use crate::recovery::stream::{read_previous_record, read_record_at, LogReadStream};

pub struct RecoveryPhysicalLogReader<S> {
    stream: S,
    /// Lowest readable position (the truncated head).
    start_position: u64,
    /// Physical end of the log.
    end_position: u64,
    graph: LogGraph,
    by_position: HashMap<u64, RecordId>,
    cancel: CancellationToken,
}

impl<S: LogReadStream> RecoveryPhysicalLogReader<S> {
    pub fn new(stream: S, start_position: u64, end_position: u64, cancel: CancellationToken) -> Self {
        Self {
            stream,
            start_position,
            end_position,
            graph: LogGraph::new(),
            by_position: HashMap::new(),
            cancel,
        }
    }

    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    pub fn graph(&self) -> &LogGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut LogGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> LogGraph {
        self.graph
    }

    /// Last record before the physical end of the log, or `None` for an empty window.
    pub async fn seek_to_last_record(&mut self) -> TxnLogResult<Option<RecordId>> {
        if self.end_position <= self.start_position {
            return Ok(None);
        }
        self.stream.seek(SeekFrom::Start(self.end_position)).await?;
        let Some((position, _)) = read_previous_record(&mut self.stream, &self.cancel).await? else {
            return Ok(None);
        };
        if position < self.start_position {
            return Err(TxnLogError::Corrupted(format!(
                "last record at {} starts below the log head {}",
                position, self.start_position
            )));
        }
        self.read_record_at(position).await.map(Some)
    }

    /// Record at the truncated head, or `None` for an empty window.
    pub async fn seek_to_first_record(&mut self) -> TxnLogResult<Option<RecordId>> {
        if self.end_position <= self.start_position {
            return Ok(None);
        }
        self.read_record_at(self.start_position).await.map(Some)
    }

    /// Decodes the record at `position`, or returns the one already loaded there.
    pub async fn read_record_at(&mut self, position: u64) -> TxnLogResult<RecordId> {
        if let Some(id) = self.by_position.get(&position).copied() {
            if self.graph.contains(id) {
                return Ok(id);
            }
        }
        if position < self.start_position || position >= self.end_position {
            return Err(TxnLogError::InvalidState(format!(
                "position {} is outside the readable log [{}, {})",
                position, self.start_position, self.end_position
            )));
        }
        let bytes = read_record_at(&mut self.stream, position, self.end_position, &self.cancel).await?;
        let mut record = decode_record(&bytes, true)?;
        record.set_record_position(position)?;
        trace!(
            "loaded {} record lsn {} psn {} at {}",
            record.record_type(),
            record.lsn,
            record.psn,
            position
        );
        let id = self.graph.insert(record);
        self.by_position.insert(position, id);
        Ok(id)
    }

    async fn resolve(&mut self, id: RecordId, kind: LinkKind) -> TxnLogResult<Option<RecordId>> {
        let record = self.graph.record(id)?;
        let link = record.required_link(kind)?;
        match link.target() {
            LinkTarget::None => return Ok(None),
            LinkTarget::Resolved(target) if self.graph.contains(target) => return Ok(Some(target)),
            _ => {}
        }
        if !link.is_offset_known() {
            return Err(TxnLogError::InvalidState(format!(
                "{} link of {} record lsn {} has no offset",
                kind,
                record.record_type(),
                record.lsn
            )));
        }
        let position = record.require_position("resolving a link")?;
        let target_position = position.checked_sub(link.offset()).ok_or_else(|| {
            TxnLogError::Corrupted(format!(
                "{} link of record at {} points {} bytes before the log start",
                kind,
                position,
                link.offset()
            ))
        })?;
        if target_position < self.start_position {
            return Err(TxnLogError::InvalidState(format!(
                "{} link of record at {} points below the log head {}",
                kind, position, self.start_position
            )));
        }

        let target = self.read_record_at(target_position).await?;
        match kind {
            LinkKind::PreviousPhysical => self.graph.link_previous_physical(id, target)?,
            LinkKind::ParentTransaction => self.graph.link_transaction(id, target)?,
            _ => {
                self.check_target_kind(kind, target)?;
                self.graph.resolve_link(id, kind, target)?;
            }
        }
        Ok(Some(target))
    }

    fn check_target_kind(&self, kind: LinkKind, target: RecordId) -> TxnLogResult<()> {
        let target_type = self.graph.record(target)?.record_type();
        let expected = match kind {
            LinkKind::LinkedPhysical => target_type.is_linkable_physical_target(),
            LinkKind::LogHead => target_type == LogRecordType::Indexing,
            LinkKind::EarliestPendingTransaction => target_type.is_transaction(),
            LinkKind::LastCompletedBeginCheckpoint => target_type == LogRecordType::BeginCheckpoint,
            LinkKind::PreviousPhysical | LinkKind::ParentTransaction => true,
        };
        if !expected {
            return Err(TxnLogError::Corrupted(format!(
                "{} link resolved to a {} record",
                kind, target_type
            )));
        }
        Ok(())
    }

    pub async fn previous_physical_record(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::PreviousPhysical).await
    }

    pub async fn linked_physical_record(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::LinkedPhysical).await
    }

    pub async fn parent_transaction_record(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::ParentTransaction).await
    }

    pub async fn log_head_record(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::LogHead).await
    }

    pub async fn earliest_pending_transaction(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::EarliestPendingTransaction).await
    }

    /// Begin checkpoint completed by the EndCheckpoint record `id`.
    pub async fn last_completed_begin_checkpoint(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        self.resolve(id, LinkKind::LastCompletedBeginCheckpoint).await
    }

    /// Walks the linked physical chain from `id` to the nearest EndCheckpoint and
    /// returns the begin checkpoint it completed.
    pub async fn find_last_completed_begin_checkpoint(&mut self, id: RecordId) -> TxnLogResult<Option<RecordId>> {
        let mut cursor = id;
        loop {
            if self.graph.record(cursor)?.record_type() == LogRecordType::EndCheckpoint {
                return self.last_completed_begin_checkpoint(cursor).await;
            }
            match self.linked_physical_record(cursor).await? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
    }
}
