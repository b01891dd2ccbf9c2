use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

use crate::config::LogReaderConfig;
use crate::error::{TxnLogError, TxnLogResult};
use crate::graph::LogGraph;
use crate::record::{decode_record, RecordId};
use crate::recovery::health::HealthReporter;
use crate::recovery::store::{LogReaderType, LogStore};
use crate::recovery::stream::read_next_record;
use crate::types::Lsn;

/// Forward enumerator over the records in `[start_position, end_position)`.
///
/// Each step decodes one record into the caller's graph and links it to the physical
/// record before it. The sequence does not restart on its own; call [`LogRecords::reset`].
pub struct LogRecords<S: LogStore> {
    store: Arc<S>,
    stream: S::Stream,
    name: String,
    reader_type: LogReaderType,
    start_lsn: Lsn,
    start_position: u64,
    end_position: u64,
    current_position: u64,
    /// Start of the range currently registered with the store.
    registered_position: u64,
    needs_seek: bool,
    last_physical: Option<(RecordId, u64)>,
    current: Option<RecordId>,
    config: LogReaderConfig,
    health: Arc<dyn HealthReporter>,
    cancel: CancellationToken,
    slow_reads: usize,
}

impl<S: LogStore> LogRecords<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        start_lsn: Lsn,
        start_position: u64,
        end_position: u64,
        name: impl Into<String>,
        reader_type: LogReaderType,
        config: LogReaderConfig,
        health: Arc<dyn HealthReporter>,
        cancel: CancellationToken,
    ) -> TxnLogResult<Self> {
        let name = name.into();
        if !store.add_log_reader(start_lsn, start_position, end_position, &name, reader_type) {
            return Err(TxnLogError::InvalidState(format!(
                "log store refused {} reader {} at {}",
                reader_type, name, start_position
            )));
        }
        let mut stream = match store.create_reader_stream() {
            Ok(stream) => stream,
            Err(e) => {
                store.remove_log_reader(start_position, &name);
                return Err(e);
            }
        };
        store.set_sequential_access_read_size(&mut stream, config.sequential_access_read_size);
        Ok(Self {
            store,
            stream,
            name,
            reader_type,
            start_lsn,
            start_position,
            end_position,
            current_position: start_position,
            registered_position: start_position,
            needs_seek: true,
            last_physical: None,
            current: None,
            config,
            health,
            cancel,
            slow_reads: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Option<RecordId> {
        self.current
    }

    /// Position of the next record to be read.
    pub fn current_position(&self) -> u64 {
        self.current_position
    }

    pub fn registered_position(&self) -> u64 {
        self.registered_position
    }

    pub fn slow_read_count(&self) -> usize {
        self.slow_reads
    }

    /// Reads the next record into `graph`. `None` once the window is exhausted.
    pub async fn move_next(&mut self, graph: &mut LogGraph) -> TxnLogResult<Option<RecordId>> {
        if self.current_position >= self.end_position {
            return Ok(None);
        }
        if self.needs_seek {
            self.stream.seek(SeekFrom::Start(self.current_position)).await?;
            self.needs_seek = false;
        }

        let started = Instant::now();
        let read = read_next_record(&mut self.stream, self.end_position, &self.cancel).await;
        let elapsed = started.elapsed();
        if elapsed > self.config.slow_read_threshold {
            self.slow_reads += 1;
            warn!(
                "{} reader {} took {:?} to read at {}",
                self.reader_type, self.name, elapsed, self.current_position
            );
            self.health
                .report_slow_operation(&self.name, "log record read", elapsed);
        }
        // A failed step may leave the stream past the record; seek back on the next call.
        let (position, bytes) = match read {
            Ok(Some(read)) => read,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.needs_seek = true;
                return Err(e);
            }
        };
        match self.admit(graph, position, &bytes) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                self.needs_seek = true;
                Err(e)
            }
        }
    }

    /// Decodes the envelope read at `position` and links it into `graph`. On error the
    /// graph and the cursor are left as they were.
    fn admit(&mut self, graph: &mut LogGraph, position: u64, bytes: &[u8]) -> TxnLogResult<RecordId> {
        let mut record = decode_record(bytes, true)?;
        record.set_record_position(position)?;

        let previous = match self.last_physical {
            Some((previous, previous_position)) if graph.contains(previous) => {
                let previous_offset = record.previous_physical.offset();
                if position - previous_position != previous_offset {
                    return Err(TxnLogError::Corrupted(format!(
                        "record at {} links {} bytes back but the previous physical record is at {}",
                        position, previous_offset, previous_position
                    )));
                }
                Some(previous)
            }
            _ => None,
        };

        let lsn = record.lsn;
        let is_physical = record.is_physical();
        let id = graph.insert(record);
        if let Some(previous) = previous {
            if let Err(e) = graph.link_previous_physical(id, previous) {
                graph.remove(id);
                return Err(e);
            }
        }
        if is_physical {
            self.last_physical = Some((id, position));
        }
        self.current_position = position + bytes.len() as u64;
        self.current = Some(id);
        self.advance_retention(lsn);
        Ok(id)
    }

    fn advance_retention(&mut self, lsn: Lsn) {
        if self.current_position - self.registered_position < self.config.retention_advance_bytes {
            return;
        }
        if !self.store.add_log_reader(
            lsn,
            self.current_position,
            self.end_position,
            &self.name,
            self.reader_type,
        ) {
            warn!(
                "log store refused to advance reader {} to {}",
                self.name, self.current_position
            );
            return;
        }
        self.store.remove_log_reader(self.registered_position, &self.name);
        debug!(
            "reader {} retained range {} -> {}",
            self.name, self.registered_position, self.current_position
        );
        self.registered_position = self.current_position;
    }

    /// Rewinds to the start of the window.
    pub fn reset(&mut self) -> TxnLogResult<()> {
        if self.registered_position != self.start_position {
            if !self.store.add_log_reader(
                self.start_lsn,
                self.start_position,
                self.end_position,
                &self.name,
                self.reader_type,
            ) {
                return Err(TxnLogError::InvalidState(format!(
                    "log store no longer holds {} for reader {}",
                    self.start_position, self.name
                )));
            }
            self.store.remove_log_reader(self.registered_position, &self.name);
            self.registered_position = self.start_position;
        }
        self.current_position = self.start_position;
        self.needs_seek = true;
        self.last_physical = None;
        self.current = None;
        Ok(())
    }
}

impl<S: LogStore> Drop for LogRecords<S> {
    fn drop(&mut self) {
        self.store.remove_log_reader(self.registered_position, &self.name);
    }
}
