use std::collections::BTreeMap;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::error::{TxnLogError, TxnLogResult};
use crate::recovery::stream::LogReadStream;
use crate::types::Lsn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum LogReaderType {
    Default,
    Recovery,
    PartialCopy,
    FullCopy,
    Backup,
}

/// A range of the log a reader has asked the store to retain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReaderRange {
    pub start_lsn: Lsn,
    pub start_position: u64,
    pub end_position: u64,
    pub name: String,
    pub reader_type: LogReaderType,
}

/// Byte-addressable log that readers register ranges against.
pub trait LogStore: Send + Sync {
    type Stream: LogReadStream;

    /// Asks the store to keep `[start_position, end_position)` readable. Returns false
    /// when the range is no longer available.
    fn add_log_reader(
        &self,
        start_lsn: Lsn,
        start_position: u64,
        end_position: u64,
        name: &str,
        reader_type: LogReaderType,
    ) -> bool;

    /// Drops the registration `name` made at `start_position`.
    fn remove_log_reader(&self, start_position: u64, name: &str);

    fn create_reader_stream(&self) -> TxnLogResult<Self::Stream>;

    fn set_sequential_access_read_size(&self, stream: &mut Self::Stream, size: usize);
}

/// Write side of the local log.
pub trait LogSink: Send + Sync {
    /// Appends one envelope and returns the position it starts at.
    fn append(&self, bytes: &[u8]) -> TxnLogResult<u64>;

    fn tail_position(&self) -> u64;
}

#[derive(Debug, Default)]
struct StoreState {
    log: BytesMut,
    head_position: u64,
    readers: BTreeMap<u64, Vec<LogReaderRange>>,
}

/// Log kept in memory. Reader streams read the bytes present when they were created.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    state: Mutex<StoreState>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one envelope and returns the position it starts at.
    pub fn append(&self, bytes: &[u8]) -> u64 {
        let mut state = self.state.lock();
        let position = state.log.len() as u64;
        state.log.extend_from_slice(bytes);
        position
    }

    pub fn tail_position(&self) -> u64 {
        self.state.lock().log.len() as u64
    }

    pub fn head_position(&self) -> u64 {
        self.state.lock().head_position
    }

    /// Moves the head forward. Refused while a registered reader starts below it.
    pub fn truncate_head(&self, position: u64) -> TxnLogResult<()> {
        let mut state = self.state.lock();
        let tail = state.log.len() as u64;
        if position < state.head_position || position > tail {
            return Err(TxnLogError::InvalidState(format!(
                "cannot truncate head to {} (head {}, tail {})",
                position, state.head_position, tail
            )));
        }
        if let Some(reader) = state.readers.range(..position).flat_map(|(_, v)| v).next() {
            return Err(TxnLogError::InvalidState(format!(
                "{} reader {} still needs the log from {}",
                reader.reader_type, reader.name, reader.start_position
            )));
        }
        debug!("log head {} -> {}", state.head_position, position);
        state.head_position = position;
        Ok(())
    }

    pub fn readers(&self) -> Vec<LogReaderRange> {
        self.state.lock().readers.values().flatten().cloned().collect()
    }

    pub fn reader_count(&self) -> usize {
        self.state.lock().readers.values().map(Vec::len).sum()
    }
}

impl LogStore for InMemoryLogStore {
    type Stream = MemoryLogStream;

    fn add_log_reader(
        &self,
        start_lsn: Lsn,
        start_position: u64,
        end_position: u64,
        name: &str,
        reader_type: LogReaderType,
    ) -> bool {
        let mut state = self.state.lock();
        if start_position < state.head_position {
            debug!(
                "refusing {} reader {} at {}: head is at {}",
                reader_type, name, start_position, state.head_position
            );
            return false;
        }
        state
            .readers
            .entry(start_position)
            .or_default()
            .push(LogReaderRange {
                start_lsn,
                start_position,
                end_position,
                name: name.to_string(),
                reader_type,
            });
        true
    }

    fn remove_log_reader(&self, start_position: u64, name: &str) {
        let mut state = self.state.lock();
        let Some(readers) = state.readers.get_mut(&start_position) else {
            warn!("no log reader registered at {}", start_position);
            return;
        };
        let Some(index) = readers.iter().rposition(|reader| reader.name == name) else {
            warn!("no log reader {} registered at {}", name, start_position);
            return;
        };
        readers.remove(index);
        if readers.is_empty() {
            state.readers.remove(&start_position);
        }
    }

    fn create_reader_stream(&self) -> TxnLogResult<Self::Stream> {
        let data = Bytes::copy_from_slice(&self.state.lock().log);
        Ok(MemoryLogStream {
            data,
            position: 0,
            read_size: usize::MAX,
        })
    }

    fn set_sequential_access_read_size(&self, stream: &mut Self::Stream, size: usize) {
        stream.read_size = size.max(1);
    }
}

impl LogSink for InMemoryLogStore {
    fn append(&self, bytes: &[u8]) -> TxnLogResult<u64> {
        Ok(InMemoryLogStore::append(self, bytes))
    }

    fn tail_position(&self) -> u64 {
        InMemoryLogStore::tail_position(self)
    }
}

/// Snapshot of an [`InMemoryLogStore`]. Each read returns at most `read_size` bytes.
#[derive(Debug)]
pub struct MemoryLogStream {
    data: Bytes,
    position: u64,
    read_size: usize,
}

impl MemoryLogStream {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsyncRead for MemoryLogStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = this.position.min(this.data.len() as u64) as usize;
        let count = (this.data.len() - start)
            .min(buf.remaining())
            .min(this.read_size);
        buf.put_slice(&this.data[start..start + count]);
        this.position += count as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryLogStream {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => this.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => this.position.checked_add_signed(delta),
        };
        this.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of log")
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
