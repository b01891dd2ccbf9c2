//! Envelope-level reads over a seekable byte stream.
//!
//! Every read races the caller's cancellation token. A cancelled read returns
//! [`TxnLogError::Cancelled`] and never a partial record.

use std::io::SeekFrom;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::error::{TxnLogError, TxnLogResult};
use crate::record::RECORD_LENGTH_FIELD_LEN;

/// Any seekable async byte source the log can be read from.
pub trait LogReadStream: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send + ?Sized> LogReadStream for T {}

const ENVELOPE_OVERHEAD: u64 = 2 * RECORD_LENGTH_FIELD_LEN as u64;

fn check_cancelled(cancel: &CancellationToken) -> TxnLogResult<()> {
    if cancel.is_cancelled() {
        return Err(TxnLogError::Cancelled);
    }
    Ok(())
}

/// Reads until `buf` is full or the stream ends. Returns the number of bytes read.
async fn fill<S: LogReadStream + ?Sized>(
    stream: &mut S,
    buf: &mut [u8],
    cancel: &CancellationToken,
) -> TxnLogResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TxnLogError::Cancelled),
            read = stream.read(&mut buf[filled..]) => read?,
        };
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

async fn seek<S: LogReadStream + ?Sized>(
    stream: &mut S,
    position: SeekFrom,
    cancel: &CancellationToken,
) -> TxnLogResult<u64> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TxnLogError::Cancelled),
        position = stream.seek(position) => Ok(position?),
    }
}

fn envelope_total(leading: u32) -> u64 {
    leading as u64 + ENVELOPE_OVERHEAD
}

/// Reads the envelope starting at the current stream position and leaves the stream
/// just past it. `None` at a clean end of stream or at `end`.
///
/// An envelope whose length runs past `end` is corrupt and is rejected before its
/// body is buffered.
pub async fn read_next_record<S: LogReadStream + ?Sized>(
    stream: &mut S,
    end: u64,
    cancel: &CancellationToken,
) -> TxnLogResult<Option<(u64, Bytes)>> {
    check_cancelled(cancel)?;
    let position = seek(stream, SeekFrom::Current(0), cancel).await?;
    if position >= end {
        return Ok(None);
    }
    let mut header = [0u8; RECORD_LENGTH_FIELD_LEN];
    match fill(stream, &mut header, cancel).await? {
        0 => return Ok(None),
        RECORD_LENGTH_FIELD_LEN => {}
        partial => {
            return Err(TxnLogError::Corrupted(format!(
                "log ends {} bytes into the record length at {}",
                partial, position
            )))
        }
    }
    let leading = u32::from_le_bytes(header);
    let total = envelope_total(leading);
    if total > end - position {
        return Err(TxnLogError::Corrupted(format!(
            "record at {} claims {} bytes past the log end {}",
            position, total, end
        )));
    }
    let total = total as usize;
    let mut buf = vec![0u8; total];
    buf[..RECORD_LENGTH_FIELD_LEN].copy_from_slice(&header);
    let read = fill(stream, &mut buf[RECORD_LENGTH_FIELD_LEN..], cancel).await?;
    if read + RECORD_LENGTH_FIELD_LEN != total {
        return Err(TxnLogError::Corrupted(format!(
            "record at {} claims {} bytes but the log ends after {}",
            position,
            total,
            read + RECORD_LENGTH_FIELD_LEN
        )));
    }
    check_trailing_length(&buf, leading, position)?;
    Ok(Some((position, Bytes::from(buf))))
}

/// Reads the envelope ending at the current stream position, using its trailing
/// length, and leaves the stream at the start of that envelope. `None` at position 0.
pub async fn read_previous_record<S: LogReadStream + ?Sized>(
    stream: &mut S,
    cancel: &CancellationToken,
) -> TxnLogResult<Option<(u64, Bytes)>> {
    check_cancelled(cancel)?;
    let end = seek(stream, SeekFrom::Current(0), cancel).await?;
    if end == 0 {
        return Ok(None);
    }
    if end < ENVELOPE_OVERHEAD {
        return Err(TxnLogError::Corrupted(format!(
            "no room for a record before position {}",
            end
        )));
    }
    seek(stream, SeekFrom::Start(end - RECORD_LENGTH_FIELD_LEN as u64), cancel).await?;
    let mut trailer = [0u8; RECORD_LENGTH_FIELD_LEN];
    if fill(stream, &mut trailer, cancel).await? != RECORD_LENGTH_FIELD_LEN {
        return Err(TxnLogError::Corrupted(format!(
            "record length before position {} is truncated",
            end
        )));
    }
    let trailing = u32::from_le_bytes(trailer);
    let start = end.checked_sub(envelope_total(trailing)).ok_or_else(|| {
        TxnLogError::Corrupted(format!(
            "record ending at {} claims {} bytes",
            end,
            envelope_total(trailing)
        ))
    })?;
    seek(stream, SeekFrom::Start(start), cancel).await?;
    let record = read_next_record(stream, end, cancel).await?.ok_or_else(|| {
        TxnLogError::Corrupted(format!("record expected at position {}", start))
    })?;
    if record.1.len() as u64 != end - start {
        return Err(TxnLogError::Corrupted(format!(
            "record at {} does not end at {}",
            start, end
        )));
    }
    seek(stream, SeekFrom::Start(start), cancel).await?;
    Ok(Some(record))
}

/// Reads the envelope at an absolute position. The envelope must end by `end`.
pub async fn read_record_at<S: LogReadStream + ?Sized>(
    stream: &mut S,
    position: u64,
    end: u64,
    cancel: &CancellationToken,
) -> TxnLogResult<Bytes> {
    check_cancelled(cancel)?;
    seek(stream, SeekFrom::Start(position), cancel).await?;
    read_next_record(stream, end, cancel)
        .await?
        .map(|(_, bytes)| bytes)
        .ok_or_else(|| TxnLogError::Corrupted(format!("no record at position {}", position)))
}

fn check_trailing_length(buf: &[u8], leading: u32, position: u64) -> TxnLogResult<()> {
    let tail = &buf[buf.len() - RECORD_LENGTH_FIELD_LEN..];
    let mut trailer = [0u8; RECORD_LENGTH_FIELD_LEN];
    trailer.copy_from_slice(tail);
    let trailing = u32::from_le_bytes(trailer);
    if trailing != leading {
        return Err(TxnLogError::Corrupted(format!(
            "record at {} has leading length {} but trailing length {}",
            position, leading, trailing
        )));
    }
    Ok(())
}
