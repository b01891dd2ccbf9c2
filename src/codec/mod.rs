//! Cursor codec shared by every record section.
//!
//! Integers are little endian. A section is a `u32` length followed by that many
//! bytes; the length does not count itself. Readers take the fields they know and
//! then jump to the section end, so newer writers may append fields freely.

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{TxnLogError, TxnLogResult};

pub const SECTION_HEADER_LEN: usize = 4;

/// Position of a reserved section length, returned by [`BinaryWriter::begin_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionMarker(usize);

#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    position: usize,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> TxnLogResult<()> {
        if position > self.buf.len() {
            return Err(TxnLogError::Internal(format!(
                "writer position {} beyond written length {}",
                position,
                self.buf.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.position = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Hands out the written bytes and leaves the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.position = 0;
        Bytes::from(std::mem::take(&mut self.buf))
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        let end = self.position + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.position..end].copy_from_slice(data);
        self.position = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_uuid(&mut self, value: &Uuid) {
        self.write_bytes(value.as_bytes());
    }

    /// Reserves `len` zeroed bytes and returns where they start.
    pub fn reserve(&mut self, len: usize) -> usize {
        let start = self.position;
        self.write_bytes(&vec![0u8; len]);
        start
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) -> TxnLogResult<()> {
        if at + 4 > self.buf.len() {
            return Err(TxnLogError::Internal(format!(
                "patch at {} outside written length {}",
                at,
                self.buf.len()
            )));
        }
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn begin_section(&mut self) -> SectionMarker {
        SectionMarker(self.reserve(SECTION_HEADER_LEN))
    }

    /// Backpatches the section length with everything written after the placeholder.
    pub fn end_section(&mut self, marker: SectionMarker) -> TxnLogResult<()> {
        let body_start = marker.0 + SECTION_HEADER_LEN;
        if self.position < body_start {
            return Err(TxnLogError::Internal(format!(
                "section closed at {} before its body start {}",
                self.position, body_start
            )));
        }
        let len = u32::try_from(self.position - body_start)
            .map_err(|_| TxnLogError::Internal("section longer than u32::MAX".to_string()))?;
        self.patch_u32(marker.0, len)
    }
}

#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> TxnLogResult<()> {
        if position > self.bytes.len() {
            return Err(TxnLogError::Corrupted(format!(
                "seek to {} beyond buffer length {}",
                position,
                self.bytes.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn read_slice(&mut self, len: usize) -> TxnLogResult<&'a [u8]> {
        let end = self.position.checked_add(len).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(TxnLogError::Corrupted(format!(
                "read of {} bytes at {} overruns buffer of {}",
                len,
                self.position,
                self.bytes.len()
            )));
        };
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> TxnLogResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> TxnLogResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> TxnLogResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> TxnLogResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> TxnLogResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> TxnLogResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> TxnLogResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_uuid(&mut self) -> TxnLogResult<Uuid> {
        Ok(Uuid::from_bytes(self.read_array()?))
    }

    /// Reads a section length and returns the absolute end of the section.
    pub fn begin_section(&mut self) -> TxnLogResult<usize> {
        let len = self.read_u32()? as usize;
        let end = self.position + len;
        if end > self.bytes.len() {
            return Err(TxnLogError::Corrupted(format!(
                "section of {} bytes at {} overruns buffer of {}",
                len,
                self.position,
                self.bytes.len()
            )));
        }
        Ok(end)
    }

    /// True while unread bytes remain before `end`.
    pub fn has_more(&self, end: usize) -> bool {
        self.position < end
    }

    /// Skips whatever this reader did not understand and lands on `end`.
    pub fn end_section(&mut self, end: usize) -> TxnLogResult<()> {
        if end < self.position {
            return Err(TxnLogError::Corrupted(format!(
                "section end {} precedes cursor {}",
                end, self.position
            )));
        }
        self.position = end;
        Ok(())
    }
}
