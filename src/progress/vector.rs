use std::fmt;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::{TxnLogError, TxnLogResult};
use crate::progress::entry::{ProgressVectorEntry, PROGRESS_VECTOR_ENTRY_LEN};
use crate::types::{Epoch, Lsn, ONE_LSN, ZERO_LSN};

const RENDER_PREFIX: &str = "\t";

/// Ordered history of epoch transitions, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressVector {
    entries: Vec<ProgressVectorEntry>,
    max_entries: usize,
}

impl ProgressVector {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// A vector holding only the zero entry, which every replica starts from.
    pub fn zero(max_entries: usize) -> Self {
        Self {
            entries: vec![ProgressVectorEntry::zero()],
            max_entries,
        }
    }

    /// Builds a vector from entries that must already be in append order.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ProgressVectorEntry>,
        max_entries: usize,
    ) -> TxnLogResult<Self> {
        let mut vector = Self::new(max_entries);
        for entry in entries {
            vector.append(entry)?;
        }
        Ok(vector)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ProgressVectorEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ProgressVectorEntry> {
        self.entries.get(index)
    }

    pub fn last_entry(&self) -> Option<&ProgressVectorEntry> {
        self.entries.last()
    }

    /// 4-byte count followed by fixed-width entries.
    pub fn byte_count(&self) -> usize {
        4 + PROGRESS_VECTOR_ENTRY_LEN * self.entries.len()
    }

    pub fn append(&mut self, entry: ProgressVectorEntry) -> TxnLogResult<()> {
        if let Some(last) = self.entries.last() {
            if last.epoch >= entry.epoch || last.lsn > entry.lsn {
                return Err(TxnLogError::InvalidState(format!(
                    "progress vector append out of order: last {} new {}",
                    last, entry
                )));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Places `entry` by epoch. Returns `false` if the epoch is already present
    /// with the same lsn.
    pub fn insert(&mut self, entry: ProgressVectorEntry) -> TxnLogResult<bool> {
        for i in (0..self.entries.len()).rev() {
            let existing = self.entries[i];
            if existing.epoch == entry.epoch {
                if existing.lsn != entry.lsn {
                    return Err(TxnLogError::InvalidState(format!(
                        "progress vector already holds epoch {} at lsn {}, not {}",
                        entry.epoch, existing.lsn, entry.lsn
                    )));
                }
                return Ok(false);
            }
            if existing.epoch < entry.epoch {
                if existing.lsn > entry.lsn {
                    return Err(TxnLogError::InvalidState(format!(
                        "inserting {} after {} breaks lsn order",
                        entry, existing
                    )));
                }
                self.entries.insert(i + 1, entry);
                return Ok(true);
            }
            if existing.lsn < entry.lsn {
                return Err(TxnLogError::InvalidState(format!(
                    "inserting {} before {} breaks lsn order",
                    entry, existing
                )));
            }
        }
        self.entries.insert(0, entry);
        Ok(true)
    }

    /// Newest entry with the given epoch.
    pub fn find(&self, epoch: Epoch) -> Option<&ProgressVectorEntry> {
        self.entries.iter().rev().find(|entry| entry.epoch == epoch)
    }

    /// Epoch in which `lsn` was produced, or [`Epoch::INVALID`] if unknown.
    pub fn find_epoch(&self, lsn: Lsn) -> Epoch {
        if self.entries.is_empty() || lsn == ZERO_LSN {
            return Epoch::INVALID;
        }
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.lsn < lsn)
            .map(|entry| entry.epoch)
            .unwrap_or(Epoch::INVALID)
    }

    /// Replaces the entry with the same epoch and drops everything older.
    pub fn truncate_head(&mut self, first: ProgressVectorEntry) {
        if let Some(index) = self.entries.iter().position(|e| e.epoch == first.epoch) {
            self.entries[index] = first;
            self.entries.drain(..index);
        }
    }

    pub fn truncate_tail(&mut self, last: &ProgressVectorEntry) -> TxnLogResult<()> {
        match self.entries.last() {
            Some(current) if current == last => {
                self.entries.pop();
                Ok(())
            }
            other => Err(TxnLogError::InvalidState(format!(
                "truncate tail expected last entry {}, found {:?}",
                last, other
            ))),
        }
    }

    /// Drops history older than max(head, highest backed up) once the vector grows past
    /// `max_entries`. Returns how many entries went away.
    pub fn trim_if_needed(&mut self, highest_backed_up_epoch: Epoch, head_epoch: Epoch) -> usize {
        if self.max_entries == 0 || self.entries.len() <= self.max_entries {
            return 0;
        }
        let trimming_point = head_epoch.max(highest_backed_up_epoch);
        let Some(index) = self.entries.iter().rposition(|e| e.epoch < trimming_point) else {
            return 0;
        };
        self.entries.drain(..=index);
        index + 1
    }

    /// Trims `self` and hands back a copy, as captured by a begin-checkpoint record.
    pub fn snapshot(&mut self, highest_backed_up_epoch: Epoch, head_epoch: Epoch) -> Self {
        self.trim_if_needed(highest_backed_up_epoch, head_epoch);
        self.clone()
    }

    /// A replica that has done nothing but exist: single zero entry, nothing logged.
    pub fn is_brand_new_replica(&self, tail_lsn: Lsn) -> bool {
        self.entries.len() == 1
            && self.entries[0].epoch.data_loss_number == 0
            && self.entries[0].lsn == ZERO_LSN
            && tail_lsn == ONE_LSN
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.entries.len() as u32);
        for entry in &self.entries {
            entry.write(writer);
        }
    }

    pub fn read(reader: &mut BinaryReader<'_>, max_entries: usize) -> TxnLogResult<Self> {
        let count = reader.read_u32()? as usize;
        if count.saturating_mul(PROGRESS_VECTOR_ENTRY_LEN) > reader.remaining() {
            return Err(TxnLogError::Corrupted(format!(
                "progress vector claims {} entries with {} bytes left",
                count,
                reader.remaining()
            )));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(ProgressVectorEntry::read(reader)?);
        }
        Ok(Self {
            entries,
            max_entries,
        })
    }

    /// Renders newest-first entries around `target_index`, never exceeding `max_bytes`.
    ///
    /// Half the budget goes to entries after the target and the rest to entries before
    /// it; whatever the older side cannot use is lent back to the newer side, so a
    /// target near either end still produces a full-sized window.
    pub fn render_around(&self, target_index: usize, max_bytes: usize) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let last = self.entries.len() - 1;
        let target = target_index.min(last);
        let line = |i: usize| format!("{}{}", RENDER_PREFIX, self.entries[i]);
        // every line pays for its trailing separator
        let cost = |i: usize| line(i).len() + 1;

        let mut used = cost(target);
        if used > max_bytes {
            return String::new();
        }
        let forward_budget = (used + max_bytes / 2).min(max_bytes);
        let (mut lo, mut hi) = (target, target);
        while hi < last && used + cost(hi + 1) <= forward_budget {
            hi += 1;
            used += cost(hi);
        }
        while lo > 0 && used + cost(lo - 1) <= max_bytes {
            lo -= 1;
            used += cost(lo);
        }
        while hi < last && used + cost(hi + 1) <= max_bytes {
            hi += 1;
            used += cost(hi);
        }

        (lo..=hi).rev().map(line).collect::<Vec<_>>().join("\n")
    }

    pub fn render_newest(&self, max_bytes: usize) -> String {
        self.render_around(self.entries.len().saturating_sub(1), max_bytes)
    }
}

impl fmt::Display for ProgressVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", RENDER_PREFIX, entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dl: i64, cfg: i64, lsn: Lsn) -> ProgressVectorEntry {
        ProgressVectorEntry::new(Epoch::new(dl, cfg), lsn, 0, 0)
    }

    fn vector(entries: &[(i64, i64, Lsn)]) -> ProgressVector {
        ProgressVector::from_entries(entries.iter().map(|(d, c, l)| entry(*d, *c, *l)), 0).unwrap()
    }

    fn sequential(count: i64, max_entries: usize) -> ProgressVector {
        let mut pv = ProgressVector::new(max_entries);
        for i in 1..=count {
            pv.append(entry(i, i, i)).unwrap();
        }
        pv
    }

    #[test]
    fn append_enforces_epoch_and_lsn_order() {
        let mut pv = vector(&[(0, 0, 0), (1, 1, 10)]);
        assert!(pv.append(entry(1, 1, 20)).is_err());
        assert!(pv.append(entry(1, 0, 20)).is_err());
        assert!(pv.append(entry(1, 2, 9)).is_err());
        pv.append(entry(1, 2, 10)).unwrap();
        pv.append(entry(2, 0, 11)).unwrap();
        assert_eq!(pv.len(), 4);
        assert!(pv
            .entries()
            .windows(2)
            .all(|w| w[0].epoch < w[1].epoch && w[0].lsn <= w[1].lsn));
    }

    #[test]
    fn insert_places_by_epoch() {
        let mut pv = vector(&[(0, 0, 0), (1, 1, 10), (1, 3, 20)]);
        assert!(pv.insert(entry(1, 2, 15)).unwrap());
        assert_eq!(pv.get(2).unwrap().epoch, Epoch::new(1, 2));
        assert!(!pv.insert(entry(1, 2, 15)).unwrap());
        assert!(pv.insert(entry(1, 2, 16)).is_err());
        assert!(pv.insert(entry(2, 0, 30)).unwrap());
        assert_eq!(pv.last_entry().unwrap().epoch, Epoch::new(2, 0));
        assert!(pv.insert(entry(1, 4, 5)).is_err());
    }

    #[test]
    fn find_epoch_cases() {
        assert_eq!(ProgressVector::new(0).find_epoch(17), Epoch::INVALID);
        assert_eq!(vector(&[(0, 0, 0)]).find_epoch(17), Epoch::ZERO);
        assert_eq!(vector(&[(0, 0, 0)]).find_epoch(0), Epoch::INVALID);
        assert_eq!(
            vector(&[(0, 0, 0), (1, 1, 0)]).find_epoch(17),
            Epoch::new(1, 1)
        );

        let pv = vector(&[(0, 0, 0), (1, 1, 7), (2, 2, 17), (3, 3, 17)]);
        assert_eq!(pv.find_epoch(17), Epoch::new(1, 1));
        assert_eq!(pv.find_epoch(18), Epoch::new(3, 3));

        assert_eq!(vector(&[(3, 3, 27), (4, 4, 37)]).find_epoch(17), Epoch::INVALID);
    }

    #[test]
    fn find_returns_entry_for_epoch() {
        let pv = vector(&[(0, 0, 0), (1, 1, 7), (2, 2, 17)]);
        assert_eq!(pv.find(Epoch::new(1, 1)).unwrap().lsn, 7);
        assert!(pv.find(Epoch::new(5, 5)).is_none());
    }

    #[test]
    fn truncate_head_and_tail() {
        let mut pv = vector(&[(0, 0, 0), (1, 1, 7), (2, 2, 17), (3, 3, 20)]);
        let replacement = ProgressVectorEntry::new(Epoch::new(1, 1), 7, 9, 1234);
        pv.truncate_head(replacement);
        assert_eq!(pv.len(), 3);
        assert_eq!(pv.get(0).unwrap().primary_replica_id, 9);

        pv.truncate_tail(&entry(3, 3, 20)).unwrap();
        assert_eq!(pv.last_entry().unwrap().epoch, Epoch::new(2, 2));
        assert!(pv.truncate_tail(&entry(1, 1, 7)).is_err());
    }

    #[test]
    fn trimming_honours_backup_and_head() {
        let trimmed = |backup: Epoch, head: Epoch| {
            let mut pv = sequential(2000, 1000);
            pv.trim_if_needed(backup, head);
            pv.len()
        };
        assert_eq!(trimmed(Epoch::new(200, 200), Epoch::new(500, 500)), 1501);
        assert_eq!(trimmed(Epoch::new(500, 500), Epoch::new(200, 200)), 1501);
        assert_eq!(trimmed(Epoch::INVALID, Epoch::new(500, 500)), 1501);
        assert_eq!(trimmed(Epoch::INVALID, Epoch::INVALID), 2000);
        assert_eq!(trimmed(Epoch::new(500, 500), Epoch::ZERO), 1501);
        assert_eq!(trimmed(Epoch::new(2000, 2000), Epoch::ZERO), 1);
        assert_eq!(trimmed(Epoch::new(2, 2), Epoch::ZERO), 1999);

        let mut pv = sequential(2000, 1000);
        assert_eq!(pv.trim_if_needed(Epoch::new(2000, 2000), Epoch::ZERO), 1999);
        assert_eq!(pv.last_entry().unwrap().epoch, Epoch::new(2000, 2000));
        assert_eq!(pv.last_entry().unwrap().lsn, 2000);

        let mut unbounded = sequential(2000, 0);
        assert_eq!(unbounded.trim_if_needed(Epoch::new(1500, 1500), Epoch::ZERO), 0);
        assert_eq!(unbounded.len(), 2000);
    }

    #[test]
    fn snapshot_trims_source_then_copies() {
        let mut pv = sequential(20, 10);
        let snap = pv.snapshot(Epoch::new(15, 15), Epoch::ZERO);
        assert_eq!(pv.len(), 6);
        assert_eq!(pv.get(0).unwrap().epoch, Epoch::new(15, 15));
        assert_eq!(snap, pv);
    }

    #[test]
    fn brand_new_replica() {
        assert!(ProgressVector::zero(0).is_brand_new_replica(ONE_LSN));
        assert!(!ProgressVector::zero(0).is_brand_new_replica(5));
        assert!(!vector(&[(0, 0, 0), (1, 1, 0)]).is_brand_new_replica(ONE_LSN));
    }

    #[test]
    fn wire_layout_is_count_then_entries() {
        let pv = vector(&[(0, 0, 0), (1, 1, 7), (2, 2, 17)]);
        let mut writer = BinaryWriter::new();
        pv.write(&mut writer);
        assert_eq!(writer.len(), pv.byte_count());
        assert_eq!(pv.byte_count(), 4 + 3 * 40);

        let bytes = writer.take();
        let decoded = ProgressVector::read(&mut BinaryReader::new(&bytes), 0).unwrap();
        assert_eq!(decoded, pv);

        let mut short = BinaryWriter::new();
        short.write_u32(3);
        let bytes = short.take();
        assert!(ProgressVector::read(&mut BinaryReader::new(&bytes), 0).is_err());
    }

    #[test]
    fn rendering_stays_within_budget() {
        let pv = {
            let mut pv = ProgressVector::new(0);
            for i in 1..=5000 {
                pv.append(ProgressVectorEntry::new(Epoch::new(i, i), i, 0, 0)).unwrap();
            }
            pv
        };
        let max_bytes = 60 * 1024;
        for target in [0usize, 10, 1250, 2500, 3750, 4999] {
            let rendered = pv.render_around(target, max_bytes);
            assert!(rendered.len() <= max_bytes);
            assert!(rendered.len() > max_bytes * 9 / 10, "target {}", target);
            assert!(rendered.contains(&pv.get(target).unwrap().to_string()));
        }
        assert!(pv.render_newest(max_bytes).starts_with("\t[(5000,5000),5000,0,0]"));

        let small = vector(&[(0, 0, 0), (1, 1, 7)]);
        assert_eq!(small.render_newest(max_bytes), "\t[(1,1),7,0,0]\n\t[(0,0),0,0,0]");
        assert_eq!(small.to_string(), "\t[(0,0),0,0,0]\n\t[(1,1),7,0,0]");
    }
}
