//! Arena holding the in-memory record graph.
//!
//! Backward links are handles into the arena, so no record owns another and dropping
//! a chain is a loop over slots instead of a cascade of destructors. Slots are reused
//! through a free list; a generation counter makes stale handles (weak forward links
//! to removed records) resolve to nothing.

use log::debug;

use crate::error::{TxnLogError, TxnLogResult};
use crate::record::{LinkKind, LinkTarget, LogRecord, LogRecordType, RecordBody, RecordId};
use crate::types::Psn;

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<LogRecord>,
}

/// Result of walking the physical chain after a head truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncationCounts {
    pub visited: usize,
    pub freed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// `previous_physical` / `next_physical`.
    Physical,
    /// `parent` / `child` inside one transaction.
    Transaction,
}

#[derive(Debug, Default)]
pub struct LogGraph {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl LogGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, record: LogRecord) -> RecordId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return RecordId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        RecordId::new(index, 0)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: RecordId) -> Option<&LogRecord> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut LogRecord> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_mut())
    }

    pub fn record(&self, id: RecordId) -> TxnLogResult<&LogRecord> {
        self.get(id)
            .ok_or_else(|| TxnLogError::InvalidState(format!("record {} is not in the graph", id)))
    }

    pub fn record_mut(&mut self, id: RecordId) -> TxnLogResult<&mut LogRecord> {
        self.get_mut(id)
            .ok_or_else(|| TxnLogError::InvalidState(format!("record {} is not in the graph", id)))
    }

    pub fn remove(&mut self, id: RecordId) -> Option<LogRecord> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index() as u32);
        self.live -= 1;
        Some(record)
    }

    /// Follows a backward link. A pruned link, or one whose referent was removed, is
    /// an error.
    pub fn follow(&self, id: RecordId, kind: LinkKind) -> TxnLogResult<Option<RecordId>> {
        let Some(target) = self.record(id)?.required_link(kind)?.follow()? else {
            return Ok(None);
        };
        if !self.contains(target) {
            return Err(TxnLogError::InvalidState(format!(
                "{} link of record {} refers to removed record {}",
                kind, id, target
            )));
        }
        Ok(Some(target))
    }

    /// Weak forward link; `None` once the next record has been removed.
    pub fn next_physical(&self, id: RecordId) -> Option<RecordId> {
        self.get(id)
            .and_then(|record| record.body.physical())
            .and_then(|physical| physical.next_physical)
            .filter(|next| self.contains(*next))
    }

    pub fn transaction_child(&self, id: RecordId) -> Option<RecordId> {
        self.get(id)
            .and_then(|record| record.body.transaction())
            .and_then(|fields| fields.child)
            .filter(|child| self.contains(*child))
    }

    /// Caches `target` as the referent of a link, keeping its serialized offset.
    pub fn resolve_link(&mut self, id: RecordId, kind: LinkKind, target: RecordId) -> TxnLogResult<()> {
        self.record(target)?;
        self.record_mut(id)?.required_link_mut(kind)?.resolve(target);
        Ok(())
    }

    fn record_type(&self, id: RecordId) -> TxnLogResult<LogRecordType> {
        Ok(self.record(id)?.record_type())
    }

    /// Makes `previous` the nearest preceding physical record of `id`, and `id` the next
    /// physical record of `previous` when `id` is itself physical.
    pub fn link_previous_physical(&mut self, id: RecordId, previous: RecordId) -> TxnLogResult<()> {
        let previous_type = self.record_type(previous)?;
        if !previous_type.is_physical() {
            return Err(TxnLogError::InvalidState(format!(
                "previous physical record cannot be a {} record",
                previous_type
            )));
        }
        let record = self.record_mut(id)?;
        record.previous_physical.resolve(previous);
        let is_physical = record.is_physical();
        if is_physical {
            if let Some(physical) = self.record_mut(previous)?.body.physical_mut() {
                physical.next_physical = Some(id);
            }
        }
        Ok(())
    }

    pub fn set_linked_physical(&mut self, id: RecordId, target: Option<RecordId>) -> TxnLogResult<()> {
        if let Some(target) = target {
            let target_type = self.record_type(target)?;
            if !target_type.is_linkable_physical_target() {
                return Err(TxnLogError::InvalidState(format!(
                    "linked physical record cannot be a {} record",
                    target_type
                )));
            }
        }
        let record = self.record_mut(id)?;
        let record_type = record.record_type();
        let physical = record.body.physical_mut().ok_or_else(|| {
            TxnLogError::InvalidState(format!("{} record has no linked physical record", record_type))
        })?;
        match target {
            Some(target) => physical.linked_physical.resolve(target),
            None => physical.linked_physical = Default::default(),
        }
        Ok(())
    }

    /// Chains `child` after `parent` within one transaction.
    pub fn link_transaction(&mut self, child: RecordId, parent: RecordId) -> TxnLogResult<()> {
        let parent_id = self
            .record(parent)?
            .body
            .transaction()
            .map(|t| t.transaction_id)
            .ok_or_else(|| TxnLogError::InvalidState("transaction parent must be a transaction record".to_string()))?;
        let child_fields = self
            .record_mut(child)?
            .body
            .transaction_mut()
            .ok_or_else(|| TxnLogError::InvalidState("transaction child must be a transaction record".to_string()))?;
        if child_fields.transaction_id != parent_id {
            return Err(TxnLogError::InvalidState(format!(
                "transaction {} record cannot follow transaction {}",
                child_fields.transaction_id, parent_id
            )));
        }
        child_fields.parent.resolve(parent);
        if let Some(parent_fields) = self.record_mut(parent)?.body.transaction_mut() {
            parent_fields.child = Some(child);
        }
        Ok(())
    }

    /// Points a log-head carrying record at the Indexing record the head sits on.
    pub fn set_log_head(&mut self, id: RecordId, head: RecordId) -> TxnLogResult<()> {
        let head_record = self.record(head)?;
        let (head_epoch, head_lsn, head_psn) = match &head_record.body {
            RecordBody::Indexing(indexing) => (indexing.epoch, head_record.lsn, head_record.psn),
            other => {
                return Err(TxnLogError::InvalidState(format!(
                    "log head must be an Indexing record, not {}",
                    other.record_type()
                )))
            }
        };
        let record = self.record_mut(id)?;
        let record_type = record.record_type();
        let fields = record.body.log_head_mut().ok_or_else(|| {
            TxnLogError::InvalidState(format!("{} record carries no log head", record_type))
        })?;
        fields.head_epoch = head_epoch;
        fields.head_lsn = head_lsn;
        fields.head_psn = head_psn;
        fields.head.resolve(head);
        Ok(())
    }

    pub fn set_earliest_pending_transaction(
        &mut self,
        begin_checkpoint: RecordId,
        transaction: Option<RecordId>,
    ) -> TxnLogResult<()> {
        if let Some(transaction) = transaction {
            let kind = self.record_type(transaction)?;
            if !kind.is_transaction() {
                return Err(TxnLogError::InvalidState(format!(
                    "earliest pending transaction cannot be a {} record",
                    kind
                )));
            }
        }
        match &mut self.record_mut(begin_checkpoint)?.body {
            RecordBody::BeginCheckpoint(body) => {
                match transaction {
                    Some(transaction) => body.earliest_pending_transaction.resolve(transaction),
                    None => body.earliest_pending_transaction = Default::default(),
                }
                Ok(())
            }
            other => Err(TxnLogError::InvalidState(format!(
                "{} record has no earliest pending transaction",
                other.record_type()
            ))),
        }
    }

    pub fn set_last_completed_begin_checkpoint(
        &mut self,
        end_checkpoint: RecordId,
        begin_checkpoint: RecordId,
    ) -> TxnLogResult<()> {
        let begin = self.record(begin_checkpoint)?;
        if begin.record_type() != LogRecordType::BeginCheckpoint {
            return Err(TxnLogError::InvalidState(format!(
                "end checkpoint cannot complete a {} record",
                begin.record_type()
            )));
        }
        let begin_lsn = begin.lsn;
        match &mut self.record_mut(end_checkpoint)?.body {
            RecordBody::EndCheckpoint(body) => {
                if body.last_stable_lsn < begin_lsn {
                    return Err(TxnLogError::InvalidState(format!(
                        "end checkpoint last stable lsn {} precedes begin checkpoint lsn {}",
                        body.last_stable_lsn, begin_lsn
                    )));
                }
                body.last_completed_begin_checkpoint.resolve(begin_checkpoint);
                Ok(())
            }
            other => Err(TxnLogError::InvalidState(format!(
                "{} record has no last completed begin checkpoint",
                other.record_type()
            ))),
        }
    }

    /// Computes the serialized offset of every resolved link from record positions.
    /// Offsets already frozen stay as they are unless `force_recompute` is set.
    pub fn freeze_offsets(&mut self, id: RecordId, force_recompute: bool) -> TxnLogResult<()> {
        let record = self.record(id)?;
        let position = record.require_position("freezing link offsets")?;
        let mut updates = Vec::new();
        for (kind, link) in record.links() {
            match link.target() {
                LinkTarget::Resolved(target) => {
                    if link.is_offset_known() && !force_recompute {
                        continue;
                    }
                    let target_position = self.record(target)?.require_position("freezing link offsets")?;
                    if target_position >= position {
                        return Err(TxnLogError::Internal(format!(
                            "{} link of record at {} points forward to {}",
                            kind, position, target_position
                        )));
                    }
                    updates.push((kind, position - target_position));
                }
                LinkTarget::None => {}
                LinkTarget::Unresolved | LinkTarget::Invalid => {
                    if !link.is_offset_known() {
                        return Err(TxnLogError::InvalidState(format!(
                            "{} link of {} record lsn {} was never set",
                            kind,
                            record.record_type(),
                            record.lsn
                        )));
                    }
                }
            }
        }
        let record = self.record_mut(id)?;
        for (kind, offset) in updates {
            record.required_link_mut(kind)?.set_offset(offset);
        }
        Ok(())
    }

    /// Prunes every link of `id` whose referent lies below the new head. Returns whether
    /// anything was pruned; a second call with the same head prunes nothing.
    pub fn free_previous_links_lower_than_psn(&mut self, id: RecordId, head_psn: Psn) -> TxnLogResult<bool> {
        let record = self.record(id)?;
        let mut pruned = Vec::new();
        for (kind, link) in record.links() {
            if let LinkTarget::Resolved(target) = link.target() {
                let below_head = self.get(target).map_or(true, |target| target.psn < head_psn);
                if below_head {
                    pruned.push(kind);
                }
            }
        }
        if pruned.is_empty() {
            return Ok(false);
        }
        let record = self.record_mut(id)?;
        for kind in pruned {
            record.required_link_mut(kind)?.invalidate();
        }
        Ok(true)
    }

    /// Walks forward from the new head along `next_physical`, pruning links into the
    /// truncated range.
    pub fn on_truncate_head(&mut self, head: RecordId) -> TxnLogResult<TruncationCounts> {
        let head_record = self.record(head)?;
        if head_record.record_type() != LogRecordType::Indexing {
            return Err(TxnLogError::InvalidState(format!(
                "log head must be an Indexing record, not {}",
                head_record.record_type()
            )));
        }
        let head_psn = head_record.psn;
        let mut counts = TruncationCounts::default();
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if counts.visited == self.live {
                return Err(TxnLogError::Internal(format!(
                    "physical chain from head {} does not terminate",
                    head
                )));
            }
            counts.visited += 1;
            if self.free_previous_links_lower_than_psn(id, head_psn)? {
                counts.freed += 1;
            }
            cursor = self.next_physical(id);
        }
        debug!(
            "head truncation at psn {} visited {} records, freed links on {}",
            head_psn, counts.visited, counts.freed
        );
        Ok(counts)
    }

    fn chain_link(record: &LogRecord, chain: Chain) -> Option<RecordId> {
        match chain {
            Chain::Physical => record.previous_physical.resolved(),
            Chain::Transaction => record.body.transaction().and_then(|t| t.parent.resolved()),
        }
    }

    /// `start` followed by every record reachable through resolved backward links,
    /// newest first.
    fn collect_chain(&self, start: RecordId, chain: Chain) -> Vec<RecordId> {
        let mut ids = Vec::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let Some(record) = self.get(id) else {
                break;
            };
            if ids.len() == self.live {
                break;
            }
            ids.push(id);
            cursor = Self::chain_link(record, chain);
        }
        ids
    }

    /// Severs every resolved link of the chain ending at `start`, oldest first. Offsets
    /// are kept, so the links can be resolved again from the log. Returns the number of
    /// links severed.
    pub fn release_chain(&mut self, start: RecordId, chain: Chain) -> usize {
        let ids = self.collect_chain(start, chain);
        let mut severed = 0;
        for pair in ids.windows(2).rev() {
            let (child, parent) = (pair[0], pair[1]);
            if let Some(record) = self.get_mut(child) {
                let link = match chain {
                    Chain::Physical => Some(&mut record.previous_physical),
                    Chain::Transaction => record.body.transaction_mut().map(|t| &mut t.parent),
                };
                if link.map_or(false, |link| link.sever()) {
                    severed += 1;
                }
            }
            if let Some(record) = self.get_mut(parent) {
                match chain {
                    Chain::Physical => {
                        if let Some(physical) = record.body.physical_mut() {
                            if physical.next_physical == Some(child) {
                                physical.next_physical = None;
                            }
                        }
                    }
                    Chain::Transaction => {
                        if let Some(fields) = record.body.transaction_mut() {
                            if fields.child == Some(child) {
                                fields.child = None;
                            }
                        }
                    }
                }
            }
        }
        severed
    }

    /// Removes `start` and every record behind it on the chain. Returns how many
    /// records were removed.
    pub fn drop_chain(&mut self, start: RecordId, chain: Chain) -> usize {
        let ids = self.collect_chain(start, chain);
        ids.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BackwardLink;
    use crate::types::Epoch;

    fn placed(graph: &mut LogGraph, mut record: LogRecord, psn: Psn, position: u64) -> RecordId {
        record.psn = psn;
        record.set_record_position(position).unwrap();
        graph.insert(record)
    }

    #[test]
    fn removed_slots_are_reused_with_a_new_generation() {
        let mut graph = LogGraph::new();
        let a = graph.insert(LogRecord::barrier(1, 1));
        assert!(graph.remove(a).is_some());
        assert!(graph.remove(a).is_none());
        let b = graph.insert(LogRecord::barrier(2, 2));
        assert_ne!(a, b);
        assert!(graph.get(a).is_none());
        assert_eq!(graph.record(b).unwrap().lsn, 2);
        assert!(matches!(graph.record(a), Err(TxnLogError::InvalidState(_))));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn freeze_offsets_measures_back_from_own_position() {
        let mut graph = LogGraph::new();
        let first = placed(&mut graph, LogRecord::indexing(0, Epoch::ZERO), 1, 0);
        let second = placed(&mut graph, LogRecord::barrier(1, 0), 2, 100);
        graph.link_previous_physical(second, first).unwrap();
        graph.freeze_offsets(second, false).unwrap();
        assert_eq!(graph.record(second).unwrap().previous_physical.offset(), 100);
        // logical records do not become anyone's next physical record
        assert_eq!(graph.next_physical(first), None);

        graph
            .record_mut(second)
            .unwrap()
            .previous_physical
            .set_offset(7);
        graph.freeze_offsets(second, false).unwrap();
        assert_eq!(graph.record(second).unwrap().previous_physical.offset(), 7);
        graph.freeze_offsets(second, true).unwrap();
        assert_eq!(graph.record(second).unwrap().previous_physical.offset(), 100);
    }

    #[test]
    fn freeze_offsets_rejects_forward_and_unset_links() {
        let mut graph = LogGraph::new();
        let later = placed(&mut graph, LogRecord::indexing(0, Epoch::ZERO), 2, 500);
        let earlier = placed(&mut graph, LogRecord::barrier(1, 0), 1, 10);
        graph.link_previous_physical(earlier, later).unwrap();
        assert!(matches!(
            graph.freeze_offsets(earlier, false),
            Err(TxnLogError::Internal(_))
        ));

        let mut orphan = LogRecord::barrier(3, 0);
        orphan.previous_physical = BackwardLink::unknown();
        let orphan = placed(&mut graph, orphan, 3, 900);
        assert!(matches!(
            graph.freeze_offsets(orphan, false),
            Err(TxnLogError::InvalidState(_))
        ));

        let unplaced = graph.insert(LogRecord::barrier(4, 0));
        assert!(graph.freeze_offsets(unplaced, false).is_err());
    }

    #[test]
    fn link_setters_enforce_target_kinds() {
        let mut graph = LogGraph::new();
        let indexing = graph.insert(LogRecord::indexing(0, Epoch::new(1, 1)));
        let barrier = graph.insert(LogRecord::barrier(1, 0));
        let info = graph.insert(LogRecord::information(1, crate::record::InformationEvent::Recovered));
        let truncate = graph.insert(LogRecord::truncate_head(1, true));

        assert!(graph.set_linked_physical(info, Some(indexing)).is_err());
        assert!(graph.set_linked_physical(barrier, Some(truncate)).is_err());
        graph.set_linked_physical(info, Some(truncate)).unwrap();
        assert_eq!(graph.follow(info, LinkKind::LinkedPhysical).unwrap(), Some(truncate));
        graph.set_linked_physical(info, None).unwrap();
        assert_eq!(graph.follow(info, LinkKind::LinkedPhysical).unwrap(), None);

        assert!(graph.link_previous_physical(info, barrier).is_err());
        assert!(graph.set_log_head(truncate, barrier).is_err());
        graph.record_mut(indexing).unwrap().psn = 11;
        graph.set_log_head(truncate, indexing).unwrap();
        let head = graph.record(truncate).unwrap().body.log_head().unwrap().clone();
        assert_eq!(head.head_epoch, Epoch::new(1, 1));
        assert_eq!(head.head_psn, 11);
        assert_eq!(head.head.resolved(), Some(indexing));
    }

    #[test]
    fn transaction_links_stay_within_one_transaction() {
        let mut graph = LogGraph::new();
        let begin = graph.insert(LogRecord::begin_transaction(1, 7, false, None, None, None));
        let op = graph.insert(LogRecord::operation(2, 7, None, None, None));
        let other = graph.insert(LogRecord::operation(3, 8, None, None, None));
        let barrier = graph.insert(LogRecord::barrier(3, 2));

        graph.link_transaction(op, begin).unwrap();
        assert_eq!(graph.follow(op, LinkKind::ParentTransaction).unwrap(), Some(begin));
        assert_eq!(graph.transaction_child(begin), Some(op));
        assert!(graph.link_transaction(other, op).is_err());
        assert!(graph.link_transaction(barrier, op).is_err());

        let checkpoint = graph.insert(LogRecord::begin_checkpoint(
            4,
            crate::progress::ProgressVector::zero(0),
            Epoch::ZERO,
            Default::default(),
            false,
        ));
        assert!(graph.set_earliest_pending_transaction(checkpoint, Some(barrier)).is_err());
        graph.set_earliest_pending_transaction(checkpoint, Some(begin)).unwrap();
        assert_eq!(
            graph.follow(checkpoint, LinkKind::EarliestPendingTransaction).unwrap(),
            Some(begin)
        );

        let early_end = graph.insert(LogRecord::end_checkpoint(5, 3));
        assert!(graph.set_last_completed_begin_checkpoint(early_end, checkpoint).is_err());
        let end = graph.insert(LogRecord::end_checkpoint(5, 4));
        graph.set_last_completed_begin_checkpoint(end, checkpoint).unwrap();
        assert!(graph.set_last_completed_begin_checkpoint(end, begin).is_err());
    }

    /// indexing(1) <- end cp(2) <- indexing(3) <- truncate head(4) <- complete cp(5)
    fn truncation_fixture() -> (LogGraph, Vec<RecordId>) {
        let mut graph = LogGraph::new();
        let records = vec![
            LogRecord::indexing(0, Epoch::ZERO),
            LogRecord::end_checkpoint(0, 0),
            LogRecord::indexing(0, Epoch::ZERO),
            LogRecord::truncate_head(0, true),
            LogRecord::complete_checkpoint(0),
        ];
        let mut ids = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            let id = placed(&mut graph, record, i as Psn + 1, i as u64 * 100);
            if let Some(previous) = ids.last() {
                graph.link_previous_physical(id, *previous).unwrap();
            }
            ids.push(id);
        }
        graph.set_log_head(ids[3], ids[2]).unwrap();
        graph.set_linked_physical(ids[4], Some(ids[1])).unwrap();
        graph.set_log_head(ids[4], ids[0]).unwrap();
        (graph, ids)
    }

    #[test]
    fn truncate_head_prunes_links_below_the_new_head() {
        let (mut graph, ids) = truncation_fixture();
        let counts = graph.on_truncate_head(ids[2]).unwrap();
        assert_eq!(counts, TruncationCounts { visited: 3, freed: 2 });

        assert!(graph.follow(ids[2], LinkKind::PreviousPhysical).is_err());
        assert_eq!(graph.follow(ids[3], LinkKind::LogHead).unwrap(), Some(ids[2]));
        assert!(graph.follow(ids[4], LinkKind::LinkedPhysical).is_err());
        assert!(graph.follow(ids[4], LinkKind::LogHead).is_err());
        assert_eq!(graph.follow(ids[4], LinkKind::PreviousPhysical).unwrap(), Some(ids[3]));
        // records below the head are not visited
        assert_eq!(graph.follow(ids[1], LinkKind::PreviousPhysical).unwrap(), Some(ids[0]));

        let again = graph.on_truncate_head(ids[2]).unwrap();
        assert_eq!(again, TruncationCounts { visited: 3, freed: 0 });
        assert!(!graph.free_previous_links_lower_than_psn(ids[4], 3).unwrap());
    }

    #[test]
    fn truncate_head_requires_indexing_record() {
        let (mut graph, ids) = truncation_fixture();
        assert!(graph.on_truncate_head(ids[1]).is_err());
    }

    #[test]
    fn million_record_physical_chain_is_released_iteratively() {
        const N: usize = 1_000_000;
        let mut graph = LogGraph::with_capacity(N);
        let mut previous = graph.insert(LogRecord::indexing(0, Epoch::ZERO));
        for lsn in 1..N as i64 {
            let id = graph.insert(LogRecord::indexing(lsn, Epoch::ZERO));
            graph.link_previous_physical(id, previous).unwrap();
            previous = id;
        }
        assert_eq!(graph.release_chain(previous, Chain::Physical), N - 1);
        assert_eq!(graph.release_chain(previous, Chain::Physical), 0);
        assert_eq!(graph.len(), N);

        // relink and drop the whole chain
        let ids: Vec<_> = (0..N as u32).map(|i| RecordId::new(i, 0)).collect();
        for pair in ids.windows(2) {
            graph.link_previous_physical(pair[1], pair[0]).unwrap();
        }
        assert_eq!(graph.drop_chain(previous, Chain::Physical), N);
        assert!(graph.is_empty());
    }

    #[test]
    fn long_transaction_chain_is_released_iteratively() {
        const N: usize = 200_000;
        let mut graph = LogGraph::new();
        let first = graph.insert(LogRecord::begin_transaction(0, 1, false, None, None, None));
        let mut last = first;
        for lsn in 1..N as i64 {
            let id = graph.insert(LogRecord::operation(lsn, 1, None, None, None));
            graph.link_transaction(id, last).unwrap();
            last = id;
        }
        assert_eq!(graph.release_chain(last, Chain::Transaction), N - 1);
        assert_eq!(graph.transaction_child(first), None);
        assert_eq!(graph.follow(last, LinkKind::ParentTransaction).unwrap(), None);
        assert_eq!(graph.drop_chain(last, Chain::Transaction), 1);
    }
}
