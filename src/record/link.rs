use std::fmt;

use crate::error::{TxnLogError, TxnLogResult};
use crate::types::{NO_RECORD_OFFSET, UNKNOWN_RECORD_OFFSET};

/// Handle of a record inside a [`crate::graph::LogGraph`].
///
/// Handles are generational: once the slot is reused, old handles stop resolving,
/// which is how weak forward references are allowed to dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    index: u32,
    generation: u32,
}

impl RecordId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// In-memory side of a backward pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// No referent; the serialized offset is 0.
    None,
    /// Referent exists on disk but has not been loaded.
    Unresolved,
    Resolved(RecordId),
    /// Pruned by head truncation. The serialized offset is still valid on disk.
    Invalid,
}

/// The kinds of backward pointer a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum LinkKind {
    PreviousPhysical,
    LinkedPhysical,
    ParentTransaction,
    LogHead,
    EarliestPendingTransaction,
    LastCompletedBeginCheckpoint,
}

impl LinkKind {
    pub const ALL: [LinkKind; 6] = [
        LinkKind::PreviousPhysical,
        LinkKind::LinkedPhysical,
        LinkKind::ParentTransaction,
        LinkKind::LogHead,
        LinkKind::EarliestPendingTransaction,
        LinkKind::LastCompletedBeginCheckpoint,
    ];
}

/// Byte offset back to the referent, plus the cached handle once followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackwardLink {
    offset: u64,
    target: LinkTarget,
}

impl BackwardLink {
    pub fn none() -> Self {
        Self {
            offset: NO_RECORD_OFFSET,
            target: LinkTarget::None,
        }
    }

    /// A link whose referent is not known yet, e.g. a record decoded without its
    /// physical metadata.
    pub fn unknown() -> Self {
        Self {
            offset: UNKNOWN_RECORD_OFFSET,
            target: LinkTarget::Unresolved,
        }
    }

    /// Link as decoded from the log: 0 means there is no referent.
    pub fn from_offset(offset: u64) -> Self {
        if offset == NO_RECORD_OFFSET {
            Self::none()
        } else {
            Self {
                offset,
                target: LinkTarget::Unresolved,
            }
        }
    }

    /// In-memory link whose offset is computed when the record is written.
    pub fn to(id: RecordId) -> Self {
        Self {
            offset: UNKNOWN_RECORD_OFFSET,
            target: LinkTarget::Resolved(id),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn target(&self) -> LinkTarget {
        self.target
    }

    pub fn is_none(&self) -> bool {
        self.target == LinkTarget::None
    }

    pub fn is_offset_known(&self) -> bool {
        self.offset != UNKNOWN_RECORD_OFFSET
    }

    pub fn resolved(&self) -> Option<RecordId> {
        match self.target {
            LinkTarget::Resolved(id) => Some(id),
            _ => None,
        }
    }

    /// Caches `id` as the referent. A link that had no referent gets an unknown
    /// offset, to be frozen on write.
    pub fn resolve(&mut self, id: RecordId) {
        if self.offset == NO_RECORD_OFFSET {
            self.offset = UNKNOWN_RECORD_OFFSET;
        }
        self.target = LinkTarget::Resolved(id);
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        if offset == NO_RECORD_OFFSET {
            self.target = LinkTarget::None;
        } else if self.target == LinkTarget::None {
            self.target = LinkTarget::Unresolved;
        }
    }

    /// Drops the cached handle, keeping the offset. Returns whether a handle was held.
    pub(crate) fn sever(&mut self) -> bool {
        if let LinkTarget::Resolved(_) = self.target {
            self.target = LinkTarget::Unresolved;
            return true;
        }
        false
    }

    /// Marks the referent as pruned. Only resolved links are pruned, so repeating the
    /// call is a no-op.
    pub(crate) fn invalidate(&mut self) -> bool {
        if let LinkTarget::Resolved(_) = self.target {
            self.target = LinkTarget::Invalid;
            return true;
        }
        false
    }

    /// Handle of the referent, if loaded. Following a pruned link is an error.
    pub fn follow(&self) -> TxnLogResult<Option<RecordId>> {
        match self.target {
            LinkTarget::Resolved(id) => Ok(Some(id)),
            LinkTarget::None | LinkTarget::Unresolved => Ok(None),
            LinkTarget::Invalid => Err(TxnLogError::InvalidState(format!(
                "link at offset {} was pruned by head truncation",
                self.offset
            ))),
        }
    }
}

impl Default for BackwardLink {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_zero_offset_means_no_referent() {
        assert!(BackwardLink::from_offset(0).is_none());
        let link = BackwardLink::from_offset(120);
        assert_eq!(link.target(), LinkTarget::Unresolved);
        assert_eq!(link.follow().unwrap(), None);
    }

    #[test]
    fn pruning_is_idempotent_and_sticky() {
        let id = RecordId::new(3, 1);
        let mut link = BackwardLink::from_offset(64);
        link.resolve(id);
        assert_eq!(link.offset(), 64);
        assert_eq!(link.follow().unwrap(), Some(id));

        assert!(link.invalidate());
        assert!(!link.invalidate());
        assert_eq!(link.offset(), 64);
        assert!(matches!(link.follow(), Err(TxnLogError::InvalidState(_))));
    }

    #[test]
    fn resolving_an_empty_link_needs_a_fresh_offset() {
        let mut link = BackwardLink::none();
        link.resolve(RecordId::new(0, 0));
        assert!(!link.is_offset_known());
        link.set_offset(0);
        assert!(link.is_none());
    }
}
