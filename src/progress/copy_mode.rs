//! Decides how a lagging replica is brought back in line with the primary.
//!
//! The decision only looks at progress vectors and log head/tail positions. Every
//! disagreement that cannot be proven harmless ends in a full copy instead of an
//! error: a needless full copy costs time, a wrong partial copy costs data.

use std::fmt;

use derive_new::new;
use log::{debug, info, warn};

use crate::progress::entry::ProgressVectorEntry;
use crate::progress::vector::ProgressVector;
use crate::types::{Epoch, Lsn, INVALID_LSN};

pub const FAILURE_LSN_MESSAGE_PREFIX: &str = "FailureLsn incremented must be <= 1";
pub const BACKWARD_AGREEMENT_MESSAGE: &str = "sourceEntry == targetEntry";
pub const STARTING_LSN_ORDER_MESSAGE: &str =
    "(sourceStartingLsn is expected to be lesser or equal to targetStartingLsn)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullCopyReason {
    Invalid,
    DataLoss,
    InsufficientLogs,
    AtomicRedoOperationFalseProgressed,
    Other,
    ProgressVectorTrimmed,
    ValidationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    None,
    Full(FullCopyReason),
    Partial,
    /// Target must undo its false progress, then continue as a partial copy.
    FalseProgress,
}

impl CopyMode {
    pub const FALSE_PROGRESS_FLAG: u32 = 1;
    pub const NONE_FLAG: u32 = 2;
    pub const PARTIAL_FLAG: u32 = 4;
    pub const FULL_FLAG: u32 = 8;

    /// Flag encoding understood by the copy stream.
    pub fn bits(&self) -> u32 {
        match self {
            CopyMode::None => Self::NONE_FLAG,
            CopyMode::Full(_) => Self::FULL_FLAG,
            CopyMode::Partial => Self::PARTIAL_FLAG,
            CopyMode::FalseProgress => Self::FALSE_PROGRESS_FLAG | Self::PARTIAL_FLAG,
        }
    }

    pub fn full_copy_reason(&self) -> FullCopyReason {
        match self {
            CopyMode::Full(reason) => *reason,
            _ => FullCopyReason::Invalid,
        }
    }
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMode::None => write!(f, "None"),
            CopyMode::Full(reason) => write!(f, "Full({:?})", reason),
            CopyMode::Partial => write!(f, "Partial"),
            CopyMode::FalseProgress => write!(f, "FalseProgress"),
        }
    }
}

/// One side of a copy negotiation.
#[derive(new, Debug, Clone, Copy)]
pub struct CopyContextParameters<'a> {
    pub progress_vector: &'a ProgressVector,
    pub log_head_epoch: Epoch,
    pub log_head_lsn: Lsn,
    pub log_tail_lsn: Lsn,
}

impl CopyContextParameters<'_> {
    pub fn is_brand_new_replica(&self) -> bool {
        self.progress_vector.is_brand_new_replica(self.log_tail_lsn)
    }
}

/// Newest entry both vectors agree on, or why there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedProgressVectorEntry {
    pub source_index: usize,
    pub target_index: usize,
    pub source_entry: ProgressVectorEntry,
    pub target_entry: ProgressVectorEntry,
    /// `Invalid` when the shared entry is usable.
    pub full_copy_reason: FullCopyReason,
    pub failed_validation_message: Option<String>,
}

impl SharedProgressVectorEntry {
    fn found(
        source_index: usize,
        target_index: usize,
        source_entry: ProgressVectorEntry,
        target_entry: ProgressVectorEntry,
    ) -> Self {
        Self {
            source_index,
            target_index,
            source_entry,
            target_entry,
            full_copy_reason: FullCopyReason::Invalid,
            failed_validation_message: None,
        }
    }

    fn trimmed() -> Self {
        Self {
            source_index: 0,
            target_index: 0,
            source_entry: ProgressVectorEntry::invalid(),
            target_entry: ProgressVectorEntry::invalid(),
            full_copy_reason: FullCopyReason::ProgressVectorTrimmed,
            failed_validation_message: None,
        }
    }

    fn validation_failed(mut self, message: String) -> Self {
        self.full_copy_reason = FullCopyReason::ValidationFailed;
        self.failed_validation_message = Some(message);
        self
    }

    pub fn is_usable(&self) -> bool {
        self.full_copy_reason == FullCopyReason::Invalid
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyModeResult {
    pub mode: CopyMode,
    /// First lsn the source sends; `INVALID_LSN` for none/full copies.
    pub source_starting_lsn: Lsn,
    /// First lsn the target has to discard or receive; `INVALID_LSN` for none/full copies.
    pub target_starting_lsn: Lsn,
    /// Absent only when the vectors could not be reconciled because of trimming.
    pub shared: Option<SharedProgressVectorEntry>,
}

impl CopyModeResult {
    fn none(shared: SharedProgressVectorEntry) -> Self {
        Self {
            mode: CopyMode::None,
            source_starting_lsn: INVALID_LSN,
            target_starting_lsn: INVALID_LSN,
            shared: Some(shared),
        }
    }

    fn full(shared: Option<SharedProgressVectorEntry>, reason: FullCopyReason) -> Self {
        debug_assert!(reason != FullCopyReason::Invalid);
        Self {
            mode: CopyMode::Full(reason),
            source_starting_lsn: INVALID_LSN,
            target_starting_lsn: INVALID_LSN,
            shared,
        }
    }

    fn partial(shared: SharedProgressVectorEntry, source_starting_lsn: Lsn, target_starting_lsn: Lsn) -> Self {
        Self {
            mode: CopyMode::Partial,
            source_starting_lsn,
            target_starting_lsn,
            shared: Some(shared),
        }
    }

    /// Operations applied atomically at the target cannot be undone, so false progress
    /// past one of them forces a full copy.
    fn false_progress(
        last_recovered_atomic_redo_lsn_at_target: Lsn,
        shared: SharedProgressVectorEntry,
        source_starting_lsn: Lsn,
        target_starting_lsn: Lsn,
    ) -> Self {
        if last_recovered_atomic_redo_lsn_at_target > source_starting_lsn {
            return Self::full(
                Some(shared),
                FullCopyReason::AtomicRedoOperationFalseProgressed,
            );
        }
        Self {
            mode: CopyMode::FalseProgress,
            source_starting_lsn,
            target_starting_lsn,
            shared: Some(shared),
        }
    }

    pub fn full_copy_reason(&self) -> FullCopyReason {
        self.mode.full_copy_reason()
    }

    /// Diagnostic text for a failed validation, with both vectors rendered around the
    /// shared indices. `None` unless the result is `Full(ValidationFailed)`.
    pub fn describe_validation_failure(
        &self,
        source: &ProgressVector,
        target: &ProgressVector,
        max_string_size_kb: usize,
    ) -> Option<String> {
        if self.mode != CopyMode::Full(FullCopyReason::ValidationFailed) {
            return None;
        }
        let shared = self.shared.as_ref()?;
        let per_vector = max_string_size_kb * 1024 / 2;
        Some(format!(
            "Validation failed, starting full copy. {}.\nTargetIndex = {}, TargetEntry = {}\nSourceIndex = {}, SourceEntry = {}\nTarget :\n{}\nSource :\n{}",
            shared.failed_validation_message.as_deref().unwrap_or_default(),
            shared.target_index,
            shared.target_entry,
            shared.source_index,
            shared.source_entry,
            target.render_around(shared.target_index, per_vector),
            source.render_around(shared.source_index, per_vector),
        ))
    }
}

/// Classifies how the target catches up with the source.
pub fn find_copy_mode(
    source: &CopyContextParameters<'_>,
    target: &CopyContextParameters<'_>,
    last_recovered_atomic_redo_lsn_at_target: Lsn,
) -> CopyModeResult {
    let result = find_copy_mode_inner(source, target, last_recovered_atomic_redo_lsn_at_target);

    if result.mode == CopyMode::FalseProgress
        && result.source_starting_lsn > result.target_starting_lsn
    {
        let message = format!(
            "{}. Source starting lsn : {}, target starting lsn :{} ",
            STARTING_LSN_ORDER_MESSAGE, result.source_starting_lsn, result.target_starting_lsn
        );
        warn!("copy mode validation failed: {}", message);
        let shared = result
            .shared
            .map(|shared| shared.validation_failed(message));
        return CopyModeResult::full(shared, FullCopyReason::ValidationFailed);
    }

    info!(
        "copy mode {} (source start {}, target start {}, source tail {}, target tail {})",
        result.mode,
        result.source_starting_lsn,
        result.target_starting_lsn,
        source.log_tail_lsn,
        target.log_tail_lsn
    );
    result
}

fn find_copy_mode_inner(
    source: &CopyContextParameters<'_>,
    target: &CopyContextParameters<'_>,
    last_recovered_atomic_redo_lsn_at_target: Lsn,
) -> CopyModeResult {
    let shared = find_shared_vector(source.progress_vector, target.progress_vector);

    match shared.full_copy_reason {
        FullCopyReason::ProgressVectorTrimmed => {
            return CopyModeResult::full(None, FullCopyReason::ProgressVectorTrimmed);
        }
        FullCopyReason::ValidationFailed => {
            warn!(
                "shared progress vector validation failed: {}",
                shared.failed_validation_message.as_deref().unwrap_or_default()
            );
            return CopyModeResult::full(Some(shared), FullCopyReason::ValidationFailed);
        }
        _ => {}
    }

    let source_entries = source.progress_vector.entries();
    let target_entries = target.progress_vector.entries();
    // find_shared_vector rejects empty vectors, so both have a last entry here
    let source_last = source_entries[source_entries.len() - 1];
    let target_last = target_entries[target_entries.len() - 1];

    // Nothing to send, not even an UpdateEpoch: a brand new replica never lands here
    // because its tail is one past the source's zero entry.
    if source_last == target_last && source.log_tail_lsn == target.log_tail_lsn {
        return CopyModeResult::none(shared);
    }

    if !target.is_brand_new_replica() {
        let data_loss = shared.source_entry.epoch.data_loss_number
            != source_last.epoch.data_loss_number
            || shared.target_entry.epoch.data_loss_number != target_last.epoch.data_loss_number
            || source.log_head_epoch.data_loss_number > shared.target_entry.epoch.data_loss_number
            || target.log_head_epoch.data_loss_number > shared.source_entry.epoch.data_loss_number;
        if data_loss {
            return CopyModeResult::full(Some(shared), FullCopyReason::DataLoss);
        }
    }

    let mut source_starting_lsn = if shared.source_index == source_entries.len() - 1 {
        source.log_tail_lsn
    } else {
        source_entries[shared.source_index + 1].lsn
    };
    let target_starting_lsn = if shared.target_index == target_entries.len() - 1 {
        target.log_tail_lsn
    } else {
        target_entries[shared.target_index + 1].lsn
    };

    if source.log_head_lsn > target.log_tail_lsn
        || source_starting_lsn < source.log_head_lsn
        || target.log_head_lsn > source_starting_lsn
    {
        return CopyModeResult::full(Some(shared), FullCopyReason::InsufficientLogs);
    }

    // Target went further in an epoch than the source remembers.
    if source_starting_lsn < target_starting_lsn {
        return CopyModeResult::false_progress(
            last_recovered_atomic_redo_lsn_at_target,
            shared,
            source_starting_lsn,
            target_starting_lsn,
        );
    }

    // Target made progress in an epoch the source has never heard of.
    if target_starting_lsn != target.log_tail_lsn {
        source_starting_lsn = target_starting_lsn;
        return CopyModeResult::false_progress(
            last_recovered_atomic_redo_lsn_at_target,
            shared,
            source_starting_lsn,
            target_starting_lsn,
        );
    }

    // Target saw an epoch at an lsn where the source saw a later one, without an entry
    // for the target's. Whatever the target did there may already be checkpointed.
    if source_entries[shared.source_index].epoch < target_last.epoch {
        return CopyModeResult::full(Some(shared), FullCopyReason::Other);
    }

    CopyModeResult::partial(shared, source_starting_lsn, target_starting_lsn)
}

/// Moves `index` down until `vector[index] <= comparand`. `false` means index 0 was
/// reached while still greater, i.e. the shared history was trimmed away.
fn decrement_until_leq(index: &mut usize, vector: &[ProgressVectorEntry], comparand: &ProgressVectorEntry) -> bool {
    loop {
        if vector[*index] <= *comparand {
            return true;
        }
        if *index == 0 {
            return false;
        }
        *index -= 1;
    }
}

/// Skips back over entries sharing `lsn` and returns the first older entry with a
/// different lsn, or `None` once index 0 is reached.
fn decrement_until_lsn_differs(
    index: &mut usize,
    vector: &[ProgressVectorEntry],
    lsn: Lsn,
) -> Option<ProgressVectorEntry> {
    while *index > 0 {
        let previous = vector[*index - 1];
        if previous.lsn != lsn {
            return Some(previous);
        }
        *index -= 1;
    }
    None
}

/// Finds the newest (epoch, lsn) present in both vectors and validates the history
/// leading up to it.
pub fn find_shared_vector(source: &ProgressVector, target: &ProgressVector) -> SharedProgressVectorEntry {
    let source_entries = source.entries();
    let target_entries = target.entries();
    if source_entries.is_empty() || target_entries.is_empty() {
        return SharedProgressVectorEntry::trimmed()
            .validation_failed("progress vector must not be empty".to_string());
    }

    let mut source_index = source_entries.len() - 1;
    let mut target_index = target_entries.len() - 1;
    let source_last = source_entries[source_index];
    let target_last = target_entries[target_index];

    if target_last.epoch.data_loss_number > source_last.epoch.data_loss_number {
        let message = format!(
            "targetDataLossNumber ({}) <= sourceDataLossNumber ({})",
            target_last.epoch.data_loss_number, source_last.epoch.data_loss_number
        );
        return SharedProgressVectorEntry::found(source_index, target_index, source_last, target_last)
            .validation_failed(message);
    }

    loop {
        if !decrement_until_leq(&mut target_index, target_entries, &source_entries[source_index]) {
            debug!("shared progress vector entry trimmed from target");
            return SharedProgressVectorEntry::trimmed();
        }
        if !decrement_until_leq(&mut source_index, source_entries, &target_entries[target_index]) {
            debug!("shared progress vector entry trimmed from source");
            return SharedProgressVectorEntry::trimmed();
        }
        if source_entries[source_index] == target_entries[target_index] {
            break;
        }
    }

    let source_entry = source_entries[source_index];
    let target_entry = target_entries[target_index];
    let shared = SharedProgressVectorEntry::found(source_index, target_index, source_entry, target_entry);

    // Without data loss after the shared point, the target can only have restarted
    // its progress once from the shared epoch.
    if target_last.epoch.data_loss_number == source_last.epoch.data_loss_number
        && target_index < target_entries.len() - 1
        && target_last.epoch.data_loss_number == target_entry.epoch.data_loss_number
    {
        let mut failure_lsn = target_entries[target_index + 1].lsn;
        let mut failure_lsn_incremented = 0usize;
        for entry in &target_entries[target_index + 2..] {
            if entry.epoch.data_loss_number != target_entry.epoch.data_loss_number {
                break;
            }
            if entry.lsn != failure_lsn {
                failure_lsn = entry.lsn;
                failure_lsn_incremented += 1;
            }
        }
        if failure_lsn_incremented > 1 {
            let message = format!(
                "{}. It is {}",
                FAILURE_LSN_MESSAGE_PREFIX, failure_lsn_incremented
            );
            return shared.validation_failed(message);
        }
    }

    // Both histories must agree below the shared entry.
    let (mut i, mut j) = (source_index, target_index);
    let (mut source_cursor, mut target_cursor) = (source_entry, target_entry);
    loop {
        let Some(older_source) = decrement_until_lsn_differs(&mut i, source_entries, source_cursor.lsn) else {
            break;
        };
        let Some(older_target) = decrement_until_lsn_differs(&mut j, target_entries, target_cursor.lsn) else {
            break;
        };
        if older_source != older_target {
            return shared.validation_failed(BACKWARD_AGREEMENT_MESSAGE.to_string());
        }
        source_cursor = older_source;
        target_cursor = older_target;
    }

    shared
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv(entries: &[(i64, i64, Lsn)]) -> ProgressVector {
        ProgressVector::from_entries(
            entries
                .iter()
                .map(|(dl, cfg, lsn)| ProgressVectorEntry::new(Epoch::new(*dl, *cfg), *lsn, 0, 0)),
            0,
        )
        .unwrap()
    }

    fn decide(
        source: &ProgressVector,
        source_head: (Epoch, Lsn),
        source_tail: Lsn,
        target: &ProgressVector,
        target_head: (Epoch, Lsn),
        target_tail: Lsn,
        last_atomic_redo: Lsn,
    ) -> CopyModeResult {
        find_copy_mode(
            &CopyContextParameters::new(source, source_head.0, source_head.1, source_tail),
            &CopyContextParameters::new(target, target_head.0, target_head.1, target_tail),
            last_atomic_redo,
        )
    }

    fn decide_simple(source: &ProgressVector, source_tail: Lsn, target: &ProgressVector, target_tail: Lsn) -> CopyModeResult {
        decide(
            source,
            (Epoch::ZERO, 0),
            source_tail,
            target,
            (Epoch::ZERO, 0),
            target_tail,
            INVALID_LSN,
        )
    }

    fn shared_indices(result: &CopyModeResult) -> (usize, usize) {
        let shared = result.shared.as_ref().expect("shared entry");
        (shared.source_index, shared.target_index)
    }

    #[test]
    fn brand_new_target_with_truncated_source_head_needs_full_copy() {
        let source = pv(&[(0, 0, 0), (10, 10, 50)]);
        let target = ProgressVector::zero(0);
        let result = decide(
            &source,
            (Epoch::new(4, 2), 5),
            50,
            &target,
            (Epoch::ZERO, 0),
            1,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::InsufficientLogs));
        assert_eq!(shared_indices(&result), (0, 0));
        assert_eq!(result.source_starting_lsn, INVALID_LSN);
        assert_eq!(result.target_starting_lsn, INVALID_LSN);
    }

    #[test]
    fn brand_new_target_gets_partial_copy() {
        let source = pv(&[(0, 0, 0), (10, 1, 50)]);
        let target = ProgressVector::zero(0);
        let result = decide_simple(&source, 1, &target, 1);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (50, 1));
    }

    #[test]
    fn boot_is_partial_from_zero() {
        let source = pv(&[(0, 0, 0), (0, 1, 0)]);
        let target = pv(&[(0, 0, 0)]);
        let result = decide_simple(&source, 0, &target, 0);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (0, 0));
    }

    #[test]
    fn secondary_with_unknown_epoch_at_zero_lsn_needs_full_copy() {
        let source = pv(&[(0, 0, 0), (0, 1, 0), (0, 3, 0)]);
        let target = pv(&[(0, 0, 0), (0, 1, 0), (0, 2, 0)]);
        let result = decide_simple(&source, 0, &target, 0);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::Other));
        assert_eq!(shared_indices(&result), (1, 1));
    }

    #[test]
    fn same_vectors_primary_ahead_is_partial() {
        let vector = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let result = decide_simple(&vector, 740, &vector, 720);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (740, 720));
        assert_eq!(shared_indices(&result), (2, 2));

        let result = decide_simple(&vector, 740, &vector, 730);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (740, 730));
    }

    #[test]
    fn identical_vectors_and_tails_need_no_copy() {
        let vector = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let result = decide_simple(&vector, 720, &vector, 720);
        assert_eq!(result.mode, CopyMode::None);
        assert_eq!(result.mode.bits(), CopyMode::NONE_FLAG);
        assert_eq!(shared_indices(&result), (2, 2));
        assert_eq!(result.source_starting_lsn, INVALID_LSN);
    }

    #[test]
    fn shared_entry_at_different_indices() {
        let source = pv(&[
            (0, 0, 0),
            (1, 2, 1),
            (1, 3, 1159),
            (1, 4, 3009),
            (1, 6, 3010),
            (1, 7, 3237),
            (1, 8, 3237),
            (1, 9, 4382),
            (1, 10, 4383),
        ]);
        let target = pv(&[
            (0, 0, 0),
            (1, 2, 1),
            (1, 3, 1159),
            (1, 4, 3009),
            (1, 6, 3010),
            (1, 8, 3237),
        ]);
        let result = decide_simple(&source, 4384, &target, 4382);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (4382, 4382));
        assert_eq!(shared_indices(&result), (6, 5));
    }

    #[test]
    fn primary_ahead_with_target_false_progress() {
        let source = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let target = pv(&[(0, 0, 0), (1, 1, 700)]);
        let result = decide_simple(&source, 740, &target, 730);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!(
            result.mode.bits(),
            CopyMode::FALSE_PROGRESS_FLAG | CopyMode::PARTIAL_FLAG
        );
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (720, 730));
        assert_eq!(shared_indices(&result), (1, 1));
    }

    #[test]
    fn data_loss_on_source_after_shared_entry() {
        let source = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720), (2, 3, 720)]);
        let target = pv(&[(0, 0, 0), (1, 1, 700)]);
        let result = decide_simple(&source, 740, &target, 730);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::DataLoss));
    }

    #[test]
    fn atomic_redo_beyond_source_start_forces_full_copy() {
        let source = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let target = pv(&[(0, 0, 0), (1, 1, 700)]);
        let result = decide(
            &source,
            (Epoch::ZERO, 0),
            740,
            &target,
            (Epoch::ZERO, 0),
            730,
            725,
        );
        assert_eq!(
            result.mode,
            CopyMode::Full(FullCopyReason::AtomicRedoOperationFalseProgressed)
        );
    }

    #[test]
    fn false_progress_without_source_logs_is_insufficient() {
        let source = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let target = pv(&[(0, 0, 0), (1, 1, 700)]);
        let result = decide(
            &source,
            (Epoch::ZERO, 735),
            740,
            &target,
            (Epoch::ZERO, 0),
            730,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::InsufficientLogs));
    }

    #[test]
    fn matching_large_data_loss_numbers_with_loss_after_shared_point() {
        let base = 131_383_889_406_148_342i64;
        let source = pv(&[(0, 0, 0), (base, 1, 40), (base + 1, 2, 60)]);
        let target = pv(&[(0, 0, 0), (base, 1, 40)]);
        let result = decide_simple(&source, 60, &target, 50);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::DataLoss));
    }

    #[test]
    fn secondary_at_unknown_epoch() {
        let source = pv(&[(0, 0, 0), (1, 1, 40), (1, 6, 60)]);
        let target = pv(&[(0, 0, 0), (1, 1, 40), (1, 5, 50)]);
        let result = decide_simple(&source, 60, &target, 50);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::Other));

        let target = pv(&[(0, 0, 0), (1, 1, 40), (1, 5, 60)]);
        let result = decide_simple(&source, 60, &target, 60);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::Other));
    }

    #[test]
    fn secondary_missing_last_entry() {
        let source = pv(&[(0, 0, 0), (1, 1, 700), (1, 2, 720)]);
        let target = pv(&[(0, 0, 0), (1, 1, 700)]);
        let result = decide_simple(&source, 720, &target, 720);
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (720, 720));
    }

    #[test]
    fn target_progress_in_unknown_epoch_is_false_progress() {
        let source = pv(&[(0, 0, 0), (1, 1, 2710), (1, 3, 2712)]);
        let target = pv(&[(0, 0, 0), (1, 1, 2710), (1, 2, 2711)]);
        let result = decide_simple(&source, 2713, &target, 2712);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (2711, 2711));

        let source = pv(&[(0, 0, 0), (1, 1, 2710), (1, 3, 2711)]);
        let result = decide_simple(&source, 2712, &target, 2712);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (2711, 2711));
    }

    #[test]
    fn double_false_progress_variants() {
        let source = pv(&[(0, 0, 0), (1, 1, 677), (1, 3, 687)]);
        let target = pv(&[(0, 0, 0), (1, 1, 677), (1, 2, 687)]);
        let result = decide_simple(&source, 687, &target, 688);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (687, 687));

        let source = pv(&[(0, 0, 0), (1, 1, 62), (1, 3, 68), (1, 5, 68)]);
        let target = pv(&[(0, 0, 0), (1, 1, 62), (1, 2, 68), (1, 4, 73)]);
        let result = decide_simple(&source, 68, &target, 73);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (68, 68));

        let source = pv(&[(0, 0, 0), (1, 3, 10), (1, 5, 17)]);
        let target = pv(&[(0, 0, 0), (1, 3, 10), (1, 4, 15)]);
        let result = decide_simple(&source, 18, &target, 17);
        assert_eq!(result.mode, CopyMode::FalseProgress);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (15, 15));
    }

    #[test]
    fn target_epoch_unknown_to_source_below_its_tail() {
        let source = pv(&[(0, 0, 0), (1, 1, 0), (1, 3, 10)]);
        let target = pv(&[(0, 0, 0), (1, 1, 0), (1, 2, 5)]);
        let result = decide_simple(&source, 11, &target, 5);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::Other));
    }

    #[test]
    fn trimmed_source_still_finds_shared_entry() {
        let source = pv(&[(0, 2, 7), (0, 3, 10), (0, 4, 11), (0, 5, 12)]);
        let target = pv(&[(0, 0, 0), (0, 1, 6), (0, 2, 7)]);
        let result = decide(
            &source,
            (Epoch::ZERO, 5),
            15,
            &target,
            (Epoch::ZERO, 0),
            9,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (10, 9));
        assert_eq!(shared_indices(&result), (0, 2));
    }

    #[test]
    fn trimmed_target_still_finds_shared_entry() {
        let source = pv(&[(0, 0, 0), (0, 1, 8), (0, 2, 10), (0, 3, 11), (0, 4, 12)]);
        let target = pv(&[(0, 3, 11), (0, 4, 12)]);
        let result = decide(
            &source,
            (Epoch::ZERO, 5),
            15,
            &target,
            (Epoch::ZERO, 0),
            9,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (15, 9));
        assert_eq!(shared_indices(&result), (4, 1));

        let source = pv(&[(0, 2, 10), (0, 3, 11), (0, 4, 12), (0, 5, 13)]);
        let result = decide(
            &source,
            (Epoch::ZERO, 5),
            15,
            &target,
            (Epoch::ZERO, 0),
            9,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Partial);
        assert_eq!((result.source_starting_lsn, result.target_starting_lsn), (13, 9));
        assert_eq!(shared_indices(&result), (2, 1));
    }

    #[test]
    fn trimmed_history_without_common_entry_forces_full_copy() {
        let source = pv(&[(0, 5, 20), (0, 6, 30)]);
        let target = pv(&[(0, 0, 0), (0, 1, 6), (0, 2, 7)]);
        let shared = find_shared_vector(&source, &target);
        assert_eq!(shared.full_copy_reason, FullCopyReason::ProgressVectorTrimmed);
        assert!(!shared.is_usable());

        let result = decide_simple(&source, 31, &target, 9);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::ProgressVectorTrimmed));
        assert!(result.shared.is_none());
    }

    #[test]
    fn history_diverging_below_newer_data_loss_fails_validation() {
        let source = pv(&[(0, 0, 0), (0, 2, 4), (0, 5, 13), (0, 6, 14), (10, 11, 50)]);
        let target = pv(&[
            (0, 0, 0),
            (0, 4, 3),
            (0, 5, 13),
            (0, 6, 15),
            (0, 7, 51),
            (0, 8, 52),
            (10, 11, 53),
        ]);
        let result = decide(
            &source,
            (Epoch::new(4, 2), 5),
            50,
            &target,
            (Epoch::ZERO, 0),
            1,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::ValidationFailed));
        let shared = result.shared.as_ref().unwrap();
        assert_eq!((shared.source_index, shared.target_index), (2, 2));
        assert_eq!(shared.source_entry, ProgressVectorEntry::new(Epoch::new(0, 5), 13, 0, 0));
        assert_eq!(result.source_starting_lsn, INVALID_LSN);
        assert_eq!(result.target_starting_lsn, INVALID_LSN);
    }

    #[test]
    fn disagreeing_history_below_shared_entry_fails_validation() {
        let source = pv(&[(0, 0, 0), (0, 2, 4), (0, 5, 13), (10, 10, 50)]);
        let target = pv(&[(0, 0, 0), (0, 4, 3), (0, 5, 13), (10, 11, 50)]);
        let result = decide(
            &source,
            (Epoch::new(4, 2), 5),
            50,
            &target,
            (Epoch::ZERO, 0),
            1,
            INVALID_LSN,
        );
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::ValidationFailed));
        let shared = result.shared.as_ref().unwrap();
        assert_eq!((shared.source_index, shared.target_index), (2, 2));
        assert_eq!(
            shared.failed_validation_message.as_deref(),
            Some(BACKWARD_AGREEMENT_MESSAGE)
        );

        let text = result
            .describe_validation_failure(&source, &target, 60)
            .unwrap();
        assert!(text.contains(BACKWARD_AGREEMENT_MESSAGE));
        assert!(text.contains("[(0,5),13,0,0]"));
    }

    #[test]
    fn failure_lsn_counter_trips_after_two_restarts() {
        let source = pv(&[(0, 0, 0), (1, 1, 10), (1, 9, 10)]);
        let target = pv(&[(0, 0, 0), (1, 1, 10), (1, 2, 12), (1, 3, 14), (1, 4, 16)]);
        let shared = find_shared_vector(&source, &target);
        assert_eq!(shared.full_copy_reason, FullCopyReason::ValidationFailed);
        assert_eq!(
            shared.failed_validation_message.as_deref(),
            Some("FailureLsn incremented must be <= 1. It is 2")
        );
    }

    #[test]
    fn target_data_loss_after_shared_point() {
        let source = pv(&[(0, 0, 0), (1, 1, 0), (1, 3, 10), (2, 7, 12)]);
        let target = pv(&[
            (0, 0, 0),
            (1, 1, 0),
            (1, 3, 10),
            (1, 4, 12),
            (1, 5, 15),
            (1, 6, 16),
            (2, 7, 17),
        ]);
        let result = decide_simple(&source, 12, &target, 17);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::DataLoss));
        assert_eq!(shared_indices(&result), (2, 2));
    }

    #[test]
    fn target_with_newer_data_loss_number_is_not_trusted() {
        let source = pv(&[(0, 0, 0), (1, 1, 10)]);
        let target = pv(&[(0, 0, 0), (2, 1, 10)]);
        let shared = find_shared_vector(&source, &target);
        assert_eq!(shared.full_copy_reason, FullCopyReason::ValidationFailed);
    }

    #[test]
    fn empty_vector_fails_validation() {
        let result = decide_simple(&ProgressVector::new(0), 1, &ProgressVector::zero(0), 1);
        assert_eq!(result.mode, CopyMode::Full(FullCopyReason::ValidationFailed));
    }
}
