pub mod copy_mode;
pub mod entry;
pub mod vector;

pub use copy_mode::{
    find_copy_mode, find_shared_vector, CopyContextParameters, CopyMode, CopyModeResult,
    FullCopyReason, SharedProgressVectorEntry,
};
pub use entry::{ProgressVectorEntry, PROGRESS_VECTOR_ENTRY_LEN};
pub use vector::ProgressVector;
