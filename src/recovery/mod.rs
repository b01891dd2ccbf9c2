//! Reading the local log back: stream primitives, the log store seam, the appender
//! that produces the physical log, and the two readers recovery is built on.

pub mod health;
pub mod log_records;
pub mod physical_reader;
pub mod store;
pub mod stream;
pub mod writer;

pub use health::{HealthReporter, LoggingHealthReporter};
pub use log_records::LogRecords;
pub use physical_reader::RecoveryPhysicalLogReader;
pub use store::{
    InMemoryLogStore, LogReaderRange, LogReaderType, LogSink, LogStore, MemoryLogStream,
};
pub use stream::{read_next_record, read_previous_record, read_record_at, LogReadStream};
pub use writer::LogAppender;
