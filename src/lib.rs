pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod progress;
pub mod record;
pub mod recovery;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{TxnLogError, TxnLogResult};
