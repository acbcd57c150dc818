//! Durable storage of emotion samples as a CSV log

pub mod codec;
pub mod record_store;

pub use record_store::{LoadReport, RecordStore, RecordStoreStatsSnapshot};

#[cfg(test)]
mod tests;
