//! Transactional file operations.
//!
//! Planned [`action`]s are carried out by the [`operator`], which records the
//! inverse of each mutation in the rollback [`journal`] and routes removals
//! through the [`archive`] sink.

pub mod action;
pub mod archive;
pub mod journal;
pub mod operator;

pub use action::ReconciliationAction;
pub use archive::ArchivalSink;
pub use journal::{replay, Journal, JournalEntry, ReplayReport};
pub use operator::{FileOperator, OperatorOutcome};
