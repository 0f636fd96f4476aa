//! Duplicate handling: grouping, classification, resolution, and persisted
//! scan reports.

pub mod classify;
pub mod group;
pub mod report;
pub mod resolve;

pub use group::{Classification, DuplicateGroup};
pub use report::DuplicateReport;
pub use resolve::{resolve, Resolution, Selector, Strategy};
