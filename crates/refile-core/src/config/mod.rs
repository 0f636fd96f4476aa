//! Configuration management.
//!
//! Engine settings ([`settings::Config`]) and declarative target layouts
//! ([`layout::TargetLayout`]) are both stored as TOML files.

pub mod layout;
pub mod settings;
