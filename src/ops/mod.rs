//! Pipeline operations
//!
//! This module organizes the stages into logical submodules:
//! - io: source loading and report writers
//! - validate: per-row schema validation
//! - window: running totals over deliveries
//! - derive: per-row derived columns and the delivery insights table
//! - aggregation: the named reports
//! - join: referential data-quality checks

pub mod aggregation;
pub mod derive;
pub mod io;
pub mod join;
pub mod validate;
pub mod window;
