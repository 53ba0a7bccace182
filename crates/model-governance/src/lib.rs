//! Risk-tiering rule engine and policy governance core for the AI/ML
//! use-case inventory.
//!
//! The crate is organized around the governance module: a declarative,
//! versioned rule set is evaluated against entity attributes to assign a
//! risk tier, and policy versions carrying new validation cadences move
//! through an analyze/approve/apply lifecycle that re-schedules every
//! tracked entity.

pub mod config;
pub mod error;
pub mod governance;
pub mod telemetry;
