//! Typed query expressions, planning against index tables and execution.

pub mod executor;
pub mod expr;
pub mod plan;
pub mod planner;
pub mod union;
