//! Incremental aggregation engine for continuous views.
//!
//! A continuous view definition is split into a worker statement computing
//! partial aggregate states over each incoming batch, a combiner statement
//! merging those partial states into a materialized relation, and an overlay
//! statement that finalizes stored states on read.
pub mod analyze;
pub mod annotate;
pub mod arrays;
pub mod catalog;
pub mod config;
pub mod continuous;
pub mod engine;
pub mod execution;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod planner;
pub mod statistics;
pub mod storage;
