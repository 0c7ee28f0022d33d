//! Continuous views.
//!
//! A view definition is split once into worker, combiner and overlay
//! statements, each planned against the stream or the view's materialized
//! relation. Batches of stream rows are then folded into the materialized
//! relation as they arrive.
pub mod cache;
pub mod context;
pub mod options;
pub mod sliding_window;
pub mod splitter;
pub mod view;

/// Column added to every stream, holding the time a row was inserted.
pub const ARRIVAL_TIMESTAMP: &str = "arrival_timestamp";
