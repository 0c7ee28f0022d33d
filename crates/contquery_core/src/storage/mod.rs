//! Storage for continuous view state.
pub mod matrel;

pub use self::matrel::{MaterializedRelation, MatrelMode};
