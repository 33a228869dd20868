//! Immutable expression and statement variants. Every node carries the
//! byte position of its anchor token so the evaluator can report runtime
//! errors at a precise source location.

mod expression;
mod program;
mod statement;

pub use expression::*;
pub use program::*;
pub use statement::*;

pub type Pos = usize;
