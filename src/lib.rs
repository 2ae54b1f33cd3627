pub mod algorithm;
pub mod error;
pub mod graph;
pub mod mm;
pub mod utils;

pub use error::{MatchError, Result};

#[cfg(test)]
pub(crate) mod testutil;
