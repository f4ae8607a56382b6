// Library crate root.
//
// The `roitrack` binary (src/main.rs) is a thin driver over these modules.

pub mod im;
pub mod desc;
pub mod error;
pub mod mpoly;
pub mod overlap;
pub mod name;
pub mod region;
pub mod store;
pub mod tracker;
pub mod edit;
pub mod session;
pub mod lineage;
pub mod export;

pub use error::{Error, Result};

#[cfg(test)]
pub mod test_helpers;
