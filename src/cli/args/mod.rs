//! Shared CLI argument types

mod global;

pub use global::GlobalOptions;
