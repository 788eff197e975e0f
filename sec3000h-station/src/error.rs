//! Error types re-exported from the core crate

pub use sec3000h_core::error::{SecError, SecResult};
