//! Operations exposed to callers.
//!
//! The presentation layer (upload form, download buttons) lives outside this
//! crate and drives everything through these functions.

pub mod split;

pub use split::*;
