//! Util Module - Shared Utilities
//!
//! Utilities and helper functions used throughout RGC.

pub mod alignment;
pub mod atomic;

pub use alignment::Alignment;
pub use atomic::AtomicUtils;
