//! Error Module - RGC Error Types
//!
//! Defines all error types used by the region space.
//!
//! # Error Categories
//!
//! ## Resource Errors (recoverable)
//! - `OutOfMemory` - No region or region tail left for a request
//!
//! ## Setup Errors
//! - `HeapInitialization` - Page source could not satisfy the reservation
//! - `Configuration` - Invalid space configuration
//! - `VirtualMemoryError` - OS mapping call failed
//!
//! ## Caller Errors
//! - `InvalidArgument` - Function argument fails validation
//! - `AddressNotInSpace` - Address resolves to no region
//!
//! ## Bugs
//! - `Internal` - Invariant violation reported as a value
//!
//! Invariant violations detected on the tracing hot path are not returned
//! as values at all. They go through [`invariant!`], which logs and panics
//! at the point of detection.

use thiserror::Error;

/// Main error type for all RGC operations
///
/// # Examples
///
/// ```rust
/// use rgc::error::RgcError;
///
/// fn handle_error(err: RgcError) {
///     match err {
///         RgcError::OutOfMemory { requested, available } => {
///             eprintln!("OOM: requested {}, available {}", requested, available);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum RgcError {
    /// Out of memory - no available region
    ///
    /// **When returned:** A bump allocator needs a fresh region and the
    /// free-region pool is empty, or the request exceeds a region.
    ///
    /// **Recovery strategy:** Trigger a collection or fail the allocation
    /// through the embedder's out-of-memory path
    #[error("Out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    /// Space initialization failed
    ///
    /// **When returned:** The page source cannot satisfy the full region
    /// reservation at construction time
    ///
    /// **Recovery strategy:** Cannot recover - the space does not exist
    #[error("Heap initialization failed: {0}")]
    HeapInitialization(String),

    /// Configuration error
    ///
    /// **When returned:** Invalid space configuration detected
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    /// Virtual memory error
    ///
    /// **When returned:** OS mapping call failed
    #[error("Virtual memory error: {0}")]
    VirtualMemoryError(String),

    /// Invalid argument
    ///
    /// **When returned:** Function argument fails validation
    ///
    /// **Example scenarios:**
    /// - Zero-sized allocation
    /// - Object header larger than the object
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Address is not covered by any region of the space
    ///
    /// **When returned:** An operation that needs the owning region was
    /// given an address outside the reserved extent
    #[error("Address {address:#x} is not inside any region")]
    AddressNotInSpace { address: usize },

    /// Internal error - indicates a bug in RGC
    ///
    /// **Action required:** Report to developers with full stack trace
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RgcError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RgcError::OutOfMemory { .. })
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(self, RgcError::Internal(_))
    }
}

/// Result type alias for RGC operations
pub type Result<T> = std::result::Result<T, RgcError>;

/// Assert an internal invariant of the collector.
///
/// A violation is logged at `error` level and then panics with the
/// stringified condition and a formatted context message. Continuing after
/// a broken invariant risks corrupting the heap, so this is never turned
/// into a `Result`.
macro_rules! invariant {
    ($cond:expr, $context:expr) => {
        if !$cond {
            log::error!("Invariant violated: {}", $context);
            panic!("Invariant violated at {}: {}", stringify!($cond), $context);
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            let message = format!($context, $($arg)*);
            log::error!("Invariant violated: {}", message);
            panic!("Invariant violated at {}: {}", stringify!($cond), message);
        }
    };
}

pub(crate) use invariant;
