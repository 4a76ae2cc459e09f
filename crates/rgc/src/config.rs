//! Configuration Module - Region Space Parameters
//!
//! Every parameter here is fixed when the space is constructed. Nothing is
//! runtime-tunable: the region table, the header bit layout and the mark
//! value cycle all depend on these numbers.

use crate::object::header::{MAX_MARK_BITS, MIN_MARK_BITS};

/// Configuration for a [`RegionSpace`](crate::space::RegionSpace)
///
/// # Examples
///
/// ```rust
/// use rgc::SpaceConfig;
///
/// // Use default configuration
/// let config = SpaceConfig::default();
///
/// // Small heap for tests
/// let config = SpaceConfig {
///     pages_per_region: 4,
///     region_count: 4,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SpaceConfig {
    /// Pages per region
    ///
    /// Region size is `pages_per_region * system page size`.
    /// Default: 256
    pub pages_per_region: usize,

    /// Number of regions reserved at construction
    ///
    /// The region table never grows or shrinks afterwards.
    /// Default: 1000
    pub region_count: usize,

    /// Width of the mark field in the header's available byte
    ///
    /// One bit toggles between two mark values and only supports
    /// mark-only cycles; evacuating cycles need at least two. Wider fields
    /// cycle through `2^mark_bits` values, so stale marks alias less often.
    /// Default: 2
    pub mark_bits: u8,

    /// Stamp freshly allocated objects as already marked
    ///
    /// Only meaningful for allocation that happens while a closure is
    /// running. Default: false
    pub alloc_as_marked: bool,

    /// Number of parallel collector threads
    ///
    /// If None, auto-detects: min(4, num_cpus / 2), at least 1.
    pub worker_threads: Option<usize>,

    /// Regions whose live bytes exceed this fraction of the region size
    /// are never selected for evacuation.
    ///
    /// Default: 0.65
    pub max_live_ratio: f64,

    /// Fraction of free-region bytes the selector may plan to fill with
    /// copies in one cycle.
    ///
    /// Default: 0.9
    pub copy_reserve_ratio: f64,

    /// Enable verbose cycle logging to the console
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();

        SpaceConfig {
            pages_per_region: 256,
            region_count: 1000,
            mark_bits: 2,
            alloc_as_marked: false,
            worker_threads: Some((num_cpus / 2).clamp(1, 4)),
            max_live_ratio: 0.65,
            copy_reserve_ratio: 0.9,
            verbose: false,
        }
    }
}

impl SpaceConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rgc::SpaceConfig;
    ///
    /// let config = SpaceConfig {
    ///     region_count: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pages_per_region == 0 {
            return Err(ConfigError::InvalidRegionSize(
                "pages_per_region must be > 0".to_string(),
            ));
        }

        if self
            .pages_per_region
            .checked_mul(crate::heap::page::get_page_size())
            .is_none()
        {
            return Err(ConfigError::InvalidRegionSize(format!(
                "pages_per_region ({}) overflows the address space",
                self.pages_per_region
            )));
        }

        if self.region_count == 0 {
            return Err(ConfigError::InvalidRegionCount(
                "region_count must be > 0".to_string(),
            ));
        }

        if self.mark_bits < MIN_MARK_BITS || self.mark_bits > MAX_MARK_BITS {
            return Err(ConfigError::InvalidMarkBits(format!(
                "mark_bits must be between {} and {}, got {}",
                MIN_MARK_BITS, MAX_MARK_BITS, self.mark_bits
            )));
        }

        if let Some(threads) = self.worker_threads {
            if threads == 0 {
                return Err(ConfigError::InvalidWorkerThreads(
                    "worker_threads must be > 0".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.max_live_ratio) {
            return Err(ConfigError::InvalidRatio(
                "max_live_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.copy_reserve_ratio) {
            return Err(ConfigError::InvalidRatio(
                "copy_reserve_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Region size in bytes
    pub fn region_size(&self) -> usize {
        self.pages_per_region * crate::heap::page::get_page_size()
    }

    /// Total bytes reserved for the space
    pub fn extent(&self) -> usize {
        self.region_size() * self.region_count
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.worker_threads.unwrap_or(1).max(1)
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - RGC_PAGES_PER_REGION
    /// - RGC_REGION_COUNT
    /// - RGC_MARK_BITS
    /// - RGC_WORKER_THREADS
    /// - RGC_VERBOSE
    ///
    /// # Examples
    ///
    /// ```bash
    /// export RGC_PAGES_PER_REGION=64
    /// export RGC_REGION_COUNT=128
    /// export RGC_VERBOSE=1
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RGC_PAGES_PER_REGION") {
            if let Ok(pages) = val.parse::<usize>() {
                config.pages_per_region = pages;
            }
        }

        if let Ok(val) = std::env::var("RGC_REGION_COUNT") {
            if let Ok(count) = val.parse::<usize>() {
                config.region_count = count;
            }
        }

        if let Ok(val) = std::env::var("RGC_MARK_BITS") {
            if let Ok(bits) = val.parse::<u8>() {
                config.mark_bits = bits;
            }
        }

        if let Ok(val) = std::env::var("RGC_WORKER_THREADS") {
            if let Ok(threads) = val.parse::<usize>() {
                config.worker_threads = Some(threads);
            }
        }

        if let Ok(val) = std::env::var("RGC_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid region size: {0}")]
    InvalidRegionSize(String),

    #[error("Invalid region count: {0}")]
    InvalidRegionCount(String),

    #[error("Invalid mark bits: {0}")]
    InvalidMarkBits(String),

    #[error("Invalid worker threads: {0}")]
    InvalidWorkerThreads(String),

    #[error("Invalid ratio: {0}")]
    InvalidRatio(String),
}
