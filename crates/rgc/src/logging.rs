//! Space Logging and Tracing
//!
//! Structured events for region space operations, recorded alongside the
//! plain `log` facade messages. Useful for:
//! - Performance analysis
//! - Debugging evacuation decisions
//! - Tests that assert on what a cycle did
//!
//! Log Levels:
//! - ERROR: Allocation and copy failures
//! - INFO: Cycle boundaries, collection set selection
//! - DEBUG: Region reclamation
//! - TRACE: Evacuation statistics

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for space events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Space event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpaceEvent {
    /// Collection cycle started
    CycleStart { cycle: u64 },

    /// Collection set chosen for this cycle
    CollectionSetSelected {
        cycle: u64,
        regions: usize,
        live_bytes: usize,
    },

    /// Region returned to the available set
    RegionReclaimed { cycle: u64, region: usize },

    /// No region could satisfy an allocation
    AllocationFailure { size: usize },

    /// Evacuation could not allocate a copy
    CopyFailure { object: usize, size: usize },

    /// Evacuation totals for a cycle
    EvacuationStats {
        cycle: u64,
        objects: usize,
        bytes: usize,
    },

    /// Collection cycle completed
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        regions_reclaimed: usize,
    },
}

impl SpaceEvent {
    /// Level the event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            SpaceEvent::AllocationFailure { .. } | SpaceEvent::CopyFailure { .. } => {
                LogLevel::Error
            }
            SpaceEvent::CycleStart { .. }
            | SpaceEvent::CycleEnd { .. }
            | SpaceEvent::CollectionSetSelected { .. } => LogLevel::Info,
            SpaceEvent::RegionReclaimed { .. } => LogLevel::Debug,
            SpaceEvent::EvacuationStats { .. } => LogLevel::Trace,
        }
    }
}

/// Space logger configuration
#[derive(Debug, Clone)]
pub struct SpaceLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,
}

impl Default for SpaceLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            console: false,
            json: false,
            timestamps: true,
        }
    }
}

/// Space Logger - structured event recorder
pub struct SpaceLogger {
    config: SpaceLoggerConfig,
    events: Mutex<Vec<(DateTime<Local>, SpaceEvent)>>,
    enabled: AtomicBool,
}

impl SpaceLogger {
    /// Create new logger
    pub fn new(config: SpaceLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record an event
    pub fn log(&self, event: SpaceEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        let timestamp = Local::now();

        if self.config.console {
            self.output_console(timestamp, &event);
        }

        self.events.lock().push((timestamp, event));
    }

    fn output_console(&self, timestamp: DateTime<Local>, event: &SpaceEvent) {
        if self.config.timestamps {
            print!("[{}] ", timestamp.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}", json);
            }
        } else {
            Self::output_human(event);
        }
    }

    fn output_human(event: &SpaceEvent) {
        match event {
            SpaceEvent::CycleStart { cycle } => {
                println!("[RGC] Cycle {} started", cycle);
            }
            SpaceEvent::CollectionSetSelected {
                cycle,
                regions,
                live_bytes,
            } => {
                println!(
                    "[RGC] Cycle {}: {} regions selected ({} live bytes to copy)",
                    cycle, regions, live_bytes
                );
            }
            SpaceEvent::RegionReclaimed { cycle, region } => {
                println!("[RGC] Cycle {}: region {} reclaimed", cycle, region);
            }
            SpaceEvent::AllocationFailure { size } => {
                eprintln!("[RGC] Allocation failure: {} bytes", size);
            }
            SpaceEvent::CopyFailure { object, size } => {
                eprintln!("[RGC] Copy failure: object {:#x} ({} bytes)", object, size);
            }
            SpaceEvent::EvacuationStats {
                cycle,
                objects,
                bytes,
            } => {
                println!(
                    "[RGC] Cycle {}: evacuated {} objects ({} bytes)",
                    cycle, objects, bytes
                );
            }
            SpaceEvent::CycleEnd {
                cycle,
                duration_ms,
                regions_reclaimed,
            } => {
                println!(
                    "[RGC] Cycle {} completed ({:.2}ms, {} regions reclaimed)",
                    cycle, duration_ms, regions_reclaimed
                );
            }
        }
    }

    /// Get all events
    pub fn events(&self) -> Vec<SpaceEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for SpaceLogger {
    fn default() -> Self {
        Self::new(SpaceLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<SpaceLogger> = Mutex::new(SpaceLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: SpaceEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Configure global logger
pub fn configure_logger(config: SpaceLoggerConfig) {
    *GLOBAL_LOGGER.lock() = SpaceLogger::new(config);
}

/// Get global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}
