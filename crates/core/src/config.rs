//! Engine configuration and runtime parameters
//!
//! [`EngineConfig`] is fixed when the engine is built. A handful of values
//! can be read and changed afterwards through the enumerated [`Parameter`]
//! keys.
//!
//! # Example
//!
//! ```
//! use greenstm_core::config::{ContentionPolicy, EngineConfig};
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     contention_policy = "timestamp"
//!     heap_words = 1024
//! "#).unwrap();
//! assert_eq!(config.contention_policy, ContentionPolicy::Timestamp);
//! assert_eq!(config.heap_words, 1024);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Result, StmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contention management strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentionPolicy {
    /// Always kill the other transaction
    Aggressive,
    /// Always abort self
    #[default]
    Suicide,
    /// Abort self and wait for the contended lock before restarting
    Delay,
    /// Older transaction (smaller start timestamp) wins
    Timestamp,
    /// Transaction with more accumulated work wins
    Karma,
}

impl ContentionPolicy {
    /// Every policy, in declaration order
    pub const ALL: [ContentionPolicy; 5] = [
        ContentionPolicy::Aggressive,
        ContentionPolicy::Suicide,
        ContentionPolicy::Delay,
        ContentionPolicy::Timestamp,
        ContentionPolicy::Karma,
    ];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            ContentionPolicy::Aggressive => "aggressive",
            ContentionPolicy::Suicide => "suicide",
            ContentionPolicy::Delay => "delay",
            ContentionPolicy::Timestamp => "timestamp",
            ContentionPolicy::Karma => "karma",
        }
    }

    /// Encode for storage in an atomic
    pub fn code(&self) -> u8 {
        match self {
            ContentionPolicy::Aggressive => 0,
            ContentionPolicy::Suicide => 1,
            ContentionPolicy::Delay => 2,
            ContentionPolicy::Timestamp => 3,
            ContentionPolicy::Karma => 4,
        }
    }

    /// Decode from [`ContentionPolicy::code`]; unknown codes map to the default
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ContentionPolicy::Aggressive,
            2 => ContentionPolicy::Delay,
            3 => ContentionPolicy::Timestamp,
            4 => ContentionPolicy::Karma,
            _ => ContentionPolicy::Suicide,
        }
    }
}

impl fmt::Display for ContentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentionPolicy {
    type Err = StmError;

    fn from_str(s: &str) -> Result<Self> {
        ContentionPolicy::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                StmError::invalid_parameter("contention_manager", format!("unknown policy '{}'", s))
            })
    }
}

/// Memory update design of the engine
///
/// Only write-back with commit-time locking is implemented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Design {
    /// Buffered writes, locks acquired at commit
    #[default]
    WriteBackCtl,
}

impl Design {
    /// Human readable design name
    pub fn name(&self) -> &'static str {
        match self {
            Design::WriteBackCtl => "WRITE-BACK (CTL)",
        }
    }
}

impl fmt::Display for Design {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Execution backend behind the retry loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Optimistic software transactions
    #[default]
    Stm,
    /// Every operation runs under one engine-wide mutex
    GlobalLock,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial contention management policy
    pub contention_policy: ContentionPolicy,
    /// Execution backend
    pub backend: Backend,
    /// Words in the engine-owned heap
    pub heap_words: usize,
    /// log2 of the lock table length
    pub lock_table_log_size: u32,
    /// Address bits ignored when mapping an address to its lock
    pub lock_shift: u32,
    /// Capacity of the thread slot registry
    pub max_threads: usize,
    /// Clock value at which rollover is triggered
    pub clock_max: u64,
    /// Lower bound of the randomized restart backoff, in microseconds
    pub min_backoff_us: u64,
    /// Upper bound of the randomized restart backoff, in microseconds
    pub max_backoff_us: u64,
    /// Initial capacity of read and write sets
    pub initial_rw_set_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            contention_policy: ContentionPolicy::Suicide,
            backend: Backend::Stm,
            heap_words: 1 << 16,
            lock_table_log_size: 20,
            lock_shift: 0,
            max_threads: 64,
            clock_max: u64::MAX >> 2,
            min_backoff_us: 0,
            max_backoff_us: 1000,
            initial_rw_set_size: 4096,
        }
    }
}

impl EngineConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Set the contention policy
    pub fn with_policy(mut self, policy: ContentionPolicy) -> Self {
        self.contention_policy = policy;
        self
    }

    /// Set the execution backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the heap size in words
    pub fn with_heap_words(mut self, words: usize) -> Self {
        self.heap_words = words;
        self
    }

    /// Set log2 of the lock table length
    pub fn with_lock_table_log_size(mut self, log_size: u32) -> Self {
        self.lock_table_log_size = log_size;
        self
    }

    /// Set the address shift applied before hashing to a lock
    pub fn with_lock_shift(mut self, shift: u32) -> Self {
        self.lock_shift = shift;
        self
    }

    /// Set the thread registry capacity
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the rollover threshold of the global clock
    pub fn with_clock_max(mut self, clock_max: u64) -> Self {
        self.clock_max = clock_max;
        self
    }

    /// Set the restart backoff bounds, in microseconds
    pub fn with_backoff_us(mut self, min: u64, max: u64) -> Self {
        self.min_backoff_us = min;
        self.max_backoff_us = max;
        self
    }

    /// Set the initial read/write set capacity
    pub fn with_initial_rw_set_size(mut self, size: usize) -> Self {
        self.initial_rw_set_size = size;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(1..=28).contains(&self.lock_table_log_size) {
            return Err(StmError::Config(format!(
                "lock_table_log_size must be in 1..=28, got {}",
                self.lock_table_log_size
            )));
        }
        if self.lock_shift >= usize::BITS {
            return Err(StmError::Config(format!(
                "lock_shift must be below {}, got {}",
                usize::BITS,
                self.lock_shift
            )));
        }
        if self.heap_words == 0 {
            return Err(StmError::Config("heap_words must be non-zero".to_string()));
        }
        if self.max_threads == 0 {
            return Err(StmError::Config("max_threads must be non-zero".to_string()));
        }
        if self.max_threads > u32::MAX as usize >> 1 {
            return Err(StmError::Config(format!(
                "max_threads too large: {}",
                self.max_threads
            )));
        }
        if self.min_backoff_us > self.max_backoff_us {
            return Err(StmError::Config(format!(
                "min_backoff_us ({}) exceeds max_backoff_us ({})",
                self.min_backoff_us, self.max_backoff_us
            )));
        }
        if self.clock_max == 0 {
            return Err(StmError::Config("clock_max must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Runtime-visible engine parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Contention management policy (text)
    ContentionManager,
    /// Engine design variant (text, read-only)
    Design,
    /// Initial read/write set capacity (number)
    InitialRwSetSize,
    /// Restart backoff lower bound in microseconds (number)
    MinBackoff,
    /// Restart backoff upper bound in microseconds (number)
    MaxBackoff,
    /// Clock rollover threshold (number)
    ClockMax,
}

impl Parameter {
    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::ContentionManager => "contention_manager",
            Parameter::Design => "design",
            Parameter::InitialRwSetSize => "initial_rw_set_size",
            Parameter::MinBackoff => "min_backoff",
            Parameter::MaxBackoff => "max_backoff",
            Parameter::ClockMax => "clock_max",
        }
    }

    /// Whether [`Parameter`] can only be read
    pub fn is_read_only(&self) -> bool {
        matches!(self, Parameter::Design)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = StmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contention_manager" | "cm_policy" => Ok(Parameter::ContentionManager),
            "design" => Ok(Parameter::Design),
            "initial_rw_set_size" => Ok(Parameter::InitialRwSetSize),
            "min_backoff" => Ok(Parameter::MinBackoff),
            "max_backoff" => Ok(Parameter::MaxBackoff),
            "clock_max" => Ok(Parameter::ClockMax),
            _ => Err(StmError::invalid_parameter(s, "unknown parameter")),
        }
    }
}

/// Value of a [`Parameter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// Textual value (policy or design name)
    Text(String),
    /// Numeric value
    Number(u64),
}

impl ParameterValue {
    /// Text value, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            ParameterValue::Number(_) => None,
        }
    }

    /// Numeric value, if any
    pub fn as_number(&self) -> Option<u64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            ParameterValue::Text(_) => None,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::Text(s.to_string())
    }
}

impl From<u64> for ParameterValue {
    fn from(n: u64) -> Self {
        ParameterValue::Number(n)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Text(s) => f.write_str(s),
            ParameterValue::Number(n) => write!(f, "{}", n),
        }
    }
}
