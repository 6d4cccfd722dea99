use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetDictError, Result};
use crate::locate::CaptureFilter;

/// Parameters for one dictionary generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Hash table size, as a power of two, handed to the training and
    /// compression primitives.
    pub hash_table_bits: u32,
    /// Target dictionary size in bytes.
    pub dictionary_size: usize,
    /// Trials evaluated per generation.
    pub trials: usize,
    /// Percentage of a candidate replaced per trial in the first generation.
    pub randomness_percent: u32,
    /// Number of generations to run.
    pub generations: usize,
    /// Skip the search and train on the whole dictionary pool.
    pub no_trials: bool,
    /// Each generation's randomness is the previous one scaled by this
    /// percentage.
    pub randomness_decay_percent: u32,
    /// Root seed for every per-trial random stream.
    pub seed: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            hash_table_bits: 19,
            dictionary_size: 1 << 20,
            trials: 4,
            randomness_percent: 50,
            generations: 3,
            no_trials: false,
            randomness_decay_percent: 50,
            seed: 0x5EED,
        }
    }
}

impl TrialConfig {
    /// Randomness used by `generation` (1-based). Never drops below 1 percent
    /// while the base randomness is non-zero.
    pub fn randomness_for(&self, generation: usize) -> u32 {
        let mut pct = self.randomness_percent as u64;
        for _ in 1..generation {
            pct = pct * self.randomness_decay_percent as u64 / 100;
        }
        if self.randomness_percent > 0 {
            pct.max(1) as u32
        } else {
            0
        }
    }
}

/// Capacity policy for the packet pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Dictionary + dictionary-test budget as a multiple of the dictionary size.
    pub budget_multiplier: usize,
    /// Share of that budget, and of routed packets, given to the test pool.
    pub test_share_percent: u32,
    /// Reserve packets for a compression pass after the dictionary is built.
    pub compression_test: bool,
    /// Share of all packets reserved for the compression test.
    pub compression_test_percent: u32,
    /// Compression-test capacity as a multiple of the dictionary size.
    pub compression_test_multiplier: usize,
    /// Trainer overflow capacity as a multiple of the dictionary size.
    pub overflow_multiplier: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            budget_multiplier: 8,
            test_share_percent: 20,
            compression_test: false,
            compression_test_percent: 10,
            compression_test_multiplier: 2,
            overflow_multiplier: 16,
        }
    }
}

/// Directory layout used by auto-generation and the debug dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub capture_subdir: String,
    pub dictionary_subdir: String,
    pub dictionary_extension: String,
    pub capture_extension: String,
    pub dump_extension: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            capture_subdir: "Saved/NetCapture/Server".into(),
            dictionary_subdir: "Content/NetDictionaries".into(),
            dictionary_extension: "ndic".into(),
            capture_extension: "ncap".into(),
            dump_extension: "bin".into(),
        }
    }
}

impl LayoutConfig {
    /// Files with the capture extension, no name filters.
    pub fn capture_filter(&self) -> CaptureFilter {
        CaptureFilter::new(self.capture_extension.as_str())
    }
}

/// Everything a generation run needs, resolved once and passed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub trial: TrialConfig,
    pub pool: PoolConfig,
    pub layout: LayoutConfig,
}

impl GeneratorConfig {
    /// Load a JSON settings file. Missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            NetDictError::Config(format!("cannot read settings '{}': {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            NetDictError::Config(format!("invalid settings '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.trial;
        let p = &self.pool;
        if !(6..=30).contains(&t.hash_table_bits) {
            return Err(config_err(format!(
                "hash_table_bits must be within 6..=30, got {}",
                t.hash_table_bits
            )));
        }
        if t.dictionary_size == 0 {
            return Err(config_err("dictionary_size must be non-zero".into()));
        }
        if !t.no_trials && (t.trials == 0 || t.generations == 0) {
            return Err(config_err(
                "trials and generations must be non-zero unless no_trials is set".into(),
            ));
        }
        if t.randomness_percent > 100 {
            return Err(config_err(format!(
                "randomness_percent must be at most 100, got {}",
                t.randomness_percent
            )));
        }
        if !(1..=100).contains(&t.randomness_decay_percent) {
            return Err(config_err(format!(
                "randomness_decay_percent must be within 1..=100, got {}",
                t.randomness_decay_percent
            )));
        }
        if p.budget_multiplier == 0 {
            return Err(config_err("budget_multiplier must be non-zero".into()));
        }
        if p.test_share_percent >= 100 {
            return Err(config_err(format!(
                "test_share_percent must be below 100, got {}",
                p.test_share_percent
            )));
        }
        if p.compression_test_percent >= 100 {
            return Err(config_err(format!(
                "compression_test_percent must be below 100, got {}",
                p.compression_test_percent
            )));
        }
        Ok(())
    }
}

fn config_err(msg: String) -> NetDictError {
    NetDictError::Config(msg)
}
