use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::TrialConfig;
use crate::error::{NetDictError, Result};
use crate::io_utils::io_error;
use crate::pool::{CapturePool, PoolSet};
use crate::primitives::{Compressor, Trainer};
use crate::search::TrialCandidate;
use crate::stats::RatioReport;

/// Dictionary bytes as returned by the trainer, bound to their output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDictionary {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
}

impl GeneratedDictionary {
    /// Hex SHA-256 of the dictionary bytes.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Train the final dictionary on `candidate`.
pub fn build<T: Trainer>(
    trainer: &T,
    candidate: &TrialCandidate,
    pools: &PoolSet,
    config: &TrialConfig,
    output: &Path,
) -> Result<GeneratedDictionary> {
    let samples = candidate.samples(pools);
    let bytes = trainer
        .train(&samples, config.hash_table_bits)
        .map_err(|e| NetDictError::TrainingFailed {
            context: format!("final build over {} packets", samples.len()),
            reason: e.to_string(),
        })?;
    info!(
        packets = samples.len(),
        sample_bytes = candidate.bytes,
        dict_len = bytes.len(),
        "dictionary trained"
    );
    Ok(GeneratedDictionary {
        bytes,
        path: output.to_path_buf(),
    })
}

/// Compress every packet of the compression-test pool with `dictionary`.
///
/// Returns `None` when the pool is empty (compression testing disabled or
/// no packets reserved).
pub fn validate<C: Compressor>(
    compressor: &C,
    dictionary: &GeneratedDictionary,
    test_pool: &CapturePool,
    config: &TrialConfig,
) -> Result<Option<RatioReport>> {
    if test_pool.is_empty() {
        return Ok(None);
    }
    let report = compressor
        .measure(&test_pool.payloads(), &dictionary.bytes, config.hash_table_bits)
        .map_err(|e| NetDictError::TrainingFailed {
            context: "compression test".into(),
            reason: e.to_string(),
        })?;
    info!(
        packets = report.packets,
        ratio = report.ratio(),
        savings_percent = report.savings_percent(),
        "compression test complete"
    );
    Ok(Some(report))
}

/// Write the dictionary verbatim to its path, creating parent directories.
pub fn persist(dictionary: &GeneratedDictionary) -> Result<()> {
    let path = &dictionary.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error("creating directory", parent, e))?;
    }
    fs::write(path, &dictionary.bytes).map_err(|e| io_error("writing dictionary", path, e))?;
    info!(
        path = %path.display(),
        bytes = dictionary.len(),
        sha256 = %dictionary.fingerprint(),
        "dictionary written"
    );
    Ok(())
}
