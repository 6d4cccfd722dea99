//! End-to-end dictionary generation: merge captures, pool packets, search,
//! train, persist and optionally run the compression test.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::GeneratorConfig;
use crate::dictionary::{build, persist, validate};
use crate::error::{NetDictError, Result};
use crate::io_utils::io_error;
use crate::locate::{locate, ChangelistFilter};
use crate::merge::{build_merge_sources, verify_output_path};
use crate::pool::{PoolSet, PoolSetSummary};
use crate::primitives::{Compressor, Trainer};
use crate::search::{GenerationRecord, SearchMode, TrialSearch};
use crate::stats::RatioReport;

/// What one generation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub output: PathBuf,
    pub sources: usize,
    pub pools: PoolSetSummary,
    pub mode: SearchMode,
    pub selected_packets: usize,
    pub selected_bytes: usize,
    pub dictionary_bytes: usize,
    pub sha256: String,
    pub history: Vec<GenerationRecord>,
    pub compression_test: Option<RatioReport>,
}

pub struct DictionaryGenerator<'a, C> {
    config: &'a GeneratorConfig,
    codec: &'a C,
    show_progress: bool,
}

impl<'a, C: Trainer + Compressor> DictionaryGenerator<'a, C> {
    pub fn new(config: &'a GeneratorConfig, codec: &'a C) -> Self {
        Self {
            config,
            codec,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Build a dictionary from `inputs` and write it to `output`.
    ///
    /// The caller is responsible for confirming that `output` may be
    /// overwritten.
    pub fn generate<P: AsRef<Path>>(&self, inputs: &[P], output: &Path) -> Result<GenerationReport> {
        self.config.validate()?;
        let trial = &self.config.trial;

        let sources = build_merge_sources(inputs, &self.config.layout.capture_filter(), true)?;
        let source_count = sources.len();
        info!(files = source_count, output = %output.display(), "generating dictionary");

        let mut pools = PoolSet::new(trial, &self.config.pool);
        pools.read_all(sources.packets(), source_count)?;

        let outcome = TrialSearch::new(trial, &pools, self.codec)
            .with_progress(self.show_progress)
            .run()?;

        let dictionary = build(self.codec, &outcome.selection, &pools, trial, output)?;
        persist(&dictionary)?;

        let compression_test = if self.config.pool.compression_test {
            let report = validate(self.codec, &dictionary, &pools.compression_test, trial)?;
            if report.is_none() {
                warn!("compression test enabled but no packets were reserved for it");
            }
            report
        } else {
            None
        };

        Ok(GenerationReport {
            output: output.to_path_buf(),
            sources: source_count,
            pools: pools.summary(),
            mode: outcome.mode,
            selected_packets: outcome.selection.len(),
            selected_bytes: outcome.selection.bytes,
            dictionary_bytes: dictionary.len(),
            sha256: dictionary.fingerprint(),
            history: outcome.history,
            compression_test,
        })
    }

    /// Generate one dictionary per capture directory of a project.
    ///
    /// Every subdirectory `D` of `<project>/<capture_subdir>` yields
    /// `<project>/<dictionary_subdir>/<Project><D>.<dictionary_extension>`
    /// from the `.<capture_extension>` files below `D`.
    /// Directories without matching captures, and outputs `confirm`
    /// declines to overwrite, are skipped. Remaining directories are still
    /// processed after a failure; the first failure is returned at the end.
    ///
    /// Fails with `EmptyCapture` when no directory held a capture. When
    /// every output was declined the result is an empty list.
    pub fn auto_generate<F>(
        &self,
        project: &Path,
        changelist: &ChangelistFilter,
        mut confirm: F,
    ) -> Result<Vec<GenerationReport>>
    where
        F: FnMut(&Path) -> bool,
    {
        let layout = &self.config.layout;
        let capture_root = project.join(&layout.capture_subdir);
        let dictionary_dir = project.join(&layout.dictionary_subdir);
        let project_name = project_name(project);
        let filter = layout.capture_filter().with_changelist(changelist.clone());

        let mut dirs = Vec::new();
        let listing = fs::read_dir(&capture_root)
            .map_err(|e| io_error("reading capture directory", &capture_root, e))?;
        for entry in listing {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut reports = Vec::new();
        let mut first_error = None;
        let mut declined = 0;
        for dir in dirs {
            let files = match locate(&dir, &filter) {
                Ok(files) => files,
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "cannot search capture directory");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            if files.is_empty() {
                warn!(dir = %dir.display(), changelist = %changelist, "no captures, skipping");
                continue;
            }
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = dictionary_dir.join(format!(
                "{project_name}{dir_name}.{}",
                layout.dictionary_extension
            ));
            if !verify_output_path(&output, &mut confirm) {
                warn!(output = %output.display(), "output exists and was not confirmed, skipping");
                declined += 1;
                continue;
            }
            match self.generate(&files, &output) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "dictionary generation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if reports.is_empty() && declined == 0 {
            return Err(NetDictError::EmptyCapture { sources: 0 });
        }
        if declined > 0 {
            info!(declined, written = reports.len(), "kept existing dictionaries");
        }
        Ok(reports)
    }
}

fn project_name(project: &Path) -> String {
    let resolved = project
        .canonicalize()
        .unwrap_or_else(|_| project.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
