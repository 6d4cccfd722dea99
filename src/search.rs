//! Randomized multi-generation search for the packet subset handed to the
//! trainer.
//!
//! Generation 1 starts from the whole dictionary pool. Every trial copies
//! the carry-forward selection, swaps a share of its members for packets
//! drawn from the dictionary and overflow pools, trains a dictionary on it
//! and scores that dictionary by its compression ratio over the
//! dictionary-test pool. A generation's best trial replaces the
//! carry-forward selection only when it scores strictly higher, so the
//! carried score never decreases.
//!
//! Each trial draws from its own RNG seeded from `(seed, generation, trial)`,
//! so results do not depend on evaluation order.

use std::collections::HashSet;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::capture::PacketRecord;
use crate::config::TrialConfig;
use crate::error::{NetDictError, Result};
use crate::pool::PoolSet;
use crate::primitives::{Compressor, Trainer};

/// Draws attempted per replaced slot before the slot is left unchanged.
const MAX_DRAWS: usize = 8;

/// A selection of packets, by index into the dictionary pool followed by
/// the trainer overflow pool.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialCandidate {
    pub members: Vec<usize>,
    /// Payload bytes of all members.
    pub bytes: usize,
    /// Compression ratio over the dictionary-test pool, once evaluated.
    pub score: Option<f64>,
}

impl TrialCandidate {
    /// Every packet of the dictionary pool.
    pub fn full_pool(pools: &PoolSet) -> Self {
        Self {
            members: (0..pools.dictionary.len()).collect(),
            bytes: pools.dictionary.bytes(),
            score: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Payloads of the selected packets, in selection order.
    pub fn samples<'p>(&self, pools: &'p PoolSet) -> Vec<&'p [u8]> {
        let material = Material::new(pools);
        self.members.iter().map(|&i| material.get(i)).collect()
    }
}

/// Read-only view over dictionary + overflow packets.
struct Material<'p> {
    dictionary: &'p [PacketRecord],
    overflow: &'p [PacketRecord],
}

impl<'p> Material<'p> {
    fn new(pools: &'p PoolSet) -> Self {
        Self {
            dictionary: pools.dictionary.packets(),
            overflow: pools.trainer_overflow.packets(),
        }
    }

    fn len(&self) -> usize {
        self.dictionary.len() + self.overflow.len()
    }

    fn get(&self, index: usize) -> &'p [u8] {
        if index < self.dictionary.len() {
            self.dictionary[index].bytes()
        } else {
            self.overflow[index - self.dictionary.len()].bytes()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchMode {
    SinglePass,
    Generations,
}

/// Outcome of one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub randomness_percent: u32,
    pub winning_trial: usize,
    pub winning_score: f64,
    /// Score carried into the next generation.
    pub carried_score: f64,
    pub failed_trials: usize,
    pub improved: bool,
    pub packets: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub selection: TrialCandidate,
    pub history: Vec<GenerationRecord>,
}

/// Trial search over a filled [`PoolSet`].
pub struct TrialSearch<'a, C> {
    config: &'a TrialConfig,
    pools: &'a PoolSet,
    codec: &'a C,
    show_progress: bool,
}

impl<'a, C: Trainer + Compressor> TrialSearch<'a, C> {
    pub fn new(config: &'a TrialConfig, pools: &'a PoolSet, codec: &'a C) -> Self {
        Self {
            config,
            pools,
            codec,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while searching.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn run(&self) -> Result<SearchOutcome> {
        if self.config.no_trials {
            return Ok(self.single_pass());
        }
        if self.pools.dictionary_test.is_empty() {
            warn!("dictionary test pool is empty, nothing to score trials against; using a single pass");
            return Ok(self.single_pass());
        }
        if self.pools.trainer_overflow.is_empty() {
            warn!("no substitution material for trials; using a single pass");
            return Ok(self.single_pass());
        }
        self.generations()
    }

    fn single_pass(&self) -> SearchOutcome {
        let selection = TrialCandidate::full_pool(self.pools);
        info!(
            packets = selection.len(),
            bytes = selection.bytes,
            "single pass over the whole dictionary pool"
        );
        SearchOutcome {
            mode: SearchMode::SinglePass,
            selection,
            history: Vec::new(),
        }
    }

    fn generations(&self) -> Result<SearchOutcome> {
        let cfg = self.config;
        let material = Material::new(self.pools);
        let ceiling = self.pools.dictionary.capacity();

        let mut carried = TrialCandidate::full_pool(self.pools);
        match self.evaluate(&carried, "baseline") {
            Ok(score) => carried.score = Some(score),
            Err(e) => warn!(error = %e, "baseline selection could not be scored"),
        }
        info!(
            packets = carried.len(),
            bytes = carried.bytes,
            score = carried.score.unwrap_or(0.0),
            generations = cfg.generations,
            trials = cfg.trials,
            "starting trial search"
        );

        let bar = self.progress_bar((cfg.generations * cfg.trials) as u64);
        let mut history = Vec::with_capacity(cfg.generations);

        for generation in 1..=cfg.generations {
            let randomness = cfg.randomness_for(generation);

            // Trials only read the pools and the carried selection; the
            // winner is picked after all of them finish.
            let results: Vec<Result<TrialCandidate>> = (0..cfg.trials)
                .map(|trial| {
                    let mut rng = trial_rng(cfg.seed, generation, trial);
                    let mut candidate = mutate(&carried, &material, randomness, ceiling, &mut rng);
                    let label = format!("generation {generation} trial {trial}");
                    let outcome = self.evaluate(&candidate, &label).map(|score| {
                        candidate.score = Some(score);
                        candidate
                    });
                    bar.inc(1);
                    outcome
                })
                .collect();

            let mut winner: Option<(usize, TrialCandidate)> = None;
            let mut failed = 0;
            for (trial, result) in results.into_iter().enumerate() {
                match result {
                    Ok(candidate) => {
                        debug!(generation, trial, score = candidate.score, "trial scored");
                        let better = match &winner {
                            Some((_, w)) => candidate.score > w.score,
                            None => true,
                        };
                        if better {
                            winner = Some((trial, candidate));
                        }
                    }
                    Err(e) => {
                        warn!(generation, trial, error = %e, "trial failed");
                        failed += 1;
                    }
                }
            }

            let (winning_trial, winner) = winner.ok_or(NetDictError::SearchExhausted {
                generation,
                trials: cfg.trials,
            })?;
            let winning_score = winner.score.unwrap_or(0.0);
            let improved = match carried.score {
                Some(s) => winning_score > s,
                None => true,
            };
            if improved {
                carried = winner;
            }
            let carried_score = carried.score.unwrap_or(0.0);
            info!(
                generation,
                randomness,
                winning_trial,
                winning_score,
                carried_score,
                improved,
                "generation complete"
            );
            history.push(GenerationRecord {
                generation,
                randomness_percent: randomness,
                winning_trial,
                winning_score,
                carried_score,
                failed_trials: failed,
                improved,
                packets: carried.len(),
                bytes: carried.bytes,
            });
        }
        bar.finish_and_clear();

        Ok(SearchOutcome {
            mode: SearchMode::Generations,
            selection: carried,
            history,
        })
    }

    /// Train on `candidate` and score the result against the test pool.
    fn evaluate(&self, candidate: &TrialCandidate, label: &str) -> Result<f64> {
        let bits = self.config.hash_table_bits;
        let samples = candidate.samples(self.pools);
        let dictionary = self
            .codec
            .train(&samples, bits)
            .map_err(|e| training_failed(label, e))?;
        let report = self
            .codec
            .measure(&self.pools.dictionary_test.payloads(), &dictionary, bits)
            .map_err(|e| training_failed(label, e))?;
        Ok(report.ratio())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} trials")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }
}

fn training_failed(label: &str, err: std::io::Error) -> NetDictError {
    NetDictError::TrainingFailed {
        context: label.to_string(),
        reason: err.to_string(),
    }
}

/// RNG for one trial, independent of every other trial.
pub fn trial_rng(seed: u64, generation: usize, trial: usize) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update((generation as u64).to_le_bytes());
    hasher.update((trial as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(bytes))
}

/// Replace `randomness` percent of `base` with unselected packets, keeping
/// the total within `ceiling` bytes.
fn mutate(
    base: &TrialCandidate,
    material: &Material<'_>,
    randomness: u32,
    ceiling: usize,
    rng: &mut StdRng,
) -> TrialCandidate {
    let len = base.members.len();
    let replace = ((len * randomness as usize + 99) / 100).min(len);
    let mut members = base.members.clone();
    let mut bytes = base.bytes;
    let mut selected: HashSet<usize> = members.iter().copied().collect();

    if material.len() > selected.len() {
        for pos in rand::seq::index::sample(rng, len, replace).into_vec() {
            for _ in 0..MAX_DRAWS {
                let pick = rng.gen_range(0..material.len());
                if selected.contains(&pick) {
                    continue;
                }
                let old = members[pos];
                let new_bytes = bytes - material.get(old).len() + material.get(pick).len();
                if new_bytes > ceiling {
                    continue;
                }
                selected.remove(&old);
                selected.insert(pick);
                members[pos] = pick;
                bytes = new_bytes;
                break;
            }
        }
    }

    TrialCandidate {
        members,
        bytes,
        score: None,
    }
}

/// Write the per-generation history as CSV.
pub fn write_history_csv<P: AsRef<Path>>(history: &[GenerationRecord], path: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref()).map_err(csv_error)?;
    for record in history {
        wtr.serialize(record).map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> NetDictError {
    NetDictError::Io(e.into())
}
