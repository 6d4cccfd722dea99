//! Packet pools.
//!
//! Decoded packets are split between four bounded pools. Each packet is
//! owned by exactly one pool; packets that fit nowhere are counted and
//! dropped.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::PacketRecord;
use crate::config::{PoolConfig, TrialConfig};
use crate::error::{NetDictError, Result};

/// The pools a packet can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolKind {
    Dictionary,
    DictionaryTest,
    TrainerOverflow,
    CompressionTest,
}

/// Ordered packets with a byte total and a capacity ceiling.
#[derive(Debug, Clone)]
pub struct CapturePool {
    packets: Vec<PacketRecord>,
    bytes: usize,
    capacity: usize,
    overflowed: bool,
}

impl CapturePool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            packets: Vec::new(),
            bytes: 0,
            capacity,
            overflowed: false,
        }
    }

    pub fn packets(&self) -> &[PacketRecord] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Payload bytes held.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes
    }

    /// Set once a packet routed here was turned away for lack of room.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn fits(&self, record: &PacketRecord) -> bool {
        record.len() <= self.remaining()
    }

    /// Append if there is room, otherwise hand the record back.
    pub fn try_push(&mut self, record: PacketRecord) -> std::result::Result<(), PacketRecord> {
        if !self.fits(&record) {
            return Err(record);
        }
        self.bytes += record.len();
        self.packets.push(record);
        Ok(())
    }

    /// Borrowed payloads, in order.
    pub fn payloads(&self) -> Vec<&[u8]> {
        self.packets.iter().map(PacketRecord::bytes).collect()
    }
}

/// Occupancy snapshot of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub packets: usize,
    pub bytes: usize,
    pub capacity: usize,
    pub overflowed: bool,
}

impl From<&CapturePool> for PoolSummary {
    fn from(pool: &CapturePool) -> Self {
        Self {
            packets: pool.len(),
            bytes: pool.bytes(),
            capacity: pool.capacity(),
            overflowed: pool.overflowed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSetSummary {
    pub dictionary: PoolSummary,
    pub dictionary_test: PoolSummary,
    pub trainer_overflow: PoolSummary,
    pub compression_test: PoolSummary,
    pub packets_read: usize,
    pub discarded: usize,
}

/// Deterministic stream-order routing by integer accumulators.
#[derive(Debug, Clone, Default)]
struct Router {
    compression_test_percent: u32,
    test_share_percent: u32,
    compression_acc: u32,
    test_acc: u32,
}

impl Router {
    fn next(&mut self) -> PoolKind {
        if self.compression_test_percent > 0 {
            self.compression_acc += self.compression_test_percent;
            if self.compression_acc >= 100 {
                self.compression_acc -= 100;
                return PoolKind::CompressionTest;
            }
        }
        self.test_acc += self.test_share_percent;
        if self.test_acc >= 100 {
            self.test_acc -= 100;
            PoolKind::DictionaryTest
        } else {
            PoolKind::Dictionary
        }
    }
}

/// The four pools of one generation run.
#[derive(Debug, Clone)]
pub struct PoolSet {
    pub dictionary: CapturePool,
    pub dictionary_test: CapturePool,
    pub trainer_overflow: CapturePool,
    pub compression_test: CapturePool,
    router: Router,
    packets_read: usize,
    discarded: usize,
}

impl PoolSet {
    /// Empty pools sized from the dictionary size.
    ///
    /// The dictionary and dictionary-test capacities always sum to
    /// `dictionary_size * budget_multiplier`. Without trials nothing is
    /// scored, so the whole budget goes to the dictionary pool.
    pub fn new(trial: &TrialConfig, pool: &PoolConfig) -> Self {
        let test_share = if trial.no_trials {
            0
        } else {
            pool.test_share_percent as usize
        };
        let budget = trial.dictionary_size.saturating_mul(pool.budget_multiplier);
        let test_capacity = budget / 100 * test_share + budget % 100 * test_share / 100;
        let dictionary_capacity = budget - test_capacity;
        let compression_capacity = if pool.compression_test {
            trial
                .dictionary_size
                .saturating_mul(pool.compression_test_multiplier)
        } else {
            0
        };
        let overflow_capacity = trial.dictionary_size.saturating_mul(pool.overflow_multiplier);

        Self {
            dictionary: CapturePool::with_capacity(dictionary_capacity),
            dictionary_test: CapturePool::with_capacity(test_capacity),
            trainer_overflow: CapturePool::with_capacity(overflow_capacity),
            compression_test: CapturePool::with_capacity(compression_capacity),
            router: Router {
                compression_test_percent: if pool.compression_test {
                    pool.compression_test_percent
                } else {
                    0
                },
                test_share_percent: test_share as u32,
                ..Router::default()
            },
            packets_read: 0,
            discarded: 0,
        }
    }

    pub fn pool(&self, kind: PoolKind) -> &CapturePool {
        match kind {
            PoolKind::Dictionary => &self.dictionary,
            PoolKind::DictionaryTest => &self.dictionary_test,
            PoolKind::TrainerOverflow => &self.trainer_overflow,
            PoolKind::CompressionTest => &self.compression_test,
        }
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut CapturePool {
        match kind {
            PoolKind::Dictionary => &mut self.dictionary,
            PoolKind::DictionaryTest => &mut self.dictionary_test,
            PoolKind::TrainerOverflow => &mut self.trainer_overflow,
            PoolKind::CompressionTest => &mut self.compression_test,
        }
    }

    /// Add `record` to the pool for `kind`.
    ///
    /// A record that does not fit is redirected to the trainer overflow pool
    /// and the origin pool is flagged. Returns where it ended up, or `None`
    /// when even the overflow pool was full and the record was dropped.
    pub fn classify(&mut self, record: PacketRecord, kind: PoolKind) -> Option<PoolKind> {
        self.packets_read += 1;
        let record = match self.pool_mut(kind).try_push(record) {
            Ok(()) => return Some(kind),
            Err(record) => record,
        };
        let origin = self.pool_mut(kind);
        if !origin.overflowed {
            debug!(pool = ?kind, bytes = origin.bytes, "pool full, redirecting to overflow");
        }
        origin.overflowed = true;
        if kind == PoolKind::TrainerOverflow {
            self.discarded += 1;
            return None;
        }
        match self.trainer_overflow.try_push(record) {
            Ok(()) => Some(PoolKind::TrainerOverflow),
            Err(_) => {
                self.trainer_overflow.overflowed = true;
                self.discarded += 1;
                None
            }
        }
    }

    /// Route `record` by the configured shares and classify it.
    pub fn route(&mut self, record: PacketRecord) -> Option<PoolKind> {
        let kind = self.router.next();
        self.classify(record, kind)
    }

    /// Decode and route every packet of `packets`.
    ///
    /// `sources` is only used for the `EmptyCapture` error. Decoding errors
    /// abort the read.
    pub fn read_all<I>(&mut self, packets: I, sources: usize) -> Result<()>
    where
        I: IntoIterator<Item = Result<PacketRecord>>,
    {
        let before = self.packets_read;
        for packet in packets {
            self.route(packet?);
        }
        if self.packets_read == before {
            return Err(NetDictError::EmptyCapture { sources });
        }
        if self.discarded > 0 {
            warn!(
                discarded = self.discarded,
                "overflow pool full, packets were dropped"
            );
        }
        let s = self.summary();
        info!(
            packets = s.packets_read,
            dictionary = s.dictionary.packets,
            dictionary_test = s.dictionary_test.packets,
            overflow = s.trainer_overflow.packets,
            compression_test = s.compression_test.packets,
            "pooled packets"
        );
        Ok(())
    }

    pub fn packets_read(&self) -> usize {
        self.packets_read
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn summary(&self) -> PoolSetSummary {
        PoolSetSummary {
            dictionary: (&self.dictionary).into(),
            dictionary_test: (&self.dictionary_test).into(),
            trainer_overflow: (&self.trainer_overflow).into(),
            compression_test: (&self.compression_test).into(),
            packets_read: self.packets_read,
            discarded: self.discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(dictionary_size: usize, pool: PoolConfig) -> (TrialConfig, PoolConfig) {
        (
            TrialConfig {
                dictionary_size,
                ..TrialConfig::default()
            },
            pool,
        )
    }

    #[test]
    fn capacities_split_the_budget() {
        let (t, p) = configs(
            1000,
            PoolConfig {
                budget_multiplier: 3,
                test_share_percent: 25,
                ..PoolConfig::default()
            },
        );
        let pools = PoolSet::new(&t, &p);
        assert_eq!(pools.dictionary_test.capacity(), 750);
        assert_eq!(pools.dictionary.capacity(), 2250);
        assert_eq!(pools.compression_test.capacity(), 0);
    }

    #[test]
    fn router_shares_are_exact() {
        let mut router = Router {
            compression_test_percent: 10,
            test_share_percent: 50,
            ..Router::default()
        };
        let kinds: Vec<PoolKind> = (0..100).map(|_| router.next()).collect();
        let count = |k| kinds.iter().filter(|&&x| x == k).count();
        assert_eq!(count(PoolKind::CompressionTest), 10);
        assert_eq!(count(PoolKind::DictionaryTest), 45);
        assert_eq!(count(PoolKind::Dictionary), 45);
    }

    #[test]
    fn full_pool_redirects_and_flags() {
        let (t, p) = configs(
            10,
            PoolConfig {
                budget_multiplier: 1,
                test_share_percent: 0,
                overflow_multiplier: 1,
                ..PoolConfig::default()
            },
        );
        let mut pools = PoolSet::new(&t, &p);
        assert_eq!(
            pools.classify(vec![1u8; 8].into(), PoolKind::Dictionary),
            Some(PoolKind::Dictionary)
        );
        assert_eq!(
            pools.classify(vec![2u8; 8].into(), PoolKind::Dictionary),
            Some(PoolKind::TrainerOverflow)
        );
        assert!(pools.dictionary.overflowed());
        assert_eq!(pools.classify(vec![3u8; 8].into(), PoolKind::Dictionary), None);
        assert!(pools.trainer_overflow.overflowed());
        assert_eq!(pools.discarded(), 1);
        assert_eq!(pools.packets_read(), 3);
    }

    #[test]
    fn no_trials_routes_everything_to_the_dictionary_pool() {
        let trial = TrialConfig {
            dictionary_size: 1000,
            no_trials: true,
            ..TrialConfig::default()
        };
        let mut pools = PoolSet::new(&trial, &PoolConfig::default());
        assert_eq!(pools.dictionary_test.capacity(), 0);
        for i in 0..10u8 {
            assert_eq!(pools.route(vec![i; 4].into()), Some(PoolKind::Dictionary));
        }
    }

    #[test]
    fn empty_stream_is_an_error() {
        let mut pools = PoolSet::new(&TrialConfig::default(), &PoolConfig::default());
        let err = pools.read_all(Vec::new(), 2).unwrap_err();
        assert!(matches!(err, NetDictError::EmptyCapture { sources: 2 }));
    }
}
