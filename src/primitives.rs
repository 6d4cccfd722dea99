//! Training and compression primitives.
//!
//! The search and build stages only see these traits, so tests can plug in
//! a deterministic fake. [`ZstdCodec`] is the production implementation.

use std::io;

use tracing::debug;
use zstd::bulk::Compressor as ZstdCompressor;
use zstd::zstd_safe::CParameter;

use crate::stats::RatioReport;

/// Builds a dictionary from sample packets.
///
/// `hash_table_bits` is the hash table size the dictionary will be used
/// with. Implementations whose training has no such parameter may ignore
/// it.
pub trait Trainer {
    fn train(&self, packets: &[&[u8]], hash_table_bits: u32) -> io::Result<Vec<u8>>;
}

/// Compresses single packets against a dictionary.
pub trait Compressor {
    /// Size of `packet` once compressed with `dictionary`.
    fn compress(&self, packet: &[u8], dictionary: &[u8], hash_table_bits: u32) -> io::Result<usize>;

    /// Compress every packet and collect ratio statistics.
    fn measure(
        &self,
        packets: &[&[u8]],
        dictionary: &[u8],
        hash_table_bits: u32,
    ) -> io::Result<RatioReport> {
        let mut report = RatioReport::default();
        for packet in packets {
            let size = self.compress(packet, dictionary, hash_table_bits)?;
            report.record(packet.len(), size);
        }
        Ok(report)
    }
}

/// zstd dictionary training and compression.
///
/// zstd training exposes no hash table size, so `hash_table_bits` only
/// reaches the compressor, as `HashLog`. Values zstd rejects fail there.
#[derive(Debug, Clone)]
pub struct ZstdCodec {
    /// Target dictionary size in bytes.
    pub dictionary_size: usize,
    /// zstd compression level.
    pub level: i32,
}

impl ZstdCodec {
    pub const DEFAULT_LEVEL: i32 = 3;

    pub fn new(dictionary_size: usize) -> Self {
        Self {
            dictionary_size,
            level: Self::DEFAULT_LEVEL,
        }
    }

    fn compressor(&self, dictionary: &[u8], hash_table_bits: u32) -> io::Result<ZstdCompressor<'static>> {
        let mut compressor = ZstdCompressor::with_dictionary(self.level, dictionary)?;
        compressor.set_parameter(CParameter::HashLog(hash_table_bits))?;
        Ok(compressor)
    }
}

impl Trainer for ZstdCodec {
    /// `hash_table_bits` is only logged; see [`ZstdCodec`].
    fn train(&self, packets: &[&[u8]], hash_table_bits: u32) -> io::Result<Vec<u8>> {
        let mut sizes = Vec::with_capacity(packets.len());
        let mut continuous = Vec::new();
        for packet in packets.iter().filter(|p| !p.is_empty()) {
            sizes.push(packet.len());
            continuous.extend_from_slice(packet);
        }
        if sizes.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no non-empty packets to train on",
            ));
        }
        debug!(
            samples = sizes.len(),
            total_size = continuous.len(),
            dict_size = self.dictionary_size,
            hash_table_bits,
            "training zstd dictionary"
        );
        zstd::dict::from_continuous(&continuous, &sizes, self.dictionary_size)
    }
}

impl Compressor for ZstdCodec {
    fn compress(&self, packet: &[u8], dictionary: &[u8], hash_table_bits: u32) -> io::Result<usize> {
        let mut compressor = self.compressor(dictionary, hash_table_bits)?;
        Ok(compressor.compress(packet)?.len())
    }

    fn measure(
        &self,
        packets: &[&[u8]],
        dictionary: &[u8],
        hash_table_bits: u32,
    ) -> io::Result<RatioReport> {
        let mut compressor = self.compressor(dictionary, hash_table_bits)?;
        let mut report = RatioReport::default();
        for packet in packets {
            let size = compressor.compress(packet)?.len();
            report.record(packet.len(), size);
        }
        Ok(report)
    }
}
