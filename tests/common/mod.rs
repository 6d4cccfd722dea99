#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io;
use std::path::Path;

use netdict::{save_capture, Compressor, PacketRecord, Trainer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dictionary = sorted distinct first bytes of the samples. A packet whose
/// first byte is in the dictionary compresses to a quarter of its size.
#[derive(Default)]
pub struct FakeCodec {
    pub trained_on: Cell<usize>,
    pub train_calls: Cell<usize>,
}

impl Trainer for FakeCodec {
    fn train(&self, packets: &[&[u8]], _hash_table_bits: u32) -> io::Result<Vec<u8>> {
        self.train_calls.set(self.train_calls.get() + 1);
        self.trained_on.set(packets.len());
        let mut dict: Vec<u8> = packets.iter().filter_map(|p| p.first().copied()).collect();
        dict.sort_unstable();
        dict.dedup();
        if dict.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "nothing to train on"));
        }
        Ok(dict)
    }
}

impl Compressor for FakeCodec {
    fn compress(&self, packet: &[u8], dictionary: &[u8], _bits: u32) -> io::Result<usize> {
        match packet.first() {
            None => Ok(1),
            Some(b) if dictionary.binary_search(b).is_ok() => Ok((packet.len() / 4).max(1)),
            Some(_) => Ok(packet.len()),
        }
    }
}

/// Every dictionary compresses every packet by exactly half.
pub struct FlatCodec;

impl Trainer for FlatCodec {
    fn train(&self, packets: &[&[u8]], _bits: u32) -> io::Result<Vec<u8>> {
        Ok(vec![packets.len() as u8])
    }
}

impl Compressor for FlatCodec {
    fn compress(&self, packet: &[u8], _dictionary: &[u8], _bits: u32) -> io::Result<usize> {
        Ok((packet.len() / 2).max(1))
    }
}

/// Training always fails.
#[derive(Default)]
pub struct FailingCodec {
    pub calls: RefCell<Vec<usize>>,
}

impl Trainer for FailingCodec {
    fn train(&self, packets: &[&[u8]], _bits: u32) -> io::Result<Vec<u8>> {
        self.calls.borrow_mut().push(packets.len());
        Err(io::Error::new(io::ErrorKind::InvalidData, "degenerate input"))
    }
}

impl Compressor for FailingCodec {
    fn compress(&self, packet: &[u8], _dictionary: &[u8], _bits: u32) -> io::Result<usize> {
        Ok(packet.len())
    }
}

/// `count` packets of 16..40 bytes whose first byte is one of 32 tags.
pub fn random_packets(seed: u64, count: usize) -> Vec<PacketRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(16..40);
            let mut p = vec![rng.gen_range(0u8..32)];
            p.extend((1..len).map(|_| rng.gen::<u8>()));
            PacketRecord::from(p)
        })
        .collect()
}

/// Text-like packets zstd can learn a dictionary from.
pub fn game_packets(seed: u64, count: usize) -> Vec<PacketRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let mut p = format!("MOVE player={} seq={} ", i % 17, i).into_bytes();
            let extra = rng.gen_range(16..64);
            p.extend((0..extra).map(|_| rng.gen_range(b'a'..=b'h')));
            PacketRecord::from(p)
        })
        .collect()
}

/// `count` packets of `len` bytes tagged with `tag`.
pub fn tagged_packets(tag: u8, count: usize, len: usize) -> Vec<PacketRecord> {
    (0..count)
        .map(|i| {
            let mut p = vec![tag; len];
            p[len - 1] = i as u8;
            PacketRecord::from(p)
        })
        .collect()
}

pub fn write_capture_file(path: &Path, packets: &[PacketRecord]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    save_capture(path, packets).unwrap();
}

/// A capture whose last record declares 10 bytes but holds only 4.
pub fn write_truncated_capture(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut data = netdict::encode_capture(&tagged_packets(7, 2, 8)).unwrap();
    data.extend_from_slice(&10u32.to_le_bytes());
    data.extend_from_slice(&[1, 2, 3, 4]);
    std::fs::write(path, data).unwrap();
}
