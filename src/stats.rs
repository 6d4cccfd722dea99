//! `RatioReport` accumulates per-packet compression results. It never
//! touches the dictionary it measures.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatioReport {
    pub packets: usize,
    pub raw_bytes: usize,
    pub compressed_bytes: usize,
    /// Best single-packet ratio (raw / compressed).
    pub best_ratio: Option<f64>,
    /// Worst single-packet ratio (raw / compressed).
    pub worst_ratio: Option<f64>,
}

impl RatioReport {
    pub fn record(&mut self, raw: usize, compressed: usize) {
        self.packets += 1;
        self.raw_bytes += raw;
        self.compressed_bytes += compressed;
        let ratio = raw as f64 / compressed.max(1) as f64;
        self.best_ratio = Some(self.best_ratio.map_or(ratio, |r| r.max(ratio)));
        self.worst_ratio = Some(self.worst_ratio.map_or(ratio, |r| r.min(ratio)));
    }

    /// Aggregate raw / compressed ratio. Higher is better.
    pub fn ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 0.0;
        }
        self.raw_bytes as f64 / self.compressed_bytes as f64
    }

    /// Percentage of bytes saved.
    pub fn savings_percent(&self) -> f64 {
        if self.raw_bytes == 0 {
            return 0.0;
        }
        100.0 * (1.0 - self.compressed_bytes as f64 / self.raw_bytes as f64)
    }

    pub fn report(&self) {
        eprintln!(
            "Compression test: {} packets, {} -> {} bytes, ratio {:.3} ({:.2}% saved), per-packet best {:.3} worst {:.3}",
            self.packets,
            self.raw_bytes,
            self.compressed_bytes,
            self.ratio(),
            self.savings_percent(),
            self.best_ratio.unwrap_or(0.0),
            self.worst_ratio.unwrap_or(0.0),
        );
    }
}
