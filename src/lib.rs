//! Network compression dictionaries from recorded packet captures.
//!
//! Captures are merged into one packet stream, split into bounded pools,
//! and a randomized trial search picks the packets a dictionary is trained
//! on. The trainer and compressor sit behind [`Trainer`] and [`Compressor`];
//! [`ZstdCodec`] is the default implementation.

pub mod capture;
pub mod config;
pub mod dictionary;
pub mod dump;
pub mod error;
pub mod generator;
pub mod io_utils;
pub mod locate;
pub mod merge;
pub mod pool;
pub mod primitives;
pub mod search;
pub mod stats;

pub use capture::{
    decode_capture, encode_capture, open_capture, save_capture, write_capture, CaptureReader,
    PacketRecord,
};
pub use config::{GeneratorConfig, LayoutConfig, PoolConfig, TrialConfig};
pub use dictionary::{build, persist, validate, GeneratedDictionary};
pub use dump::{decode_dump, dump, encode_dump, DumpRecordHeader, DumpSummary};
pub use error::{NetDictError, Result};
pub use generator::{DictionaryGenerator, GenerationReport};
pub use locate::{locate, resolve_inputs, CaptureFilter, ChangelistFilter};
pub use merge::{build_merge_sources, merge_packets, merge_to_file, verify_output_path, MergeSources};
pub use pool::{CapturePool, PoolKind, PoolSet, PoolSetSummary, PoolSummary};
pub use primitives::{Compressor, Trainer, ZstdCodec};
pub use search::{
    trial_rng, write_history_csv, GenerationRecord, SearchMode, SearchOutcome, TrialCandidate,
    TrialSearch,
};
pub use stats::RatioReport;
