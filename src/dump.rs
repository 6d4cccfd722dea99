//! Debug dump: convert captures into the flat `.bin` layout read by
//! external compression test harnesses.
//!
//! Every record becomes an 8-byte [`DumpRecordHeader`] followed by the
//! payload. The source tree layout is mirrored under the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use tracing::{info, warn};

use crate::capture::{open_capture, PacketRecord};
use crate::error::{NetDictError, Result};
use crate::locate::{locate, CaptureFilter};

/// Record header of the dump layout. Both fields are little-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DumpRecordHeader {
    /// Always 0; captures carry no channel information.
    pub channel: u32,
    pub size: u32,
}

pub const DUMP_HEADER_SIZE: usize = std::mem::size_of::<DumpRecordHeader>();

impl DumpRecordHeader {
    pub fn new(size: u32) -> Self {
        Self {
            channel: 0u32.to_le(),
            size: size.to_le(),
        }
    }

    pub fn size(&self) -> u32 {
        u32::from_le(self.size)
    }
}

/// Encode packets in the dump layout.
pub fn encode_dump(packets: &[PacketRecord]) -> Vec<u8> {
    let total: usize = packets.iter().map(|p| DUMP_HEADER_SIZE + p.len()).sum();
    let mut out = Vec::with_capacity(total);
    for packet in packets {
        let header = DumpRecordHeader::new(packet.len() as u32);
        out.extend_from_slice(bytemuck::bytes_of(&header));
        out.extend_from_slice(packet.bytes());
    }
    out
}

/// Decode a dump back into payloads. Returns `None` on a truncated record.
pub fn decode_dump(mut data: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut packets = Vec::new();
    while !data.is_empty() {
        let head = data.get(..DUMP_HEADER_SIZE)?;
        let header: DumpRecordHeader = bytemuck::pod_read_unaligned(head);
        let size = header.size() as usize;
        let payload = data.get(DUMP_HEADER_SIZE..DUMP_HEADER_SIZE + size)?;
        packets.push(payload.to_vec());
        data = &data[DUMP_HEADER_SIZE + size..];
    }
    Some(packets)
}

/// Result of a dump run.
#[derive(Debug, Default, Serialize)]
pub struct DumpSummary {
    pub succeeded: Vec<PathBuf>,
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<NetDictError>,
}

fn serialize_failures<S: serde::Serializer>(
    failed: &[NetDictError],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(failed.iter().map(|e| e.to_string()))
}

impl DumpSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Convert every capture below `source` passing `filter` into the dump
/// layout under `output`, each written with `extension`.
///
/// A failing file is recorded as `DumpIo` and the run continues. Output
/// files are only written once their capture decoded completely.
pub fn dump<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    output: Q,
    filter: &CaptureFilter,
    extension: &str,
) -> Result<DumpSummary> {
    let source = source.as_ref();
    let output = output.as_ref();
    let files = locate(source, filter)?;
    let mut summary = DumpSummary::default();

    for file in files {
        if file.starts_with(output) {
            continue;
        }
        let relative = file.strip_prefix(source).unwrap_or(&file);
        let target = output.join(relative).with_extension(extension);
        match dump_file(&file, &target) {
            Ok(packets) => {
                info!(source = %file.display(), target = %target.display(), packets, "dumped capture");
                summary.succeeded.push(target);
            }
            Err(e) => {
                let err = NetDictError::DumpIo {
                    path: file.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "skipping capture");
                summary.failed.push(err);
            }
        }
    }

    info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        "debug dump finished"
    );
    Ok(summary)
}

fn dump_file(file: &Path, target: &Path) -> Result<usize> {
    let packets = open_capture(file)?.collect::<Result<Vec<_>>>()?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, encode_dump(&packets))?;
    Ok(packets.len())
}
