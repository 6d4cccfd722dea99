use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::capture::{write_record, CaptureReader, PacketRecord};
use crate::error::{NetDictError, Result};
use crate::io_utils::io_error;
use crate::locate::{locate, CaptureFilter};

/// One open capture file.
pub struct MergeEntry {
    pub path: PathBuf,
    reader: BufReader<File>,
}

/// Open capture files in discovery order. Dropping the value closes every
/// handle.
pub struct MergeSources {
    entries: Vec<MergeEntry>,
}

impl MergeSources {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    /// Decode every source in order as one packet stream.
    pub fn packets(self) -> impl Iterator<Item = Result<PacketRecord>> {
        self.entries.into_iter().flat_map(|entry| {
            let name = entry.path.display().to_string();
            CaptureReader::new(entry.reader).with_source_name(name)
        })
    }
}

/// Open every capture in `files`, expanding directories into the captures
/// they contain that pass `filter`. Plain files are opened as given.
///
/// Fails with `InsufficientInput` when fewer than two files result, unless
/// `allow_single_file` is set (a single file is then fine, zero is not).
pub fn build_merge_sources<P: AsRef<Path>>(
    files: &[P],
    filter: &CaptureFilter,
    allow_single_file: bool,
) -> Result<MergeSources> {
    let mut paths = Vec::new();
    for file in files {
        let file = file.as_ref();
        if file.is_dir() {
            paths.extend(locate(file, filter)?);
        } else {
            paths.push(file.to_path_buf());
        }
    }

    let needed = if allow_single_file { 1 } else { 2 };
    if paths.len() < needed {
        return Err(NetDictError::InsufficientInput { found: paths.len() });
    }

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let file = File::open(&path).map_err(|e| io_error("opening capture", &path, e))?;
        debug!(path = %path.display(), "opened merge source");
        entries.push(MergeEntry {
            path,
            reader: BufReader::new(file),
        });
    }
    Ok(MergeSources { entries })
}

/// Concatenate all sources into one capture written to `out`. Returns the
/// number of packets written.
pub fn merge_packets<W: Write>(sources: MergeSources, out: &mut W) -> Result<usize> {
    let mut count = 0;
    for packet in sources.packets() {
        write_record(out, packet?.bytes())?;
        count += 1;
    }
    Ok(count)
}

/// Merge into a file. On failure the partial output is removed.
pub fn merge_to_file<P: AsRef<Path>>(sources: MergeSources, output: P) -> Result<usize> {
    let output = output.as_ref();
    let files = sources.len();
    let file = File::create(output).map_err(|e| io_error("creating merged capture", output, e))?;
    let mut out = BufWriter::new(file);
    let result = merge_packets(sources, &mut out).and_then(|count| {
        out.flush()?;
        Ok(count)
    });
    match result {
        Ok(count) => {
            info!(output = %output.display(), files, packets = count, "merged captures");
            Ok(count)
        }
        Err(e) => {
            drop(out);
            let _ = std::fs::remove_file(output);
            Err(e)
        }
    }
}

/// Whether `path` may be written: it does not exist yet, or `confirm`
/// agreed to overwrite it.
pub fn verify_output_path<F>(path: &Path, confirm: F) -> bool
where
    F: FnOnce(&Path) -> bool,
{
    if path.is_dir() {
        return false;
    }
    !path.exists() || confirm(path)
}
