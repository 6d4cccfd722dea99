//! Capture file codec.
//!
//! A capture is a flat sequence of records, each a little-endian `u32`
//! length followed by exactly that many payload bytes. There is no file
//! header; an empty stream is an empty capture.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{NetDictError, Result};

/// Size of the record length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One captured packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketRecord {
    data: Box<[u8]>,
}

impl PacketRecord {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes this record occupies on disk.
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.data.len()
    }
}

impl From<Vec<u8>> for PacketRecord {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for PacketRecord {
    fn from(v: &[u8]) -> Self {
        Self::new(v.to_vec())
    }
}

/// Lazily decodes records from a byte stream.
///
/// After the first error the reader is exhausted. Reopen the underlying
/// stream to decode again.
pub struct CaptureReader<R> {
    inner: R,
    source_name: String,
    record: usize,
    offset: u64,
    done: bool,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            source_name: "<stream>".to_string(),
            record: 0,
            offset: 0,
            done: false,
        }
    }

    /// Name reported in `MalformedCapture` errors.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn malformed(&self, declared: u64, available: u64) -> NetDictError {
        NetDictError::MalformedCapture {
            source_name: self.source_name.clone(),
            record: self.record,
            offset: self.offset,
            declared,
            available,
        }
    }

    fn read_record(&mut self) -> Result<Option<PacketRecord>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let got = read_full(&mut self.inner, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < LENGTH_PREFIX_SIZE {
            return Err(self.malformed(LENGTH_PREFIX_SIZE as u64, got as u64));
        }
        let declared = u32::from_le_bytes(prefix) as u64;

        // Buffer grows with the bytes actually read, never with `declared`.
        let mut payload = Vec::new();
        let available = (&mut self.inner).take(declared).read_to_end(&mut payload)? as u64;
        if available < declared {
            return Err(self.malformed(declared, available));
        }

        self.record += 1;
        self.offset += LENGTH_PREFIX_SIZE as u64 + declared;
        Ok(Some(PacketRecord::new(payload)))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<PacketRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decode every record of an in-memory capture.
pub fn decode_capture(data: &[u8]) -> Result<Vec<PacketRecord>> {
    CaptureReader::new(data).collect()
}

/// Append one record to `out`.
pub fn write_record<W: Write>(out: &mut W, packet: &[u8]) -> Result<()> {
    let len = u32::try_from(packet.len()).map_err(|_| {
        NetDictError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("packet of {} bytes exceeds the capture record limit", packet.len()),
        ))
    })?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(packet)?;
    Ok(())
}

/// Encode records in order. Returns the number of records written.
pub fn write_capture<'a, W, I>(out: &mut W, packets: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a PacketRecord>,
{
    let mut count = 0;
    for packet in packets {
        write_record(out, packet.bytes())?;
        count += 1;
    }
    Ok(count)
}

/// Encode records into a fresh buffer.
pub fn encode_capture<'a, I>(packets: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a PacketRecord>,
{
    let mut out = Vec::new();
    write_capture(&mut out, packets)?;
    Ok(out)
}

/// Open a capture file for lazy decoding.
pub fn open_capture<P: AsRef<Path>>(path: P) -> Result<CaptureReader<io::BufReader<File>>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    Ok(CaptureReader::new(io::BufReader::new(file)).with_source_name(path.display().to_string()))
}

/// Write a whole capture file.
pub fn save_capture<P: AsRef<Path>>(path: P, packets: &[PacketRecord]) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    let count = write_capture(&mut out, packets)?;
    out.flush()?;
    Ok(count)
}
