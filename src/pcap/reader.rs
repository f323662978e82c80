//! Capture file reader.
//!
//! Sequential, forward-only iteration over a legacy pcap stream. The
//! global header is validated up front (the pcapng magic fails fast);
//! each record is decoded through the protocol layers into a [`Frame`]
//! with a capture-relative timestamp. Gzipped captures are transparently
//! decompressed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use super::header::{CaptureHeader, GLOBAL_HEADER_LEN, RECORD_HEADER_LEN};
use super::Frame;
use crate::error::{CaptureError, Error};
use crate::protocol::decode_layers;

/// Buffer size for reading capture files (64KB).
const BUFFER_SIZE: usize = 65536;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reader over one capture stream. Yields each frame exactly once, in
/// order; the stream is not restartable.
pub struct CaptureReader {
    input: BufReader<Box<dyn Read + Send>>,
    header: CaptureHeader,
    frame_number: u64,
    /// Timestamp of the first record, once seen.
    base: Option<(u32, u32)>,
    done: bool,
}

impl CaptureReader {
    /// Open a capture file for reading.
    ///
    /// Automatically detects and decompresses gzipped files.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let is_gzipped = is_gzip_file(path)?;

        let file = File::open(path).map_err(|_| {
            Error::Capture(CaptureError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;

        let reader: Box<dyn Read + Send> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Self::from_reader(reader)
    }

    /// Wrap an already-open byte stream.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self, Error> {
        let mut input = BufReader::with_capacity(BUFFER_SIZE, reader);

        let mut global = [0u8; GLOBAL_HEADER_LEN];
        let have = read_fully(&mut input, &mut global)?;
        if have < GLOBAL_HEADER_LEN {
            return Err(Error::Capture(CaptureError::TruncatedGlobalHeader { have }));
        }
        let header = CaptureHeader::parse(&global)?;

        Ok(Self {
            input,
            header,
            frame_number: 0,
            base: None,
            done: false,
        })
    }

    /// The capture's global header.
    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Number of frames produced so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read and decode the next frame. A short read of a record header or
    /// payload ends the sequence.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.done {
            return Ok(None);
        }

        let mut record = [0u8; RECORD_HEADER_LEN];
        if read_fully(&mut self.input, &mut record)? < RECORD_HEADER_LEN {
            self.done = true;
            return Ok(None);
        }

        let order = self.header.byte_order;
        let ts_sec = order.read_u32([record[0], record[1], record[2], record[3]]);
        let ts_frac = order.read_u32([record[4], record[5], record[6], record[7]]);
        let captured_len = order.read_u32([record[8], record[9], record[10], record[11]]);
        let original_len = order.read_u32([record[12], record[13], record[14], record[15]]);

        let mut data = vec![0u8; captured_len as usize];
        if read_fully(&mut self.input, &mut data)? < data.len() {
            self.done = true;
            return Ok(None);
        }

        let (base_sec, base_frac) = *self.base.get_or_insert((ts_sec, ts_frac));
        let time_s = (ts_sec as i64 - base_sec as i64) as f64
            + (ts_frac as i64 - base_frac as i64) as f64 * self.header.resolution.fraction_seconds();

        let layers = decode_layers(self.header.link_type, &data)?;

        self.frame_number += 1;
        Ok(Some(Frame {
            number: self.frame_number,
            ts_sec,
            ts_frac,
            time_s,
            captured_len,
            original_len,
            link: layers.link,
            network: layers.network,
            transport: layers.transport,
            payload: layers.payload,
        }))
    }
}

impl Iterator for CaptureReader {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read until the buffer is full or EOF; returns the bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Check if a file is gzipped by extension or magic bytes.
fn is_gzip_file<P: AsRef<Path>>(path: P) -> Result<bool, Error> {
    let path = path.as_ref();

    if let Some(filename) = path.file_name().and_then(|f| f.to_str()) {
        if filename.to_lowercase().ends_with(".gz") {
            return Ok(true);
        }
    }

    let mut file = File::open(path).map_err(|_| {
        Error::Capture(CaptureError::FileNotFound {
            path: path.display().to_string(),
        })
    })?;

    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(_) => Ok(false), // too short to be gzipped
    }
}
