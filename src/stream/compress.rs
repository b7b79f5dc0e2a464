//! Transparent deflate compression around a sink or source.
//!
//! [`CompressionAdapter`] is a `Write` decorator: bytes written to it are
//! deflated (raw deflate, no zlib or gzip framing) before reaching the
//! wrapped sink. It is finalized either explicitly with
//! [`detach`](CompressionAdapter::detach), which reports errors, or on drop,
//! which flushes the remaining compressed data and ignores errors. The
//! compressed stream is therefore terminated on every exit path.
//!
//! [`DecompressionAdapter`] buffers its source and consumes it only up to
//! the end of the deflate stream, so whatever follows stays readable after
//! [`detach`](DecompressionAdapter::detach).

use std::io::{self, BufReader, Read, Write};

use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

/// Deflates everything written through it into the wrapped sink.
#[derive(Debug)]
pub struct CompressionAdapter<W: Write> {
    encoder: DeflateEncoder<W>,
}

impl<W: Write> CompressionAdapter<W> {
    /// Attaches to `sink` with the given compression level (0-9).
    pub fn attach(sink: W, level: u32) -> Self {
        Self {
            encoder: DeflateEncoder::new(sink, Compression::new(level.min(9))),
        }
    }

    /// Finishes the compressed stream and returns the sink.
    ///
    /// # Errors
    ///
    /// Propagates failures while writing the final compressed block.
    pub fn detach(self) -> io::Result<W> {
        let mut sink = self.encoder.finish()?;
        sink.flush()?;
        Ok(sink)
    }

    /// Number of uncompressed bytes accepted so far.
    #[must_use]
    pub fn total_in(&self) -> u64 {
        self.encoder.total_in()
    }
}

impl<W: Write> Write for CompressionAdapter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Inflates a raw deflate stream from the wrapped source.
#[derive(Debug)]
pub struct DecompressionAdapter<R: Read> {
    decoder: DeflateDecoder<BufReader<R>>,
}

impl<R: Read> DecompressionAdapter<R> {
    /// Attaches to `source`.
    pub fn attach(source: R) -> Self {
        Self {
            decoder: DeflateDecoder::new(BufReader::new(source)),
        }
    }

    /// Number of compressed bytes consumed so far.
    #[must_use]
    pub fn total_in(&self) -> u64 {
        self.decoder.total_in()
    }

    /// Returns the buffered source, positioned just past the compressed
    /// bytes consumed so far.
    pub fn detach(self) -> BufReader<R> {
        self.decoder.into_inner()
    }
}

impl<R: Read> Read for DecompressionAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}
