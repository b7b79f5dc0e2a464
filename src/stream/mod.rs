//! Fixed-width scalar and length-prefixed string primitives.
//!
//! All integers are little-endian. Short strings (names) carry a one-byte
//! length prefix, long strings (values) a four-byte one. [`BinaryWriter`]
//! and [`BinaryReader`] wrap any `Write` / `Read` and keep a running byte
//! count so errors can point at an offset.
//!
//! Length policy (reject or truncate) is not decided here; the encoder
//! checks lengths before calling in.

pub mod compress;

pub use compress::{CompressionAdapter, DecompressionAdapter};

use std::io::{self, ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{DecodeError, DecodeErrorKind, FieldClass};

/// Longest string a one-byte length prefix can describe.
pub const MAX_SHORT_STRING_LENGTH: usize = u8::MAX as usize;

/// Writes scalars and strings to an underlying sink.
#[derive(Debug)]
pub struct BinaryWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> BinaryWriter<W> {
    /// Wraps a sink.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Returns the number of bytes written through this writer.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Unwraps the sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes a `u32`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn write_u32(&mut self, n: u32) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(n)?;
        self.written += 4;
        Ok(())
    }

    /// Writes a boolean as a single `0` or `1` byte.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn write_bool(&mut self, b: bool) -> io::Result<()> {
        self.inner.write_u8(u8::from(b))?;
        self.written += 1;
        Ok(())
    }

    /// Writes a short string: `u8` length, then the UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the string is longer than
    /// [`MAX_SHORT_STRING_LENGTH`] bytes, or propagates sink failures.
    pub fn write_string(&mut self, s: &str) -> io::Result<()> {
        let len = u8::try_from(s.len()).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("short string of {} bytes", s.len()),
            )
        })?;
        self.inner.write_u8(len)?;
        self.inner.write_all(s.as_bytes())?;
        self.written += 1 + u64::from(len);
        Ok(())
    }

    /// Writes a long string: `u32` length, then the UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the length does not fit in a `u32`, or
    /// propagates sink failures.
    pub fn write_long_string(&mut self, s: &str) -> io::Result<()> {
        let len = u32::try_from(s.len()).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("long string of {} bytes", s.len()),
            )
        })?;
        self.write_u32(len)?;
        self.inner.write_all(s.as_bytes())?;
        self.written += u64::from(len);
        Ok(())
    }

    /// Flushes the sink.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads scalars and strings from an underlying source.
#[derive(Debug)]
pub struct BinaryReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> BinaryReader<R> {
    /// Wraps a source.
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Returns the number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Unwraps the source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Builds an error located at the current position.
    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.pos)
    }

    fn io_error(&self, err: io::Error) -> DecodeError {
        if err.kind() == ErrorKind::UnexpectedEof {
            self.error(DecodeErrorKind::UnexpectedEof)
        } else {
            self.error(DecodeErrorKind::Io(err))
        }
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails on end of input or source failure.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let b = self.inner.read_u8().map_err(|e| self.io_error(e))?;
        self.pos += 1;
        Ok(b)
    }

    /// Reads a `u32`.
    ///
    /// # Errors
    ///
    /// Fails on end of input or source failure.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let n = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|e| self.io_error(e))?;
        self.pos += 4;
        Ok(n)
    }

    /// Reads a boolean byte, which must be `0` or `1`.
    ///
    /// # Errors
    ///
    /// Fails on end of input, source failure, or any other byte value.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::new(
                DecodeErrorKind::InvalidBool(other),
                self.pos - 1,
            )),
        }
    }

    /// Reads a short string.
    ///
    /// # Errors
    ///
    /// Fails on end of input, source failure, or invalid UTF-8.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u8()?;
        self.read_utf8(usize::from(len))
    }

    /// Reads a long string whose length may not exceed `max`.
    ///
    /// The length is checked before any allocation.
    ///
    /// # Errors
    ///
    /// Fails on end of input, source failure, invalid UTF-8, or a declared
    /// length above `max`.
    pub fn read_long_string(&mut self, max: usize, class: FieldClass) -> Result<String, DecodeError> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(DecodeError::new(
                DecodeErrorKind::ValueTooLong { class, len, max },
                start,
            ));
        }
        self.read_utf8(len)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String, DecodeError> {
        let start = self.pos;
        let mut buf = vec![0; len];
        self.inner.read_exact(&mut buf).map_err(|e| self.io_error(e))?;
        self.pos += len as u64;
        String::from_utf8(buf).map_err(|_| DecodeError::new(DecodeErrorKind::InvalidUtf8, start))
    }

    /// Returns `true` if the source has no more bytes.
    ///
    /// Consumes one byte if there is one, so only call this once decoding is
    /// otherwise finished.
    ///
    /// # Errors
    ///
    /// Propagates source failures.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.io_error(e)),
            }
        }
    }
}
