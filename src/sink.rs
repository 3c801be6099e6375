// src/sink.rs

//! Unbuffered writer wrapper.
//!
//! Everything a job writes must become visible to the parent process as soon
//! as it is written. [`UnbufferedSink`] flushes the wrapped writer after every
//! write call, so a `BufWriter`/`LineWriter` underneath never holds bytes back.

use std::fmt;
use std::io::{self, Write};

/// A writer that flushes the underlying destination after every write.
///
/// Errors are never swallowed; they come straight from the wrapped writer.
#[derive(Debug)]
pub struct UnbufferedSink<W: Write> {
    inner: W,
}

impl<W: Write> UnbufferedSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write every line in order, then flush once.
    ///
    /// No separators are inserted.
    pub fn write_lines<I, S>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for line in lines {
            self.inner.write_all(line.as_ref())?;
        }
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for UnbufferedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.inner.flush()?;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.inner.flush()
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.inner.write_fmt(args)?;
        self.inner.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
