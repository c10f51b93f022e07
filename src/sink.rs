use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::error::Result;

/// Destination of exported bytes. Writers call `write` one or more times and flag exactly
/// the last call as final.
pub trait Sink {
    fn write(&mut self, bytes: &[u8], is_final: bool) -> Result<()>;
}

impl Sink for Vec<u8> {
    fn write(&mut self, bytes: &[u8], _is_final: bool) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

pub struct WriteSink<W: Write> {
    writer: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for WriteSink<W> {
    fn write(&mut self, bytes: &[u8], is_final: bool) -> Result<()> {
        self.writer.write_all(bytes)?;
        if is_final {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Gzip-compresses everything written, finishing the stream on the final call.
pub struct GzSink<W: Write> {
    encoder: Option<GzEncoder<W>>,
    inner: Option<W>,
}

impl<W: Write> GzSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            encoder: Some(GzEncoder::new(writer, Compression::best())),
            inner: None,
        }
    }

    /// The underlying writer, once the final chunk has been written.
    pub fn into_inner(self) -> Option<W> {
        self.inner
    }
}

impl<W: Write> Sink for GzSink<W> {
    fn write(&mut self, bytes: &[u8], is_final: bool) -> Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(std::io::Error::other("write after final chunk").into());
        };
        encoder.write_all(bytes)?;
        if is_final {
            if let Some(encoder) = self.encoder.take() {
                let mut inner = encoder.finish()?;
                inner.flush()?;
                self.inner = Some(inner);
            }
        }
        Ok(())
    }
}

/// Fixed-capacity staging buffer in front of a sink. Full buffers are passed on as
/// non-final writes; [`BufferedSink::finish`] passes on the remainder as the final one.
pub struct BufferedSink<'a, S: Sink + ?Sized> {
    sink: &'a mut S,
    buffer: Vec<u8>,
    capacity: usize,
    written: usize,
}

impl<'a, S: Sink + ?Sized> BufferedSink<'a, S> {
    /// `expected_size` bounds the allocation when the whole output is smaller than `capacity`.
    pub fn new(sink: &'a mut S, capacity: usize, expected_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(capacity.min(expected_size.max(1))),
            capacity,
            written: 0,
        }
    }

    pub fn write(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let room = self.capacity - self.buffer.len();
            let (head, tail) = bytes.split_at(room.min(bytes.len()));
            self.buffer.extend_from_slice(head);
            bytes = tail;
            if self.buffer.len() == self.capacity {
                self.sink.write(&self.buffer, false)?;
                self.written += self.buffer.len();
                self.buffer.clear();
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<usize> {
        self.sink.write(&self.buffer, true)?;
        Ok(self.written + self.buffer.len())
    }
}
