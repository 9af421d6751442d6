use std::fs::File;
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};

/// Byte sink for a layer writer.
///
/// Seeking is optional. A writer without a spatial index uses it to rewrite
/// the header in place on close; indexed writers never seek the target.
pub trait WriteTarget: Write {
    fn supports_seek(&self) -> bool;

    /// Moves the write position to `pos` bytes from the start.
    fn seek_to(&mut self, pos: u64) -> io::Result<()>;
}

impl WriteTarget for File {
    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

impl WriteTarget for Cursor<Vec<u8>> {
    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.set_position(pos);
        Ok(())
    }
}

impl WriteTarget for Cursor<&mut Vec<u8>> {
    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.set_position(pos);
        Ok(())
    }
}

impl<W: Write + Seek> WriteTarget for BufWriter<W> {
    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

/// Wraps any `Write` as a forward-only target, e.g. a socket or stdout.
#[derive(Debug)]
pub struct Sequential<W>(pub W);

impl<W> Sequential<W> {
    pub fn new(inner: W) -> Self {
        Sequential(inner)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> Write for Sequential<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> WriteTarget for Sequential<W> {
    fn supports_seek(&self) -> bool {
        false
    }

    fn seek_to(&mut self, _pos: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sequential target cannot seek",
        ))
    }
}
