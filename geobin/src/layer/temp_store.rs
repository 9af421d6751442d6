use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::GeobinResult;
use crate::layer::options::TempStoreKind;

/// Scratch storage for the records of an indexed layer.
///
/// The file variant is created with [`tempfile::tempfile`], which unlinks
/// it immediately, so it disappears with the handle.
#[derive(Debug)]
pub enum TempStore {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl TempStore {
    pub fn create(kind: TempStoreKind, dir: Option<&Path>) -> GeobinResult<TempStore> {
        let store = match kind {
            TempStoreKind::Memory => TempStore::Memory(Cursor::new(Vec::new())),
            TempStoreKind::File => {
                let file = match dir {
                    Some(dir) => tempfile::tempfile_in(dir)?,
                    None => tempfile::tempfile()?,
                };
                TempStore::File(file)
            }
        };
        log::debug!("created {:?} temp store", kind);
        Ok(store)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, TempStore::Memory(_))
    }
}

impl Read for TempStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TempStore::File(f) => f.read(buf),
            TempStore::Memory(c) => c.read(buf),
        }
    }
}

impl Write for TempStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TempStore::File(f) => f.write(buf),
            TempStore::Memory(c) => c.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TempStore::File(f) => f.flush(),
            TempStore::Memory(c) => c.flush(),
        }
    }
}

impl Seek for TempStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            TempStore::File(f) => f.seek(pos),
            TempStore::Memory(c) => c.seek(pos),
        }
    }
}
