//! Little-endian scalar reads and writes.
//!
//! Every byte-order conversion in the crate goes through [`ByteReader`] and
//! [`ByteWriter`]. Reads are bounds-checked and report `CorruptData` with
//! the name of the field that ran past the end of the slice.

use crate::errors::{GeobinError, GeobinResult};

/// Cursor over an untrusted byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrows the next `len` bytes and advances past them.
    pub fn read_bytes(&mut self, len: usize, what: &str) -> GeobinResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(GeobinError::corrupt(format!(
                "{} needs {} bytes but only {} remain",
                what,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize, what: &str) -> GeobinResult<()> {
        self.read_bytes(len, what).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> GeobinResult<[u8; N]> {
        let bytes = self.read_bytes(N, what)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self, what: &str) -> GeobinResult<u8> {
        Ok(self.read_array::<1>(what)?[0])
    }

    pub fn read_i8(&mut self, what: &str) -> GeobinResult<i8> {
        Ok(i8::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_u16(&mut self, what: &str) -> GeobinResult<u16> {
        Ok(u16::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_i16(&mut self, what: &str) -> GeobinResult<i16> {
        Ok(i16::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_u32(&mut self, what: &str) -> GeobinResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_i32(&mut self, what: &str) -> GeobinResult<i32> {
        Ok(i32::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_u64(&mut self, what: &str) -> GeobinResult<u64> {
        Ok(u64::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_i64(&mut self, what: &str) -> GeobinResult<i64> {
        Ok(i64::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_f32(&mut self, what: &str) -> GeobinResult<f32> {
        Ok(f32::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_f64(&mut self, what: &str) -> GeobinResult<f64> {
        Ok(f64::from_le_bytes(self.read_array(what)?))
    }
}

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Overwrites four bytes at `pos` with `v`. `pos + 4` must not exceed
    /// the current length.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }
}

/// Decodes a `u32` from the first four bytes of `bytes`.
pub fn u32_at(bytes: &[u8], what: &str) -> GeobinResult<u32> {
    ByteReader::new(bytes).read_u32(what)
}
