use crate::errors::{GeobinError, GeobinResult};

/// Smallest allocation of a [`FeatureBuffer`].
pub const MIN_FEATURE_BUFFER_SIZE: usize = 32 * 1024;

/// Reusable record buffer owned by a reader.
///
/// Grows geometrically and never shrinks. Growth uses fallible reservation
/// so a huge (but accepted) record length reports `OutOfMemory` instead of
/// aborting.
#[derive(Debug, Default)]
pub struct FeatureBuffer {
    data: Vec<u8>,
}

impl FeatureBuffer {
    pub fn new() -> Self {
        FeatureBuffer { data: Vec::new() }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Makes room for at least `len` bytes.
    pub fn ensure(&mut self, len: usize) -> GeobinResult<()> {
        if len <= self.data.len() {
            return Ok(());
        }
        let target = len
            .max(self.data.len().saturating_mul(2))
            .max(MIN_FEATURE_BUFFER_SIZE);
        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|_| GeobinError::OutOfMemory(format!("feature buffer of {} bytes", target)))?;
        self.data.resize(target, 0);
        Ok(())
    }

    /// First `len` bytes. `len` must not exceed the capacity.
    pub fn slice(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }

    pub fn slice_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.data[..len]
    }
}
