//! Moving framed records from the temp store to the final output in
//! Hilbert order.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::{GeobinError, GeobinResult};
use crate::layer::FeatureItem;

/// Readable, seekable record source.
pub trait RecordSource: Read + Seek {}

impl<T: Read + Seek> RecordSource for T {}

/// Copies records from a temp store to the output.
pub trait CopyStrategy {
    /// Writes the records of `items`, in slice order, to `out`. Returns the
    /// number of bytes written.
    fn copy(
        &mut self,
        source: &mut dyn RecordSource,
        items: &[FeatureItem],
        out: &mut dyn Write,
    ) -> GeobinResult<u64>;

    fn name(&self) -> &'static str;
}

fn read_record_at(
    source: &mut dyn RecordSource,
    item: &FeatureItem,
    buf: &mut [u8],
) -> GeobinResult<()> {
    source.seek(SeekFrom::Start(item.temp_offset))?;
    source
        .read_exact(buf)
        .map_err(|e| GeobinError::from_read(e, "temporary feature record"))
}

/// One seek, read and write per record.
#[derive(Debug, Default)]
pub struct DirectCopy {
    buf: Vec<u8>,
}

impl DirectCopy {
    pub fn new() -> Self {
        DirectCopy::default()
    }
}

impl CopyStrategy for DirectCopy {
    fn copy(
        &mut self,
        source: &mut dyn RecordSource,
        items: &[FeatureItem],
        out: &mut dyn Write,
    ) -> GeobinResult<u64> {
        let mut written = 0u64;
        for item in items {
            if self.buf.len() < item.size {
                self.buf.resize(item.size, 0);
            }
            let buf = &mut self.buf[..item.size];
            read_record_at(source, item, buf)?;
            out.write_all(buf)?;
            written += item.size as u64;
        }
        Ok(written)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Fills a buffer with as many consecutive output records as fit, reading
/// them in ascending source order, then writes the buffer in one go.
#[derive(Debug)]
pub struct BatchedCopy {
    buffer_size: usize,
}

impl BatchedCopy {
    /// Buffer of `max(max_record, min(cap, temp_size))` bytes.
    pub fn new(cap: usize, max_record: usize, temp_size: u64) -> Self {
        let bounded = (temp_size.min(cap as u64)) as usize;
        BatchedCopy {
            buffer_size: bounded.max(max_record),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl CopyStrategy for BatchedCopy {
    fn copy(
        &mut self,
        source: &mut dyn RecordSource,
        items: &[FeatureItem],
        out: &mut dyn Write,
    ) -> GeobinResult<u64> {
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(self.buffer_size).map_err(|_| {
            GeobinError::OutOfMemory(format!("copy buffer of {} bytes", self.buffer_size))
        })?;

        let mut written = 0u64;
        let mut batches = 0usize;
        let mut start = 0usize;
        while start < items.len() {
            let mut end = start;
            let mut total = 0usize;
            while end < items.len() && (end == start || total + items[end].size <= self.buffer_size) {
                total += items[end].size;
                end += 1;
            }
            let batch = &items[start..end];

            // destination of each record inside the buffer
            let mut slots = Vec::with_capacity(batch.len());
            let mut at = 0usize;
            for (i, item) in batch.iter().enumerate() {
                slots.push((i, at));
                at += item.size;
            }
            slots.sort_by_key(|&(i, _)| batch[i].temp_offset);

            buf.clear();
            buf.resize(total, 0);
            for (i, at) in slots {
                let item = &batch[i];
                read_record_at(source, item, &mut buf[at..at + item.size])?;
            }
            out.write_all(&buf)?;

            written += total as u64;
            batches += 1;
            start = end;
        }
        log::debug!("copied {} records in {} batches", items.len(), batches);
        Ok(written)
    }

    fn name(&self) -> &'static str {
        "batched"
    }
}
