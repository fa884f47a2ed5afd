//! Latency histogram used to pick the hit and conflict thresholds by hand.
use std::fmt::{self, Display, Formatter};
use std::io::Write;

use crate::memory::{BytePointer, ClockKind, MemoryTupleTimer};
use crate::util::named_bar;
use indicatif::MultiProgress;
use log::info;
use serde::Serialize;

/// Pair latencies bucketed with a fixed width, plus one overflow bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyHistogram {
    bucket_width: u64,
    buckets: Vec<u64>,
    overflow: u64,
}

impl LatencyHistogram {
    /// Creates an empty histogram of `num_buckets` buckets covering `[0, num_buckets * bucket_width)`.
    pub fn new(bucket_width: u64, num_buckets: usize) -> Self {
        assert!(bucket_width > 0, "bucket width must not be 0");
        LatencyHistogram {
            bucket_width,
            buckets: vec![0; num_buckets],
            overflow: 0,
        }
    }

    /// Counts one latency.
    pub fn record(&mut self, latency: u64) {
        let idx = latency / self.bucket_width;
        match usize::try_from(idx).ok().and_then(|i| self.buckets.get_mut(i)) {
            Some(count) => *count += 1,
            None => self.overflow += 1,
        }
    }

    /// Number of recorded latencies.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum::<u64>() + self.overflow
    }

    /// Bucket counts, lowest latencies first.
    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Number of latencies beyond the last bucket.
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Writes the histogram with a header naming the pair count, unit and timing method.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn write_report<W: Write + ?Sized>(&self, out: &mut W, clock: ClockKind) -> std::io::Result<()> {
        writeln!(out, "HEADER,HEADER")?;
        writeln!(out, "Total Number of pairs, {}", self.total())?;
        writeln!(out, "TABLESTART,TABLESTART")?;
        writeln!(out, "UNIT,{}", clock.unit())?;
        writeln!(out, "TIMING-METHOD,{}", clock)?;
        writeln!(out, "Timing-Unit,Number-of-Address-Pairs")?;
        write!(out, "{}", self)
    }
}

impl Display for LatencyHistogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, count) in self.buckets.iter().enumerate() {
            let low = i as u64 * self.bucket_width;
            writeln!(f, "[{}-{}),{:>15}", low, low + self.bucket_width, count)?;
        }
        writeln!(
            f,
            "[{}),{:>15}",
            self.buckets.len() as u64 * self.bucket_width,
            self.overflow
        )
    }
}

/// Measures the first row of `memory` against every other row and buckets the averages.
///
/// Each pair is averaged over `samples` measurements.
pub fn calibrate(
    memory: &dyn BytePointer,
    timer: &dyn MemoryTupleTimer,
    row_size: usize,
    samples: usize,
    histogram: &mut LatencyHistogram,
    progress: Option<&MultiProgress>,
) {
    let rows = memory.num_rows(row_size);
    let base = memory.ptr() as *const u8;
    info!("Timing {} row pairs", rows.saturating_sub(1));
    let bar = named_bar(progress, "Calibrating", rows.saturating_sub(1) as u64);
    for i in 1..rows {
        // SAFETY: both rows lie within `memory`
        let latency = unsafe {
            timer.time_subsequent_access_from_ram(base, memory.row(i, row_size), samples)
        };
        histogram.record(latency);
        bar.inc(1);
    }
    bar.finish_and_clear();
}
