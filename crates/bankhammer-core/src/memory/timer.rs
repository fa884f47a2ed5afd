use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory::{CacheMaintenance, NativeCache};
use crate::util::{
    CancelableJoinHandle, ROW_BUFFER_CONFLICT_LATENCY, ROW_BUFFER_HIT_LATENCY, spawn_cancelable,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source of timestamps for latency measurements.
pub trait Clock {
    /// Current timestamp. Only differences between two calls are meaningful.
    fn now(&self) -> u64;
}

/// `CLOCK_MONOTONIC` in nanoseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        (ts.tv_sec as u64)
            .wrapping_mul(1_000_000_000)
            .wrapping_add(ts.tv_nsec as u64)
    }
}

/// The native cycle counter (`rdtscp` on x86_64, `cntvct_el0` on aarch64).
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleCounter;

impl Clock for CycleCounter {
    #[cfg(target_arch = "x86_64")]
    fn now(&self) -> u64 {
        let mut aux = 0;
        unsafe { std::arch::x86_64::__rdtscp(&mut aux) }
    }

    #[cfg(target_arch = "aarch64")]
    fn now(&self) -> u64 {
        let val: u64;
        unsafe { std::arch::asm!("mrs {}, cntvct_el0", out(reg) val, options(nomem, nostack)) };
        val
    }
}

/// Errors of the counting thread clock.
#[derive(Debug, Error)]
pub enum ClockError {
    /// The counter thread could not be created
    #[error("Failed to spawn counter thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The counter thread panicked
    #[error("Counter thread panicked")]
    Join,
}

/// A clock driven by a thread that increments a shared counter in a tight loop.
///
/// The thread runs until [`CountingThreadClock::stop`] is called or the clock is dropped.
pub struct CountingThreadClock {
    counter: Arc<AtomicU64>,
    handle: Option<CancelableJoinHandle<()>>,
}

impl CountingThreadClock {
    /// Starts the counter thread.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Spawn`] if the thread cannot be created.
    pub fn new() -> Result<Self, ClockError> {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let handle = spawn_cancelable("counter", move |running| {
            while running.load(Ordering::Acquire) {
                // single writer
                c.store(c.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
            }
        })?;
        debug!("Counter thread running");
        Ok(CountingThreadClock {
            counter,
            handle: Some(handle),
        })
    }

    /// Stops and joins the counter thread.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Join`] if the thread panicked.
    pub fn stop(mut self) -> Result<(), ClockError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), ClockError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ClockError::Join),
            None => Ok(()),
        }
    }
}

impl Clock for CountingThreadClock {
    fn now(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Drop for CountingThreadClock {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            warn!("{}", e);
        }
    }
}

/// Selects the [`Clock`] behind a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// [`MonotonicClock`]
    #[default]
    Monotonic,
    /// [`CycleCounter`]
    Cycles,
    /// [`CountingThreadClock`]
    CountingThread,
}

impl ClockKind {
    /// Unit of the timestamps this clock produces.
    pub fn unit(&self) -> &'static str {
        match self {
            ClockKind::Monotonic => "NS",
            ClockKind::Cycles => "CYCLES",
            ClockKind::CountingThread => "TICKS",
        }
    }
}

impl Display for ClockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClockKind::Monotonic => "POSIX",
            ClockKind::Cycles => "CYCLE-COUNTER",
            ClockKind::CountingThread => "COUNTING-THREAD",
        };
        f.write_str(name)
    }
}

/// Unknown clock name.
#[derive(Debug, Error)]
#[error("Unknown clock '{0}', expected one of monotonic, cycles, counting_thread")]
pub struct ParseClockKindError(String);

impl FromStr for ClockKind {
    type Err = ParseClockKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "monotonic" | "posix" => Ok(ClockKind::Monotonic),
            "cycles" | "rdtsc" => Ok(ClockKind::Cycles),
            "counting_thread" | "pthread" => Ok(ClockKind::CountingThread),
            _ => Err(ParseClockKindError(s.to_string())),
        }
    }
}

/// Measures the latency of accessing two addresses back to back from DRAM.
pub trait MemoryTupleTimer {
    /// Average access time of `a` and `b` over `rounds` measurements.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for reads.
    unsafe fn time_subsequent_access_from_ram(
        &self,
        a: *const u8,
        b: *const u8,
        rounds: usize,
    ) -> u64;
}

/// Times uncached accesses to address pairs with a pluggable clock and cache backend.
pub struct TimingOracle<C, M> {
    clock: C,
    cache: M,
}

impl<C: Clock, M: CacheMaintenance> TimingOracle<C, M> {
    /// Creates an oracle from its clock and cache backend.
    pub fn new(clock: C, cache: M) -> Self {
        TimingOracle { clock, cache }
    }

    /// One measurement: evict both, fence, load `a` then `b`, fence.
    ///
    /// The difference is taken with wrapping arithmetic and never filtered.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for reads.
    pub unsafe fn measure(&self, a: *const u8, b: *const u8) -> u64 {
        self.cache.evict(a);
        self.cache.evict(b);
        self.cache.fence();
        let t1 = self.clock.now();
        unsafe {
            std::ptr::read_volatile(a);
            std::ptr::read_volatile(b);
        }
        self.cache.fence();
        let t2 = self.clock.now();
        t2.wrapping_sub(t1)
    }
}

impl<C: Clock, M: CacheMaintenance> MemoryTupleTimer for TimingOracle<C, M> {
    unsafe fn time_subsequent_access_from_ram(
        &self,
        a: *const u8,
        b: *const u8,
        rounds: usize,
    ) -> u64 {
        let rounds = rounds.max(1);
        let sum = (0..rounds).fold(0u64, |sum, _| {
            sum.wrapping_add(unsafe { self.measure(a, b) })
        });
        sum / rounds as u64
    }
}

/// Constructs a timer on the native cache backend with the given clock.
///
/// # Errors
///
/// Fails if the counting thread of [`ClockKind::CountingThread`] cannot be started.
pub fn construct_memory_tuple_timer(
    kind: ClockKind,
) -> Result<Box<dyn MemoryTupleTimer>, ClockError> {
    debug!("Using {} timer", kind);
    Ok(match kind {
        ClockKind::Monotonic => Box::new(TimingOracle::new(MonotonicClock, NativeCache::default())),
        ClockKind::Cycles => Box::new(TimingOracle::new(CycleCounter, NativeCache::default())),
        ClockKind::CountingThread => Box::new(TimingOracle::new(
            CountingThreadClock::new()?,
            NativeCache::default(),
        )),
    })
}

/// Classification of a pair latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatencyClass {
    /// Below the hit threshold: the pair shares an open row or lives in different banks
    Hit,
    /// Between the two thresholds
    Ambiguous,
    /// At or above the conflict threshold: same bank, different rows
    Conflict,
}

/// Row buffer hit and conflict latency thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Latencies below this value are hits
    pub hit: u64,
    /// Latencies at or above this value are conflicts
    pub conflict: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            hit: ROW_BUFFER_HIT_LATENCY,
            conflict: ROW_BUFFER_CONFLICT_LATENCY,
        }
    }
}

impl Thresholds {
    /// Classifies `latency`.
    pub fn classify(&self, latency: u64) -> LatencyClass {
        if latency >= self.conflict {
            LatencyClass::Conflict
        } else if latency < self.hit {
            LatencyClass::Hit
        } else {
            LatencyClass::Ambiguous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_conflict_boundary() {
        let t = Thresholds::default();
        assert_eq!(t.classify(ROW_BUFFER_CONFLICT_LATENCY), LatencyClass::Conflict);
        assert_eq!(t.classify(ROW_BUFFER_CONFLICT_LATENCY - 1), LatencyClass::Ambiguous);
        assert_eq!(t.classify(ROW_BUFFER_HIT_LATENCY), LatencyClass::Ambiguous);
        assert_eq!(t.classify(ROW_BUFFER_HIT_LATENCY - 1), LatencyClass::Hit);
        assert_eq!(t.classify(u64::MAX), LatencyClass::Conflict);
    }

    struct StepClock {
        ticks: Cell<u64>,
        step: u64,
    }

    impl Clock for StepClock {
        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t.wrapping_add(self.step));
            t
        }
    }

    #[derive(Default)]
    struct CountingCache {
        evictions: Cell<usize>,
        fences: Cell<usize>,
    }

    impl CacheMaintenance for &CountingCache {
        fn evict(&self, _addr: *const u8) {
            self.evictions.set(self.evictions.get() + 1);
        }
        fn fence(&self) {
            self.fences.set(self.fences.get() + 1);
        }
    }

    #[test]
    fn test_oracle_protocol() {
        let cache = CountingCache::default();
        let oracle = TimingOracle::new(
            StepClock {
                ticks: Cell::new(100),
                step: 42,
            },
            &cache,
        );
        let buf = [0u8; 128];
        let avg = unsafe { oracle.time_subsequent_access_from_ram(&buf[0], &buf[64], 10) };
        assert_eq!(avg, 42);
        assert_eq!(cache.evictions.get(), 20);
        assert_eq!(cache.fences.get(), 20);
    }

    #[test]
    fn test_oracle_wraps() {
        let oracle = TimingOracle::new(
            StepClock {
                ticks: Cell::new(u64::MAX - 5),
                step: 10,
            },
            NativeCache::default(),
        );
        let buf = [0u8; 128];
        assert_eq!(unsafe { oracle.measure(&buf[0], &buf[64]) }, 10);
    }

    #[test]
    fn test_counting_thread_advances() -> Result<(), ClockError> {
        let clock = CountingThreadClock::new()?;
        let start = clock.now();
        while clock.now() == start {
            std::hint::spin_loop();
        }
        assert!(clock.now() > start);
        clock.stop()
    }

    #[test]
    fn test_monotonic_clock() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_parse_clock_kind() {
        assert_eq!("monotonic".parse::<ClockKind>().ok(), Some(ClockKind::Monotonic));
        assert_eq!(
            "counting-thread".parse::<ClockKind>().ok(),
            Some(ClockKind::CountingThread)
        );
        assert!("sundial".parse::<ClockKind>().is_err());
    }
}
