//! Sweeps a buffer row by row, hammering every victim whose aggressors can be selected.
use std::io::Write;

use crate::aggressor::{AggressorPair, AggressorSelector};
use crate::config::HammerConfig;
use crate::hammerer::Hammering;
use crate::memory::{AddressTranslation, BitFlip, BytePointer, PhysAddr};
use crate::util::{PHYS_ADDR_BITS, named_bar, to_binary};
use indicatif::MultiProgress;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

const SEPARATOR: &str = "=========================================================";

/// Sweep parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Row size in bytes, the stride between victims
    pub row_size: usize,
    /// Row distances, one pass over the buffer each
    pub row_offsets: Vec<usize>,
    /// Additional rounds on a pair after it flipped
    pub reproductions: usize,
}

impl From<&HammerConfig> for SweepConfig {
    fn from(config: &HammerConfig) -> Self {
        SweepConfig {
            row_size: config.row_size,
            row_offsets: config.row_offsets.clone(),
            reproductions: config.reproductions,
        }
    }
}

/// One hammering round on a pair.
#[derive(Debug, Clone, Serialize)]
pub struct Trial {
    /// Number of victim bytes that differed from the victim pattern
    pub flip_count: usize,
    /// The differing bytes
    pub bit_flips: Vec<BitFlip>,
}

impl From<Vec<BitFlip>> for Trial {
    fn from(bit_flips: Vec<BitFlip>) -> Self {
        Trial {
            flip_count: bit_flips.len(),
            bit_flips,
        }
    }
}

/// A victim that flipped, with every trial run on it.
#[derive(Debug, Clone, Serialize)]
pub struct FlipReport {
    /// Victim address
    pub victim: PhysAddr,
    /// Aggressors at `+row_offset` and `-row_offset`
    pub aggressors: [PhysAddr; 2],
    /// Row distance between victim and aggressors
    pub row_offset: usize,
    /// The first trial followed by the reproductions
    pub trials: Vec<Trial>,
}

impl FlipReport {
    fn new(pair: &AggressorPair, first: Trial) -> Self {
        FlipReport {
            victim: pair.victim.phys,
            aggressors: [pair.aggressors[0].phys, pair.aggressors[1].phys],
            row_offset: pair.row_offset,
            trials: vec![first],
        }
    }

    /// Prints the addresses of this report and the flip count of trial `idx`.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn write_trial<W: Write + ?Sized>(&self, out: &mut W, idx: usize) -> std::io::Result<()> {
        let line = |name: &str, addr: PhysAddr| {
            format!(
                "{}: {}\t{} (phys)",
                name,
                to_binary(addr.into(), PHYS_ADDR_BITS),
                addr.as_usize()
            )
        };
        writeln!(out, "{}", line("victim", self.victim))?;
        writeln!(out, "{}", line("attacker 1", self.aggressors[0]))?;
        writeln!(out, "{}", line("attacker 2", self.aggressors[1]))?;
        writeln!(
            out,
            "Bit flips found: {}",
            self.trials.get(idx).map_or(0, |t| t.flip_count)
        )
    }
}

/// Errors that end a sweep.
#[derive(Debug, Error)]
pub enum SweepError<E: std::error::Error> {
    /// The report could not be written
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The hammerer failed
    #[error("Hammering failed: {0}")]
    Hammering(E),
}

/// Outcome of a sweep.
#[derive(Debug, Serialize)]
pub struct SweepResult {
    /// ISO 8601 timestamp of when the sweep finished
    pub date: String,
    /// Row distances swept
    pub row_offsets: Vec<usize>,
    /// Number of victims hammered
    pub hammered: usize,
    /// Number of victims skipped because no aggressors could be selected
    pub skipped: usize,
    /// Victims that flipped
    pub reports: Vec<FlipReport>,
}

/// Drives selection and hammering over every row of a buffer.
pub struct Sweep<'a, H> {
    selector: &'a AggressorSelector<'a>,
    hammerer: &'a H,
    config: SweepConfig,
    progress: Option<MultiProgress>,
}

impl<'a, H: Hammering> Sweep<'a, H> {
    /// Creates a sweep.
    pub fn new(
        selector: &'a AggressorSelector<'a>,
        hammerer: &'a H,
        config: SweepConfig,
        progress: Option<MultiProgress>,
    ) -> Self {
        Sweep {
            selector,
            hammerer,
            config,
            progress,
        }
    }

    fn hammer(&self, pair: &AggressorPair) -> Result<Trial, SweepError<H::Error>> {
        self.hammerer
            .hammer(pair)
            .map(Trial::from)
            .map_err(SweepError::Hammering)
    }

    /// Runs one pass per row offset over `memory` and prints a block for every flipping victim.
    ///
    /// For offset `k` the victims are rows `k..rows - k` of the buffer. Victims without
    /// selectable aggressors are skipped. A victim that flips is hammered again
    /// `reproductions` times and each trial is printed.
    ///
    /// # Errors
    ///
    /// Fails if `out` cannot be written or the hammerer fails.
    pub fn run<W: Write + ?Sized>(
        &self,
        memory: &dyn BytePointer,
        translation: &dyn AddressTranslation,
        out: &mut W,
    ) -> Result<SweepResult, SweepError<H::Error>> {
        let rows = memory.num_rows(self.config.row_size);
        let mut hammered = 0;
        let mut skipped = 0;
        let mut reports = vec![];
        for &offset in &self.config.row_offsets {
            writeln!(out, "{}", SEPARATOR)?;
            writeln!(out, "Row +{}, -{}", offset, offset)?;
            writeln!(out, "{}", SEPARATOR)?;

            let victims = offset..rows.saturating_sub(offset);
            let bar = named_bar(
                self.progress.as_ref(),
                &format!("Row +/-{}", offset),
                victims.len() as u64,
            );
            for i in victims {
                bar.inc(1);
                let Some(victim) = translation.virt_to_phys(memory.row(i, self.config.row_size))
                else {
                    debug!("Row {} has no physical frame", i);
                    skipped += 1;
                    continue;
                };
                let pair = match self.selector.select(victim, offset) {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!("Skipping victim {}: {}", victim, e);
                        skipped += 1;
                        continue;
                    }
                };
                hammered += 1;
                let trial = self.hammer(&pair)?;
                if trial.flip_count == 0 {
                    continue;
                }
                info!("{} flips in {}", trial.flip_count, pair);
                let mut report = FlipReport::new(&pair, trial);
                writeln!(out, "{}", SEPARATOR)?;
                report.write_trial(out, 0)?;
                for r in 0..self.config.reproductions {
                    if r == 0 {
                        writeln!(out, "Bit Flips Found. Reproducing Bit Flips.")?;
                    } else {
                        writeln!(out, "Try again? Reproducing Bit Flips.")?;
                    }
                    report.trials.push(self.hammer(&pair)?);
                    report.write_trial(out, r + 1)?;
                }
                writeln!(out, "{}", SEPARATOR)?;
                reports.push(report);
            }
            bar.finish_and_clear();
        }
        info!(
            "Hammered {} victims, skipped {}, {} flipped",
            hammered,
            skipped,
            reports.len()
        );
        Ok(SweepResult {
            date: chrono::Local::now().to_rfc3339(),
            row_offsets: self.config.row_offsets.clone(),
            hammered,
            skipped,
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hammerer::Never;
    use crate::memory::{MemConfiguration, Memory, PageMapTranslator};
    use crate::util::{PAGE_SIZE, ROW_SIZE};
    use std::cell::Cell;

    const ROWS: usize = 32;
    const PAGES: usize = ROWS * ROW_SIZE / PAGE_SIZE;

    #[repr(C, align(4096))]
    #[derive(Clone)]
    struct Page([u8; PAGE_SIZE]);

    /// Reports one flip whenever the victim is `target`.
    struct TargetHammerer {
        target: PhysAddr,
        calls: Cell<usize>,
    }

    impl Hammering for TargetHammerer {
        type Error = Never;
        fn hammer(&self, pair: &AggressorPair) -> Result<Vec<BitFlip>, Never> {
            self.calls.set(self.calls.get() + 1);
            if pair.victim.phys == self.target {
                Ok(vec![BitFlip::new(pair.victim.ptr, 0x01, 0x55)])
            } else {
                Ok(vec![])
            }
        }
    }

    #[test]
    fn test_sweep_reports_and_skips() {
        let mut pages = vec![Page([0; PAGE_SIZE]); PAGES];
        let base = pages.as_mut_ptr() as *mut u8;
        // physically contiguous from 0x10000, i.e. geometry rows 1 to 4
        let frames = (0..PAGES)
            .map(|p| PhysAddr::new(0x10000 + p * PAGE_SIZE))
            .collect();
        let translation = unsafe { PageMapTranslator::from_frames(base, frames) };
        let memory = Memory::new(base, PAGES * PAGE_SIZE);
        let geometry = MemConfiguration::default();
        let selector = AggressorSelector::new(&geometry, &translation, 3);
        let target = PhysAddr::new(0x10000 + 10 * ROW_SIZE);
        let hammerer = TargetHammerer {
            target,
            calls: Cell::new(0),
        };
        let config = SweepConfig {
            row_size: ROW_SIZE,
            row_offsets: vec![1, 2],
            reproductions: 2,
        };
        let sweep = Sweep::new(&selector, &hammerer, config, None);
        let mut out = Vec::new();
        let result = sweep.run(&memory, &translation, &mut out).expect("sweep");

        // offset 1: victims in geometry rows 2 and 3 have both neighbours
        assert_eq!(result.hammered, 16);
        assert_eq!(result.skipped, (ROWS - 2 - 16) + (ROWS - 4));
        assert_eq!(hammerer.calls.get(), 16 + 2);
        assert_eq!(result.reports.len(), 1);
        let report = &result.reports[0];
        assert_eq!(report.victim, target);
        assert_eq!(report.row_offset, 1);
        assert_eq!(report.trials.len(), 3);
        assert_eq!(report.aggressors[0] - target, 0x10000);
        assert_eq!(target - report.aggressors[1], 0x10000);

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Row +1, -1"));
        assert!(text.contains("Row +2, -2"));
        assert_eq!(text.matches("Bit flips found: 1").count(), 3);
        assert!(text.contains("Bit Flips Found. Reproducing Bit Flips."));
        assert!(text.contains("Try again? Reproducing Bit Flips."));
        assert!(text.contains(&format!(
            "victim: {}\t{} (phys)",
            to_binary(target.into(), PHYS_ADDR_BITS),
            target.as_usize()
        )));
    }

    #[test]
    fn test_report_format() {
        let report = FlipReport {
            victim: PhysAddr::new(5),
            aggressors: [PhysAddr::new(6), PhysAddr::new(4)],
            row_offset: 1,
            trials: vec![Trial::from(vec![])],
        };
        let mut out = Vec::new();
        report.write_trial(&mut out, 0).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let zeros = "0".repeat(PHYS_ADDR_BITS - 3);
        assert_eq!(
            text,
            format!(
                "victim: {z}101\t5 (phys)\nattacker 1: {z}110\t6 (phys)\nattacker 2: {z}100\t4 (phys)\nBit flips found: 0\n",
                z = zeros
            )
        );
    }
}
