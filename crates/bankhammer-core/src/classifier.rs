//! Timing based partitioning of physical rows into banks.
//!
//! Bank ids are relative: bank 0 is whatever the lowest address ended up in. The
//! classification is a single greedy pass and is not statistically robust.
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use crate::memory::{AddressTranslation, LatencyClass, MemoryTupleTimer, PhysAddr, Thresholds};
use crate::util::{GroupBy, Rng, named_bar};
use indicatif::MultiProgress;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

/// A bank id in `0..num_banks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BankId(pub usize);

impl Display for BankId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a classification run: one bank per probed address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BankMap {
    banks: BTreeMap<PhysAddr, BankId>,
}

impl BankMap {
    /// Bank of `addr`, if it was classified.
    pub fn bank_of(&self, addr: PhysAddr) -> Option<BankId> {
        self.banks.get(&addr).copied()
    }

    /// Number of classified addresses.
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Returns true if no address was classified.
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Iterates over (address, bank) in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (PhysAddr, BankId)> + '_ {
        self.banks.iter().map(|(&addr, &bank)| (addr, bank))
    }

    /// The inverse view: addresses of every non-empty bank, ascending.
    pub fn by_bank(&self) -> BTreeMap<BankId, Vec<PhysAddr>> {
        GroupBy::group_by(self.iter(), |&(_, bank)| bank)
            .into_iter()
            .map(|(bank, entries)| (bank, entries.into_iter().map(|(addr, _)| addr).collect()))
            .collect()
    }

    /// Number of addresses in every non-empty bank.
    pub fn population(&self) -> BTreeMap<BankId, usize> {
        self.banks.values().copied().counts().into_iter().collect()
    }
}

impl FromIterator<(PhysAddr, BankId)> for BankMap {
    fn from_iter<T: IntoIterator<Item = (PhysAddr, BankId)>>(iter: T) -> Self {
        BankMap {
            banks: iter.into_iter().collect(),
        }
    }
}

/// Decides the bank of the later address of a pair that did not conflict.
///
/// The rule only spreads non-conflicting rows over the bank ids. It is a
/// heuristic and carries no guarantee that the result matches the hardware.
pub trait BankAssignmentPolicy {
    /// New bank for an address currently tentatively in `current`.
    fn reassign(&self, current: BankId) -> BankId;
}

/// Moves the address on to the next bank id, wrapping at `num_banks`.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobin {
    num_banks: usize,
}

impl RoundRobin {
    /// Creates the policy. `num_banks` must not be 0.
    pub fn new(num_banks: usize) -> Self {
        assert!(num_banks > 0, "need at least one bank");
        RoundRobin { num_banks }
    }
}

impl BankAssignmentPolicy for RoundRobin {
    fn reassign(&self, current: BankId) -> BankId {
        BankId((current.0 + 1) % self.num_banks)
    }
}

/// Outcome of one sampled pair during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    /// Conflict latency, consistent with a shared bank
    Confirmed,
    /// Latency between the hit and the conflict threshold
    Ambiguous,
    /// Hit latency, contradicting a shared bank
    Contradicted,
}

impl From<LatencyClass> for Verdict {
    fn from(class: LatencyClass) -> Self {
        match class {
            LatencyClass::Conflict => Verdict::Confirmed,
            LatencyClass::Ambiguous => Verdict::Ambiguous,
            LatencyClass::Hit => Verdict::Contradicted,
        }
    }
}

/// One sampled pair of the verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationFinding {
    /// First address
    pub a: PhysAddr,
    /// Second address
    pub b: PhysAddr,
    /// Averaged latency
    pub latency: u64,
    /// Classification of the latency
    pub verdict: Verdict,
}

/// Partitions addresses into banks from pairwise access latencies.
pub struct BankClassifier<'a, P = RoundRobin> {
    timer: &'a dyn MemoryTupleTimer,
    translation: &'a dyn AddressTranslation,
    thresholds: Thresholds,
    samples: usize,
    policy: P,
}

impl<'a, P: BankAssignmentPolicy> BankClassifier<'a, P> {
    /// Creates a classifier measuring with `timer` on addresses resolved by `translation`.
    pub fn new(
        timer: &'a dyn MemoryTupleTimer,
        translation: &'a dyn AddressTranslation,
        thresholds: Thresholds,
        samples: usize,
        policy: P,
    ) -> Self {
        BankClassifier {
            timer,
            translation,
            thresholds,
            samples,
            policy,
        }
    }

    fn latency(&self, a: *mut u8, b: *mut u8) -> u64 {
        // SAFETY: both pointers come from `self.translation`
        unsafe {
            self.timer
                .time_subsequent_access_from_ram(a, b, self.samples)
        }
    }

    /// Classifies `addresses` with one pairwise pass in ascending address order.
    ///
    /// Every address starts in bank 0. For each pair `i < j` a conflict moves `j` into the
    /// bank `i` currently has, anything else lets the policy pick a new bank for `j`. Later
    /// pairs overwrite earlier decisions. This takes O(n²) measurements.
    ///
    /// Addresses without a virtual mapping keep bank 0 and take part in no pair.
    pub fn classify(&self, addresses: &[PhysAddr], progress: Option<&MultiProgress>) -> BankMap {
        let addrs = addresses.iter().copied().sorted().dedup().collect_vec();
        let virt = addrs
            .iter()
            .map(|&addr| {
                let v = self.translation.phys_to_virt(addr);
                if v.is_none() {
                    warn!("{} has no virtual mapping, leaving it in bank 0", addr);
                }
                v
            })
            .collect_vec();
        let mut banks = vec![BankId(0); addrs.len()];

        let n = addrs.len() as u64;
        let bar = named_bar(progress, "Classifying pairs", n * n.saturating_sub(1) / 2);
        info!("Classifying {} addresses", addrs.len());
        for (i, j) in (0..addrs.len()).tuple_combinations() {
            bar.inc(1);
            let (Some(a), Some(b)) = (virt[i], virt[j]) else {
                continue;
            };
            let latency = self.latency(a, b);
            banks[j] = match self.thresholds.classify(latency) {
                LatencyClass::Conflict => banks[i],
                _ => self.policy.reassign(banks[j]),
            };
        }
        bar.finish_and_clear();

        addrs.into_iter().zip(banks).collect()
    }

    /// Samples `samples` random pairs of distinct addresses from `bank` and re-measures them.
    ///
    /// Pairs that are not conflicts are logged. The map itself is never changed.
    pub fn verify_bank(
        &self,
        map: &BankMap,
        bank: BankId,
        samples: usize,
        rng: &mut Rng,
    ) -> Vec<VerificationFinding> {
        let members = map.by_bank().remove(&bank).unwrap_or_default();
        let mut findings = Vec::with_capacity(samples);
        for _ in 0..samples {
            let Some((i, j)) = rng.distinct_pair(members.len()) else {
                debug!("Bank {} has fewer than two members, nothing to verify", bank);
                break;
            };
            let (a, b) = (members[i], members[j]);
            let (Some(va), Some(vb)) = (
                self.translation.phys_to_virt(a),
                self.translation.phys_to_virt(b),
            ) else {
                debug!("Skipping unmapped pair ({}, {})", a, b);
                continue;
            };
            let latency = self.latency(va, vb);
            let verdict = Verdict::from(self.thresholds.classify(latency));
            match verdict {
                Verdict::Confirmed => {
                    debug!("A: {}, B: {}, latency {}: same bank", a, b, latency)
                }
                Verdict::Ambiguous => warn!(
                    "A: {}, B: {}, latency {}: ambiguous despite being classified into bank {}",
                    a, b, latency, bank
                ),
                Verdict::Contradicted => warn!(
                    "A: {}, B: {}, latency {}: row buffer hit despite being classified into bank {}",
                    a, b, latency, bank
                ),
            }
            findings.push(VerificationFinding {
                a,
                b,
                latency,
                verdict,
            });
        }
        findings
    }
}
