use std::cell::RefCell;

use bankhammer::classifier::Verdict;
use bankhammer::memory::{
    AddressTranslation, CacheMaintenance, DramGeometry, MemConfiguration, Memory,
    MemoryTupleTimer, PageMapTranslator, PhysAddr, Thresholds, XorSource,
};
use bankhammer::util::{AGGRESSOR_PATTERN, PAGE_SIZE, ROW_SIZE, Rng, VICTIM_PATTERN};
use bankhammer::{
    AggressorSelector, BankClassifier, HammerConfig, RoundRobin, Sweep, SweepConfig,
};
use bankhammer::hammerer::Hammering;
use bankhammer_double_sided::DoubleSided;
use rand::Rng as _;

const CONFIG_FILE: &str = "config/bankhammer.json";
const BASE: usize = 0x10000;
// geometry rows 1, 2 and 3
const PAGES: usize = 3 * 0x10000 / PAGE_SIZE;

#[repr(C, align(4096))]
#[derive(Clone)]
struct Page([u8; PAGE_SIZE]);

struct NoopCache;

impl CacheMaintenance for NoopCache {
    fn evict(&self, _addr: *const u8) {}
    fn fence(&self) {}
}

/// A heap buffer posing as physically contiguous memory starting at `BASE`.
fn stub_memory(pages: &mut [Page]) -> (Memory, PageMapTranslator) {
    let base = pages.as_mut_ptr() as *mut u8;
    let frames = (0..pages.len())
        .map(|p| PhysAddr::new(BASE + p * PAGE_SIZE))
        .collect();
    let translation = unsafe { PageMapTranslator::from_frames(base, frames) };
    (Memory::new(base, pages.len() * PAGE_SIZE), translation)
}

#[test]
fn test_select_and_hammer_stub_memory() -> anyhow::Result<()> {
    let mut pages = vec![Page([0; PAGE_SIZE]); PAGES];
    let (_memory, translation) = stub_memory(&mut pages);
    let mut rng = rand::rng();

    for xor_source in [XorSource::AddressLowBits, XorSource::RowLowBits] {
        let geometry = MemConfiguration {
            xor_source,
            ..Default::default()
        };
        let selector = AggressorSelector::new(&geometry, &translation, 10);
        let hammerer = DoubleSided::new(
            &translation,
            NoopCache,
            1000,
            ROW_SIZE,
            VICTIM_PATTERN,
            AGGRESSOR_PATTERN,
        );
        for _ in 0..16 {
            let victim = PhysAddr::new(0x20000 + rng.random_range(0..0x10000));
            let x = geometry.decompose(victim);
            let pair = selector.select(victim, 1)?;
            let above = geometry.decompose(pair.aggressors[0].phys);
            let below = geometry.decompose(pair.aggressors[1].phys);
            assert_eq!((above.row, above.bank, above.col), (x.row + 1, x.bank, x.col));
            assert_eq!((below.row, below.bank, below.col), (x.row - 1, x.bank, x.col));
            assert_eq!(translation.virt_to_phys(pair.aggressors[0].ptr), Some(pair.aggressors[0].phys));

            let flips = hammerer.hammer(&pair)?;
            assert!(flips.is_empty());
        }
    }
    Ok(())
}

#[test]
fn test_sweep_double_sided_stub_memory() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pages = vec![Page([0; PAGE_SIZE]); PAGES];
    let (memory, translation) = stub_memory(&mut pages);
    let config = HammerConfig {
        hammer_iterations: 10,
        ..Default::default()
    };
    let selector = AggressorSelector::new(&config.geometry, &translation, config.select_attempts);
    let hammerer = DoubleSided::new(
        &translation,
        NoopCache,
        config.hammer_iterations,
        config.row_size,
        config.victim_pattern,
        config.aggressor_pattern,
    );
    let sweep = Sweep::new(&selector, &hammerer, SweepConfig::from(&config), None);
    let mut out = Vec::new();
    let result = sweep.run(&memory, &translation, &mut out)?;

    // only the middle geometry row has both neighbours in the buffer
    assert_eq!(result.hammered, 0x10000 / ROW_SIZE);
    assert!(result.reports.is_empty());
    let text = String::from_utf8(out)?;
    assert!(text.contains("Row +1, -1"));
    assert!(!text.contains("Bit flips found"));
    Ok(())
}

#[test]
fn test_classifier_mock_timer() -> anyhow::Result<()> {
    struct TestTimer<'a> {
        callback: &'a dyn Fn((*const u8, *const u8)) -> u64,
        calls: RefCell<usize>,
    }

    impl MemoryTupleTimer for TestTimer<'_> {
        unsafe fn time_subsequent_access_from_ram(
            &self,
            a: *const u8,
            b: *const u8,
            _rounds: usize,
        ) -> u64 {
            *self.calls.borrow_mut() += 1;
            (self.callback)((a, b))
        }
    }

    let mut pages = vec![Page([0; PAGE_SIZE]); PAGES];
    let (_memory, translation) = stub_memory(&mut pages);
    let geometry = MemConfiguration::default();
    let thresholds = Thresholds::default();
    let timer = TestTimer {
        callback: &|(a, b)| {
            let a = geometry.decompose(translation.virt_to_phys(a).expect("mapped"));
            let b = geometry.decompose(translation.virt_to_phys(b).expect("mapped"));
            if a.bank == b.bank && a.row != b.row {
                thresholds.conflict + 100
            } else {
                thresholds.hit - 100
            }
        },
        calls: RefCell::new(0),
    };

    let addresses = translation.strided_phys(ROW_SIZE);
    let n = addresses.len();
    let classify = || {
        BankClassifier::new(&timer, &translation, thresholds, 10, RoundRobin::new(8))
            .classify(&addresses, None)
    };
    let first = classify();
    let second = classify();
    assert_eq!(first, second);
    assert_eq!(*timer.calls.borrow(), n * (n - 1));
    assert_eq!(first.len(), n);
    assert_eq!(first.population().values().sum::<usize>(), n);

    let classifier = BankClassifier::new(&timer, &translation, thresholds, 10, RoundRobin::new(8));
    let verify = |seed| {
        let mut rng = Rng::from_seed(seed);
        first
            .population()
            .keys()
            .flat_map(|&bank| classifier.verify_bank(&first, bank, 5, &mut rng))
            .collect::<Vec<_>>()
    };
    let findings = verify(42);
    assert_eq!(findings, verify(42));
    // the map is left untouched
    assert_eq!(first, second);
    for f in &findings {
        let expected = if geometry.decompose(f.a).bank == geometry.decompose(f.b).bank {
            Verdict::Confirmed
        } else {
            Verdict::Contradicted
        };
        assert_eq!(f.verdict, expected);
    }
    Ok(())
}

#[test]
fn test_config_file_matches_defaults() -> anyhow::Result<()> {
    let config = HammerConfig::from_jsonfile(CONFIG_FILE)?;
    assert_eq!(config, HammerConfig::default());
    Ok(())
}
