use std::collections::BTreeMap;

use anyhow::Result;
use bankhammer_bin::{Dated, alloc_buffer, init_logging_with_progress, load_config, save_json};
use bankhammer_core::classifier::{Verdict, VerificationFinding};
use bankhammer_core::memory::{ClockKind, PageMapTranslator, construct_memory_tuple_timer};
use bankhammer_core::util::{Rng, Size};
use bankhammer_core::{BankClassifier, BankId, BankMap, RoundRobin};
use clap::Parser;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

/// CLI arguments for the `classify` binary.
///
/// Partitions the rows of a buffer into banks by access timing, then re-measures random
/// pairs inside every bank.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// The bankhammer config file.
    #[clap(long = "config", default_value = "config/bankhammer.json")]
    config: String,
    /// The buffer size. Classification is quadratic in the number of rows.
    #[clap(long = "size", default_value = "8M")]
    #[serde(skip)]
    size: Size,
    /// Allocate the buffer from a 1 GB hugepage.
    #[clap(long = "hugepage")]
    hugepage: bool,
    /// Timestamp source (monotonic, cycles, counting_thread), overrides the config.
    #[clap(long = "clock")]
    clock: Option<ClockKind>,
    /// Random pairs re-measured per bank.
    #[clap(long = "verify", default_value = "10")]
    verify: usize,
    /// Seed for picking verification pairs.
    #[clap(long = "seed")]
    seed: Option<u64>,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyResults {
    args: CliArgs,
    seed: u64,
    population: BTreeMap<BankId, usize>,
    banks: BankMap,
    findings: Vec<VerificationFinding>,
}

fn main() -> Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let mut config = load_config(&args.config)?;
    if let Some(clock) = args.clock {
        config.clock = clock;
    }
    config.validate()?;

    let memory = alloc_buffer(args.size, args.hugepage)?;
    let translation = PageMapTranslator::new(&memory)?;
    let addresses = translation.strided_phys(config.row_size);
    let timer = construct_memory_tuple_timer(config.clock)?;

    let classifier = BankClassifier::new(
        timer.as_ref(),
        &translation,
        config.thresholds,
        config.samples,
        RoundRobin::new(config.num_banks),
    );
    let map = classifier.classify(&addresses, Some(&progress));
    let population = map.population();
    for (bank, count) in &population {
        println!("Bank {}: {} rows", bank, count);
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Verification seed: {}", seed);
    let mut rng = Rng::from_seed(seed);
    let findings = population
        .keys()
        .flat_map(|&bank| classifier.verify_bank(&map, bank, args.verify, &mut rng))
        .collect_vec();
    let counts = findings.iter().counts_by(|f| f.verdict);
    let confirmed = counts.get(&Verdict::Confirmed).copied().unwrap_or(0);
    println!("Verified {} of {} pairs", confirmed, findings.len());
    if confirmed < findings.len() {
        warn!(
            "{} ambiguous, {} contradicted",
            counts.get(&Verdict::Ambiguous).copied().unwrap_or(0),
            counts.get(&Verdict::Contradicted).copied().unwrap_or(0)
        );
    }

    if let Some(output_file) = &args.output {
        save_json(
            output_file,
            &Dated::now(ClassifyResults {
                args: args.clone(),
                seed,
                population,
                banks: map,
                findings,
            }),
        )?;
    }
    memory.dealloc();
    Ok(())
}
