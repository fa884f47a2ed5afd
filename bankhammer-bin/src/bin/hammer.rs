use anyhow::Result;
use bankhammer_bin::{alloc_buffer, init_logging_with_progress, load_config, save_json};
use bankhammer_core::memory::{NativeCache, PageMapTranslator};
use bankhammer_core::util::Size;
use bankhammer_core::{AggressorSelector, HammerConfig, Sweep, SweepConfig, SweepResult};
use bankhammer_double_sided::DoubleSided;
use clap::Parser;
use log::info;
use serde::Serialize;

/// CLI arguments for the `hammer` binary.
///
/// Sweeps every row of the buffer with double-sided Rowhammer and prints each flipping victim.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// The bankhammer config file.
    #[clap(long = "config", default_value = "config/bankhammer.json")]
    config: String,
    /// The buffer size, e.g. 64M or 1G.
    #[clap(long = "size", default_value = "64M")]
    #[serde(skip)]
    size: Size,
    /// Allocate the buffer from a 1 GB hugepage.
    #[clap(long = "hugepage")]
    hugepage: bool,
    /// Aggressor activations per hammering round, overrides the config.
    #[clap(long = "iterations")]
    iterations: Option<u64>,
    /// Row distances to sweep, overrides the config.
    #[clap(long = "row-offset")]
    row_offsets: Vec<usize>,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct HammerResults<'a> {
    args: &'a CliArgs,
    config: &'a HammerConfig,
    sweep: &'a SweepResult,
}

fn main() -> Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let mut config = load_config(&args.config)?;
    if let Some(iterations) = args.iterations {
        config.hammer_iterations = iterations;
    }
    if !args.row_offsets.is_empty() {
        config.row_offsets = args.row_offsets.clone();
    }
    config.validate()?;

    let memory = alloc_buffer(args.size, args.hugepage)?;
    let translation = PageMapTranslator::new(&memory)?;
    info!("Translated {} pages", translation.len());

    let selector = AggressorSelector::new(&config.geometry, &translation, config.select_attempts);
    let hammerer = DoubleSided::new(
        &translation,
        NativeCache::default(),
        config.hammer_iterations,
        config.row_size,
        config.victim_pattern,
        config.aggressor_pattern,
    );
    let sweep = Sweep::new(
        &selector,
        &hammerer,
        SweepConfig::from(&config),
        Some(progress),
    );
    let stdout = std::io::stdout();
    let result = sweep.run(&memory, &translation, &mut stdout.lock())?;

    if let Some(output_file) = &args.output {
        save_json(
            output_file,
            &HammerResults {
                args: &args,
                config: &config,
                sweep: &result,
            },
        )?;
    }
    memory.dealloc();
    Ok(())
}
