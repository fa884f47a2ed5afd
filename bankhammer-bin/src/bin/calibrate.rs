use anyhow::Result;
use bankhammer_bin::{Dated, alloc_buffer, init_logging_with_progress, load_config, save_json};
use bankhammer_core::calibrate::{LatencyHistogram, calibrate};
use bankhammer_core::memory::{ClockKind, construct_memory_tuple_timer};
use bankhammer_core::util::Size;
use clap::Parser;
use log::info;
use serde::Serialize;

/// CLI arguments for the `calibrate` binary.
///
/// Times the first row of the buffer against every other row and prints the latency histogram.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// The bankhammer config file.
    #[clap(long = "config", default_value = "config/bankhammer.json")]
    config: String,
    /// The buffer size.
    #[clap(long = "size", default_value = "64M")]
    #[serde(skip)]
    size: Size,
    /// Allocate the buffer from a 1 GB hugepage.
    #[clap(long = "hugepage")]
    hugepage: bool,
    /// Timestamp source (monotonic, cycles, counting_thread), overrides the config.
    #[clap(long = "clock")]
    clock: Option<ClockKind>,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct CalibrationResults {
    clock: ClockKind,
    unit: &'static str,
    histogram: LatencyHistogram,
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
    let timer = construct_memory_tuple_timer(config.clock)?;
    let mut histogram = LatencyHistogram::new(config.bucket_width, config.num_buckets);
    calibrate(
        &memory,
        timer.as_ref(),
        config.row_size,
        config.samples,
        &mut histogram,
        Some(&progress),
    );
    let stdout = std::io::stdout();
    histogram.write_report(&mut stdout.lock(), config.clock)?;

    if let Some(output_file) = &args.output {
        save_json(
            output_file,
            &Dated::now(CalibrationResults {
                clock: config.clock,
                unit: config.clock.unit(),
                histogram,
            }),
        )?;
    }
    memory.dealloc();
    Ok(())
}
