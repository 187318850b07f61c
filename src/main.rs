// Headless simulation: builds both control loops from config, drives them
// against a simulated observer and emits a JSON report.
mod cli;

use std::fs;
use std::io::Write;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use psychostair::config::AppConfig;
use psychostair::sim;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = cli::Args::parse();

    let mut cfg = AppConfig::load_or_default(&args.config);
    if let Some(trials) = args.trials {
        cfg.simulation.trials = trials;
    }
    if let Some(seed) = args.seed {
        cfg.simulation.seed = seed;
    }
    cfg.validate()?;

    if args.compile_only {
        let (estimator, controller) = cfg.build()?;
        info!(
            cells = estimator.cell_count(),
            alpha_candidates = estimator.grid().alpha().len(),
            catch_probability = controller.current_catch_probability(),
            "config ok"
        );
        return Ok(());
    }

    let mut report = sim::simulate(&cfg)?;
    if args.summary_only {
        report.log.clear();
    }
    let json = serde_json::to_string_pretty(&report)?;
    match args.out {
        Some(path) => {
            fs::write(&path, json)?;
            info!("report written to {path}");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    info!(
        catch_trials = report.catch_trials,
        false_alarms = report.false_alarms,
        unmatched = report.unmatched,
        final_catch_probability = report.final_catch_probability,
        "session summary"
    );
    Ok(())
}
