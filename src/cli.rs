use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML (written with commented defaults if missing)
    #[arg(long, default_value = "psychostair.toml")]
    pub config: String,

    /// Number of simulated trials (overrides config)
    #[arg(long)]
    pub trials: Option<usize>,

    /// RNG seed for the simulated session (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    pub out: Option<String>,

    /// Drop the per-trial log from the report
    #[arg(long, default_value_t = false)]
    pub summary_only: bool,

    /// Validate the config and build both loops, then exit
    #[arg(long, default_value_t = false)]
    pub compile_only: bool,
}
