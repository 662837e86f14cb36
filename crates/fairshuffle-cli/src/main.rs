//! CLI for fairshuffle — audit your answer shuffles before your students do.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fairshuffle")]
#[command(about = "fairshuffle — deterministic answer shuffling with bias auditing")]
#[command(version = fairshuffle_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run seeded shuffles of a synthetic question and print the position tally
    Simulate {
        /// Shuffling strategy
        #[arg(long, default_value = "full_random", value_parser = ["full_random", "constrained_random", "block_random"])]
        strategy: String,

        /// Number of shuffles to simulate
        #[arg(long, default_value = "10000")]
        samples: usize,

        /// Options per question (2-5)
        #[arg(long, default_value = "4")]
        options: usize,

        /// Master seed (fresh random seed if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the tally and per-option statistics as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Run the permutation uniformity battery and strategy invariant checks
    Audit {
        /// Shuffles sampled per strategy
        #[arg(long, default_value = "5000")]
        samples: usize,

        /// Options per question (2-5)
        #[arg(long, default_value = "4")]
        options: usize,

        /// Audit a single strategy instead of all three
        #[arg(long, value_parser = ["full_random", "constrained_random", "block_random"])]
        strategy: Option<String>,

        /// Master seed (fresh random seed if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Write battery results as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Analyze accumulated stat rows for positional bias
    Analyze {
        /// Path to a JSON stat store
        stats: String,

        /// Chi-square significance threshold
        #[arg(long, default_value = "0.05")]
        significance: f64,

        /// Minimum bias score for flagging
        #[arg(long, default_value = "10.0")]
        min_bias_score: f64,

        /// Write the bias report as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Print a freshly generated master seed
    Seed,

    /// Start the HTTP admin server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8043")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Back the server with a JSON stat store (flushed on Ctrl-C)
        #[arg(long)]
        stats: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            strategy,
            samples,
            options,
            seed,
            output,
        } => commands::simulate::run(&strategy, samples, options, seed, output.as_deref()),
        Commands::Audit {
            samples,
            options,
            strategy,
            seed,
            output,
        } => commands::audit::run(samples, options, strategy.as_deref(), seed, output.as_deref()),
        Commands::Analyze {
            stats,
            significance,
            min_bias_score,
            output,
        } => commands::analyze::run(&stats, significance, min_bias_score, output.as_deref()),
        Commands::Seed => commands::seed::run(),
        Commands::Serve { port, host, stats } => {
            commands::serve::run(&host, port, stats.as_deref())
        }
    }
}
