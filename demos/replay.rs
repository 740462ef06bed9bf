//! Replays workload traces and prints how well the heap used its memory.
//!
//! ```text
//! cargo run --example replay -- [--compact] demos/traces/*.rep
//! ```

use std::{error::Error, fs, path::PathBuf};

use clap::Parser;
use segalloc::{Config, Heap, trace::Trace};

/// Replay allocator workload traces.
#[derive(Debug, Parser)]
#[command(name = "replay")]
#[command(about = "Replays workload traces and reports heap utilization")]
struct Cli {
    /// Use the compact policy instead of the default one.
    #[arg(long)]
    compact: bool,
    /// Trace files to replay.
    #[arg(required = true)]
    traces: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = if cli.compact {
        Config::compact()
    } else {
        Config::default()
    };

    for path in &cli.traces {
        let trace: Trace = fs::read_to_string(path)?.parse()?;
        let mut heap = Heap::mapped(config.clone())?;
        let stats = trace.replay_checked(&mut heap)?;

        println!(
            "{}: {} ops, peak payload {} bytes, heap {} bytes, utilization {:.1}%",
            path.display(),
            stats.ops,
            stats.peak_payload,
            stats.heap_size,
            stats.utilization * 100.0
        );
    }

    Ok(())
}
