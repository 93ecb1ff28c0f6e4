//! Report on, query, and derive side files from a solved-state table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ur_lut::depth::{compute_depths, write_depths};
use ur_lut::env_config;
use ur_lut::progress::format_count;
use ur_lut::storage::read_lut;
use ur_lut::GameSnapshot;

#[derive(Parser)]
#[command(name = "inspect")]
#[command(version, about = "Inspect solved Royal Game of Ur tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata and per-shard entry counts
    Info {
        table: PathBuf,
        /// Also list every shard
        #[arg(long)]
        shards: bool,
    },

    /// Light's win percentage for a position given as snapshot JSON
    Query {
        table: PathBuf,
        /// e.g. '{"light_pieces":[4],"dark_pieces":[],"light_score":0,"dark_score":0,"light_to_move":true}'
        snapshot: String,
    },

    /// Compute the depth side file
    Depth {
        table: PathBuf,
        output: PathBuf,
    },
}

fn print_kv(key: &str, value: &str) {
    println!("  {:20} {}", format!("{}:", key), value);
}

fn main() -> Result<()> {
    env_config::init_logging()?;
    let cli = Cli::parse();
    env_config::init_base_path()?;

    match cli.command {
        Commands::Info { table, shards } => {
            let lut = read_lut(&table)?;
            println!("{}", table.display());
            print_kv("configuration", &lut.config().descriptor());
            print_kv("value type", lut.value_type().name());
            print_kv("entries", &format_count(lut.entry_count()));
            print_kv("shards", &lut.store().shard_count().to_string());
            for (key, value) in &lut.metadata().annotations {
                print_kv(key, value);
            }
            if shards {
                println!("\nShard | Scores | Entries");
                println!("------|--------|--------");
                for chunk in lut.store().chunks() {
                    let (ls, ds) = lut.encoder().scores(chunk.upper());
                    println!("{:5} | {}-{}    | {}", chunk.upper(), ls, ds, format_count(chunk.len() as u64));
                }
            }
        }
        Commands::Query { table, snapshot } => {
            let lut = read_lut(&table)?;
            let snapshot: GameSnapshot = serde_json::from_str(&snapshot).context("invalid snapshot JSON")?;
            let mut game = lut.new_game();
            game.copy_from_snapshot(&snapshot)?;
            let mut scratch = lut.new_game();
            let percent = lut.get_light_win_percent(&game, &mut scratch)?;
            println!("light wins {:.4}%, dark wins {:.4}%", percent, 100.0 - percent);
        }
        Commands::Depth { table, output } => {
            env_config::init_rayon_threads();
            let lut = read_lut(&table)?;
            let depths = compute_depths(&lut)?;
            write_depths(&depths, &output)?;
            println!(
                "{} of {} states reached, max depth {}",
                format_count(depths.reached()),
                format_count(lut.entry_count()),
                depths.max_depth().map_or("-".to_string(), |d| d.to_string())
            );
        }
    }
    Ok(())
}
