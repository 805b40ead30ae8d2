// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::deprecated_clippy_cfg_attr,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use catenary::feed_tables::FeedTables;
use catenary::patterns::finder::discover_patterns;
use catenary::patterns::gtfs_source::{lookup_from_gtfs, trips_from_gtfs};
use catenary::patterns::store::DEFAULT_BATCH_SIZE;
use catenary::patterns::{NewGtfsError, PatternHalt};
use catenary::pg_store;
use catenary::postgres_tools::{Namespace, make_async_pool};
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Finds, names and edits trip patterns of GTFS feeds", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the patterns of a GTFS directory or zip without touching the database
    Discover {
        #[arg(long)]
        gtfs: PathBuf,
    },
    /// Build patterns for a feed already loaded into a schema
    Build {
        #[arg(long)]
        namespace: String,
        /// Keep the feed's own pattern ids and names when they line up
        #[arg(long)]
        use_feed_patterns: bool,
    },
    /// Replace a pattern's halts with the JSON list in a file
    Reconcile {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        pattern_id: String,
        #[arg(long)]
        halts: PathBuf,
        /// Recompute stop times from the first changed halt in the same transaction
        #[arg(long)]
        normalize: bool,
        /// With --normalize, interpolate stops between timepoints
        #[arg(long, requires = "normalize")]
        interpolate: bool,
    },
    /// Recompute stop times of a pattern from its default travel and dwell times
    Normalize {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        pattern_id: String,
        #[arg(long, default_value_t = 0)]
        from: i32,
        #[arg(long)]
        interpolate: bool,
    },
}

fn batch_size_from_env() -> usize {
    match std::env::var("PATTERN_BATCH_SIZE") {
        Ok(value) => match value.parse::<usize>() {
            Ok(batch_size) if batch_size > 0 => batch_size,
            _ => {
                warn!(
                    "Ignoring PATTERN_BATCH_SIZE={}, using {}",
                    value, DEFAULT_BATCH_SIZE
                );
                DEFAULT_BATCH_SIZE
            }
        },
        Err(_) => DEFAULT_BATCH_SIZE,
    }
}

fn discover_from_gtfs(path: &Path) -> Result<(), Box<dyn Error + Sync + Send>> {
    let path = path.to_str().ok_or("GTFS path must be valid UTF-8")?;
    let gtfs = gtfs_structures::Gtfs::new(path)?;

    let trips = trips_from_gtfs(&gtfs);
    let lookup = lookup_from_gtfs(&gtfs);
    let mut errors: Vec<NewGtfsError> = Vec::new();

    let discovered = discover_patterns(&trips, &lookup, None, &mut errors);

    for pattern in discovered.patterns() {
        println!(
            "{}\t{}\t{}",
            pattern.pattern_id,
            pattern.route_id,
            pattern.name.as_deref().unwrap_or_default()
        );
    }

    info!(
        "{} patterns from {} trips, {} data quality errors",
        discovered.len(),
        trips.len(),
        errors.len()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    if let Commands::Discover { gtfs } = &args.command {
        return discover_from_gtfs(gtfs);
    }

    let batch_size = batch_size_from_env();
    let tables = FeedTables::new();
    let pool = make_async_pool().await?;
    let mut conn = pool.get().await?;

    match args.command {
        Commands::Discover { .. } => {}
        Commands::Build {
            namespace,
            use_feed_patterns,
        } => {
            let namespace = Namespace::new(&namespace)?;
            let mut errors: Vec<NewGtfsError> = Vec::new();

            let count = pg_store::build_patterns(
                &mut conn,
                &namespace,
                &tables,
                use_feed_patterns,
                batch_size,
                &mut errors,
            )
            .await?;

            info!(
                "Built {} patterns in {} with {} data quality errors",
                count,
                namespace,
                errors.len()
            );
        }
        Commands::Reconcile {
            namespace,
            pattern_id,
            halts,
            normalize,
            interpolate,
        } => {
            let namespace = Namespace::new(&namespace)?;
            let new_halts: Vec<PatternHalt> =
                serde_json::from_str(&std::fs::read_to_string(&halts)?)?;

            match normalize {
                true => {
                    let (diff, updated) = pg_store::reconcile_and_normalize(
                        &mut conn,
                        &namespace,
                        &tables,
                        &pattern_id,
                        &new_halts,
                        interpolate,
                        batch_size,
                    )
                    .await?;

                    info!(
                        "Pattern {} changed: {}, normalized {} stop times",
                        pattern_id,
                        diff.changed(),
                        updated
                    );
                }
                false => {
                    let diff = pg_store::reconcile_pattern(
                        &mut conn,
                        &namespace,
                        &tables,
                        &pattern_id,
                        &new_halts,
                        batch_size,
                    )
                    .await?;

                    info!("Pattern {} changed: {}", pattern_id, diff.changed());
                }
            }
        }
        Commands::Normalize {
            namespace,
            pattern_id,
            from,
            interpolate,
        } => {
            let namespace = Namespace::new(&namespace)?;

            let updated = pg_store::normalize_stop_times(
                &mut conn,
                &namespace,
                &tables,
                &pattern_id,
                from,
                interpolate,
                batch_size,
            )
            .await?;

            info!("Normalized {} stop times on pattern {}", updated, pattern_id);
        }
    }

    Ok(())
}
