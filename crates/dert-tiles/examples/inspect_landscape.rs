//! Example: inspect a DERT landscape and look up the tile under a point.
//!
//! Usage: cargo run --example inspect_landscape -- <landscape_dir> <x> <y> <width> <length> [level]
//!
//! Set `RUST_LOG=dert_tiles=debug` to see discovery and cache activity.

use dert_tiles::{DataType, TileStore, TileStoreConfig};
use std::env;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    dert_metrics::describe_metrics();

    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        eprintln!("Usage: {} <landscape_dir> <x> <y> <width> <length> [level]", args[0]);
        eprintln!("Example: {} ./gale 120.0 -340.5 2048 2048", args[0]);
        std::process::exit(1);
    }

    let dir = &args[1];
    let x: f64 = args[2].parse().expect("Invalid x");
    let y: f64 = args[3].parse().expect("Invalid y");
    let width: f64 = args[4].parse().expect("Invalid width");
    let length: f64 = args[5].parse().expect("Invalid length");
    let level: Option<u32> = args.get(6).map(|s| s.parse().expect("Invalid level"));

    let Some(store) = TileStore::connect(dir, TileStoreConfig::default()) else {
        eprintln!("No landscape at {}", dir);
        std::process::exit(1);
    };

    let start = Instant::now();
    let layers = match store.discover_layers() {
        Ok(layers) => layers,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    println!("Found {} layers in {:.3}s", layers.len(), start.elapsed().as_secs_f64());
    for layer in &layers {
        println!(
            "  {:<16} {:<12} levels={:?} tile={:?}x{:?} type={:?}",
            layer.name,
            layer.layer_type,
            layer.number_of_levels(),
            layer.tile_width(),
            layer.tile_length(),
            layer.data_type()
        );
    }

    match store.existence_tree() {
        Some(tree) => println!("Existence tree: {} tiles, {} levels deep", tree.len(), tree.max_level()),
        None => {
            println!("Landscape has no elevation tiles");
            return;
        }
    }

    let Some(id) = store.locate_tile_id(x, y, width, length, level) else {
        println!("No tile at level {:?} under ({}, {})", level, x, y);
        return;
    };
    let bounds = id.bounds(width, length);
    println!(
        "\nTile {:?} (level {}) covers x {:.2}..{:.2}, y {:.2}..{:.2}",
        id.to_string(),
        id.level(),
        bounds.min_x,
        bounds.max_x,
        bounds.min_y,
        bounds.max_y
    );

    for layer in &layers {
        let declared = layer.data_type().unwrap_or(DataType::UnsignedByte);
        let fetch_start = Instant::now();
        match store.fetch_tile(&layer.name, &id, declared) {
            Some(tile) => println!(
                "  {:<16} {}x{} {} band(s) {} ({} bytes, {:.3}s)",
                layer.name,
                tile.width,
                tile.height,
                tile.bands,
                tile.data_type,
                tile.data.len(),
                fetch_start.elapsed().as_secs_f64()
            ),
            None => println!("  {:<16} not available", layer.name),
        }
    }

    // Give a freshly discovered tree a chance to reach the cache before exiting.
    println!("\nCache write: {:?}", store.wait_for_persist(Duration::from_secs(5)));
}
