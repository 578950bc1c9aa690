//! Grid snapshot inspection tool.
//!
//! Usage: cargo run --bin grid_info -- [OPTIONS]
//!
//! Options:
//!   --load <FILE>   Inspect an existing grid snapshot instead of the demo grid
//!   --compressed    Build the demo grid with compressed (16-byte) cells
//!   --out <FILE>    Write the grid back out as an LZ4 snapshot

use std::path::PathBuf;

use irregrid::grid::{create_test_grid, snapshot, Grid};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let load = parse_path_arg(&args, "--load");
    let out = parse_path_arg(&args, "--out");
    let compressed = args.iter().any(|a| a == "--compressed");

    let grid: Grid = match &load {
        Some(path) => match snapshot::load_grid(path) {
            Ok(grid) => {
                log::info!("loaded snapshot {}", path.display());
                grid
            }
            Err(e) => {
                log::error!("failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => create_test_grid(compressed),
    };

    match grid.validate() {
        Ok(()) => log::info!("structural validation passed"),
        Err(e) => {
            log::error!("structural validation failed: {e}");
            std::process::exit(1);
        }
    }

    println!("=== Irregrid Inspector ===");
    println!("Bounds: {} .. {}", grid.bbox().min, grid.bbox().max);
    println!("Dims:   {} (voxels {})", grid.dims(), grid.voxel_dims());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&grid.stats()).expect("stats are serializable")
    );

    if let Some(path) = out {
        match snapshot::save_grid(&path, &grid) {
            Ok(()) => log::info!("snapshot written to {}", path.display()),
            Err(e) => {
                log::error!("failed to write {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }
}

fn parse_path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}
