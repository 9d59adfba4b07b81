//! Streams two synthetic stations through the store and merges them.
//!
//! `cargo run --example station_merge [config.toml]`, with `RUST_LOG=debug`
//! for per-batch logging.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use stationcloud::{Ingestor, MarkerSink, RigidTransform, StoreConfig, StoreHandle};
use stationcloud_core::{colorize_by_height, heat_map_color};
use tracing::info;

struct LogMarkers;

impl MarkerSink for LogMarkers {
    fn add_markers(&self, transforms: &BTreeMap<String, RigidTransform>) {
        for (station, transform) in transforms {
            let t = transform.translation_part();
            info!(%station, x = t[0], y = t[1], z = t[2], "marker");
        }
    }

    fn remove_markers(&self) {
        info!("markers cleared");
    }
}

/// A small ramp of `frames` batches, each a 20×20 patch rising in z.
fn capture(frames: usize, offset: f32) -> Vec<Vec<[f32; 3]>> {
    (0..frames)
        .map(|f| {
            (0..400)
                .map(|i| {
                    let x = (i % 20) as f32 * 0.02 + f as f32 * 0.4 + offset;
                    let y = (i / 20) as f32 * 0.02;
                    [x, y, x * 0.1]
                })
                .collect()
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };

    let store = StoreHandle::spawn(&config, Arc::new(LogMarkers))?;
    let ingestor = Ingestor::new(store.clone(), &config)?;

    for frame in capture(10, 0.0) {
        ingestor.submit(colorize_by_height(&frame));
    }
    ingestor.wait_idle();
    store.finalize_station(RigidTransform::translation(4.0, 0.0, 0.0));

    store.switch_to_station("1");
    for frame in capture(10, 4.0) {
        ingestor.submit(colorize_by_height(&frame));
    }
    ingestor.wait_idle();
    store.finalize_station_from_text("1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1")?;

    let merged = store.merged_len().unwrap_or_default();
    let visible = store.snapshot().unwrap_or_default().len();
    let budget = store.budget().unwrap_or(config.budget.upper);
    // Budget occupancy as a heat colour.
    let fill = visible as f32 / budget.max(1) as f32;
    let [r, g, b] = heat_map_color(fill);
    info!(merged, visible, budget, r, g, b, "capture merged");
    println!("merged {merged} points, {visible}/{budget} visible (fill #{r:02x}{g:02x}{b:02x})");
    Ok(())
}
