//! Synthetic radar feed
//!
//! Writes a sequence of grid documents with a drifting storm cell into a
//! directory, for demos and smoke tests. Point it at the converted buffer
//! (frames are used as-is) or at the raw inbox with a matching extension
//! when a pass-through converter is configured.
//!
//! # Usage
//! ```bash
//! ./synthetic-feed --out data/converted/buffer --frames 8 --interval-secs 210
//! ./synthetic-feed --out data/raw/inbox --ext mdv --delay-ms 2000 --seed 7
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Timelike, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;

use hailcast::config::RadarConfig;
use hailcast::grid::{Grid2D, GridCodec, GridDocument, GridGeometry, JsonGridCodec, ProjectionInfo};
use hailcast::storage::canonical_name;

// ============================================================================
// Storm Constants
// ============================================================================

/// Clear-air background reflectivity (dBZ)
const BACKGROUND_DBZ: f64 = 5.0;
/// Background noise standard deviation (dBZ)
const BACKGROUND_NOISE_DBZ: f64 = 2.0;
/// Cell radius at which reflectivity has fallen by ~40% (pixels)
const CELL_SIGMA_PX: f64 = 6.0;
/// Reflectivity growth per frame while the cell matures (dBZ)
const GROWTH_PER_FRAME_DBZ: f64 = 1.5;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "synthetic-feed")]
#[command(about = "Synthetic radar frames for HailCast demos")]
#[command(version)]
struct Args {
    /// Directory receiving the frames
    #[arg(short, long)]
    out: PathBuf,

    /// Number of frames to write
    #[arg(short, long, default_value = "8")]
    frames: u32,

    /// Scan cadence in seconds (frame timestamps)
    #[arg(long, default_value = "210")]
    interval_secs: i64,

    /// Grid size in pixels (square, 1 km spacing)
    #[arg(long, default_value = "120", value_parser = clap::value_parser!(u32).range(16..=1000))]
    size: u32,

    /// File extension of the written frames
    #[arg(long, default_value = "json")]
    ext: String,

    /// Peak reflectivity of the first frame (dBZ)
    #[arg(long, default_value = "52")]
    peak_dbz: f64,

    /// Wall-clock delay between frames in milliseconds (0 = write all at once)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Storm Model
// ============================================================================

struct Storm {
    row: f64,
    col: f64,
    drift_row: f64,
    drift_col: f64,
    peak_dbz: f64,
}

impl Storm {
    fn new(size: usize, peak_dbz: f64, rng: &mut StdRng) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let s = size as f64;
        Self {
            row: s * rng.gen_range(0.3..0.5),
            col: s * rng.gen_range(0.3..0.5),
            drift_row: rng.gen_range(0.5..2.0),
            drift_col: rng.gen_range(0.5..2.0),
            peak_dbz,
        }
    }

    fn advance(&mut self) {
        self.row += self.drift_row;
        self.col += self.drift_col;
        self.peak_dbz = (self.peak_dbz + GROWTH_PER_FRAME_DBZ).min(65.0);
    }

    fn render(&self, size: usize, rng: &mut StdRng, noise: &Normal<f64>) -> Grid2D {
        let mut grid = Grid2D::filled(size, size, 0.0);
        for r in 0..size {
            for c in 0..size {
                #[allow(clippy::cast_precision_loss)]
                let d2 = (r as f64 - self.row).powi(2) + (c as f64 - self.col).powi(2);
                let cell = (self.peak_dbz - BACKGROUND_DBZ) * (-d2 / (2.0 * CELL_SIGMA_PX.powi(2))).exp();
                let value = BACKGROUND_DBZ + cell + noise.sample(rng);
                #[allow(clippy::cast_possible_truncation)]
                grid.set(r, c, value as f32);
            }
        }
        grid
    }
}

fn frame_time(start: DateTime<Utc>, index: u32, interval_secs: i64) -> DateTime<Utc> {
    start + Duration::seconds(i64::from(index) * interval_secs)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let size = args.size as usize;
    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, BACKGROUND_NOISE_DBZ).context("invalid noise distribution")?;

    let radar = RadarConfig::default();
    let projection = ProjectionInfo::new(radar.sensor_latitude, radar.sensor_longitude, radar.earth_radius_m);
    let geometry = GridGeometry::native(size, size, projection);
    let codec = JsonGridCodec::default();

    // Whole seconds, ending at "now"
    let now = Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now);
    let start = now - Duration::seconds(i64::from(args.frames.saturating_sub(1)) * args.interval_secs);

    std::fs::create_dir_all(&args.out).with_context(|| format!("creating {}", args.out.display()))?;
    eprintln!("{}", "=".repeat(60));
    eprintln!("SYNTHETIC RADAR FEED");
    eprintln!("  Frames:   {} every {} s", args.frames, args.interval_secs);
    eprintln!("  Grid:     {size}x{size} @ 1 km around {}", radar.radar_name);
    eprintln!("  Output:   {}", args.out.display());
    eprintln!("{}", "=".repeat(60));

    let mut storm = Storm::new(size, args.peak_dbz, &mut rng);
    for i in 0..args.frames {
        let at = frame_time(start, i, args.interval_secs);
        let grid = storm.render(size, &mut rng, &noise);
        let doc = GridDocument::from_grid(at, &radar.variable_name, "dBZ", &grid, &geometry)
            .with_attribute("title", format!("{} - Synthetic scan", radar.radar_name))
            .with_attribute("source", "hailcast synthetic-feed");

        let path = args.out.join(canonical_name(at, &args.ext));
        codec.write(&path, &doc).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("  [{:>3}] {} peak {:.1} dBZ", i + 1, path.display(), storm.peak_dbz);

        storm.advance();
        if args.delay_ms > 0 && i + 1 < args.frames {
            std::thread::sleep(std::time::Duration::from_millis(args.delay_ms));
        }
    }
    Ok(())
}
