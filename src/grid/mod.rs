//! Reflectivity grids and the maths applied to them
//!
//! Missing samples are `NaN` everywhere in memory; the fill value only
//! exists on disk (see [`codec`]).
//!
//! Resampling follows half-pixel-centre conventions: output pixel `i` maps
//! to source coordinate `(i + 0.5) * in / out - 0.5`. Rows are processed
//! in parallel with Rayon.

pub mod codec;
pub mod projection;

use rayon::prelude::*;
use std::path::PathBuf;

pub use codec::{GridCodec, GridDocument, GridField, JsonGridCodec, LoadedGrid, VariableMatch};
pub use projection::{haversine_km, AzimuthalEquidistant, GridGeometry, ProjectionInfo};

/// Cubic convolution coefficient for bicubic resampling.
const CUBIC_A: f64 = -0.75;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode grid document {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Cannot encode grid document: {0}")]
    Encode(String),

    #[error("No reflectivity field in {path} (tried {tried})")]
    MissingVariable { path: PathBuf, tried: String },

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Unsupported grid rank {rank} (shape {shape:?})")]
    Rank { rank: usize, shape: Vec<usize> },
}

// ============================================================================
// 2-D Grid
// ============================================================================

/// Row-major 2-D field.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Grid2D {
    pub fn new(height: usize, width: usize, data: Vec<f32>) -> Result<Self, GridError> {
        let expected = height * width;
        if data.len() != expected {
            return Err(GridError::Shape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self {
            height,
            width,
            data: vec![value; height * width],
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.width + col] = value;
    }

    /// Apply `f` to every sample.
    pub fn map_in_place(&mut self, f: impl Fn(f32) -> f32 + Sync) {
        self.data.par_iter_mut().for_each(|v| *v = f(*v));
    }

    /// Largest non-missing value.
    pub fn max_value(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
    }

    /// Number of non-missing samples.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Bilinear resize. Returns a clone when the shape already matches.
    pub fn resize_bilinear(&self, height: usize, width: usize) -> Self {
        if self.shape() == (height, width) {
            return self.clone();
        }
        let ys: Vec<LinearTap> = (0..height)
            .map(|i| LinearTap::new(i, self.height, height))
            .collect();
        let xs: Vec<LinearTap> = (0..width)
            .map(|j| LinearTap::new(j, self.width, width))
            .collect();

        let mut out = vec![0.0_f32; height * width];
        out.par_chunks_mut(width).enumerate().for_each(|(r, row)| {
            let ty = &ys[r];
            for (c, dst) in row.iter_mut().enumerate() {
                let tx = &xs[c];
                let top = lerp(self.get(ty.i0, tx.i0), self.get(ty.i0, tx.i1), tx.t);
                let bottom = lerp(self.get(ty.i1, tx.i0), self.get(ty.i1, tx.i1), tx.t);
                *dst = lerp(top, bottom, ty.t);
            }
        });
        Self {
            height,
            width,
            data: out,
        }
    }

    /// Bicubic resize (cubic convolution, edge-clamped taps).
    pub fn resize_bicubic(&self, height: usize, width: usize) -> Self {
        if self.shape() == (height, width) {
            return self.clone();
        }
        let ys: Vec<CubicTap> = (0..height)
            .map(|i| CubicTap::new(i, self.height, height))
            .collect();
        let xs: Vec<CubicTap> = (0..width)
            .map(|j| CubicTap::new(j, self.width, width))
            .collect();

        let mut out = vec![0.0_f32; height * width];
        out.par_chunks_mut(width).enumerate().for_each(|(r, row)| {
            let ty = &ys[r];
            for (c, dst) in row.iter_mut().enumerate() {
                let tx = &xs[c];
                let mut acc = 0.0_f64;
                for (ky, &iy) in ty.idx.iter().enumerate() {
                    let mut row_acc = 0.0_f64;
                    for (kx, &ix) in tx.idx.iter().enumerate() {
                        row_acc += f64::from(self.get(iy, ix)) * tx.w[kx];
                    }
                    acc += row_acc * ty.w[ky];
                }
                #[allow(clippy::cast_possible_truncation)]
                let value = acc as f32;
                *dst = value;
            }
        });
        Self {
            height,
            width,
            data: out,
        }
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[allow(clippy::cast_precision_loss)]
fn source_coord(dst: usize, in_len: usize, out_len: usize) -> f64 {
    let scale = in_len as f64 / out_len as f64;
    (dst as f64 + 0.5) * scale - 0.5
}

struct LinearTap {
    i0: usize,
    i1: usize,
    t: f32,
}

impl LinearTap {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn new(dst: usize, in_len: usize, out_len: usize) -> Self {
        let src = source_coord(dst, in_len, out_len).max(0.0);
        let i0 = (src.floor() as usize).min(in_len - 1);
        let i1 = (i0 + 1).min(in_len - 1);
        let t = (src - i0 as f64) as f32;
        Self { i0, i1, t }
    }
}

struct CubicTap {
    idx: [usize; 4],
    w: [f64; 4],
}

impl CubicTap {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    fn new(dst: usize, in_len: usize, out_len: usize) -> Self {
        let src = source_coord(dst, in_len, out_len);
        let base = src.floor();
        let t = src - base;
        let base = base as isize;
        let last = in_len as isize - 1;
        let mut idx = [0usize; 4];
        for (k, slot) in idx.iter_mut().enumerate() {
            *slot = (base - 1 + k as isize).clamp(0, last) as usize;
        }
        Self {
            idx,
            w: cubic_weights(t),
        }
    }
}

fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let outer = |x: f64| ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a;
    let inner = |x: f64| ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0;
    [outer(t + 1.0), inner(t), inner(1.0 - t), outer(2.0 - t)]
}

// ============================================================================
// 3-D Volume
// ============================================================================

/// Stack of 2-D levels, lowest altitude first.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    levels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Volume {
    pub fn new(levels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self, GridError> {
        let expected = levels * height * width;
        if data.len() != expected {
            return Err(GridError::Shape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            levels,
            height,
            width,
            data,
        })
    }

    pub fn from_grid(grid: Grid2D) -> Self {
        Self {
            levels: 1,
            height: grid.height,
            width: grid.width,
            data: grid.data,
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Replace missing samples with `value`.
    pub fn fill_missing(&mut self, value: f32) {
        self.data.par_iter_mut().for_each(|v| {
            if v.is_nan() {
                *v = value;
            }
        });
    }

    /// Element-wise maximum over levels. A pixel is missing only when it is
    /// missing on every level.
    pub fn composite_max(&self) -> Grid2D {
        let plane = self.height * self.width;
        let mut out = vec![f32::NAN; plane];
        out.par_iter_mut().enumerate().for_each(|(i, dst)| {
            for z in 0..self.levels {
                let v = self.data[z * plane + i];
                if !v.is_nan() && (dst.is_nan() || v > *dst) {
                    *dst = v;
                }
            }
        });
        Grid2D {
            height: self.height,
            width: self.width,
            data: out,
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Map `[min, max]` onto `[0, 1]`, clipping first.
#[inline]
pub fn normalize(value: f32, min: f32, max: f32) -> f32 {
    (value.clamp(min, max) - min) / (max - min)
}

/// Inverse of [`normalize`], clipped to `[min, max]`.
#[inline]
pub fn denormalize(norm: f32, min: f32, max: f32) -> f32 {
    (norm * (max - min) + min).clamp(min, max)
}
