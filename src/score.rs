//! Busyness evaluator.
//!
//! Maps one frame (plus the evaluator's background-model state) to a
//! bounded 1..10 score and a full signal report. Five signals, each
//! normalized to [0,1], combined with fixed convex weights:
//!
//! 1. Motion ratio - fraction of pixels deviating from an exponential
//!    moving-average background model of luminance.
//! 2. Edge ratio - Sobel gradient magnitude with two-threshold hysteresis.
//! 3. Color variance - variance of raw channel bytes, clipped at 10000.
//! 4. Texture variance - variance of a 4-neighbor Laplacian response over
//!    luminance, clipped at 1000.
//! 5. Contour count - 8-connected edge components with area > 100 pixels,
//!    capped at 20.
//!
//! Malformed pixel data never panics and never fails the cycle: the
//! evaluator returns a `Degraded` outcome carrying `FALLBACK_SCORE` and an
//! error annotation in the report, so the monitor always has a usable
//! record to persist.

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Score reported when the input frame is malformed.
pub const FALLBACK_SCORE: u8 = 5;

/// Signal weights. Fixed constants, sum to 1.0 by construction.
pub const WEIGHT_MOTION: f64 = 0.30;
pub const WEIGHT_EDGES: f64 = 0.20;
pub const WEIGHT_COLOR_VARIANCE: f64 = 0.20;
pub const WEIGHT_TEXTURE: f64 = 0.15;
pub const WEIGHT_CONTOURS: f64 = 0.15;

/// Absolute luminance deviation from the background mean that classifies a
/// pixel as foreground.
const FOREGROUND_DEVIATION: f32 = 25.0;
/// Background model learning rate (EMA toward the current frame).
const BACKGROUND_LEARNING_RATE: f32 = 0.05;
/// Hysteresis thresholds on Sobel gradient magnitude.
const EDGE_LOW_THRESHOLD: f32 = 50.0;
const EDGE_HIGH_THRESHOLD: f32 = 150.0;
/// Normalization ceilings for the variance signals.
const COLOR_VARIANCE_CEILING: f64 = 10_000.0;
const TEXTURE_VARIANCE_CEILING: f64 = 1_000.0;
/// Edge components below this pixel area are ignored.
const CONTOUR_MIN_AREA: usize = 100;
/// Contour count is capped here before normalization.
const CONTOUR_CAP: u32 = 20;

/// Raw (pre-normalization) signal values plus the combined weighted sum.
///
/// Persisted verbatim alongside every observation so scores can be
/// re-derived and audited after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalReport {
    pub motion_ratio: f64,
    pub edge_ratio: f64,
    pub color_variance: f64,
    pub texture_variance: f64,
    pub contour_count: u32,
    pub combined_raw: f64,
    /// Set only on degraded outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignalReport {
    fn degraded(error: String) -> Self {
        Self {
            motion_ratio: 0.0,
            edge_ratio: 0.0,
            color_variance: 0.0,
            texture_variance: 0.0,
            contour_count: 0,
            combined_raw: 0.0,
            error: Some(error),
        }
    }
}

/// Outcome of scoring one frame.
///
/// `Degraded` makes the fallback path explicit at the type level while
/// keeping the resilience contract: the loop always receives a usable
/// record to persist.
#[derive(Clone, Debug)]
pub enum ScoreOutcome {
    Scored { score: u8, report: SignalReport },
    Degraded { score: u8, report: SignalReport },
}

impl ScoreOutcome {
    pub fn score(&self) -> u8 {
        match self {
            Self::Scored { score, .. } | Self::Degraded { score, .. } => *score,
        }
    }

    pub fn report(&self) -> &SignalReport {
        match self {
            Self::Scored { report, .. } | Self::Degraded { report, .. } => report,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Per-pixel EMA background model over luminance.
struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
}

/// Stateful busyness evaluator.
///
/// Owns the background model for one monitor session. The `&mut self`
/// receiver is the no-concurrent-scoring invariant: two sessions must each
/// construct their own evaluator.
#[derive(Default)]
pub struct BusynessEvaluator {
    background: Option<BackgroundModel>,
}

impl BusynessEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one frame. Never panics on malformed input.
    pub fn score(&mut self, frame: &Frame) -> ScoreOutcome {
        if !frame.is_well_formed() {
            return ScoreOutcome::Degraded {
                score: FALLBACK_SCORE,
                report: SignalReport::degraded(format!(
                    "malformed frame: {}x{} with {} bytes",
                    frame.width,
                    frame.height,
                    frame.data().len()
                )),
            };
        }

        let luma = frame.luminance();
        let total = frame.pixel_count() as f64;

        let motion_ratio = self.motion_ratio(frame.width, frame.height, &luma);
        let edges = edge_mask(&luma, frame.width as usize, frame.height as usize);
        let edge_ratio = edges.iter().filter(|&&e| e).count() as f64 / total;
        let color_variance = byte_variance(frame.data());
        let texture_variance =
            laplacian_variance(&luma, frame.width as usize, frame.height as usize);
        let contour_count =
            contour_count(&edges, frame.width as usize, frame.height as usize);

        let combined_raw = WEIGHT_MOTION * motion_ratio
            + WEIGHT_EDGES * edge_ratio
            + WEIGHT_COLOR_VARIANCE * (color_variance / COLOR_VARIANCE_CEILING).min(1.0)
            + WEIGHT_TEXTURE * (texture_variance / TEXTURE_VARIANCE_CEILING).min(1.0)
            + WEIGHT_CONTOURS * (contour_count.min(CONTOUR_CAP) as f64 / CONTOUR_CAP as f64);

        ScoreOutcome::Scored {
            score: quantize(combined_raw),
            report: SignalReport {
                motion_ratio,
                edge_ratio,
                color_variance,
                texture_variance,
                contour_count,
                combined_raw,
                error: None,
            },
        }
    }

    /// Foreground fraction against the EMA background model, then model
    /// update. The first frame (or a resolution change) seeds the model
    /// and reports zero motion.
    fn motion_ratio(&mut self, width: u32, height: u32, luma: &[f32]) -> f64 {
        match &mut self.background {
            Some(model) if model.width == width && model.height == height => {
                let mut foreground = 0usize;
                for (mean, &lum) in model.mean.iter_mut().zip(luma) {
                    if (lum - *mean).abs() > FOREGROUND_DEVIATION {
                        foreground += 1;
                    }
                    *mean += BACKGROUND_LEARNING_RATE * (lum - *mean);
                }
                foreground as f64 / luma.len() as f64
            }
            slot => {
                *slot = Some(BackgroundModel {
                    width,
                    height,
                    mean: luma.to_vec(),
                });
                0.0
            }
        }
    }
}

/// `clamp(round(combined * 9) + 1, 1, 10)`
fn quantize(combined: f64) -> u8 {
    ((combined * 9.0).round() as i64 + 1).clamp(1, 10) as u8
}

/// Population variance over all raw channel bytes.
fn byte_variance(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().map(|&b| b as f64).sum::<f64>() / n;
    data.iter()
        .map(|&b| {
            let d = b as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Variance of the 4-neighbor Laplacian response over interior pixels.
fn laplacian_variance(luma: &[f32], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let response = (luma[idx - width] + luma[idx + width] + luma[idx - 1]
                + luma[idx + 1]
                - 4.0 * luma[idx]) as f64;
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }
    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Sobel gradient magnitude with two-threshold hysteresis.
///
/// Pixels at or above the high threshold are edges; pixels between the
/// thresholds become edges only when 8-connected to one. Border pixels are
/// never edges (no full gradient neighborhood).
fn edge_mask(luma: &[f32], width: usize, height: usize) -> Vec<bool> {
    let mut mask = vec![false; width * height];
    if width < 3 || height < 3 {
        return mask;
    }

    const NONE: u8 = 0;
    const WEAK: u8 = 1;
    const STRONG: u8 = 2;

    let mut class = vec![NONE; width * height];
    let mut pending = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let gx = (luma[idx - width + 1] + 2.0 * luma[idx + 1] + luma[idx + width + 1])
                - (luma[idx - width - 1] + 2.0 * luma[idx - 1] + luma[idx + width - 1]);
            let gy = (luma[idx + width - 1] + 2.0 * luma[idx + width] + luma[idx + width + 1])
                - (luma[idx - width - 1] + 2.0 * luma[idx - width] + luma[idx - width + 1]);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude >= EDGE_HIGH_THRESHOLD {
                class[idx] = STRONG;
                mask[idx] = true;
                pending.push(idx);
            } else if magnitude >= EDGE_LOW_THRESHOLD {
                class[idx] = WEAK;
            }
        }
    }

    // Promote weak pixels reachable from strong ones.
    while let Some(idx) = pending.pop() {
        let x = idx % width;
        let y = idx / width;
        for (nx, ny) in neighbors8(x, y, width, height) {
            let nidx = ny * width + nx;
            if class[nidx] == WEAK && !mask[nidx] {
                mask[nidx] = true;
                pending.push(nidx);
            }
        }
    }

    mask
}

/// Count 8-connected edge components with pixel area above the minimum.
fn contour_count(edges: &[bool], width: usize, height: usize) -> u32 {
    let mut visited = vec![false; edges.len()];
    let mut stack = Vec::new();
    let mut count = 0u32;

    for start in 0..edges.len() {
        if !edges[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;
        while let Some(idx) = stack.pop() {
            area += 1;
            let x = idx % width;
            let y = idx / width;
            for (nx, ny) in neighbors8(x, y, width, height) {
                let nidx = ny * width + nx;
                if edges[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
        if area > CONTOUR_MIN_AREA {
            count += 1;
        }
    }

    count
}

fn neighbors8(
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> impl Iterator<Item = (usize, usize)> {
    const OFFSETS: [(isize, isize); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
            Some((nx as usize, ny as usize))
        } else {
            None
        }
    })
}
