//! Frame container and synthetic frame builders.
//!
//! - `Frame`: Owned RGB8 pixel grid handed from a source to the evaluator.
//! - Builders (`solid`, `noise`, draw helpers): used by the stub camera
//!   backend and by tests to construct scenes with known statistics.
//!
//! Frames are ephemeral. A source produces one per cycle, the evaluator
//! reads it, and the monitor drops it. Nothing retains pixel data across
//! cycles except the evaluator's background model (a derived statistic,
//! not the pixels themselves).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of interleaved channels per pixel.
pub const CHANNELS: usize = 3;

/// Owned RGB8 frame.
///
/// `data` is row-major, interleaved R,G,B. A well-formed frame satisfies
/// `data.len() == width * height * 3`; the evaluator treats anything else
/// as malformed input and degrades rather than panicking, so this type
/// does not enforce the invariant at construction.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Uniform frame of a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, data)
    }

    /// Frame of per-channel uniform noise around `base`, clamped to u8.
    ///
    /// Seeded so stub sources and tests get reproducible scenes.
    pub fn noise(width: u32, height: u32, base: [u8; 3], amplitude: u8, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        let spread = amplitude as i16;
        for _ in 0..pixels {
            for channel in base {
                let jitter = rng.gen_range(-spread..=spread);
                data.push((channel as i16 + jitter).clamp(0, 255) as u8);
            }
        }
        Self::new(width, height, data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Whether dimensions and byte length agree.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * CHANNELS
    }

    /// Rec.601 luminance plane. Caller must check `is_well_formed` first.
    pub fn luminance(&self) -> Vec<f32> {
        debug_assert!(self.is_well_formed());
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
            .collect()
    }

    /// Fill an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        let x1 = (x + w).min(self.width);
        let y1 = (y + h).min(self.height);
        for py in y..y1 {
            for px in x..x1 {
                self.put_pixel(px, py, rgb);
            }
        }
    }

    /// Fill a disc of radius `r` centered at (`cx`, `cy`), clipped to the frame.
    pub fn fill_circle(&mut self, cx: u32, cy: u32, r: u32, rgb: [u8; 3]) {
        let r2 = (r as i64) * (r as i64);
        let y0 = cy.saturating_sub(r);
        let y1 = (cy + r + 1).min(self.height);
        let x0 = cx.saturating_sub(r);
        let x1 = (cx + r + 1).min(self.width);
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as i64 - cx as i64;
                let dy = py as i64 - cy as i64;
                if dx * dx + dy * dy <= r2 {
                    self.put_pixel(px, py, rgb);
                }
            }
        }
    }

    fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = ((y as usize) * (self.width as usize) + x as usize) * CHANNELS;
        self.data[idx..idx + CHANNELS].copy_from_slice(&rgb);
    }
}
