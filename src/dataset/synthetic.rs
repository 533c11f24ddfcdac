//! Synthetic clock faces
//!
//! Draws a rim and two hands on a blank grayscale canvas so the training and
//! evaluation loops can run end to end without any image decoding. Angles are
//! measured clockwise from 12 o'clock with the y axis pointing down.

use std::f32::consts::PI;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::burn_dataset::{ClockDataset, ClockItem};
use super::{NUM_HOURS, NUM_MINUTES};
use crate::utils::error::Result;

const RIM_INNER: f32 = 0.85;
const HOUR_HAND: f32 = 0.5;
const MINUTE_HAND: f32 = 0.8;

/// Render `hour:minute` as a `[height * width]` row-major image in [0, 1]
pub fn render_clock(hour: usize, minute: usize, image_size: [usize; 2]) -> Vec<f32> {
    let [height, width] = image_size;
    let mut pixels = vec![0.0f32; height * width];
    if height == 0 || width == 0 {
        return pixels;
    }

    let cy = (height as f32 - 1.0) / 2.0;
    let cx = (width as f32 - 1.0) / 2.0;
    let radius = cy.min(cx).max(0.5);

    // Rim
    for y in 0..height {
        for x in 0..width {
            let dist = ((y as f32 - cy).powi(2) + (x as f32 - cx).powi(2)).sqrt();
            if dist >= RIM_INNER * radius && dist <= radius + 0.5 {
                pixels[y * width + x] = 0.5;
            }
        }
    }

    let minute_frac = (minute % NUM_MINUTES) as f32 / NUM_MINUTES as f32;
    let hour_frac = ((hour % NUM_HOURS) as f32 + minute_frac) / NUM_HOURS as f32;

    draw_hand(&mut pixels, image_size, (cy, cx), hour_frac * 2.0 * PI, HOUR_HAND * radius);
    draw_hand(&mut pixels, image_size, (cy, cx), minute_frac * 2.0 * PI, MINUTE_HAND * radius);

    pixels
}

fn draw_hand(
    pixels: &mut [f32],
    image_size: [usize; 2],
    center: (f32, f32),
    angle: f32,
    length: f32,
) {
    let [height, width] = image_size;
    let (cy, cx) = center;
    let (dx, dy) = (angle.sin(), -angle.cos());

    let samples = (length * 4.0).ceil().max(1.0) as usize;
    for i in 0..=samples {
        let t = length * i as f32 / samples as f32;
        let y = (cy + dy * t).round();
        let x = (cx + dx * t).round();
        if y >= 0.0 && x >= 0.0 && (y as usize) < height && (x as usize) < width {
            pixels[y as usize * width + x as usize] = 1.0;
        }
    }
}

/// Seeded generator of labelled clock images
#[derive(Debug, Clone)]
pub struct SyntheticClocks {
    rng: ChaCha8Rng,
    image_size: [usize; 2],
    noise_std: f32,
}

impl SyntheticClocks {
    pub fn new(seed: u64, image_size: [usize; 2]) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            image_size,
            noise_std: 0.0,
        }
    }

    /// Add Gaussian pixel noise with the given standard deviation
    pub fn with_noise(mut self, noise_std: f32) -> Self {
        self.noise_std = noise_std.max(0.0);
        self
    }

    pub fn image_size(&self) -> [usize; 2] {
        self.image_size
    }

    /// Draw one random time and render it
    pub fn sample(&mut self) -> Result<ClockItem> {
        let hour = self.rng.gen_range(0..NUM_HOURS);
        let minute = self.rng.gen_range(0..NUM_MINUTES);
        let mut image = render_clock(hour, minute, self.image_size);

        if self.noise_std > 0.0 {
            for pixel in image.iter_mut() {
                // Box-Muller transform for Gaussian noise
                let u1: f32 = self.rng.gen_range(f32::EPSILON..1.0);
                let u2: f32 = self.rng.gen();
                let noise = self.noise_std * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
                *pixel = (*pixel + noise).clamp(0.0, 1.0);
            }
        }

        ClockItem::new(image, hour, minute)
    }

    /// Draw `count` items
    pub fn generate(&mut self, count: usize) -> Result<Vec<ClockItem>> {
        (0..count).map(|_| self.sample()).collect()
    }

    /// Draw `count` items wrapped in a dataset
    pub fn dataset(&mut self, count: usize) -> Result<ClockDataset> {
        let items = self.generate(count)?;
        ClockDataset::new(items, self.image_size)
    }
}
