//! Deterministic synthetic images for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use imgref::Img;
use wavemetric::{Decomposition, Image};

/// LCG pseudo-random number generator (deterministic)
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u8(&mut self) -> u8 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 33) & 0xFF) as u8
    }

    /// Uniform in `-amplitude..=amplitude`.
    pub fn next_offset(&mut self, amplitude: i32) -> i32 {
        i32::from(self.next_u8()) * (2 * amplitude + 1) / 256 - amplitude
    }
}

/// Smooth gradients plus pseudo-random texture, one byte per sample.
pub fn textured(width: usize, height: usize, planes: usize, seed: u64) -> Vec<u8> {
    let mut rng = Lcg::new(seed);
    let mut data = Vec::with_capacity(width * height * planes);
    for y in 0..height {
        for x in 0..width {
            for p in 0..planes {
                let base = (x * 160 / width + y * 60 / height + p * 20) as i32;
                let v = base + rng.next_offset(30);
                data.push(v.clamp(0, 255) as u8);
            }
        }
    }
    data
}

/// Add uniform noise of the given amplitude to every sample.
pub fn add_noise(data: &[u8], amplitude: i32, seed: u64) -> Vec<u8> {
    let mut rng = Lcg::new(seed);
    data.iter()
        .map(|&v| (i32::from(v) + rng.next_offset(amplitude)).clamp(0, 255) as u8)
        .collect()
}

pub fn gray(data: Vec<u8>, width: usize, height: usize, decomposition: Decomposition) -> Image {
    Image::from_gray8(Img::new(data, width, height).as_ref(), decomposition).unwrap()
}

/// Write a binary PGM (`planes == 1`) or PPM (`planes == 3`) file.
pub fn write_pnm(path: &Path, width: usize, height: usize, planes: usize, data: &[u8]) {
    let magic = if planes == 3 { "P6" } else { "P5" };
    let mut bytes = format!("{magic}\n{width} {height}\n255\n").into_bytes();
    bytes.extend_from_slice(data);
    fs::write(path, bytes).unwrap();
}
