//! Synthetic images for unit tests

use std::path::Path;

use image::{Rgb, RgbImage};

/// Spread `seed` over all 64 bits so every code mixes black and white cells
pub fn pattern_code(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// 8x8 black/white image whose average hash is determined by `seed`
pub fn block_image(seed: u64) -> RgbImage {
    let code = pattern_code(seed);
    RgbImage::from_fn(8, 8, |x, y| {
        if (code >> (y * 8 + x)) & 1 == 1 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Write [`block_image`] as PNG
pub fn write_block_image(path: &Path, seed: u64) {
    block_image(seed).save(path).unwrap();
}
