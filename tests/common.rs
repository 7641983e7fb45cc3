#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Gradient with pseudo-random noise, so encoders cannot shrink it to nothing.
pub fn noisy_image(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    RgbImage::from_fn(width, height, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state & 0x3f) as u8;
        Rgb([
            ((x * 255 / width.max(1)) as u8).saturating_add(noise),
            ((y * 255 / height.max(1)) as u8).saturating_add(noise / 2),
            noise.wrapping_mul(3),
        ])
    })
}

pub fn write_png(path: &Path, width: u32, height: u32) -> PathBuf {
    noisy_image(width, height, width ^ height)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
    path.to_path_buf()
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) -> PathBuf {
    noisy_image(width, height, width + height)
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
    path.to_path_buf()
}

/// Lossless WebP, standing in for an output of an earlier run.
pub fn write_webp(path: &Path, width: u32, height: u32) -> PathBuf {
    noisy_image(width, height, 7)
        .save_with_format(path, ImageFormat::WebP)
        .unwrap();
    path.to_path_buf()
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

/// A small hotel tree: two rooms, an already deduplicated lobby and a junk screenshot.
pub fn create_site_tree(root: &Path) {
    let rooms = root.join("rooms");
    fs::create_dir_all(&rooms).unwrap();
    write_png(&rooms.join("suite.png"), 320, 240);
    write_jpeg(&rooms.join("deluxe.jpg"), 300, 200);
    write_webp(&root.join("lobby-optimized.webp"), 120, 80);
    fs::write(root.join("Screenshot 2024-01-02 at 10.00.00.png"), b"junk").unwrap();
}

/// Every file under `root` with its bytes, for before/after comparisons.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let bytes = fs::read(e.path()).unwrap();
            (e.path().to_path_buf(), bytes)
        })
        .collect();
    files.sort();
    files
}
