//! Image fixtures shared by the integration tests.

use image::{ImageBuffer, Rgb};
use std::fs;
use std::path::{Path, PathBuf};

/// Distinct synthetic pictures.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    HorizontalGradient,
    VerticalGradient,
    Checkerboard,
    Diagonal,
}

/// Write a 64x48 PNG of `pattern` to `dir/name`.
pub fn write_png(dir: &Path, name: &str, pattern: Pattern) -> PathBuf {
    write_png_sized(dir, name, pattern, 64, 48)
}

pub fn write_png_sized(dir: &Path, name: &str, pattern: Pattern, w: u32, h: u32) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let img = ImageBuffer::from_fn(w, h, |x, y| {
        let (xs, ys) = (x * 255 / w, y * 255 / h);
        let v = match pattern {
            Pattern::HorizontalGradient => xs,
            Pattern::VerticalGradient => ys,
            Pattern::Checkerboard => {
                if (x * 4 / w + y * 4 / h) % 2 == 0 {
                    230
                } else {
                    20
                }
            }
            Pattern::Diagonal => ((x * 4 / w + y * 4 / h) * 60) % 256,
        } as u8;
        Rgb([v, v, v])
    });
    img.save(&path).unwrap();
    path
}

/// A file with an image extension that cannot be decoded.
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"definitely not a png").unwrap();
    path
}
