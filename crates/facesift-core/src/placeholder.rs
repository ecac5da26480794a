//! Deterministic stand-in for face recognition.
//!
//! Reduces a photo to a 16×16 grayscale thumbnail, removes its mean and
//! scales it to unit length. Two photos compare with the same cosine
//! distance the ArcFace backend uses, so near-duplicate photos match and
//! unrelated ones do not. A flat photo has no signature and is treated as
//! "no face".

use crate::types::Embedding;
use image::imageops::FilterType;
use image::DynamicImage;

const THUMBNAIL_SIZE: u32 = 16;
pub const THUMBNAIL_MODEL_VERSION: &str = "thumbnail-16";

/// Compute the thumbnail signature of a decoded photo.
pub fn thumbnail_signature(image: &DynamicImage) -> Option<Embedding> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let thumb = image
        .resize_exact(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<f32> = thumb.pixels().map(|p| p[0] as f32).collect();
    let mean = pixels.iter().sum::<f32>() / pixels.len() as f32;

    Embedding::normalized(pixels.into_iter().map(|p| p - mean).collect(), THUMBNAIL_MODEL_VERSION)
}
