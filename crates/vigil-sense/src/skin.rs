//! Pixel heuristics for per-frame skin metrics.

use crate::face::FaceLandmarks;
use image::RgbImage;
use thiserror::Error;
use vigil_core::{Measurement, Signal};

/// Red channel must exceed green and blue by more than this to count as inflamed.
const REDNESS_MARGIN: i16 = 15;
/// Centre window used for roughness, as fractions of width/height.
const TEXTURE_WINDOW: (f32, f32) = (0.3, 0.7);
const TEXTURE_STEP: usize = 4;

/// Under-eye points (left eye 41, 40; right eye 46, 47) and cheek points beside the nose.
const UNDER_EYE: [usize; 4] = [41, 40, 46, 47];
const CHEEKS: [usize; 2] = [31, 35];

const ACNE_GAIN: f32 = 2.0;
const TEXTURE_GAIN: f32 = 5.0;
const CIRCLES_GAIN: f32 = 3.0;
const MIN_HEALTH: f32 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("landmark {index} at ({x}, {y}) lies outside the {width}x{height} frame")]
    LandmarkOutOfBounds {
        index: usize,
        x: f32,
        y: f32,
        width: u32,
        height: u32,
    },
}

/// Normalised per-frame metrics, each in 0–100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinMetrics {
    pub health: f32,
    pub acne: f32,
    pub texture: f32,
    pub circles: f32,
}

impl SkinMetrics {
    /// Scale raw heuristics into 0–100 and derive overall health.
    pub fn from_raw(redness_pct: f32, roughness: f32, contrast: f32) -> Self {
        let acne = (redness_pct * ACNE_GAIN).min(100.0);
        let texture = (roughness * TEXTURE_GAIN).min(100.0);
        let circles = (contrast * CIRCLES_GAIN).min(100.0);
        let health = (100.0 - (acne * 0.4 + texture * 0.3 + circles * 0.3)).max(MIN_HEALTH);
        Self {
            health,
            acne,
            texture,
            circles,
        }
    }

    pub fn to_measurement(&self) -> Measurement {
        Measurement::new()
            .with(Signal::Health, self.health)
            .with(Signal::Acne, self.acne)
            .with(Signal::Texture, self.texture)
            .with(Signal::Circles, self.circles)
    }
}

fn gray(px: &image::Rgb<u8>) -> f32 {
    (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0
}

/// Percentage (0–100) of pixels whose red channel dominates.
pub fn redness_percent(img: &RgbImage) -> f32 {
    let total = img.width() as usize * img.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let red = img
        .pixels()
        .filter(|p| {
            let (r, g, b) = (p[0] as i16, p[1] as i16, p[2] as i16);
            r > g + REDNESS_MARGIN && r > b + REDNESS_MARGIN
        })
        .count();
    red as f32 / total as f32 * 100.0
}

/// Grayscale standard deviation over the centre window, scaled down by 10.
pub fn roughness(img: &RgbImage) -> f32 {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x0 = (w * TEXTURE_WINDOW.0) as u32;
    let x1 = (w * TEXTURE_WINDOW.1) as u32;
    let y0 = (h * TEXTURE_WINDOW.0) as u32;
    let y1 = (h * TEXTURE_WINDOW.1) as u32;

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;
    for y in (y0..y1).step_by(TEXTURE_STEP) {
        for x in (x0..x1).step_by(TEXTURE_STEP) {
            let v = gray(img.get_pixel(x, y)) as f64;
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (variance.sqrt() / 10.0) as f32
}

fn brightness_at(img: &RgbImage, landmarks: &FaceLandmarks, index: usize) -> Result<f32, FrameError> {
    let p = landmarks.point(index).ok_or(FrameError::Empty)?;
    let (x, y) = (p.x.floor(), p.y.floor());
    if x < 0.0 || y < 0.0 || x >= img.width() as f32 || y >= img.height() as f32 {
        return Err(FrameError::LandmarkOutOfBounds {
            index,
            x: p.x,
            y: p.y,
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(gray(img.get_pixel(x as u32, y as u32)))
}

/// Cheek brightness minus under-eye brightness, floored at zero.
pub fn under_eye_contrast(img: &RgbImage, landmarks: &FaceLandmarks) -> Result<f32, FrameError> {
    let mut under_eye = 0.0;
    for index in UNDER_EYE {
        under_eye += brightness_at(img, landmarks, index)?;
    }
    let mut cheeks = 0.0;
    for index in CHEEKS {
        cheeks += brightness_at(img, landmarks, index)?;
    }
    let diff = cheeks / CHEEKS.len() as f32 - under_eye / UNDER_EYE.len() as f32;
    Ok(diff.max(0.0))
}

/// Full per-frame analysis for one face.
pub fn analyze_frame(img: &RgbImage, landmarks: &FaceLandmarks) -> Result<SkinMetrics, FrameError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(FrameError::Empty);
    }
    let redness = redness_percent(img);
    let rough = roughness(img);
    let contrast = under_eye_contrast(img, landmarks)?;
    let metrics = SkinMetrics::from_raw(redness, rough, contrast);
    tracing::debug!(redness, rough, contrast, ?metrics, "analyzed skin frame");
    Ok(metrics)
}
