//! Mask compliance collaborator.

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryError, CapturedImage};
use crate::faces::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskStatus {
    WithMask,
    WithoutMask,
    #[default]
    Unknown,
}

impl MaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MaskStatus::WithMask => "with_mask",
            MaskStatus::WithoutMask => "without_mask",
            MaskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary mask classifier. Callers map any error to [`MaskStatus::Unknown`].
pub trait MaskClassifier: Send + Sync {
    fn classify(
        &self,
        image: &CapturedImage,
        face: Option<BoundingBox>,
    ) -> Result<MaskStatus, BoundaryError>;
}

/// Colour heuristic: a covered mouth and nose leave little skin-toned area in
/// the lower half of the face.
#[derive(Debug, Clone, Copy)]
pub struct SkinToneMaskClassifier {
    /// Skin fractions below this mean a mask is worn.
    pub min_skin_ratio: f64,
}

impl Default for SkinToneMaskClassifier {
    fn default() -> Self {
        Self {
            min_skin_ratio: 0.3,
        }
    }
}

impl SkinToneMaskClassifier {
    /// Fraction of skin-toned pixels in the lower half of `face`.
    pub fn skin_ratio(&self, rgb: &RgbImage, face: Option<BoundingBox>) -> Result<f64, BoundaryError> {
        let (left, top, right, bottom) = clamp_face(rgb, face)?;
        let mid = top + (bottom - top) / 2;

        let mut total = 0u64;
        let mut skin = 0u64;
        for y in mid..bottom {
            for x in left..right {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                total += 1;
                if is_skin(r, g, b) {
                    skin += 1;
                }
            }
        }
        if total == 0 {
            return Err(BoundaryError::Failed("face region is empty".into()));
        }
        Ok(skin as f64 / total as f64)
    }
}

impl MaskClassifier for SkinToneMaskClassifier {
    fn classify(
        &self,
        image: &CapturedImage,
        face: Option<BoundingBox>,
    ) -> Result<MaskStatus, BoundaryError> {
        let decoded = image::load_from_memory(image.bytes())
            .map_err(|err| BoundaryError::Failed(format!("failed to decode image: {err}")))?;
        let ratio = self.skin_ratio(&decoded.to_rgb8(), face)?;
        Ok(if ratio < self.min_skin_ratio {
            MaskStatus::WithMask
        } else {
            MaskStatus::WithoutMask
        })
    }
}

fn clamp_face(rgb: &RgbImage, face: Option<BoundingBox>) -> Result<(u32, u32, u32, u32), BoundaryError> {
    let (width, height) = rgb.dimensions();
    let Some(face) = face else {
        return Ok((0, 0, width, height));
    };
    let clamp = |value: i64, max: u32| value.clamp(0, i64::from(max)) as u32;
    let left = clamp(face.left, width);
    let right = clamp(face.right, width);
    let top = clamp(face.top, height);
    let bottom = clamp(face.bottom, height);
    if left >= right || top + 1 >= bottom {
        return Err(BoundaryError::Failed(
            "face box lies outside the image".into(),
        ));
    }
    Ok((left, top, right, bottom))
}

/// Skin band in 8-bit HSV with hue halved to 0..180: H <= 20, S >= 20,
/// V >= 70.
fn is_skin(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let value = max;
    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let hue_degrees = if delta == 0.0 {
        0.0
    } else if max == r {
        (60.0 * (g - b) / delta).rem_euclid(360.0)
    } else if max == g {
        60.0 * (b - r) / delta + 120.0
    } else {
        60.0 * (r - g) / delta + 240.0
    };
    let hue = hue_degrees / 2.0;

    hue <= 20.0 && saturation >= 20.0 && value >= 70.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    const SKIN: Rgb<u8> = Rgb([220, 170, 140]);
    const SURGICAL_BLUE: Rgb<u8> = Rgb([120, 170, 220]);

    fn face_image(lower: Rgb<u8>) -> CapturedImage {
        let img = RgbImage::from_fn(40, 40, |_, y| if y < 20 { SKIN } else { lower });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        CapturedImage::new(buf, 0)
    }

    #[test]
    fn skin_band_matches_warm_tones() {
        assert!(is_skin(SKIN[0], SKIN[1], SKIN[2]));
        assert!(!is_skin(SURGICAL_BLUE[0], SURGICAL_BLUE[1], SURGICAL_BLUE[2]));
        assert!(!is_skin(20, 15, 10));
    }

    #[test]
    fn covered_lower_face_is_masked() {
        let status = SkinToneMaskClassifier::default()
            .classify(&face_image(SURGICAL_BLUE), None)
            .unwrap();
        assert_eq!(status, MaskStatus::WithMask);
    }

    #[test]
    fn bare_lower_face_is_unmasked() {
        let face = BoundingBox {
            left: 5,
            top: 0,
            right: 35,
            bottom: 40,
        };
        let status = SkinToneMaskClassifier::default()
            .classify(&face_image(SKIN), Some(face))
            .unwrap();
        assert_eq!(status, MaskStatus::WithoutMask);
    }

    #[test]
    fn undecodable_bytes_fail() {
        let err = SkinToneMaskClassifier::default()
            .classify(&CapturedImage::new(vec![1u8, 2, 3], 0), None)
            .unwrap_err();
        assert!(matches!(err, BoundaryError::Failed(_)));
    }

    #[test]
    fn face_box_outside_image_fails() {
        let face = BoundingBox {
            left: 100,
            top: 100,
            right: 140,
            bottom: 140,
        };
        let rgb = RgbImage::from_pixel(10, 10, SKIN);
        assert!(SkinToneMaskClassifier::default()
            .skin_ratio(&rgb, Some(face))
            .is_err());
    }
}
