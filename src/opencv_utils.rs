#![cfg(feature = "opencv")]
use crate::{HbowErr, HbowResult, Image, ImageSource};
use opencv::{self, core::MatTrait};
use std::path::Path;

type CvMat = opencv::core::Mat;

/// Copy an 8-bit BGR opencv matrix into an RGB `Image`.
fn image_from_cvmat(cv_img: &CvMat, path: &Path) -> HbowResult<Image> {
    if cv_img.empty()? {
        return Err(HbowErr::ImageLoad {
            path: path.display().to_string(),
            reason: "opencv returned an empty matrix".into(),
        });
    }
    let rows = cv_img.rows();
    let cols = cv_img.cols();

    // View as single channel so each byte is addressable as (row, col * 3 + channel).
    let flat = cv_img.reshape(1, rows)?;
    let mut bytes = Vec::with_capacity((rows * cols * 3) as usize);
    for y in 0..rows {
        for x in 0..cols {
            let b = *flat.at_2d::<u8>(y, x * 3)?;
            let g = *flat.at_2d::<u8>(y, x * 3 + 1)?;
            let r = *flat.at_2d::<u8>(y, x * 3 + 2)?;
            bytes.extend_from_slice(&[r, g, b]);
        }
    }
    Image::from_rgb_bytes(cols as usize, rows as usize, &bytes)
}

#[derive(Debug, Clone, Copy, Default)]
/// Image source using opencv's `imread`.
pub struct OpenCvSource;

impl ImageSource for OpenCvSource {
    fn load(&self, path: &Path) -> HbowResult<Image> {
        let name = path.to_str().ok_or_else(|| HbowErr::ImageLoad {
            path: path.display().to_string(),
            reason: "path is not valid UTF-8".into(),
        })?;
        let img = opencv::imgcodecs::imread(name, opencv::imgcodecs::IMREAD_COLOR)?;
        image_from_cvmat(&img, path)
    }
}
