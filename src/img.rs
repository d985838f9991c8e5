use serde::{Deserialize, Serialize};

use crate::*;

/// One pixel, channels in R, G, B order.
pub type Rgb = [u8; 3];

#[derive(Clone, PartialEq)]
/// Row-major RGB image. Width and height are always positive.
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Axis aligned rectangle in pixel coordinates.
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Build an image from row-major pixels.
    pub fn new(width: usize, height: usize, pixels: Vec<Rgb>) -> HbowResult<Self> {
        if width == 0 || height == 0 {
            return Err(HbowErr::ImageLoad {
                path: "<memory>".into(),
                reason: format!("zero-size image {}x{}", width, height),
            });
        }
        if pixels.len() != width * height {
            return Err(HbowErr::ImageLoad {
                path: "<memory>".into(),
                reason: format!(
                    "expected {} pixels for {}x{}, got {}",
                    width * height,
                    width,
                    height,
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build an image from a packed `RGBRGB...` byte buffer.
    pub fn from_rgb_bytes(width: usize, height: usize, bytes: &[u8]) -> HbowResult<Self> {
        if bytes.len() % 3 != 0 {
            return Err(HbowErr::ImageLoad {
                path: "<memory>".into(),
                reason: format!("buffer length {} is not a multiple of 3", bytes.len()),
            });
        }
        let pixels = bytes.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Self::new(width, height, pixels)
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F: FnMut(usize, usize) -> Rgb>(
        width: usize,
        height: usize,
        mut f: F,
    ) -> HbowResult<Self> {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub fn rows(&self) -> std::slice::Chunks<'_, Rgb> {
        self.pixels.chunks(self.width)
    }

    /// Rectangle covering the whole image.
    pub fn bounds(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// Iterate over the pixels of `region`, row by row.
    ///
    /// An empty region, or one whose far corner does not fit in `usize`, is an
    /// `InvalidRegion`. A region reaching past the image is `InsufficientImageSize`.
    pub fn region_pixels(&self, region: Rect) -> HbowResult<impl Iterator<Item = &Rgb> + '_> {
        if region.width == 0 || region.height == 0 {
            return Err(HbowErr::InvalidRegion(region));
        }
        let (right, bottom) = match (
            region.x.checked_add(region.width),
            region.y.checked_add(region.height),
        ) {
            (Some(right), Some(bottom)) => (right, bottom),
            _ => return Err(HbowErr::InvalidRegion(region)),
        };
        self.require(right, bottom)?;
        let w = self.width;
        Ok((region.y..region.y + region.height).flat_map(move |y| {
            let start = y * w + region.x;
            self.pixels[start..start + region.width].iter()
        }))
    }

    /// Fail with `InsufficientImageSize` if the image is smaller than `min_width`x`min_height`.
    pub fn require(&self, min_width: usize, min_height: usize) -> HbowResult<()> {
        if self.width < min_width || self.height < min_height {
            return Err(HbowErr::InsufficientImageSize {
                width: self.width,
                height: self.height,
                min_width,
                min_height,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_size_and_short_buffers() {
        assert!(matches!(
            Image::new(0, 4, vec![]),
            Err(HbowErr::ImageLoad { .. })
        ));
        assert!(matches!(
            Image::from_rgb_bytes(2, 2, &[0; 9]),
            Err(HbowErr::ImageLoad { .. })
        ));
    }

    #[test]
    fn region_pixels_walks_rows() {
        let img = Image::from_fn(4, 3, |x, y| [x as u8, y as u8, 0]).unwrap();
        let region = Rect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };
        let px: Vec<Rgb> = img.region_pixels(region).unwrap().copied().collect();
        assert_eq!(px, vec![[1, 1, 0], [2, 1, 0], [1, 2, 0], [2, 2, 0]]);

        let outside = Rect { x: 3, ..region };
        assert!(matches!(
            img.region_pixels(outside),
            Err(HbowErr::InsufficientImageSize {
                min_width: 5,
                min_height: 3,
                ..
            })
        ));
    }

    #[test]
    fn oversized_region_needs_larger_image() {
        let img = Image::from_fn(4, 4, |_, _| [0; 3]).unwrap();
        let region = Rect {
            x: 0,
            y: 0,
            width: 7,
            height: 7,
        };
        match img.region_pixels(region) {
            Err(HbowErr::InsufficientImageSize {
                width,
                height,
                min_width,
                min_height,
            }) => assert_eq!((width, height, min_width, min_height), (4, 4, 7, 7)),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("region larger than the image was accepted"),
        };
    }

    #[test]
    fn degenerate_regions_are_invalid() {
        let img = Image::from_fn(4, 4, |_, _| [0; 3]).unwrap();
        let empty = Rect {
            x: 0,
            y: 0,
            width: 0,
            height: 2,
        };
        assert!(matches!(img.region_pixels(empty), Err(HbowErr::InvalidRegion(_))));
        let overflowing = Rect {
            x: usize::MAX,
            y: 0,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            img.region_pixels(overflowing),
            Err(HbowErr::InvalidRegion(_))
        ));
    }
}
