use crate::*;

/// Smallest image the 3x3 derivative kernel is applied to.
pub const KERNEL_FOOTPRINT: usize = 3;

/// Row-major 8-bit single channel map.
pub struct GrayMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayMap {
    #[inline]
    fn at(&self, x: usize, y: usize) -> i32 {
        self.data[y * self.width + x] as i32
    }
}

/// ITU-R 601 luma, fixed point with 14 fractional bits.
#[inline]
pub fn luma(px: Rgb) -> u8 {
    let [r, g, b] = px;
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

pub fn luminance(image: &Image) -> GrayMap {
    let mut data = Vec::with_capacity(image.width() * image.height());
    for row in image.rows() {
        data.extend(row.iter().map(|&px| luma(px)));
    }
    GrayMap {
        width: image.width(),
        height: image.height(),
        data,
    }
}

/// Mirror an out-of-range coordinate back inside `[0, n)` without repeating the edge sample.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - i - 2
    } else {
        i
    };
    r as usize
}

/// Mean of two saturated absolute gradients. Halves round up, so `(0, 1)` gives 1 and
/// `(2, 1)` gives 2; a round-half-to-even rule would give 0 and 2. Bin boundaries at
/// multiples of `256 / B` are unaffected when `B` divides 256.
#[inline]
pub fn combine_gradients(ax: i32, ay: i32) -> u8 {
    ((ax.min(255) + ay.min(255) + 1) / 2) as u8
}

/// Sobel gradient magnitude: `(|gx| + |gy|) / 2` rounded half up, each absolute value
/// saturated to 255 first.
pub fn gradient_magnitude(image: &Image) -> HbowResult<GrayMap> {
    image.require(KERNEL_FOOTPRINT, KERNEL_FOOTPRINT)?;
    let gray = luminance(image);
    let (w, h) = (gray.width, gray.height);
    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        let ym = reflect(y as isize - 1, h);
        let yp = reflect(y as isize + 1, h);
        for x in 0..w {
            let xm = reflect(x as isize - 1, w);
            let xp = reflect(x as isize + 1, w);

            let gx = (gray.at(xp, ym) + 2 * gray.at(xp, y) + gray.at(xp, yp))
                - (gray.at(xm, ym) + 2 * gray.at(xm, y) + gray.at(xm, yp));
            let gy = (gray.at(xm, yp) + 2 * gray.at(x, yp) + gray.at(xp, yp))
                - (gray.at(xm, ym) + 2 * gray.at(x, ym) + gray.at(xp, ym));

            data.push(combine_gradients(gx.abs(), gy.abs()));
        }
    }
    Ok(GrayMap {
        width: w,
        height: h,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_of_primaries() {
        assert_eq!(luma([0, 0, 0]), 0);
        assert_eq!(luma([255, 255, 255]), 255);
        assert_eq!(luma([255, 0, 0]), 76);
        assert_eq!(luma([0, 255, 0]), 150);
        assert_eq!(luma([0, 0, 255]), 29);
    }

    #[test]
    fn reflect_skips_edge() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
    }

    #[test]
    fn gradient_mean_rounds_half_up() {
        assert_eq!(combine_gradients(0, 0), 0);
        assert_eq!(combine_gradients(0, 1), 1);
        assert_eq!(combine_gradients(2, 1), 2);
        assert_eq!(combine_gradients(3, 0), 2);
        assert_eq!(combine_gradients(1020, 0), 128);
        assert_eq!(combine_gradients(1020, 1020), 255);
    }

    #[test]
    fn flat_image_has_no_gradient() {
        let img = Image::from_fn(6, 5, |_, _| [90, 30, 200]).unwrap();
        let mag = gradient_magnitude(&img).unwrap();
        assert!(mag.data.iter().all(|&m| m == 0));
    }

    #[test]
    fn vertical_edge_saturates() {
        // Left half black, right half white: |gx| = 4 * 255 clipped to 255, gy = 0.
        let img = Image::from_fn(6, 4, |x, _| if x < 3 { [0; 3] } else { [255; 3] }).unwrap();
        let mag = gradient_magnitude(&img).unwrap();
        assert_eq!(mag.data[2], 128);
        assert_eq!(mag.data[3], 128);
        assert_eq!(mag.data[0], 0);
        assert_eq!(mag.data[5], 0);
    }

    #[test]
    fn tiny_image_is_rejected() {
        let img = Image::from_fn(2, 8, |_, _| [0; 3]).unwrap();
        assert!(matches!(
            gradient_magnitude(&img),
            Err(HbowErr::InsufficientImageSize { .. })
        ));
    }
}
