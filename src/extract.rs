use log::debug;
use serde::{Deserialize, Serialize};

use crate::texture::{self, KERNEL_FOOTPRINT};
use crate::*;

/// Half side of the default center block (7x7).
pub const DEFAULT_HALF: usize = 3;
/// Bins per channel for RGB histograms.
pub const DEFAULT_BINS: usize = 8;
/// Bins per axis for the rg chromaticity histogram.
pub const DEFAULT_CHROMA_BINS: usize = 16;
/// Upper bound on bins per axis. Finer bins than one per 8-bit level stay empty.
pub const MAX_BINS: usize = 256;
/// Upper bound on the number of tiles in a tiling.
pub const MAX_TILES: usize = 1024;

fn default_half() -> usize {
    DEFAULT_HALF
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

fn default_chroma_bins() -> usize {
    DEFAULT_CHROMA_BINS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
/// The closed set of descriptor families. Each variant carries its parameters.
pub enum ExtractorKind {
    /// Raw `(2h+1)x(2h+1)` RGB window at the image center.
    PixelBlock {
        #[serde(default = "default_half")]
        half: usize,
    },
    /// Joint RGB histogram over one region (the whole image when `region` is unset).
    RegionHistogram {
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default)]
        region: Option<Rect>,
    },
    /// One RGB histogram per tile, tiles in row-major order.
    MultiRegionHistogram {
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default)]
        tiling: Tiling,
    },
    /// 2D rg chromaticity histogram.
    Chromaticity {
        #[serde(default = "default_chroma_bins")]
        bins: usize,
    },
    /// Whole image RGB histogram followed by a gradient magnitude histogram.
    ColorTexture {
        #[serde(default = "default_bins")]
        bins: usize,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
/// Disjoint partition of an image into tiles.
pub enum Tiling {
    /// Top half, then bottom half.
    Halves,
    Grid { rows: usize, cols: usize },
}

impl Default for Tiling {
    fn default() -> Self {
        Tiling::Halves
    }
}

impl Tiling {
    fn grid(self) -> (usize, usize) {
        match self {
            Tiling::Halves => (2, 1),
            Tiling::Grid { rows, cols } => (rows, cols),
        }
    }

    pub fn num_tiles(self) -> usize {
        let (rows, cols) = self.grid();
        rows.saturating_mul(cols)
    }

    fn validate(self) -> HbowResult<()> {
        let (rows, cols) = self.grid();
        if rows == 0 || cols == 0 || self.num_tiles() > MAX_TILES {
            return Err(HbowErr::InvalidParameter(format!(
                "tiling must have between 1 and {} tiles, got {}x{}",
                MAX_TILES, rows, cols
            )));
        }
        Ok(())
    }

    /// Tiles covering the whole image, row-major. Edges sit at `floor(i * len / n)`.
    pub fn regions(self, width: usize, height: usize) -> HbowResult<Vec<Rect>> {
        self.validate()?;
        let (rows, cols) = self.grid();
        if width < cols || height < rows {
            return Err(HbowErr::InsufficientImageSize {
                width,
                height,
                min_width: cols,
                min_height: rows,
            });
        }
        let mut tiles = Vec::with_capacity(self.num_tiles());
        for r in 0..rows {
            let y0 = r * height / rows;
            let y1 = (r + 1) * height / rows;
            for c in 0..cols {
                let x0 = c * width / cols;
                let x1 = (c + 1) * width / cols;
                tiles.push(Rect {
                    x: x0,
                    y: y0,
                    width: x1 - x0,
                    height: y1 - y0,
                });
            }
        }
        Ok(tiles)
    }
}

impl ExtractorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractorKind::PixelBlock { .. } => "pixel-block",
            ExtractorKind::RegionHistogram { .. } => "region-histogram",
            ExtractorKind::MultiRegionHistogram { .. } => "multi-region-histogram",
            ExtractorKind::Chromaticity { .. } => "chromaticity",
            ExtractorKind::ColorTexture { .. } => "color-texture",
        }
    }

    /// Reject parameters no image can satisfy, before anything is allocated for them.
    pub fn validate(&self) -> HbowResult<()> {
        match *self {
            ExtractorKind::PixelBlock { half } => block_side(half).map(|_| ()),
            ExtractorKind::RegionHistogram { bins, .. }
            | ExtractorKind::Chromaticity { bins }
            | ExtractorKind::ColorTexture { bins } => check_bins(bins),
            ExtractorKind::MultiRegionHistogram { bins, tiling } => {
                check_bins(bins)?;
                tiling.validate()
            }
        }
    }

    /// Compute the raw (unnormalized) descriptor of `image`.
    pub fn extract(&self, image: &Image) -> HbowResult<Descriptor> {
        self.validate()?;
        let descriptor = match *self {
            ExtractorKind::PixelBlock { half } => pixel_block(image, half)?,
            ExtractorKind::RegionHistogram { bins, region } => {
                let region = region.unwrap_or_else(|| image.bounds());
                Descriptor::single(color_histogram(image, region, bins, "color")?)
            }
            ExtractorKind::MultiRegionHistogram { bins, tiling } => {
                multi_region_histogram(image, tiling, bins)?
            }
            ExtractorKind::Chromaticity { bins } => {
                Descriptor::single(chromaticity_histogram(image, bins)?)
            }
            ExtractorKind::ColorTexture { bins } => color_texture_histogram(image, bins)?,
        };
        debug!(target: "hbow::extract", "{} extracted {} values from {:?}", self.name(), descriptor.len(), image);
        Ok(descriptor)
    }

    /// Fields this extractor produces, in order. Used to split persisted rows.
    pub fn layout(&self) -> Vec<FieldSpec> {
        match *self {
            ExtractorKind::PixelBlock { half } => {
                let side = 2 * half + 1;
                vec![FieldSpec::new(
                    "pixels",
                    FieldTag::RawPixels,
                    Shape::d3(side, side, 3),
                )]
            }
            ExtractorKind::RegionHistogram { bins, .. } => {
                vec![FieldSpec::new("color", FieldTag::Color, cube(bins))]
            }
            ExtractorKind::MultiRegionHistogram { bins, tiling } => (0..tiling.num_tiles())
                .map(|i| FieldSpec::new(region_name(i), FieldTag::Color, cube(bins)))
                .collect(),
            ExtractorKind::Chromaticity { bins } => {
                vec![FieldSpec::new("rg", FieldTag::Color, Shape::d2(bins, bins))]
            }
            ExtractorKind::ColorTexture { bins } => vec![
                FieldSpec::new("color", FieldTag::Color, cube(bins)),
                FieldSpec::new("texture", FieldTag::Texture, Shape::d1(bins)),
            ],
        }
    }

    /// Whether descriptors of this family are normalized before comparison.
    pub fn normalizes(&self) -> bool {
        !matches!(self, ExtractorKind::PixelBlock { .. })
    }

    /// The metric this family is compared with unless configured otherwise.
    pub fn default_metric(&self) -> HbowResult<MetricKind> {
        self.validate()?;
        Ok(match *self {
            ExtractorKind::PixelBlock { .. } => MetricKind::Ssd,
            ExtractorKind::RegionHistogram { .. } | ExtractorKind::Chromaticity { .. } => {
                MetricKind::IntersectionDistance
            }
            ExtractorKind::MultiRegionHistogram { tiling, .. } => MetricKind::Weighted(
                WeightedCombination::uniform(FieldMetric::IntersectionDistance, tiling.num_tiles())?,
            ),
            ExtractorKind::ColorTexture { .. } => {
                MetricKind::Weighted(WeightedCombination::uniform(FieldMetric::IntersectionDistance, 2)?)
            }
        })
    }
}

fn cube(bins: usize) -> Shape {
    Shape::d3(bins, bins, bins)
}

fn region_name(i: usize) -> String {
    format!("region-{}", i)
}

fn check_bins(bins: usize) -> HbowResult<()> {
    if bins == 0 || bins > MAX_BINS {
        return Err(HbowErr::InvalidParameter(format!(
            "bin count must be between 1 and {}, got {}",
            MAX_BINS, bins
        )));
    }
    Ok(())
}

/// Side `2h+1` of the center block, or `InvalidParameter` when it cannot be represented.
fn block_side(half: usize) -> HbowResult<usize> {
    half.checked_mul(2)
        .and_then(|d| d.checked_add(1))
        .filter(|&side| side.checked_mul(side).and_then(|a| a.checked_mul(3)).is_some())
        .ok_or_else(|| HbowErr::InvalidParameter(format!("block half-size {} is too large", half)))
}

/// Bin of an 8-bit channel value over `[0, 256)`. 255 always lands in the last bin.
#[inline]
pub fn bin_index(value: u8, bins: usize) -> usize {
    (value as usize * bins / 256).min(bins - 1)
}

/// Bin of a ratio over `[0, 1)`, with 1.0 clamped into the last bin.
#[inline]
pub fn unit_bin_index(ratio: f64, bins: usize) -> usize {
    ((ratio * bins as f64) as usize).min(bins - 1)
}

/// Center `(2h+1)x(2h+1)` window, channel-interleaved R, G, B.
pub fn pixel_block(image: &Image, half: usize) -> HbowResult<Descriptor> {
    let side = block_side(half)?;
    image.require(side, side)?;
    let cx = image.width() / 2;
    let cy = image.height() / 2;
    let region = Rect {
        x: cx - half,
        y: cy - half,
        width: side,
        height: side,
    };
    let values: Vec<f64> = image
        .region_pixels(region)?
        .flat_map(|px| px.iter().map(|&c| c as f64))
        .collect();
    Ok(Descriptor::single(Field::new(
        "pixels",
        FieldTag::RawPixels,
        Shape::d3(side, side, 3),
        values,
    )?))
}

/// Joint `bins^3` RGB count histogram over `region`, indexed `[r][g][b]`.
pub fn color_histogram(image: &Image, region: Rect, bins: usize, name: &str) -> HbowResult<Field> {
    check_bins(bins)?;
    let mut field = Field::zeros(name, FieldTag::Color, cube(bins));
    let hist = field.values_mut();
    for &[r, g, b] in image.region_pixels(region)? {
        let idx = (bin_index(r, bins) * bins + bin_index(g, bins)) * bins + bin_index(b, bins);
        hist[idx] += 1.;
    }
    Ok(field)
}

/// One color histogram per tile, tagged by region index.
pub fn multi_region_histogram(image: &Image, tiling: Tiling, bins: usize) -> HbowResult<Descriptor> {
    let tiles = tiling.regions(image.width(), image.height())?;
    let fields = tiles
        .into_iter()
        .enumerate()
        .map(|(i, tile)| color_histogram(image, tile, bins, &region_name(i)))
        .collect::<HbowResult<Vec<_>>>()?;
    Ok(Descriptor::new(fields))
}

/// `bins x bins` histogram of `(R/255, G/255)`, indexed `[r][g]`. Blue is ignored.
pub fn chromaticity_histogram(image: &Image, bins: usize) -> HbowResult<Field> {
    check_bins(bins)?;
    let mut field = Field::zeros("rg", FieldTag::Color, Shape::d2(bins, bins));
    let hist = field.values_mut();
    for row in image.rows() {
        for &[r, g, _] in row {
            let rb = unit_bin_index(r as f64 / 255., bins);
            let gb = unit_bin_index(g as f64 / 255., bins);
            hist[rb * bins + gb] += 1.;
        }
    }
    Ok(field)
}

/// Histogram of the gradient magnitude map over `[0, 256)`.
pub fn texture_histogram(image: &Image, bins: usize) -> HbowResult<Field> {
    check_bins(bins)?;
    let magnitude = texture::gradient_magnitude(image)?;
    let mut field = Field::zeros("texture", FieldTag::Texture, Shape::d1(bins));
    let hist = field.values_mut();
    for &m in &magnitude.data {
        hist[bin_index(m, bins)] += 1.;
    }
    Ok(field)
}

/// Whole image color histogram followed by the texture histogram.
pub fn color_texture_histogram(image: &Image, bins: usize) -> HbowResult<Descriptor> {
    image.require(KERNEL_FOOTPRINT, KERNEL_FOOTPRINT)?;
    let color = color_histogram(image, image.bounds(), bins, "color")?;
    let texture = texture_histogram(image, bins)?;
    Ok(Descriptor::single(color).with_field(texture))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Image {
        Image::from_fn(width, height, |x, y| {
            [(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8]
        })
        .unwrap()
    }

    #[test]
    fn bin_clamp_stays_in_range() {
        for &bins in &[2usize, 8, 16] {
            for v in 0..=255u8 {
                assert!(bin_index(v, bins) < bins);
            }
            assert_eq!(bin_index(255, bins), bins - 1);
            assert_eq!(bin_index(0, bins), 0);
            assert_eq!(unit_bin_index(1.0, bins), bins - 1);
            assert_eq!(unit_bin_index(0.0, bins), 0);
        }
        assert_eq!(bin_index(127, 2), 0);
        assert_eq!(bin_index(128, 2), 1);
    }

    #[test]
    fn pixel_block_needs_seven_by_seven() {
        let small = gradient(6, 10);
        assert!(matches!(
            pixel_block(&small, 3),
            Err(HbowErr::InsufficientImageSize { .. })
        ));
        let d = pixel_block(&gradient(7, 7), 3).unwrap();
        assert_eq!(d.len(), 3 * 49);
        assert_eq!(d.fields()[0].tag(), FieldTag::RawPixels);
    }

    #[test]
    fn pixel_block_is_centered_and_interleaved() {
        let img = gradient(9, 11);
        let d = pixel_block(&img, 1).unwrap();
        // Center is (4, 5); window starts at (3, 4).
        let first = img.pixel(3, 4);
        let values = d.fields()[0].values();
        assert_eq!(&values[..3], &[first[0] as f64, first[1] as f64, first[2] as f64]);
        let center = img.pixel(4, 5);
        assert_eq!(&values[12..15], &[center[0] as f64, center[1] as f64, center[2] as f64]);
    }

    #[test]
    fn color_histogram_counts_every_pixel() {
        let img = gradient(20, 13);
        let field = color_histogram(&img, img.bounds(), 8, "color").unwrap();
        assert_eq!(field.shape().dims(), &[8, 8, 8]);
        assert_eq!(field.sum(), (20 * 13) as f64);
    }

    #[test]
    fn color_histogram_bins_joint_rgb() {
        let img = Image::from_fn(2, 1, |x, _| if x == 0 { [255, 0, 0] } else { [0, 255, 255] }).unwrap();
        let field = color_histogram(&img, img.bounds(), 2, "color").unwrap();
        // [r][g][b] with 2 bins: red -> (1,0,0) = 4, cyan -> (0,1,1) = 3.
        assert_eq!(field.values(), &[0., 0., 0., 1., 1., 0., 0., 0.]);
    }

    #[test]
    fn halves_cover_odd_heights() {
        let tiles = Tiling::Halves.regions(4, 5).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!((tiles[0].y, tiles[0].height), (0, 2));
        assert_eq!((tiles[1].y, tiles[1].height), (2, 3));
        let grid = Tiling::Grid { rows: 2, cols: 3 }.regions(10, 4).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.iter().map(|t| t.width * t.height).sum::<usize>(), 40);
    }

    #[test]
    fn multi_region_keeps_spatial_order() {
        // Top half red, bottom half blue.
        let img = Image::from_fn(4, 4, |_, y| if y < 2 { [255, 0, 0] } else { [0, 0, 255] }).unwrap();
        let d = multi_region_histogram(&img, Tiling::Halves, 2).unwrap();
        assert_eq!(d.num_fields(), 2);
        assert_eq!(d.fields()[0].name(), "region-0");
        assert_eq!(d.fields()[0].values()[4], 8.);
        assert_eq!(d.fields()[1].values()[1], 8.);
        assert_eq!(d.layout(), ExtractorKind::MultiRegionHistogram { bins: 2, tiling: Tiling::Halves }.layout());
    }

    #[test]
    fn chromaticity_ignores_blue() {
        let a = Image::from_fn(3, 3, |_, _| [200, 40, 0]).unwrap();
        let b = Image::from_fn(3, 3, |_, _| [200, 40, 255]).unwrap();
        let ha = chromaticity_histogram(&a, 16).unwrap();
        let hb = chromaticity_histogram(&b, 16).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(ha.values()[unit_bin_index(200. / 255., 16) * 16 + unit_bin_index(40. / 255., 16)], 9.);
    }

    #[test]
    fn color_texture_layout() {
        let kind = ExtractorKind::ColorTexture { bins: 8 };
        let d = kind.extract(&gradient(16, 16)).unwrap();
        d.check_layout(&kind.layout()).unwrap();
        assert_eq!(d.fields()[1].tag(), FieldTag::Texture);
        assert_eq!(d.fields()[1].sum(), 256.);
    }

    #[test]
    fn zero_bins_rejected() {
        let img = gradient(4, 4);
        assert!(matches!(
            chromaticity_histogram(&img, 0),
            Err(HbowErr::InvalidParameter(_))
        ));
    }

    #[test]
    fn oversized_parameters_rejected() {
        let img = gradient(8, 8);
        let huge_bins = ExtractorKind::RegionHistogram {
            bins: 4_194_304,
            region: None,
        };
        assert!(matches!(huge_bins.extract(&img), Err(HbowErr::InvalidParameter(_))));
        assert!(matches!(huge_bins.default_metric(), Err(HbowErr::InvalidParameter(_))));
        assert!(matches!(
            color_histogram(&img, img.bounds(), MAX_BINS + 1, "color"),
            Err(HbowErr::InvalidParameter(_))
        ));
        assert!(color_histogram(&img, img.bounds(), MAX_BINS, "color").is_ok());

        let huge_half = ExtractorKind::PixelBlock { half: usize::MAX / 2 };
        assert!(matches!(huge_half.extract(&img), Err(HbowErr::InvalidParameter(_))));

        let huge_grid = ExtractorKind::MultiRegionHistogram {
            bins: 8,
            tiling: Tiling::Grid {
                rows: usize::MAX,
                cols: 2,
            },
        };
        assert!(matches!(huge_grid.validate(), Err(HbowErr::InvalidParameter(_))));
        assert!(matches!(huge_grid.default_metric(), Err(HbowErr::InvalidParameter(_))));
    }

    #[test]
    fn region_outside_image_reports_size() {
        let kind = ExtractorKind::RegionHistogram {
            bins: 8,
            region: Some(Rect {
                x: usize::MAX,
                y: 0,
                width: 2,
                height: 2,
            }),
        };
        assert!(matches!(kind.extract(&gradient(4, 4)), Err(HbowErr::InvalidRegion(_))));

        let kind = ExtractorKind::RegionHistogram {
            bins: 8,
            region: Some(Rect {
                x: 0,
                y: 0,
                width: 7,
                height: 7,
            }),
        };
        assert!(matches!(
            kind.extract(&gradient(4, 4)),
            Err(HbowErr::InsufficientImageSize { .. })
        ));
    }

    #[test]
    fn extractor_kind_from_json_defaults() {
        let kind: ExtractorKind = serde_json::from_str(r#"{"kind":"chromaticity"}"#).unwrap();
        assert_eq!(kind, ExtractorKind::Chromaticity { bins: 16 });
        let kind: ExtractorKind = serde_json::from_str(r#"{"kind":"multi-region-histogram"}"#).unwrap();
        assert_eq!(kind, ExtractorKind::MultiRegionHistogram { bins: 8, tiling: Tiling::Halves });
    }
}
