use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
/// Semantic tag of a descriptor field. Decides normalization and which metrics apply.
pub enum FieldTag {
    Color,
    Texture,
    Embedding,
    RawPixels,
}

impl FieldTag {
    /// Histogram fields are rescaled into distributions; raw pixels and embeddings are not.
    pub fn is_normalizable(self) -> bool {
        matches!(self, FieldTag::Color | FieldTag::Texture)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldTag::Color => "color",
            FieldTag::Texture => "texture",
            FieldTag::Embedding => "embedding",
            FieldTag::RawPixels => "raw-pixels",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
/// Dimensions of a field, 1 to 3 axes. Values are stored row-major.
pub struct Shape(SmallVec<[usize; 3]>);

impl Shape {
    pub fn d1(n: usize) -> Self {
        Self(SmallVec::from_buf_and_len([n, 0, 0], 1))
    }

    pub fn d2(rows: usize, cols: usize) -> Self {
        Self(SmallVec::from_buf_and_len([rows, cols, 0], 2))
    }

    pub fn d3(a: usize, b: usize, c: usize) -> Self {
        Self(SmallVec::from_buf([a, b, c]))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of values a field of this shape holds, or `None` if it overflows `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Number of values a field of this shape holds, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        f.write_str(&dims.join("x"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// Declared name, tag and shape of one field, without values.
pub struct FieldSpec {
    pub name: String,
    pub tag: FieldTag,
    pub shape: Shape,
}

impl FieldSpec {
    pub fn new<S: Into<String>>(name: S, tag: FieldTag, shape: Shape) -> Self {
        Self {
            name: name.into(),
            tag,
            shape,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// One named, shaped numeric sub-array of a descriptor.
pub struct Field {
    name: String,
    tag: FieldTag,
    shape: Shape,
    values: Vec<f64>,
}

impl Field {
    pub fn new<S: Into<String>>(
        name: S,
        tag: FieldTag,
        shape: Shape,
        values: Vec<f64>,
    ) -> HbowResult<Self> {
        let name = name.into();
        if values.len() != shape.len() {
            return Err(HbowErr::ShapeMismatch {
                expected: format!("{}[{}] ({} values)", tag, shape, shape.len()),
                found: format!("{} values", values.len()),
            });
        }
        Ok(Self {
            name,
            tag,
            shape,
            values,
        })
    }

    /// All-zero field, used as an accumulator by the histogram extractors. Callers bound
    /// the shape first; extractor parameters are checked by `ExtractorKind::validate`.
    pub fn zeros<S: Into<String>>(name: S, tag: FieldTag, shape: Shape) -> Self {
        let values = vec![0.; shape.len()];
        Self {
            name: name.into(),
            tag,
            shape,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> FieldTag {
        self.tag
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn spec(&self) -> FieldSpec {
        FieldSpec::new(self.name.clone(), self.tag, self.shape.clone())
    }

    /// Same tag and same shape. Names are labels only.
    pub fn same_layout(&self, other: &Field) -> bool {
        self.tag == other.tag && self.shape == other.shape
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
/// Ordered sequence of fields describing one image. Field order is part of its identity.
pub struct Descriptor {
    fields: Vec<Field>,
}

impl Descriptor {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn single(field: Field) -> Self {
        Self {
            fields: vec![field],
        }
    }

    /// Append a field after the existing ones.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Concatenate `other`'s fields after this descriptor's fields.
    pub fn concat(mut self, other: Descriptor) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Total number of values over all fields.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All values, field by field, each field row-major.
    pub fn flat_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.fields.iter().flat_map(|f| f.values.iter().copied())
    }

    pub fn layout(&self) -> Vec<FieldSpec> {
        self.fields.iter().map(Field::spec).collect()
    }

    /// Split a flat value row into fields following `layout`.
    pub fn from_flat(layout: &[FieldSpec], values: &[f64]) -> HbowResult<Self> {
        let expected: usize = layout.iter().map(|s| s.shape.len()).sum();
        if values.len() != expected {
            return Err(HbowErr::ShapeMismatch {
                expected: format!("{} ({} values)", describe_layout(layout), expected),
                found: format!("{} values", values.len()),
            });
        }
        let mut offset = 0;
        let mut fields = Vec::with_capacity(layout.len());
        for spec in layout {
            let n = spec.shape.len();
            fields.push(Field::new(
                spec.name.clone(),
                spec.tag,
                spec.shape.clone(),
                values[offset..offset + n].to_vec(),
            )?);
            offset += n;
        }
        Ok(Self { fields })
    }

    /// Fail with `ShapeMismatch` unless both descriptors have the same tags and
    /// shapes, position by position.
    pub fn check_compatible(&self, other: &Descriptor) -> HbowResult<()> {
        let compatible = self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.same_layout(b));
        if compatible {
            Ok(())
        } else {
            Err(HbowErr::ShapeMismatch {
                expected: describe_layout(&self.layout()),
                found: describe_layout(&other.layout()),
            })
        }
    }

    /// Check this descriptor against a declared layout, tags and shapes only.
    pub fn check_layout(&self, layout: &[FieldSpec]) -> HbowResult<()> {
        let matches = self.fields.len() == layout.len()
            && self
                .fields
                .iter()
                .zip(layout)
                .all(|(f, s)| f.tag == s.tag && f.shape == s.shape);
        if matches {
            Ok(())
        } else {
            Err(HbowErr::ShapeMismatch {
                expected: describe_layout(layout),
                found: describe_layout(&self.layout()),
            })
        }
    }
}

/// Human readable layout, e.g. `color[8x8x8], texture[8]`.
pub fn describe_layout(layout: &[FieldSpec]) -> String {
    layout
        .iter()
        .map(|s| format!("{}[{}]", s.tag, s.shape))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(bins: usize) -> Descriptor {
        Descriptor::single(Field::zeros("color", FieldTag::Color, Shape::d3(bins, bins, bins)))
    }

    #[test]
    fn field_rejects_wrong_value_count() {
        let err = Field::new("t", FieldTag::Texture, Shape::d1(8), vec![0.; 7]).unwrap_err();
        assert!(matches!(err, HbowErr::ShapeMismatch { .. }));
    }

    #[test]
    fn shape_len_and_display() {
        let s = Shape::d3(8, 8, 8);
        assert_eq!(s.len(), 512);
        assert_eq!(s.dims(), &[8, 8, 8]);
        assert_eq!(s.to_string(), "8x8x8");
        assert_eq!(Shape::d2(16, 16).len(), 256);
    }

    #[test]
    fn huge_shape_len_saturates() {
        let s = Shape::d3(4_194_304, 4_194_304, 4_194_304);
        assert_eq!(s.checked_len(), None);
        assert_eq!(s.len(), usize::MAX);
        assert_eq!(Shape::d3(256, 256, 256).checked_len(), Some(16_777_216));
    }

    #[test]
    fn different_bin_counts_are_incompatible() {
        assert!(hist(8).check_compatible(&hist(8)).is_ok());
        assert!(matches!(
            hist(8).check_compatible(&hist(16)),
            Err(HbowErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn field_order_is_part_of_identity() {
        let color = Field::zeros("color", FieldTag::Color, Shape::d1(4));
        let texture = Field::zeros("texture", FieldTag::Texture, Shape::d1(4));
        let a = Descriptor::single(color.clone()).with_field(texture.clone());
        let b = Descriptor::single(texture).with_field(color);
        assert!(a.check_compatible(&b).is_err());
    }

    #[test]
    fn from_flat_splits_by_layout() {
        let layout = vec![
            FieldSpec::new("top", FieldTag::Color, Shape::d1(2)),
            FieldSpec::new("bottom", FieldTag::Color, Shape::d1(3)),
        ];
        let d = Descriptor::from_flat(&layout, &[1., 2., 3., 4., 5.]).unwrap();
        assert_eq!(d.fields()[0].values(), &[1., 2.]);
        assert_eq!(d.fields()[1].values(), &[3., 4., 5.]);
        assert_eq!(d.flat_values().collect::<Vec<_>>(), vec![1., 2., 3., 4., 5.]);

        assert!(Descriptor::from_flat(&layout, &[1., 2.]).is_err());
    }

    #[test]
    fn serialization_keeps_field_order() {
        let d = Descriptor::from_flat(
            &[
                FieldSpec::new("color", FieldTag::Color, Shape::d1(2)),
                FieldSpec::new("texture", FieldTag::Texture, Shape::d1(1)),
            ],
            &[0.25, 0.75, 1.0],
        )
        .unwrap();
        let json = serde_json::to_string(&d).unwrap();
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
        assert_eq!(back.fields()[1].tag(), FieldTag::Texture);
    }
}
