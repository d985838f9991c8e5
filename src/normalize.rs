use log::debug;

use crate::*;

/// Tolerance for "sums to one" checks. Loose enough for values read back from text.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Rescale every normalizable field so that it sums to one.
///
/// Raw pixel and embedding fields are passed through unchanged. A histogram field whose
/// sum is zero fails with `DegenerateField`; callers decide whether to skip the image.
pub fn normalize(descriptor: &Descriptor) -> HbowResult<Descriptor> {
    let mut out = descriptor.clone();
    normalize_in_place(&mut out)?;
    Ok(out)
}

pub fn normalize_in_place(descriptor: &mut Descriptor) -> HbowResult<()> {
    for field in descriptor.fields_mut() {
        if field.tag().is_normalizable() {
            normalize_field(field)?;
        }
    }
    Ok(())
}

/// Divide every element of `field` by the field's sum.
pub fn normalize_field(field: &mut Field) -> HbowResult<()> {
    let sum = field.sum();
    if sum == 0. {
        return Err(HbowErr::DegenerateField(field.name().to_string()));
    }
    debug!(target: "hbow::normalize", "normalizing `{}` (sum {})", field.name(), sum);
    for v in field.values_mut() {
        *v /= sum;
    }
    Ok(())
}

/// Whether every normalizable field sums to one within `SUM_TOLERANCE`.
pub fn is_normalized(descriptor: &Descriptor) -> bool {
    descriptor
        .fields()
        .iter()
        .filter(|f| f.tag().is_normalizable())
        .all(|f| (f.sum() - 1.).abs() <= SUM_TOLERANCE)
}
