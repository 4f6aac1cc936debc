//! Affine geometry and the point/pixel coordinate bridge.
//!
//! All matrices are [`kurbo::Affine`] with coefficients `[a, b, c, d, e, f]`, mapping
//! `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`. Composition follows kurbo: `A * B`
//! applies `B` first, then `A`. Every function here uses that convention.
//!
//! PDF point space has its origin at the bottom-left with y growing upward. Pixel space
//! (raster and interactive surface) has its origin at the top-left with y growing downward.

use crate::error::{OverlayError, OverlayResult};
use kurbo::{Affine, Vec2};

/// Document points per device pixel (72 pt per inch / 96 px per inch).
pub const POINTS_PER_PIXEL: f64 = 72.0 / 96.0;

/// Smallest absolute determinant accepted for a basis change.
pub const DETERMINANT_EPSILON: f64 = 1e-8;

/// Compose two matrices. The result applies `b` first, then `a`.
pub fn multiply(a: Affine, b: Affine) -> Affine {
    a * b
}

/// Determinant `ad - bc` of the linear part.
pub fn determinant(m: Affine) -> f64 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    a * d - b * c
}

/// Invert a matrix, failing instead of returning a numerically unstable result.
pub fn invert(m: Affine) -> OverlayResult<Affine> {
    let det = determinant(m);
    if !det.is_finite() || det.abs() < DETERMINANT_EPSILON {
        return Err(OverlayError::InvalidMatrix { det });
    }
    Ok(m.inverse())
}

/// Basis change from pixel space to point space for a page of the given height.
pub fn pixel_to_point_matrix(page_height_pt: f64) -> Affine {
    let s = POINTS_PER_PIXEL;
    Affine::new([s, 0.0, 0.0, -s, 0.0, page_height_pt])
}

/// Basis change from point space to pixel space; the exact inverse of
/// [`pixel_to_point_matrix`].
pub fn point_to_pixel_matrix(page_height_pt: f64) -> Affine {
    let inv = 1.0 / POINTS_PER_PIXEL;
    Affine::new([inv, 0.0, 0.0, -inv, 0.0, page_height_pt * inv])
}

/// Convert a length in pixels to points.
pub fn px_to_pt(px: f64) -> f64 {
    px * POINTS_PER_PIXEL
}

/// Convert a length in points to pixels.
pub fn pt_to_px(pt: f64) -> f64 {
    pt / POINTS_PER_PIXEL
}

/// Re-express a surface-space interaction as a point-space delta.
///
/// `baseline_px` is the controller's transform before the interaction and `new_px` the one
/// after it. The pixel-space delta `new_px * baseline_px^-1` is conjugated by the basis change
/// so that applying the result to the object's point-space matrix has the same visual effect.
pub fn delta_in_document_space(
    baseline_px: Affine,
    new_px: Affine,
    page_height_pt: f64,
) -> OverlayResult<Affine> {
    let delta_px = multiply(new_px, invert(baseline_px)?);
    let to_pt = pixel_to_point_matrix(page_height_pt);
    let to_px = point_to_pixel_matrix(page_height_pt);
    Ok(multiply(to_pt, multiply(delta_px, to_px)))
}

/// Translation component `(e, f)` of a matrix.
pub fn translation(m: Affine) -> Vec2 {
    let [_, _, _, _, e, f] = m.as_coeffs();
    Vec2::new(e, f)
}

/// Whether all six coefficients are finite.
pub fn is_finite(m: Affine) -> bool {
    m.as_coeffs().iter().all(|v| v.is_finite())
}

/// Coefficient-wise comparison with an absolute tolerance.
pub fn approx_eq(a: Affine, b: Affine, tolerance: f64) -> bool {
    a.as_coeffs()
        .iter()
        .zip(b.as_coeffs().iter())
        .all(|(x, y)| (x - y).abs() <= tolerance)
}

/// Serde adapter that writes a matrix as a plain `[a, b, c, d, e, f]` array.
pub mod serde_matrix {
    use kurbo::Affine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Affine, serializer: S) -> Result<S::Ok, S::Error> {
        m.as_coeffs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Affine, D::Error> {
        let coeffs = <[f64; 6]>::deserialize(deserializer)?;
        Ok(Affine::new(coeffs))
    }
}
