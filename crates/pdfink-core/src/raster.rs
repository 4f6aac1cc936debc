//! Boundary with the page rasterizer.

use crate::error::OverlayResult;
use crate::geometry;
use crate::patch::BoxFuture;
use kurbo::Size;

/// A rendered page preview and its native size.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPage {
    pub index: usize,
    pub size_px: Size,
    pub width_pt: f64,
    pub height_pt: f64,
    /// Encoded bitmap, if the rasterizer produced one.
    pub bitmap: Option<Vec<u8>>,
}

impl RasterPage {
    /// A page without a bitmap, sized at the fixed point/pixel scale.
    pub fn from_point_size(index: usize, width_pt: f64, height_pt: f64) -> Self {
        Self {
            index,
            size_px: Size::new(geometry::pt_to_px(width_pt), geometry::pt_to_px(height_pt)),
            width_pt,
            height_pt,
            bitmap: None,
        }
    }
}

/// Renders document bytes into page previews.
pub trait Rasterizer {
    fn rasterize<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, OverlayResult<Vec<RasterPage>>>;
}

/// Rasterizer that renders nothing; pages fall back to their IR point size.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreview;

impl Rasterizer for NoPreview {
    fn rasterize<'a>(&'a self, _bytes: &'a [u8]) -> BoxFuture<'a, OverlayResult<Vec<RasterPage>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
