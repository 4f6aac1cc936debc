//! Controller mapping: one interactive shape per editable IR object.

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{self, POINTS_PER_PIXEL};
use crate::ir::{ObjectKind, Page, PageObject};
use crate::surface::{ShapeHandle, ShapeStyle, Surface};
use kurbo::{Affine, Size};
use peniko::Color;

/// Edit state of a single controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerState {
    /// Baseline equals the last confirmed document state.
    Idle,
    /// The user is moving or resizing the shape.
    Interacting,
    /// A patch is in flight for `target`. A later interaction end is parked in `queued`.
    Committing {
        seq: u64,
        target: Affine,
        queued: Option<Affine>,
    },
}

impl ControllerState {
    pub fn is_committing(&self) -> bool {
        matches!(self, ControllerState::Committing { .. })
    }
}

/// Surface placement computed for one IR object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Pixel-space transform: `point_to_pixel(page height) * object matrix`.
    pub matrix: Affine,
    /// On-screen size derived from the point-space bounding box.
    pub size: Size,
}

/// UI-side state pairing an IR object with its shape on the surface.
#[derive(Debug, Clone)]
pub struct Controller {
    id: String,
    kind: ObjectKind,
    page_index: usize,
    page_height_pt: f64,
    shape: ShapeHandle,
    size_px: Size,
    baseline: Affine,
    state: ControllerState,
    next_seq: u64,
}

impl Controller {
    pub(crate) fn new(
        id: String,
        kind: ObjectKind,
        page: &Page,
        shape: ShapeHandle,
        placement: Placement,
    ) -> Self {
        Self {
            id,
            kind,
            page_index: page.index,
            page_height_pt: page.height_pt,
            shape,
            size_px: placement.size,
            baseline: placement.matrix,
            state: ControllerState::Idle,
            next_seq: 1,
        }
    }

    /// Id of the originating page object.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_height_pt(&self) -> f64 {
        self.page_height_pt
    }

    pub fn shape(&self) -> ShapeHandle {
        self.shape
    }

    pub fn size_px(&self) -> Size {
        self.size_px
    }

    /// Last confirmed surface-space transform.
    pub fn baseline(&self) -> Affine {
        self.baseline
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ControllerState) {
        self.state = state;
    }

    pub(crate) fn confirm_baseline(&mut self, baseline: Affine) {
        self.baseline = baseline;
    }

    pub(crate) fn rename(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Style used for a controller of the given kind.
pub fn style_for(kind: ObjectKind) -> ShapeStyle {
    match kind {
        ObjectKind::Text => ShapeStyle {
            stroke: Color::from_rgba8(37, 99, 235, 255),
            fill: Some(Color::from_rgba8(37, 99, 235, 24)),
            stroke_width: 1.0,
            resizable: true,
        },
        ObjectKind::Image => ShapeStyle {
            stroke: Color::from_rgba8(22, 163, 74, 255),
            fill: Some(Color::from_rgba8(22, 163, 74, 24)),
            stroke_width: 1.0,
            resizable: true,
        },
        ObjectKind::Path => ShapeStyle {
            stroke: Color::from_rgba8(234, 88, 12, 255),
            fill: None,
            stroke_width: 1.0,
            resizable: false,
        },
    }
}

/// Compute the surface placement of one object.
///
/// Fails with `MalformedObject` when the placement or the on-screen size is not finite.
pub fn place_object(page: &Page, object: &PageObject) -> OverlayResult<Placement> {
    let matrix = geometry::multiply(
        geometry::point_to_pixel_matrix(page.height_pt),
        object.matrix(),
    );
    let bbox = object.bbox();
    let size = Size::new(
        bbox.width() / POINTS_PER_PIXEL,
        bbox.height() / POINTS_PER_PIXEL,
    );

    if !size.width.is_finite() || !size.height.is_finite() {
        return Err(OverlayError::MalformedObject {
            id: object.id().to_string(),
            reason: format!("non-finite size {}x{}", size.width, size.height),
        });
    }
    if !geometry::is_finite(matrix) {
        return Err(OverlayError::MalformedObject {
            id: object.id().to_string(),
            reason: "non-finite placement matrix".to_string(),
        });
    }

    Ok(Placement { matrix, size })
}

/// Create one controller per placeable object of `page` on `surface`.
///
/// Objects with degenerate geometry are skipped and logged; they never abort the page.
pub fn build_controllers<S: Surface>(
    page: &Page,
    page_size_px: Size,
    surface: &mut S,
) -> Vec<Controller> {
    let expected = Size::new(
        geometry::pt_to_px(page.width_pt),
        geometry::pt_to_px(page.height_pt),
    );
    if (expected.width - page_size_px.width).abs() > 1.0
        || (expected.height - page_size_px.height).abs() > 1.0
    {
        log::warn!(
            "Page {} raster size {:?} differs from point size {:?}",
            page.index,
            page_size_px,
            expected
        );
    }

    let mut controllers = Vec::with_capacity(page.objects.len());
    for object in &page.objects {
        let placement = match place_object(page, object) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Skipping object on page {}: {}", page.index, e);
                continue;
            }
        };
        let kind = object.kind();
        let shape = surface.add_shape(placement.matrix, placement.size, &style_for(kind));
        controllers.push(Controller::new(
            object.id().to_string(),
            kind,
            page,
            shape,
            placement,
        ));
    }
    log::debug!(
        "Built {} controllers for page {} ({} objects)",
        controllers.len(),
        page.index,
        page.objects.len()
    );
    controllers
}
