//! Interactive surface capability.
//!
//! The overlay never talks to a concrete canvas toolkit. It sees a per-page [`Surface`]
//! that can hold shapes placed by an affine matrix, report their current transform after
//! the user moved them, and be disposed. [`MemorySurface`] is a headless implementation
//! used by tests and the command-line shell.

use kurbo::{Affine, Size, Vec2};
use peniko::Color;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Opaque handle of a shape on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHandle(pub u64);

/// Visual style of a controller shape.
#[derive(Debug, Clone, Copy)]
pub struct ShapeStyle {
    pub stroke: Color,
    pub fill: Option<Color>,
    pub stroke_width: f64,
    /// Whether the user may rotate/scale the shape or only move it.
    pub resizable: bool,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke: Color::from_rgba8(59, 130, 246, 255),
            fill: None,
            stroke_width: 1.0,
            resizable: true,
        }
    }
}

/// A per-page interactive surface.
pub trait Surface {
    /// Add a shape of the given size, placed by `placement`.
    fn add_shape(&mut self, placement: Affine, size: Size, style: &ShapeStyle) -> ShapeHandle;

    /// Current on-screen transform of a shape.
    fn transform(&self, shape: ShapeHandle) -> Option<Affine>;

    /// Overwrite the transform of a shape.
    fn set_transform(&mut self, shape: ShapeHandle, transform: Affine);

    fn remove_shape(&mut self, shape: ShapeHandle);

    fn request_redraw(&mut self);

    /// Release every resource held by the surface. Further calls are no-ops.
    fn dispose(&mut self);
}

/// Creates one surface per page.
pub trait SurfaceFactory {
    type Surface: Surface;

    fn create_surface(&mut self, page_index: usize, size_px: Size) -> Self::Surface;
}

/// A shape held by a [`MemorySurface`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryShape {
    pub placement: Affine,
    pub transform: Affine,
    pub size: Size,
    pub style: ShapeStyle,
}

/// Headless surface that records shapes and redraw requests.
#[derive(Debug)]
pub struct MemorySurface {
    page_index: usize,
    size_px: Size,
    shapes: BTreeMap<ShapeHandle, MemoryShape>,
    next_handle: u64,
    redraws: usize,
    disposed: bool,
    live: Rc<Cell<usize>>,
}

impl MemorySurface {
    /// Create a standalone surface.
    pub fn new(page_index: usize, size_px: Size) -> Self {
        Self::with_counter(page_index, size_px, Rc::new(Cell::new(0)))
    }

    fn with_counter(page_index: usize, size_px: Size, live: Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self {
            page_index,
            size_px,
            shapes: BTreeMap::new(),
            next_handle: 1,
            redraws: 0,
            disposed: false,
            live,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn size_px(&self) -> Size {
        self.size_px
    }

    pub fn shape(&self, handle: ShapeHandle) -> Option<&MemoryShape> {
        self.shapes.get(&handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = ShapeHandle> + '_ {
        self.shapes.keys().copied()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn redraw_count(&self) -> usize {
        self.redraws
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Simulate the user dragging a shape by `offset` pixels.
    pub fn drag(&mut self, handle: ShapeHandle, offset: Vec2) {
        if let Some(shape) = self.shapes.get_mut(&handle) {
            shape.transform = Affine::translate(offset) * shape.transform;
        }
    }
}

impl Surface for MemorySurface {
    fn add_shape(&mut self, placement: Affine, size: Size, style: &ShapeStyle) -> ShapeHandle {
        let handle = ShapeHandle(self.next_handle);
        self.next_handle += 1;
        self.shapes.insert(
            handle,
            MemoryShape {
                placement,
                transform: placement,
                size,
                style: *style,
            },
        );
        handle
    }

    fn transform(&self, shape: ShapeHandle) -> Option<Affine> {
        self.shapes.get(&shape).map(|s| s.transform)
    }

    fn set_transform(&mut self, shape: ShapeHandle, transform: Affine) {
        if let Some(s) = self.shapes.get_mut(&shape) {
            s.transform = transform;
        }
    }

    fn remove_shape(&mut self, shape: ShapeHandle) {
        self.shapes.remove(&shape);
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.shapes.clear();
        self.disposed = true;
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Factory for [`MemorySurface`]s that tracks how many are still alive.
#[derive(Debug, Default)]
pub struct MemorySurfaceFactory {
    live: Rc<Cell<usize>>,
    created: usize,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surfaces created and not yet disposed.
    pub fn live_surfaces(&self) -> usize {
        self.live.get()
    }

    pub fn created_surfaces(&self) -> usize {
        self.created
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    type Surface = MemorySurface;

    fn create_surface(&mut self, page_index: usize, size_px: Size) -> MemorySurface {
        self.created += 1;
        MemorySurface::with_counter(page_index, size_px, self.live.clone())
    }
}
