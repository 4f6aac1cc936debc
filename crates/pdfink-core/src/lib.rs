//! pdfink Core Library
//!
//! Coordinate bridge between PDF point space and an interactive editing surface, the
//! document IR received from the backend, and the optimistic edit overlay that turns
//! user interactions into point-space patches.

pub mod controller;
pub mod error;
pub mod geometry;
pub mod ir;
pub mod overlay;
pub mod patch;
pub mod raster;
pub mod session;
pub mod surface;

pub use controller::{Controller, ControllerState, Placement, build_controllers};
pub use error::{OverlayError, OverlayResult};
pub use geometry::{POINTS_PER_PIXEL, delta_in_document_space, invert, multiply};
pub use ir::{DocumentIr, ObjectKind, Page, PageObject};
pub use overlay::{CommitRequest, Committer, ErrorSink, LogSink, OverlaySync, PageOverlay, Resolution};
pub use patch::{Backend, BoxFuture, PatchOp, PatchOutcome, PatchResponse, PatchTarget};
pub use raster::{NoPreview, RasterPage, Rasterizer};
pub use session::EditorSession;
pub use surface::{MemorySurface, MemorySurfaceFactory, ShapeHandle, ShapeStyle, Surface, SurfaceFactory};
