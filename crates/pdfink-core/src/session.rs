//! Editing session: one open document, its overlay, and the backend it talks to.

use crate::error::{OverlayError, OverlayResult};
use crate::ir::DocumentIr;
use crate::overlay::{self, CommitRequest, Committer, ErrorSink, LogSink, OverlaySync};
use crate::patch::{self, Backend, BoxFuture, PatchOp, PatchOutcome, PatchTarget};
use crate::raster::{RasterPage, Rasterizer};
use crate::surface::{ShapeHandle, SurfaceFactory};
use kurbo::Size;
use std::cell::{Cell, RefCell};

/// Largest disagreement between rasterizer and IR page sizes that is not logged.
const PAGE_SIZE_TOLERANCE_PT: f64 = 0.01;

/// Owns the overlay for one document and commits edits through a [`Backend`].
///
/// All methods take `&self`; futures from different calls may be interleaved on one
/// thread. Interior state is only borrowed between awaits.
pub struct EditorSession<B, R, F: SurfaceFactory> {
    backend: B,
    rasterizer: R,
    factory: RefCell<F>,
    overlay: RefCell<OverlaySync<F::Surface>>,
    doc_id: RefCell<Option<String>>,
    ir: RefCell<Option<DocumentIr>>,
    /// Latest document bytes known to match the backend.
    document: RefCell<Option<Vec<u8>>>,
    /// The backend changed the document since the last rasterization.
    preview_stale: Cell<bool>,
    /// Bumped whenever a different document is opened.
    epoch: Cell<u64>,
    sink: Box<dyn ErrorSink>,
}

impl<B: Backend, R: Rasterizer, F: SurfaceFactory> EditorSession<B, R, F> {
    pub fn new(backend: B, rasterizer: R, factory: F) -> Self {
        Self {
            backend,
            rasterizer,
            factory: RefCell::new(factory),
            overlay: RefCell::new(OverlaySync::new()),
            doc_id: RefCell::new(None),
            ir: RefCell::new(None),
            document: RefCell::new(None),
            preview_stale: Cell::new(false),
            epoch: Cell::new(0),
            sink: Box::new(LogSink),
        }
    }

    /// Route rollback causes to `sink` instead of the log.
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn doc_id(&self) -> Option<String> {
        self.doc_id.borrow().clone()
    }

    /// Snapshot of the IR the overlay was built from.
    pub fn ir(&self) -> Option<DocumentIr> {
        self.ir.borrow().clone()
    }

    /// Latest document bytes returned by the backend, if any.
    pub fn updated_document(&self) -> Option<Vec<u8>> {
        self.document.borrow().clone()
    }

    /// Whether the backend holds edits that the current preview does not show.
    pub fn preview_stale(&self) -> bool {
        self.preview_stale.get()
    }

    /// Read the overlay.
    pub fn with_overlay<T>(&self, f: impl FnOnce(&OverlaySync<F::Surface>) -> T) -> T {
        f(&self.overlay.borrow())
    }

    /// Mutate the overlay, e.g. to feed pointer input into a page surface.
    pub fn with_overlay_mut<T>(&self, f: impl FnOnce(&mut OverlaySync<F::Surface>) -> T) -> T {
        f(&mut self.overlay.borrow_mut())
    }

    pub fn with_factory<T>(&self, f: impl FnOnce(&F) -> T) -> T {
        f(&self.factory.borrow())
    }

    /// Open a document: upload, rasterize, fetch the IR and place controllers.
    ///
    /// Pages accept input only once this returns.
    pub async fn load(&self, bytes: Vec<u8>) -> OverlayResult<()> {
        let doc_id = self.backend.open(&bytes).await?;
        log::info!("Opened document {} ({} bytes)", doc_id, bytes.len());
        let raster = self.rasterizer.rasterize(&bytes).await?;
        let ir = self.backend.fetch_ir(&doc_id).await?;

        self.epoch.set(self.epoch.get() + 1);
        *self.doc_id.borrow_mut() = Some(doc_id);
        *self.document.borrow_mut() = Some(bytes);
        self.install(ir, &raster);
        Ok(())
    }

    /// Re-render the latest document and rebuild every page overlay.
    pub async fn reload(&self) -> OverlayResult<()> {
        let doc_id = self.require_doc_id()?;
        let cached = self.document.borrow().clone();
        let bytes = match cached {
            Some(bytes) => bytes,
            None => self.backend.download(&doc_id).await?,
        };
        let raster = self.rasterizer.rasterize(&bytes).await?;
        let ir = self.backend.fetch_ir(&doc_id).await?;

        *self.document.borrow_mut() = Some(bytes);
        self.install(ir, &raster);
        Ok(())
    }

    /// Fetch the current document bytes from the backend.
    pub async fn download(&self) -> OverlayResult<Vec<u8>> {
        let doc_id = self.require_doc_id()?;
        let epoch = self.epoch.get();
        let bytes = self.backend.download(&doc_id).await?;
        if self.epoch.get() == epoch {
            *self.document.borrow_mut() = Some(bytes.clone());
        }
        Ok(bytes)
    }

    /// The user released `shape` on `page`; commit the resulting delta.
    pub async fn finish_interaction(&self, page: usize, shape: ShapeHandle) -> OverlayResult<()> {
        overlay::finish_interaction(&self.overlay, page, shape, self, &*self.sink).await
    }

    /// Replace the text of a text object. Failures are reported through the error sink.
    pub async fn replace_text(&self, page: usize, id: &str, text: &str) -> bool {
        let generation = self.overlay.borrow().page_generation(page);
        let ops = [PatchOp::edit_text(PatchTarget::new(page, id), text)];
        match self.submit(&ops).await {
            Ok(outcome) => {
                let mut overlay = self.overlay.borrow_mut();
                if generation.is_some() && overlay.page_generation(page) == generation {
                    if let Some(page) = overlay.page_mut(page) {
                        page.apply_remap(&outcome.remap);
                    }
                } else {
                    log::debug!("Page {} was rebuilt while editing {}; remap skipped", page, id);
                }
                true
            }
            Err(e) => {
                self.sink.report(&e);
                false
            }
        }
    }

    async fn submit(&self, ops: &[PatchOp]) -> OverlayResult<PatchOutcome> {
        let doc_id = self
            .require_doc_id()
            .map_err(|e| OverlayError::PatchRejected(e.to_string()))?;
        let epoch = self.epoch.get();
        let outcome = patch::submit(&self.backend, &doc_id, ops).await?;
        if self.epoch.get() != epoch {
            log::debug!("Document {} was replaced while a patch was in flight", doc_id);
            return Ok(outcome);
        }
        if let Some(bytes) = &outcome.updated_document {
            *self.document.borrow_mut() = Some(bytes.clone());
            self.preview_stale.set(true);
        }
        Ok(outcome)
    }

    fn require_doc_id(&self) -> OverlayResult<String> {
        self.doc_id
            .borrow()
            .clone()
            .ok_or_else(|| OverlayError::Backend("no document open".to_string()))
    }

    fn install(&self, ir: DocumentIr, raster: &[RasterPage]) {
        let pages: Vec<_> = ir
            .pages
            .iter()
            .map(|page| {
                let size_px = match raster.iter().find(|r| r.index == page.index) {
                    Some(r) => {
                        if (r.width_pt - page.width_pt).abs() > PAGE_SIZE_TOLERANCE_PT
                            || (r.height_pt - page.height_pt).abs() > PAGE_SIZE_TOLERANCE_PT
                        {
                            log::warn!(
                                "Page {}: rasterizer reports {}x{}pt, IR says {}x{}pt",
                                page.index,
                                r.width_pt,
                                r.height_pt,
                                page.width_pt,
                                page.height_pt
                            );
                        }
                        r.size_px
                    }
                    None => RasterPage::from_point_size(page.index, page.width_pt, page.height_pt).size_px,
                };
                (page.clone(), size_px)
            })
            .collect::<Vec<(_, Size)>>();

        self.overlay
            .borrow_mut()
            .load(&mut *self.factory.borrow_mut(), &pages);
        *self.ir.borrow_mut() = Some(ir);
        self.preview_stale.set(false);
    }
}

impl<B: Backend, R: Rasterizer, F: SurfaceFactory> Committer for EditorSession<B, R, F> {
    fn commit<'a>(&'a self, request: &'a CommitRequest) -> BoxFuture<'a, OverlayResult<PatchOutcome>> {
        Box::pin(async move {
            let ops = [PatchOp::transform(
                PatchTarget::new(request.page, request.id.clone()),
                request.delta_pt,
                request.kind,
            )];
            self.submit(&ops).await
        })
    }
}
