//! Overlay synchronization: the per-controller optimistic edit state machine.
//!
//! Each page gets its own surface and controller map ([`PageOverlay`]), stamped with the
//! generation it was built in. [`OverlaySync`] owns every page and hands out generations;
//! results that arrive for a page generation that was replaced are discarded, while other
//! pages keep resolving normally.
//!
//! ```text
//! Idle ──start──▶ Interacting ──end──▶ Committing ──ok──▶ Idle (baseline = target)
//!   ▲                                      │
//!   └──────────── rollback (transform = baseline) ◀──err
//! ```
//!
//! Only one commit is in flight per controller. An interaction that ends while a commit is
//! in flight is parked and sent after the first resolves, measured from the new baseline.

use crate::controller::{self, Controller, ControllerState};
use crate::error::{OverlayError, OverlayResult};
use crate::geometry;
use crate::ir::{ObjectKind, Page};
use crate::patch::{BoxFuture, PatchOutcome};
use crate::surface::{ShapeHandle, Surface, SurfaceFactory};
use kurbo::{Affine, Size};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Tolerance under which an interaction is treated as "did not move".
const NO_OP_TOLERANCE: f64 = 1e-9;

/// A delta ready to be handed to the commit callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    pub generation: u64,
    pub page: usize,
    pub shape: ShapeHandle,
    pub seq: u64,
    pub id: String,
    pub kind: ObjectKind,
    /// Point-space delta to apply to the object's document matrix.
    pub delta_pt: Affine,
}

/// How a commit resolution was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Baseline advanced. `next` carries a parked interaction that must be committed now.
    Committed { next: Option<CommitRequest> },
    /// The shape snapped back to its baseline; the cause must be reported once.
    RolledBack(OverlayError),
    /// The targeted surface or commit no longer exists; ignore silently.
    Stale,
}

/// Caller-supplied commit callback, the only path toward the patch protocol.
pub trait Committer {
    fn commit<'a>(&'a self, request: &'a CommitRequest) -> BoxFuture<'a, OverlayResult<PatchOutcome>>;
}

/// Receives rollback causes for display to the user.
pub trait ErrorSink {
    fn report(&self, error: &OverlayError);
}

impl<F: Fn(&OverlayError)> ErrorSink for F {
    fn report(&self, error: &OverlayError) {
        self(error)
    }
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, error: &OverlayError) {
        log::error!("Edit rolled back: {}", error);
    }
}

/// Surface and controllers of one page.
pub struct PageOverlay<S: Surface> {
    page_index: usize,
    generation: u64,
    page_size_px: Size,
    surface: S,
    controllers: BTreeMap<ShapeHandle, Controller>,
}

impl<S: Surface> PageOverlay<S> {
    /// Place controllers for every object of `page` on a fresh surface.
    pub fn build(mut surface: S, page: &Page, page_size_px: Size, generation: u64) -> Self {
        let controllers = controller::build_controllers(page, page_size_px, &mut surface)
            .into_iter()
            .map(|c| (c.shape(), c))
            .collect();
        surface.request_redraw();
        Self {
            page_index: page.index,
            generation,
            page_size_px,
            surface,
            controllers,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Generation this page was built in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_size_px(&self) -> Size {
        self.page_size_px
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access for hosts that feed user input into the surface.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }

    pub fn controller(&self, shape: ShapeHandle) -> Option<&Controller> {
        self.controllers.get(&shape)
    }

    pub fn controller_by_id(&self, id: &str) -> Option<&Controller> {
        self.controllers.values().find(|c| c.id() == id)
    }

    fn controller_mut(&mut self, shape: ShapeHandle) -> OverlayResult<&mut Controller> {
        let page = self.page_index;
        self.controllers
            .get_mut(&shape)
            .ok_or(OverlayError::UnknownShape { page })
    }

    /// The user grabbed a shape.
    pub fn interaction_started(&mut self, shape: ShapeHandle) -> OverlayResult<()> {
        let controller = self.controller_mut(shape)?;
        if controller.state() == ControllerState::Idle {
            controller.set_state(ControllerState::Interacting);
        }
        Ok(())
    }

    /// Abandon an interaction and snap the shape back to its baseline.
    pub fn cancel_interaction(&mut self, shape: ShapeHandle) -> OverlayResult<()> {
        let controller = self.controller_mut(shape)?;
        if controller.state() != ControllerState::Interacting {
            return Ok(());
        }
        controller.set_state(ControllerState::Idle);
        let baseline = controller.baseline();
        self.surface.set_transform(shape, baseline);
        self.surface.request_redraw();
        Ok(())
    }

    /// The user released a shape. Returns the commit to send, if any.
    pub fn interaction_ended(&mut self, shape: ShapeHandle) -> OverlayResult<Option<CommitRequest>> {
        let page = self.page_index;
        let generation = self.generation;
        let current = self
            .surface
            .transform(shape)
            .ok_or(OverlayError::UnknownShape { page })?;
        let controller = self
            .controllers
            .get_mut(&shape)
            .ok_or(OverlayError::UnknownShape { page })?;

        if let ControllerState::Committing { seq, target, .. } = controller.state() {
            log::debug!("Parking interaction on {} behind commit #{}", controller.id(), seq);
            controller.set_state(ControllerState::Committing {
                seq,
                target,
                queued: Some(current),
            });
            return Ok(None);
        }

        if geometry::approx_eq(current, controller.baseline(), NO_OP_TOLERANCE) {
            controller.set_state(ControllerState::Idle);
            return Ok(None);
        }

        match Self::start_commit(controller, current, page, generation) {
            Ok(request) => Ok(Some(request)),
            Err(e) => {
                let baseline = controller.baseline();
                self.surface.set_transform(shape, baseline);
                self.surface.request_redraw();
                Err(e)
            }
        }
    }

    fn start_commit(
        controller: &mut Controller,
        target: Affine,
        page: usize,
        generation: u64,
    ) -> OverlayResult<CommitRequest> {
        let delta_pt = match geometry::delta_in_document_space(
            controller.baseline(),
            target,
            controller.page_height_pt(),
        ) {
            Ok(delta) => delta,
            Err(e) => {
                controller.set_state(ControllerState::Idle);
                return Err(e);
            }
        };
        let seq = controller.take_seq();
        controller.set_state(ControllerState::Committing {
            seq,
            target,
            queued: None,
        });
        Ok(CommitRequest {
            generation,
            page,
            shape: controller.shape(),
            seq,
            id: controller.id().to_string(),
            kind: controller.kind(),
            delta_pt,
        })
    }

    /// Apply the outcome of a commit callback.
    pub fn resolve(
        &mut self,
        request: &CommitRequest,
        outcome: OverlayResult<PatchOutcome>,
    ) -> Resolution {
        let Some(controller) = self.controllers.get_mut(&request.shape) else {
            return Resolution::Stale;
        };
        let (target, queued) = match controller.state() {
            ControllerState::Committing { seq, target, queued } if seq == request.seq => {
                (target, queued)
            }
            _ => return Resolution::Stale,
        };

        match outcome {
            Ok(outcome) => {
                controller.confirm_baseline(target);
                controller.set_state(ControllerState::Idle);
                // Ids may be reallocated for any object touched by the patch, not only this one.
                self.apply_remap(&outcome.remap);

                let parked = match (queued, self.controllers.get_mut(&request.shape)) {
                    (Some(parked), Some(_)) if geometry::approx_eq(parked, target, NO_OP_TOLERANCE) => {
                        log::debug!("Parked interaction on {} ends at the confirmed position", request.id);
                        None
                    }
                    (Some(parked), Some(controller)) => Some(Self::start_commit(
                        controller,
                        parked,
                        self.page_index,
                        self.generation,
                    )),
                    _ => None,
                };
                let next = match parked {
                    Some(Ok(next)) => Some(next),
                    Some(Err(e)) => {
                        log::warn!("Dropping parked interaction on {}: {}", request.id, e);
                        self.surface.set_transform(request.shape, target);
                        None
                    }
                    None => {
                        self.surface.set_transform(request.shape, target);
                        None
                    }
                };
                self.surface.request_redraw();
                Resolution::Committed { next }
            }
            Err(e) => {
                let baseline = controller.baseline();
                controller.set_state(ControllerState::Idle);
                if queued.is_some() {
                    log::debug!("Discarding parked interaction on {}", request.id);
                }
                self.surface.set_transform(request.shape, baseline);
                self.surface.request_redraw();
                log::warn!("Rolled back {} on page {}: {}", request.id, self.page_index, e);
                Resolution::RolledBack(e)
            }
        }
    }

    /// Rename controllers whose objects were given new ids by the backend.
    pub fn apply_remap(&mut self, remap: &BTreeMap<String, String>) {
        for controller in self.controllers.values_mut() {
            if let Some(new_id) = remap.get(controller.id()) {
                log::info!("Object {} remapped to {}", controller.id(), new_id);
                controller.rename(new_id.clone());
            }
        }
    }

    /// Release the surface and forget all controllers.
    pub fn dispose(&mut self) {
        self.controllers.clear();
        self.surface.dispose();
    }
}

/// Every page overlay of the current document plus the stale-generation guard.
pub struct OverlaySync<S: Surface> {
    /// Last generation handed out.
    generation: u64,
    pages: BTreeMap<usize, PageOverlay<S>>,
}

impl<S: Surface> Default for OverlaySync<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Surface> OverlaySync<S> {
    pub fn new() -> Self {
        Self {
            generation: 0,
            pages: BTreeMap::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of one page, if it is loaded.
    pub fn page_generation(&self, index: usize) -> Option<u64> {
        self.pages.get(&index).map(PageOverlay::generation)
    }

    /// Replace all pages. Previous surfaces are disposed before new ones are created.
    pub fn load<F>(&mut self, factory: &mut F, pages: &[(Page, Size)])
    where
        F: SurfaceFactory<Surface = S>,
    {
        self.dispose_all();
        self.generation += 1;
        for (page, size_px) in pages {
            let surface = factory.create_surface(page.index, *size_px);
            self.pages.insert(
                page.index,
                PageOverlay::build(surface, page, *size_px, self.generation),
            );
        }
        log::info!(
            "Overlay generation {} with {} page(s)",
            self.generation,
            self.pages.len()
        );
    }

    /// Rebuild a single page, disposing its old surface first.
    pub fn reload_page<F>(&mut self, factory: &mut F, page: &Page, size_px: Size)
    where
        F: SurfaceFactory<Surface = S>,
    {
        if let Some(mut old) = self.pages.remove(&page.index) {
            old.dispose();
        }
        // Commits still in flight for the old surface must not land on the new one.
        // Other pages keep their generation.
        self.generation += 1;
        let surface = factory.create_surface(page.index, size_px);
        self.pages.insert(
            page.index,
            PageOverlay::build(surface, page, size_px, self.generation),
        );
    }

    pub fn dispose_all(&mut self) {
        for (_, mut page) in std::mem::take(&mut self.pages) {
            page.dispose();
        }
    }

    pub fn page(&self, index: usize) -> Option<&PageOverlay<S>> {
        self.pages.get(&index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut PageOverlay<S>> {
        self.pages.get_mut(&index)
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageOverlay<S>> {
        self.pages.values()
    }

    fn page_or_err(&mut self, index: usize) -> OverlayResult<&mut PageOverlay<S>> {
        self.pages.get_mut(&index).ok_or(OverlayError::UnknownPage(index))
    }

    pub fn interaction_started(&mut self, page: usize, shape: ShapeHandle) -> OverlayResult<()> {
        self.page_or_err(page)?.interaction_started(shape)
    }

    pub fn cancel_interaction(&mut self, page: usize, shape: ShapeHandle) -> OverlayResult<()> {
        self.page_or_err(page)?.cancel_interaction(shape)
    }

    pub fn interaction_ended(
        &mut self,
        page: usize,
        shape: ShapeHandle,
    ) -> OverlayResult<Option<CommitRequest>> {
        self.page_or_err(page)?.interaction_ended(shape)
    }

    pub fn resolve(
        &mut self,
        request: &CommitRequest,
        outcome: OverlayResult<PatchOutcome>,
    ) -> Resolution {
        match self.pages.get_mut(&request.page) {
            Some(page) if page.generation == request.generation => page.resolve(request, outcome),
            Some(page) => {
                log::debug!(
                    "Ignoring result for page {} generation {} (current {})",
                    request.page,
                    request.generation,
                    page.generation
                );
                Resolution::Stale
            }
            None => Resolution::Stale,
        }
    }
}

/// Run a commit and every interaction parked behind it, reporting rollbacks once.
///
/// The overlay is only borrowed between awaits, so other controllers keep working
/// while a patch is in flight.
pub async fn drive_commit<S, C, E>(
    sync: &RefCell<OverlaySync<S>>,
    committer: &C,
    sink: &E,
    first: CommitRequest,
) where
    S: Surface,
    C: Committer + ?Sized,
    E: ErrorSink + ?Sized,
{
    let mut pending = Some(first);
    while let Some(request) = pending.take() {
        let outcome = committer.commit(&request).await;
        let resolution = sync.borrow_mut().resolve(&request, outcome);
        match resolution {
            Resolution::Committed { next } => pending = next,
            Resolution::RolledBack(error) => sink.report(&error),
            Resolution::Stale => {
                let stale = OverlayError::StaleSurface {
                    generation: request.generation,
                    page: request.page,
                };
                log::debug!("Discarded: {}", stale);
            }
        }
    }
}

/// Handle an interaction end: compute the delta and drive the commit to completion.
///
/// Returns once this controller has no commit left that this call started. Geometry
/// failures are logged and leave the shape at its baseline.
pub async fn finish_interaction<S, C, E>(
    sync: &RefCell<OverlaySync<S>>,
    page: usize,
    shape: ShapeHandle,
    committer: &C,
    sink: &E,
) -> OverlayResult<()>
where
    S: Surface,
    C: Committer + ?Sized,
    E: ErrorSink + ?Sized,
{
    let request = match sync.borrow_mut().interaction_ended(page, shape) {
        Ok(request) => request,
        Err(e @ OverlayError::InvalidMatrix { .. }) => {
            log::warn!("Interaction on page {} ignored: {}", page, e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if let Some(request) = request {
        drive_commit(sync, committer, sink, request).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::approx_eq;
    use crate::ir::{FontDescriptor, GraphicObject, PageObject, TextObject};
    use crate::surface::{MemorySurface, MemorySurfaceFactory};
    use kurbo::{Rect, Vec2};

    const TOL: f64 = 1e-9;

    fn letter_page(index: usize) -> Page {
        Page {
            index,
            width_pt: 612.0,
            height_pt: 792.0,
            objects: vec![
                PageObject::Text(TextObject {
                    id: "t1".to_string(),
                    tm: Affine::translate((72.0, 700.0)),
                    font: FontDescriptor::default(),
                    bbox: Rect::new(72.0, 700.0, 200.0, 712.0),
                    text: Some("Title".to_string()),
                    source: None,
                }),
                PageObject::Image(GraphicObject {
                    id: "i1".to_string(),
                    cm: Affine::new([100.0, 0.0, 0.0, 100.0, 300.0, 300.0]),
                    bbox: Rect::new(300.0, 300.0, 400.0, 400.0),
                    source: None,
                }),
            ],
        }
    }

    fn loaded(pages: usize) -> (OverlaySync<MemorySurface>, MemorySurfaceFactory) {
        let mut factory = MemorySurfaceFactory::new();
        let mut sync = OverlaySync::new();
        let input: Vec<_> = (0..pages)
            .map(|i| (letter_page(i), Size::new(816.0, 1056.0)))
            .collect();
        sync.load(&mut factory, &input);
        (sync, factory)
    }

    fn shape_of(sync: &OverlaySync<MemorySurface>, page: usize, id: &str) -> ShapeHandle {
        sync.page(page).unwrap().controller_by_id(id).unwrap().shape()
    }

    fn drag(sync: &mut OverlaySync<MemorySurface>, page: usize, shape: ShapeHandle, dx: f64, dy: f64) {
        sync.interaction_started(page, shape).unwrap();
        sync.page_mut(page).unwrap().surface_mut().drag(shape, Vec2::new(dx, dy));
    }

    fn ok() -> OverlayResult<PatchOutcome> {
        Ok(PatchOutcome::default())
    }

    fn rejected() -> OverlayResult<PatchOutcome> {
        Err(OverlayError::PatchRejected("nope".to_string()))
    }

    #[test]
    fn test_drag_produces_point_delta() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        drag(&mut sync, 0, shape, 96.0, -96.0);

        let request = sync.interaction_ended(0, shape).unwrap().unwrap();
        assert_eq!(request.id, "t1");
        assert_eq!(request.kind, ObjectKind::Text);
        assert_eq!(request.generation, 1);
        assert!(approx_eq(request.delta_pt, Affine::translate((72.0, 72.0)), TOL));
        assert!(sync.page(0).unwrap().controller(shape).unwrap().state().is_committing());
    }

    #[test]
    fn test_commit_success_advances_baseline() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        let before = sync.page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync, 0, shape, 10.0, 20.0);
        let request = sync.interaction_ended(0, shape).unwrap().unwrap();

        let resolution = sync.resolve(&request, ok());
        assert_eq!(resolution, Resolution::Committed { next: None });

        let page = sync.page(0).unwrap();
        let controller = page.controller(shape).unwrap();
        let expected = Affine::translate((10.0, 20.0)) * before;
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(approx_eq(controller.baseline(), expected, TOL));
        assert!(approx_eq(page.surface().transform(shape).unwrap(), expected, TOL));
    }

    #[test]
    fn test_commit_failure_restores_baseline() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "i1");
        let baseline = sync.page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync, 0, shape, -40.0, 15.0);
        let request = sync.interaction_ended(0, shape).unwrap().unwrap();
        let redraws = sync.page(0).unwrap().surface().redraw_count();

        let resolution = sync.resolve(&request, rejected());
        assert!(matches!(resolution, Resolution::RolledBack(OverlayError::PatchRejected(_))));

        let page = sync.page(0).unwrap();
        assert_eq!(page.surface().transform(shape), Some(baseline));
        assert_eq!(page.controller(shape).unwrap().baseline(), baseline);
        assert_eq!(page.controller(shape).unwrap().state(), ControllerState::Idle);
        assert!(page.surface().redraw_count() > redraws);
    }

    #[test]
    fn test_second_interaction_waits_for_first() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        drag(&mut sync, 0, shape, 96.0, 0.0);
        let first = sync.interaction_ended(0, shape).unwrap().unwrap();

        // Moved again while the first patch is still in flight.
        drag(&mut sync, 0, shape, 0.0, 96.0);
        assert_eq!(sync.interaction_ended(0, shape).unwrap(), None);

        let Resolution::Committed { next: Some(second) } = sync.resolve(&first, ok()) else {
            panic!("Expected a parked commit");
        };
        assert!(second.seq > first.seq);
        // Measured from the confirmed first position, so only the second drag remains.
        assert!(approx_eq(second.delta_pt, Affine::translate((0.0, -72.0)), TOL));
        // The surface keeps showing the latest user position.
        let page = sync.page(0).unwrap();
        let baseline = page.controller(shape).unwrap().baseline();
        let shown = page.surface().transform(shape).unwrap();
        assert!(approx_eq(shown, Affine::translate((0.0, 96.0)) * baseline, TOL));

        assert_eq!(sync.resolve(&second, ok()), Resolution::Committed { next: None });
        let controller = sync.page(0).unwrap().controller(shape).unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(approx_eq(controller.baseline(), shown, TOL));
    }

    #[test]
    fn test_failure_discards_parked_interaction() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        let baseline = sync.page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync, 0, shape, 5.0, 5.0);
        let first = sync.interaction_ended(0, shape).unwrap().unwrap();
        drag(&mut sync, 0, shape, 5.0, 5.0);
        assert!(sync.interaction_ended(0, shape).unwrap().is_none());

        assert!(matches!(sync.resolve(&first, rejected()), Resolution::RolledBack(_)));
        let page = sync.page(0).unwrap();
        assert_eq!(page.surface().transform(shape), Some(baseline));
        assert_eq!(page.controller(shape).unwrap().state(), ControllerState::Idle);
    }

    #[test]
    fn test_controllers_commit_independently() {
        let (mut sync, _) = loaded(1);
        let text = shape_of(&sync, 0, "t1");
        let image = shape_of(&sync, 0, "i1");
        drag(&mut sync, 0, text, 10.0, 0.0);
        drag(&mut sync, 0, image, 0.0, 10.0);
        let a = sync.interaction_ended(0, text).unwrap().unwrap();
        let b = sync.interaction_ended(0, image).unwrap().unwrap();

        assert!(matches!(sync.resolve(&b, rejected()), Resolution::RolledBack(_)));
        assert_eq!(sync.resolve(&a, ok()), Resolution::Committed { next: None });

        let page = sync.page(0).unwrap();
        let moved = page.controller(text).unwrap().baseline();
        assert!((geometry::translation(moved).x - geometry::translation(page.surface().shape(text).unwrap().placement).x - 10.0).abs() < TOL);
        let image_ctrl = page.controller(image).unwrap();
        assert_eq!(page.surface().transform(image), Some(image_ctrl.baseline()));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let (mut sync, mut factory) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        drag(&mut sync, 0, shape, 10.0, 10.0);
        let request = sync.interaction_ended(0, shape).unwrap().unwrap();

        sync.load(&mut factory, &[(letter_page(0), Size::new(816.0, 1056.0))]);
        assert_eq!(sync.resolve(&request, ok()), Resolution::Stale);
        assert_eq!(sync.resolve(&request, rejected()), Resolution::Stale);

        let page = sync.page(0).unwrap();
        for c in page.controllers() {
            assert_eq!(c.state(), ControllerState::Idle);
            assert_eq!(page.surface().transform(c.shape()), Some(c.baseline()));
        }
    }

    #[test]
    fn test_reloading_one_page_keeps_other_commits_live() {
        let (mut sync, mut factory) = loaded(2);
        let shape = shape_of(&sync, 0, "t1");
        let baseline = sync.page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync, 0, shape, 20.0, 0.0);
        let request = sync.interaction_ended(0, shape).unwrap().unwrap();

        sync.reload_page(&mut factory, &letter_page(1), Size::new(816.0, 1056.0));
        assert_eq!(sync.page_generation(0), Some(request.generation));
        assert!(sync.page_generation(1).unwrap() > request.generation);

        assert!(matches!(sync.resolve(&request, rejected()), Resolution::RolledBack(_)));
        let page = sync.page(0).unwrap();
        assert_eq!(page.controller(shape).unwrap().state(), ControllerState::Idle);
        assert_eq!(page.surface().transform(shape), Some(baseline));

        // The page is not wedged: the next drag commits normally.
        drag(&mut sync, 0, shape, 0.0, 20.0);
        let next = sync.interaction_ended(0, shape).unwrap().unwrap();
        assert_eq!(sync.resolve(&next, ok()), Resolution::Committed { next: None });
        let controller = sync.page(0).unwrap().controller(shape).unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(approx_eq(controller.baseline(), Affine::translate((0.0, 20.0)) * baseline, TOL));
    }

    #[test]
    fn test_reloaded_page_drops_its_own_commits() {
        let (mut sync, mut factory) = loaded(2);
        let shape = shape_of(&sync, 1, "i1");
        drag(&mut sync, 1, shape, 5.0, 5.0);
        let request = sync.interaction_ended(1, shape).unwrap().unwrap();

        sync.reload_page(&mut factory, &letter_page(1), Size::new(816.0, 1056.0));
        assert_eq!(sync.resolve(&request, ok()), Resolution::Stale);
        let page = sync.page(1).unwrap();
        for c in page.controllers() {
            assert_eq!(c.state(), ControllerState::Idle);
        }
    }

    #[test]
    fn test_parked_return_to_confirmed_position_is_not_sent() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        drag(&mut sync, 0, shape, 30.0, 0.0);
        let first = sync.interaction_ended(0, shape).unwrap().unwrap();
        // Grabbed and released again without moving while the first patch is in flight.
        drag(&mut sync, 0, shape, 0.0, 0.0);
        assert_eq!(sync.interaction_ended(0, shape).unwrap(), None);

        assert_eq!(sync.resolve(&first, ok()), Resolution::Committed { next: None });
        let page = sync.page(0).unwrap();
        let controller = page.controller(shape).unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(page.surface().transform(shape), Some(controller.baseline()));
    }

    #[test]
    fn test_reload_disposes_previous_surfaces() {
        let (mut sync, mut factory) = loaded(3);
        assert_eq!(factory.live_surfaces(), 3);
        let input: Vec<_> = (0..2).map(|i| (letter_page(i), Size::new(816.0, 1056.0))).collect();
        sync.load(&mut factory, &input);
        assert_eq!(factory.live_surfaces(), 2);
        assert_eq!(factory.created_surfaces(), 5);

        sync.reload_page(&mut factory, &letter_page(1), Size::new(816.0, 1056.0));
        assert_eq!(factory.live_surfaces(), 2);
        assert_eq!(sync.generation(), 3);

        sync.dispose_all();
        assert_eq!(factory.live_surfaces(), 0);
        assert!(sync.page(0).is_none());
    }

    #[test]
    fn test_remap_renames_controller() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        drag(&mut sync, 0, shape, 1.0, 1.0);
        let request = sync.interaction_ended(0, shape).unwrap().unwrap();
        let mut outcome = PatchOutcome::default();
        outcome.remap.insert("t1".to_string(), "t1#2".to_string());

        sync.resolve(&request, Ok(outcome));
        let page = sync.page(0).unwrap();
        assert!(page.controller_by_id("t1").is_none());
        assert_eq!(page.controller_by_id("t1#2").unwrap().shape(), shape);
    }

    #[test]
    fn test_release_without_move_does_not_commit() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "t1");
        sync.interaction_started(0, shape).unwrap();
        assert_eq!(sync.interaction_ended(0, shape).unwrap(), None);
        let state = sync.page(0).unwrap().controller(shape).unwrap().state();
        assert_eq!(state, ControllerState::Idle);
    }

    #[test]
    fn test_cancel_interaction_restores_baseline() {
        let (mut sync, _) = loaded(1);
        let shape = shape_of(&sync, 0, "i1");
        let baseline = sync.page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync, 0, shape, 30.0, 30.0);
        sync.cancel_interaction(0, shape).unwrap();
        assert_eq!(sync.page(0).unwrap().surface().transform(shape), Some(baseline));
    }

    #[test]
    fn test_unknown_page_and_shape() {
        let (mut sync, _) = loaded(1);
        assert_eq!(
            sync.interaction_ended(7, ShapeHandle(1)),
            Err(OverlayError::UnknownPage(7))
        );
        assert_eq!(
            sync.interaction_ended(0, ShapeHandle(999)),
            Err(OverlayError::UnknownShape { page: 0 })
        );
    }

    struct RecordingCommitter {
        fail: bool,
        seen: RefCell<Vec<CommitRequest>>,
    }

    impl Committer for RecordingCommitter {
        fn commit<'a>(&'a self, request: &'a CommitRequest) -> BoxFuture<'a, OverlayResult<PatchOutcome>> {
            self.seen.borrow_mut().push(request.clone());
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(OverlayError::PatchRejected("backend said no".to_string()))
                } else {
                    Ok(PatchOutcome::default())
                }
            })
        }
    }

    #[test]
    fn test_finish_interaction_drives_commit() {
        let (sync, _) = loaded(1);
        let sync = RefCell::new(sync);
        let shape = shape_of(&sync.borrow(), 0, "t1");
        drag(&mut sync.borrow_mut(), 0, shape, 96.0, -96.0);

        let committer = RecordingCommitter { fail: false, seen: RefCell::new(Vec::new()) };
        let errors = RefCell::new(Vec::new());
        let sink = |e: &OverlayError| errors.borrow_mut().push(e.clone());
        pollster::block_on(finish_interaction(&sync, 0, shape, &committer, &sink)).unwrap();

        assert_eq!(committer.seen.borrow().len(), 1);
        assert!(errors.borrow().is_empty());
        let state = sync.borrow().page(0).unwrap().controller(shape).unwrap().state();
        assert_eq!(state, ControllerState::Idle);
    }

    #[test]
    fn test_finish_interaction_reports_rollback_once() {
        let (sync, _) = loaded(1);
        let sync = RefCell::new(sync);
        let shape = shape_of(&sync.borrow(), 0, "i1");
        let baseline = sync.borrow().page(0).unwrap().controller(shape).unwrap().baseline();
        drag(&mut sync.borrow_mut(), 0, shape, 12.0, 0.0);

        let committer = RecordingCommitter { fail: true, seen: RefCell::new(Vec::new()) };
        let errors = RefCell::new(Vec::new());
        let sink = |e: &OverlayError| errors.borrow_mut().push(e.clone());
        pollster::block_on(finish_interaction(&sync, 0, shape, &committer, &sink)).unwrap();

        assert_eq!(errors.borrow().len(), 1);
        assert!(matches!(errors.borrow()[0], OverlayError::PatchRejected(_)));
        assert_eq!(sync.borrow().page(0).unwrap().surface().transform(shape), Some(baseline));
    }
}
