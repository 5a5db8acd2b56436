//! Frame system and transform evaluator
//!
//! A [`FrameSystem`] owns two rooted trees — one of axes, one of points —
//! and answers two kinds of queries against them: the rotation between two
//! axes and the state of one point relative to another, both up to the
//! system's compile-time derivative order `O` (position through jerk at
//! `O = 4`).
//!
//! Queries walk the unique tree path between the endpoints, ask each edge's
//! child node to materialize its local transform at the requested epoch, and
//! compose the results with the Leibniz product rule. Every node carries one
//! cache slot per worker thread, stamped with `(epoch, order)`; repeating a
//! query at the same epoch never re-invokes a producer.
//!
//! The graph is built single-threaded; once built, any number of threads may
//! query it concurrently through distinct thread slots.

mod tests;

use nalgebra::{Matrix3, Vector3};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::axeslib::{
    dcm_slots, orientation_slots, AxesClass, AxesNode, ComputableVector, DcmClosure, RotEntry,
    RotationProducer,
};
use crate::constants::{C_KM_S, LIGHT_TIME_PRECISION_KM, MAX_LIGHT_TIME_ITERATIONS};
use crate::difflib::{DcmFunction, VectorFunction};
use crate::errors::{FrameError, Result};
use crate::graphlib::{Direction, MappedTree, NodeId};
use crate::pointslib::{
    vector_slots, PointClass, PointNode, StateEntry, StateProducer, UpdatableEntry, VectorClosure,
};
use crate::providers::{EphemerisProvider, EphemerisRecord, PlanetaryOrientation};
use crate::rotationlib::twovectors::{dcm_series, TwoVectorsSeq};
use crate::statelib::{Rot, State};

/// Light-time handling for corrected state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightTimeCorrection {
    /// Geometric state, instantaneous light propagation.
    None,
    /// Evaluate the target at the epoch the observed light was emitted.
    LightTime,
    /// Light time plus stellar aberration of the line of sight.
    Aberration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

/// A frame system of derivative order `O ∈ 1..=4`.
///
/// `O = 1` answers position/rotation only; each additional order adds one
/// more time derivative (velocity, acceleration, jerk).
pub struct FrameSystem<const O: usize> {
    axes: MappedTree<AxesNode<O>>,
    points: MappedTree<PointNode<O>>,
    ephemeris: Option<Arc<dyn EphemerisProvider>>,
    threads: usize,
}

impl<const O: usize> Default for FrameSystem<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const O: usize> fmt::Debug for FrameSystem<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameSystem<{}> with {} axes, {} points, {} thread slot(s)",
            O,
            self.axes.len(),
            self.points.len(),
            self.threads
        )
    }
}

impl<const O: usize> FrameSystem<O> {
    /// A frame system with a single query-thread slot.
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// A frame system whose per-node caches carry `threads` slots.
    ///
    /// Concurrent callers must each use a distinct slot through the
    /// `*_for_thread` query variants.
    pub fn with_threads(threads: usize) -> Self {
        assert!(threads >= 1, "at least one thread slot is required");
        FrameSystem {
            axes: MappedTree::new(),
            points: MappedTree::new(),
            ephemeris: None,
            threads,
        }
    }

    /// Attach the ephemeris provider used by ephemeris points. Must happen
    /// before the first `add_ephemeris_point` call.
    pub fn set_ephemeris(&mut self, provider: Arc<dyn EphemerisProvider>) {
        self.ephemeris = Some(provider);
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    pub fn axes_count(&self) -> usize {
        self.axes.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn has_axes(&self, id: NodeId) -> bool {
        self.axes.has_vertex(id)
    }

    pub fn has_point(&self, id: NodeId) -> bool {
        self.points.has_vertex(id)
    }

    /// Resolve an axes name to its ID.
    pub fn axes_id(&self, name: &str) -> Result<NodeId> {
        self.axes
            .id_of(name)
            .ok_or_else(|| FrameError::UnknownName(name.to_string()))
    }

    /// Resolve a point name to its ID.
    pub fn point_id(&self, name: &str) -> Result<NodeId> {
        self.points
            .id_of(name)
            .ok_or_else(|| FrameError::UnknownName(name.to_string()))
    }

    pub fn axes_node(&self, id: NodeId) -> Option<&AxesNode<O>> {
        self.axes.get(id)
    }

    pub fn point_node(&self, id: NodeId) -> Option<&PointNode<O>> {
        self.points.get(id)
    }

    // ------------------------------------------------------------------
    // axes registration
    // ------------------------------------------------------------------

    /// Register inertial axes.
    ///
    /// The first inertial axes (no `parent`) becomes the root of the axes
    /// tree and takes no DCM; every other inertial axes must name an
    /// existing inertial parent and supply the constant DCM relative to it.
    pub fn add_inertial_axes(
        &mut self,
        id: NodeId,
        name: &str,
        parent: Option<NodeId>,
        dcm: Option<Matrix3<f64>>,
    ) -> Result<()> {
        self.check_new_axes(id, name)?;
        match parent {
            None => {
                if let Some(root) = self.axes.root() {
                    return Err(FrameError::InvalidParent {
                        id,
                        details: format!("axes tree already has root {root}"),
                    });
                }
                if dcm.is_some() {
                    return Err(FrameError::InvalidParent {
                        id,
                        details: "root axes do not take a DCM".to_string(),
                    });
                }
                let node = AxesNode::new(
                    id,
                    name,
                    AxesClass::Inertial,
                    id,
                    RotationProducer::Identity,
                    self.threads,
                );
                self.insert_axes(node, None)
            }
            Some(p) => {
                let parent_node = self.axes.get(p).ok_or(FrameError::UnknownAxes(p))?;
                if parent_node.class != AxesClass::Inertial {
                    return Err(FrameError::InvalidParent {
                        id,
                        details: format!(
                            "inertial axes must descend from inertial axes, parent {p} is {:?}",
                            parent_node.class
                        ),
                    });
                }
                let dcm = dcm.ok_or(FrameError::MissingDcm(id))?;
                let node = AxesNode::new(
                    id,
                    name,
                    AxesClass::Inertial,
                    p,
                    RotationProducer::Const(dcm),
                    self.threads,
                );
                self.insert_axes(node, Some(p))
            }
        }
    }

    /// Register axes at a constant rotation from their parent.
    pub fn add_fixed_offset_axes(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        dcm: Matrix3<f64>,
    ) -> Result<()> {
        self.check_new_axes(id, name)?;
        if !self.axes.has_vertex(parent) {
            return Err(FrameError::UnknownAxes(parent));
        }
        let node = AxesNode::new(
            id,
            name,
            AxesClass::FixedOffset,
            parent,
            RotationProducer::Const(dcm),
            self.threads,
        );
        self.insert_axes(node, Some(parent))
    }

    /// Register rotating axes from a differentiable time-only function; all
    /// derivative orders are synthesized by forward-mode differentiation.
    pub fn add_rotating_axes<F: DcmFunction>(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        f: F,
    ) -> Result<()> {
        self.add_rotating_axes_with(id, name, parent, f, None, None, None)
    }

    /// Register rotating axes with analytic derivative overrides; any order
    /// left as `None` falls back to differentiating `f`.
    pub fn add_rotating_axes_with<F: DcmFunction>(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        f: F,
        d1: Option<DcmClosure>,
        d2: Option<DcmClosure>,
        d3: Option<DcmClosure>,
    ) -> Result<()> {
        self.check_new_axes(id, name)?;
        if !self.axes.has_vertex(parent) {
            return Err(FrameError::UnknownAxes(parent));
        }
        let node = AxesNode::new(
            id,
            name,
            AxesClass::Rotating,
            parent,
            RotationProducer::TimeOnly(dcm_slots(f, d1, d2, d3)),
            self.threads,
        );
        self.insert_axes(node, Some(parent))
    }

    /// Register body-fixed axes backed by a planetary-orientation model.
    ///
    /// The collaborator contract stops at the second derivative; the jerk
    /// block of such axes is zero.
    pub fn add_planetary_axes(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        orientation: Arc<dyn PlanetaryOrientation>,
    ) -> Result<()> {
        self.check_new_axes(id, name)?;
        if !self.axes.has_vertex(parent) {
            return Err(FrameError::UnknownAxes(parent));
        }
        let node = AxesNode::new(
            id,
            name,
            AxesClass::Rotating,
            parent,
            RotationProducer::TimeOnly(orientation_slots(orientation)),
            self.threads,
        );
        self.insert_axes(node, Some(parent))
    }

    /// Register axes whose orientation is derived from two state vectors of
    /// the point graph via the two-vectors construction.
    pub fn add_computable_axes(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        v1: ComputableVector,
        v2: ComputableVector,
        seq: TwoVectorsSeq,
    ) -> Result<()> {
        self.check_new_axes(id, name)?;
        if !self.axes.has_vertex(parent) {
            return Err(FrameError::UnknownAxes(parent));
        }
        for v in [v1, v2] {
            if v.order == 0 || v.order > 3 {
                return Err(FrameError::OrderExceeded {
                    requested: v.order,
                    max: 3,
                });
            }
            for p in [v.from, v.to] {
                if !self.points.has_vertex(p) {
                    return Err(FrameError::UnknownPoint(p));
                }
            }
        }
        let node = AxesNode::new(
            id,
            name,
            AxesClass::Computable,
            parent,
            RotationProducer::TwoVectors { v1, v2, seq },
            self.threads,
        );
        self.insert_axes(node, Some(parent))
    }

    fn check_new_axes(&self, id: NodeId, name: &str) -> Result<()> {
        if self.axes.has_vertex(id) {
            return Err(FrameError::DuplicateId(id));
        }
        if self.axes.has_name(name) {
            return Err(FrameError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn insert_axes(&mut self, node: AxesNode<O>, parent: Option<NodeId>) -> Result<()> {
        let id = node.id;
        let name = node.name.clone();
        let class = node.class;
        self.axes.add_vertex(id, &name, node)?;
        if let Some(p) = parent {
            self.axes.add_edge(p, id)?;
        }
        debug!(id, name = %name, ?class, "axes registered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // point registration
    // ------------------------------------------------------------------

    /// Register the unique root point of the system.
    pub fn add_root_point(&mut self, id: NodeId, name: &str, axes: NodeId) -> Result<()> {
        self.check_new_point(id, name)?;
        if let Some(root) = self.points.root() {
            return Err(FrameError::InvalidParent {
                id,
                details: format!("point tree already has root {root}"),
            });
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        let node = PointNode::new(
            id,
            name,
            PointClass::Root,
            id,
            axes,
            StateProducer::Zero,
            self.threads,
        );
        self.insert_point(node, None)
    }

    /// Register a point at a constant offset from its parent.
    pub fn add_fixed_point(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        axes: NodeId,
        offset: Vector3<f64>,
    ) -> Result<()> {
        self.check_new_point(id, name)?;
        if !self.points.has_vertex(parent) {
            return Err(FrameError::UnknownPoint(parent));
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        let node = PointNode::new(
            id,
            name,
            PointClass::Fixed,
            parent,
            axes,
            StateProducer::Const(offset),
            self.threads,
        );
        self.insert_point(node, Some(parent))
    }

    /// Register an ephemeris-backed point.
    ///
    /// The center and axes are discovered from the provider's position
    /// records for the target `id`; both must already be registered, and
    /// the records must agree on a single (center, axes) pair.
    pub fn add_ephemeris_point(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.check_new_point(id, name)?;
        let provider = self.ephemeris.clone().ok_or(FrameError::NoEphemeris(id))?;
        let records: Vec<EphemerisRecord> = provider
            .position_records()
            .into_iter()
            .filter(|r| r.target == id)
            .collect();
        let first = *records.first().ok_or(FrameError::NoEphemeris(id))?;
        if records
            .iter()
            .any(|r| r.center != first.center || r.axes != first.axes)
        {
            return Err(FrameError::AmbiguousEphemeris(id));
        }
        if !self.points.has_vertex(first.center) {
            return Err(FrameError::UnknownPoint(first.center));
        }
        if !self.axes.has_vertex(first.axes) {
            return Err(FrameError::UnknownAxes(first.axes));
        }
        let node = PointNode::new(
            id,
            name,
            PointClass::Ephemeris,
            first.center,
            first.axes,
            StateProducer::Ephemeris {
                target: id,
                center: first.center,
            },
            self.threads,
        );
        self.insert_point(node, Some(first.center))
    }

    /// Register a point whose state is written by an external caller through
    /// [`FrameSystem::update_point`].
    pub fn add_updatable_point(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        axes: NodeId,
    ) -> Result<()> {
        self.check_new_point(id, name)?;
        if !self.points.has_vertex(parent) {
            return Err(FrameError::UnknownPoint(parent));
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        let node = PointNode::new(
            id,
            name,
            PointClass::Updatable,
            parent,
            axes,
            StateProducer::Updatable(RwLock::new(None)),
            self.threads,
        );
        self.insert_point(node, Some(parent))
    }

    /// Register a point moving along a differentiable time-only function;
    /// derivative orders are synthesized by forward-mode differentiation.
    pub fn add_dynamical_point<F: VectorFunction>(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        axes: NodeId,
        f: F,
    ) -> Result<()> {
        self.add_dynamical_point_with(id, name, parent, axes, f, None, None, None)
    }

    /// Register a dynamical point with analytic derivative overrides; any
    /// order left as `None` falls back to differentiating `f`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_dynamical_point_with<F: VectorFunction>(
        &mut self,
        id: NodeId,
        name: &str,
        parent: NodeId,
        axes: NodeId,
        f: F,
        d1: Option<VectorClosure>,
        d2: Option<VectorClosure>,
        d3: Option<VectorClosure>,
    ) -> Result<()> {
        self.check_new_point(id, name)?;
        if !self.points.has_vertex(parent) {
            return Err(FrameError::UnknownPoint(parent));
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        let node = PointNode::new(
            id,
            name,
            PointClass::Dynamical,
            parent,
            axes,
            StateProducer::TimeOnly(vector_slots(f, d1, d2, d3)),
            self.threads,
        );
        self.insert_point(node, Some(parent))
    }

    fn check_new_point(&self, id: NodeId, name: &str) -> Result<()> {
        if self.points.has_vertex(id) {
            return Err(FrameError::DuplicateId(id));
        }
        if self.points.has_name(name) {
            return Err(FrameError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn insert_point(&mut self, node: PointNode<O>, parent: Option<NodeId>) -> Result<()> {
        let id = node.id;
        let name = node.name.clone();
        let class = node.class;
        self.points.add_vertex(id, &name, node)?;
        if let Some(p) = parent {
            self.points.add_edge(p, id)?;
        }
        debug!(id, name = %name, ?class, "point registered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // updatable points
    // ------------------------------------------------------------------

    /// Write the state of an updatable point, stamping it with the epoch and
    /// the derivative order the state is valid to.
    ///
    /// Subsequent queries at a different epoch, or above the stamped order,
    /// fail with [`FrameError::NotUpdated`].
    pub fn update_point(
        &self,
        point: NodeId,
        state: State<O>,
        epoch: f64,
        order: usize,
    ) -> Result<()> {
        self.check_order(order)?;
        let node = self
            .points
            .get(point)
            .ok_or(FrameError::UnknownPoint(point))?;
        match &node.producer {
            StateProducer::Updatable(slot) => {
                let mut guard = write_lock(slot);
                *guard = Some(UpdatableEntry {
                    state,
                    epoch,
                    order,
                });
                trace!(point, epoch, order, "updatable point stamped");
                Ok(())
            }
            _ => Err(FrameError::NotUpdatable(point)),
        }
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Rotation from `from` axes to `to` axes at `epoch`, populated to the
    /// full order `O`.
    pub fn rotation(&self, from: NodeId, to: NodeId, epoch: f64) -> Result<Rot<O>> {
        self.rotation_for_thread(0, from, to, epoch, O)
    }

    /// Rotation populated at least to `order ∈ 1..=O`.
    pub fn rotation_at_order(
        &self,
        from: NodeId,
        to: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<Rot<O>> {
        self.rotation_for_thread(0, from, to, epoch, order)
    }

    /// Rotation query through an explicit per-thread cache slot.
    pub fn rotation_for_thread(
        &self,
        thread: usize,
        from: NodeId,
        to: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<Rot<O>> {
        assert!(thread < self.threads, "thread slot out of range");
        self.check_order(order)?;
        for id in [from, to] {
            if !self.axes.has_vertex(id) {
                return Err(FrameError::UnknownAxes(id));
            }
        }
        self.rotation_inner(thread, from, to, epoch, order)
    }

    /// State of `to` relative to `from`, expressed in `axes`, populated to
    /// the full order `O`.
    pub fn state(&self, from: NodeId, to: NodeId, axes: NodeId, epoch: f64) -> Result<State<O>> {
        self.state_for_thread(0, from, to, axes, epoch, O)
    }

    /// State populated at least to `order ∈ 1..=O`.
    pub fn state_at_order(
        &self,
        from: NodeId,
        to: NodeId,
        axes: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<State<O>> {
        self.state_for_thread(0, from, to, axes, epoch, order)
    }

    /// State query through an explicit per-thread cache slot.
    pub fn state_for_thread(
        &self,
        thread: usize,
        from: NodeId,
        to: NodeId,
        axes: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<State<O>> {
        assert!(thread < self.threads, "thread slot out of range");
        self.check_order(order)?;
        for id in [from, to] {
            if !self.points.has_vertex(id) {
                return Err(FrameError::UnknownPoint(id));
            }
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        self.state_inner(thread, from, to, axes, epoch, order)
    }

    /// State with light-time (and optionally aberration) correction applied
    /// at the receive epoch.
    pub fn state_corrected(
        &self,
        from: NodeId,
        to: NodeId,
        axes: NodeId,
        epoch: f64,
        correction: LightTimeCorrection,
    ) -> Result<State<O>> {
        self.state_corrected_for_thread(0, from, to, axes, epoch, O, correction)
    }

    /// Corrected state through an explicit per-thread cache slot.
    ///
    /// Positions are assumed to be kilometers and epochs TDB seconds; the
    /// fixed-point iteration `t_emit = t_recv − ‖r(t_emit)‖/c` converges to
    /// millimeter precision or fails with
    /// [`FrameError::LightTimeNoConverge`]. Aberration needs the velocity
    /// entry, so it requires `order ≥ 2`.
    #[allow(clippy::too_many_arguments)]
    pub fn state_corrected_for_thread(
        &self,
        thread: usize,
        from: NodeId,
        to: NodeId,
        axes: NodeId,
        epoch: f64,
        order: usize,
        correction: LightTimeCorrection,
    ) -> Result<State<O>> {
        assert!(thread < self.threads, "thread slot out of range");
        self.check_order(order)?;
        for id in [from, to] {
            if !self.points.has_vertex(id) {
                return Err(FrameError::UnknownPoint(id));
            }
        }
        if !self.axes.has_vertex(axes) {
            return Err(FrameError::UnknownAxes(axes));
        }
        if correction == LightTimeCorrection::None {
            return self.state_inner(thread, from, to, axes, epoch, order);
        }
        if correction == LightTimeCorrection::Aberration && order < 2 {
            return Err(FrameError::OrderExceeded {
                requested: 2,
                max: order,
            });
        }

        let tol = LIGHT_TIME_PRECISION_KM / C_KM_S;
        let mut lt_prev = 0.0;
        let mut s = self.state_inner(thread, from, to, axes, epoch, order)?;
        for iteration in 1..=MAX_LIGHT_TIME_ITERATIONS {
            let lt = s.position().norm() / C_KM_S;
            if !lt.is_finite() {
                return Err(FrameError::LightTimeNoConverge {
                    iterations: iteration,
                });
            }
            if (lt - lt_prev).abs() < tol {
                let mut out = s;
                if correction == LightTimeCorrection::Aberration {
                    let v = *out.entry(1);
                    *out.entry_mut(0) -= v * lt;
                }
                trace!(iterations = iteration, light_time = lt, "light-time converged");
                return Ok(out);
            }
            lt_prev = lt;
            s = self.state_inner(thread, from, to, axes, epoch - lt, order)?;
        }
        Err(FrameError::LightTimeNoConverge {
            iterations: MAX_LIGHT_TIME_ITERATIONS,
        })
    }

    fn check_order(&self, order: usize) -> Result<()> {
        if order == 0 || order > O {
            return Err(FrameError::OrderExceeded {
                requested: order,
                max: O,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // evaluator
    // ------------------------------------------------------------------

    fn rotation_inner(
        &self,
        thread: usize,
        from: NodeId,
        to: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<Rot<O>> {
        if from == to {
            return Ok(Rot::identity());
        }
        let path = self.axes.get_path(from, to)?;
        let mut rot = Rot::identity();
        for step in path {
            let local = self.local_rotation(thread, step.node, epoch, order)?;
            rot = match step.direction {
                Direction::Down => local.compose(&rot),
                Direction::Up => local.inverse().compose(&rot),
            };
        }
        Ok(rot)
    }

    /// Rotation from the parent of `id` to `id`, through the cache.
    fn local_rotation(
        &self,
        thread: usize,
        id: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<Rot<O>> {
        let node = self.axes.get(id).ok_or(FrameError::UnknownAxes(id))?;
        {
            let slot = lock(&node.cache[thread]);
            if let Some(entry) = slot.as_ref() {
                if entry.epoch == epoch && entry.order >= order {
                    return Ok(entry.rot);
                }
            }
        }
        trace!(id, epoch, order, "axes cache miss");
        let rot = match &node.producer {
            RotationProducer::Identity => Rot::identity(),
            RotationProducer::Const(dcm) => Rot::from_dcm(*dcm),
            RotationProducer::TimeOnly(slots) => {
                let mut m = [Matrix3::zeros(); O];
                for (k, block) in m.iter_mut().enumerate().take(order) {
                    *block = slots[k](epoch);
                }
                Rot::new(m)
            }
            RotationProducer::TwoVectors { v1, v2, seq } => {
                self.computable_rotation(thread, node.parent, *v1, *v2, *seq, epoch, order)?
            }
        };
        let mut slot = lock(&node.cache[thread]);
        *slot = Some(RotEntry { epoch, order, rot });
        Ok(rot)
    }

    /// Materialize computable axes: pull both defining vectors (and their
    /// derivatives) out of the point graph in the parent axes, then run the
    /// two-vectors construction at the requested order.
    fn computable_rotation(
        &self,
        thread: usize,
        parent_axes: NodeId,
        v1: ComputableVector,
        v2: ComputableVector,
        seq: TwoVectorsSeq,
        epoch: f64,
        order: usize,
    ) -> Result<Rot<O>> {
        let mut stacks = [[Vector3::zeros(); 4]; 2];
        for (stack, v) in stacks.iter_mut().zip([v1, v2]) {
            // the descriptor's base entry is state derivative v.order − 1;
            // its own derivatives up to order − 1 must fit inside O
            let state_order = v.order - 1 + order;
            if state_order > O {
                return Err(FrameError::OrderExceeded {
                    requested: state_order,
                    max: O,
                });
            }
            let s = self.state_inner(thread, v.from, v.to, parent_axes, epoch, state_order)?;
            for (k, slot) in stack.iter_mut().enumerate().take(order) {
                *slot = *s.entry(v.order - 1 + k);
            }
        }
        let series = dcm_series(&stacks[0][..order], &stacks[1][..order], seq, order);
        let mut m = [Matrix3::zeros(); O];
        for (k, block) in m.iter_mut().enumerate().take(order) {
            *block = series[k];
        }
        Ok(Rot::new(m))
    }

    fn state_inner(
        &self,
        thread: usize,
        from: NodeId,
        to: NodeId,
        axes: NodeId,
        epoch: f64,
        order: usize,
    ) -> Result<State<O>> {
        if from == to {
            return Ok(State::zero());
        }
        let path = self.points.get_path(from, to)?;
        let mut acc = State::zero();
        for step in path {
            let node = self
                .points
                .get(step.node)
                .ok_or(FrameError::UnknownPoint(step.node))?;
            let local = self.local_state(thread, node, epoch, order)?;
            let rotated = if node.axes == axes {
                local
            } else {
                let rot = self.rotation_inner(thread, node.axes, axes, epoch, order)?;
                rot.transform_to_order(&local, order)
            };
            acc = match step.direction {
                Direction::Down => acc + rotated,
                Direction::Up => acc - rotated,
            };
        }
        Ok(acc)
    }

    /// State of `node` relative to its parent, in the node's axes, through
    /// the cache. Updatable points bypass the per-thread cache entirely:
    /// their stamp belongs to the external writer.
    fn local_state(
        &self,
        thread: usize,
        node: &PointNode<O>,
        epoch: f64,
        order: usize,
    ) -> Result<State<O>> {
        if let StateProducer::Updatable(slot) = &node.producer {
            let guard = read_lock(slot);
            return match guard.as_ref() {
                Some(entry) if entry.epoch == epoch && entry.order >= order => Ok(entry.state),
                _ => Err(FrameError::NotUpdated(node.id)),
            };
        }
        {
            let slot = lock(&node.cache[thread]);
            if let Some(entry) = slot.as_ref() {
                if entry.epoch == epoch && entry.order >= order {
                    return Ok(entry.state);
                }
            }
        }
        trace!(id = node.id, epoch, order, "point cache miss");
        let state = match &node.producer {
            StateProducer::Zero => State::zero(),
            StateProducer::Const(offset) => State::from_position(*offset),
            StateProducer::TimeOnly(slots) => {
                let mut v = [Vector3::zeros(); O];
                for (k, entry) in v.iter_mut().enumerate().take(order) {
                    *entry = slots[k](epoch);
                }
                State::new(v)
            }
            StateProducer::Ephemeris { target, center } => {
                let provider = self
                    .ephemeris
                    .as_ref()
                    .ok_or(FrameError::NoEphemeris(*target))?;
                let stack = provider.compute(order - 1, *target, *center, epoch)?;
                let mut v = [Vector3::zeros(); O];
                for (k, entry) in v.iter_mut().enumerate().take(order) {
                    *entry = stack[k];
                }
                State::new(v)
            }
            // handled above; an updatable point never reaches the producer path
            StateProducer::Updatable(_) => return Err(FrameError::NotUpdated(node.id)),
        };
        let mut slot = lock(&node.cache[thread]);
        *slot = Some(StateEntry {
            epoch,
            order,
            state,
        });
        Ok(state)
    }
}
