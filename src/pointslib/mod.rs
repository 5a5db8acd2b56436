//! Point nodes and their state producers
//!
//! Each point node owns a producer that materializes the state of the point
//! relative to its parent, expressed in the node's declared axes. The root
//! produces zero, fixed points a constant offset, ephemeris points delegate
//! to the ephemeris provider, updatable points replay an externally written
//! stamp, and dynamical points evaluate a time-only function whose missing
//! derivative orders are synthesized at registration.

use nalgebra::Vector3;
use std::sync::{Arc, Mutex, RwLock};

use crate::difflib::{vector_derivative, VectorFunction};
use crate::graphlib::NodeId;
use crate::statelib::State;

/// Boxed time-only vector callable, one per derivative order.
pub type VectorClosure = Box<dyn Fn(f64) -> Vector3<f64> + Send + Sync>;

/// The state-production class of a point node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    Root,
    Fixed,
    Ephemeris,
    Updatable,
    Dynamical,
}

/// Externally written state of an updatable point.
pub(crate) struct UpdatableEntry<const O: usize> {
    pub state: State<O>,
    pub epoch: f64,
    pub order: usize,
}

/// Per-node state producer.
pub(crate) enum StateProducer<const O: usize> {
    Zero,
    Const(Vector3<f64>),
    Ephemeris { target: NodeId, center: NodeId },
    Updatable(RwLock<Option<UpdatableEntry<O>>>),
    TimeOnly([VectorClosure; 4]),
}

/// Cached state stamped with the epoch and the order it was filled to.
pub(crate) struct StateEntry<const O: usize> {
    pub epoch: f64,
    pub order: usize,
    pub state: State<O>,
}

/// A point node: payload of the point tree.
pub struct PointNode<const O: usize> {
    pub id: NodeId,
    pub name: String,
    pub class: PointClass,
    /// Parent point ID; equal to `id` for the root.
    pub parent: NodeId,
    /// Axes the produced state is expressed in.
    pub axes: NodeId,
    pub(crate) producer: StateProducer<O>,
    /// One slot per worker thread; slot `i` is only touched by thread `i`.
    pub(crate) cache: Vec<Mutex<Option<StateEntry<O>>>>,
}

impl<const O: usize> PointNode<O> {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        class: PointClass,
        parent: NodeId,
        axes: NodeId,
        producer: StateProducer<O>,
        threads: usize,
    ) -> Self {
        PointNode {
            id,
            name: name.to_string(),
            class,
            parent,
            axes,
            producer,
            cache: (0..threads).map(|_| Mutex::new(None)).collect(),
        }
    }
}

/// Build the four per-order closures for a dynamical point from a
/// differentiable base function plus optional analytic derivative overrides.
pub(crate) fn vector_slots<F: VectorFunction>(
    f: F,
    d1: Option<VectorClosure>,
    d2: Option<VectorClosure>,
    d3: Option<VectorClosure>,
) -> [VectorClosure; 4] {
    let f = Arc::new(f);
    let s0: VectorClosure = {
        let f = Arc::clone(&f);
        Box::new(move |t| f.eval(t))
    };
    let s1 = d1.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| vector_derivative(&*f, t, 1))
    });
    let s2 = d2.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| vector_derivative(&*f, t, 2))
    });
    let s3 = d3.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| vector_derivative(&*f, t, 3))
    });
    [s0, s1, s2, s3]
}
