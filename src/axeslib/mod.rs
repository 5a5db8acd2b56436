//! Axes nodes and their rotation producers
//!
//! Each axes node owns a producer that materializes the rotation from the
//! parent axes to itself at a requested epoch and derivative order. Inertial
//! axes produce the identity, fixed offsets a constant DCM, rotating axes a
//! time-only function (missing derivative orders synthesized by forward-mode
//! differentiation at registration), and computable axes derive their
//! orientation from two state vectors pulled out of the point graph by the
//! evaluator.

use nalgebra::Matrix3;
use std::sync::{Arc, Mutex};

use crate::difflib::{dcm_derivative, DcmFunction};
use crate::graphlib::NodeId;
use crate::providers::PlanetaryOrientation;
use crate::rotationlib::twovectors::TwoVectorsSeq;
use crate::statelib::Rot;

/// Boxed time-only DCM callable, one per derivative order.
pub type DcmClosure = Box<dyn Fn(f64) -> Matrix3<f64> + Send + Sync>;

/// The state-production class of an axes node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxesClass {
    Inertial,
    FixedOffset,
    Rotating,
    Computable,
}

/// Descriptor of a defining vector for computable axes: the state entry
/// `order − 1` (1 = position, 2 = velocity, 3 = acceleration) of `to`
/// relative to `from`, evaluated in the parent axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputableVector {
    pub from: NodeId,
    pub to: NodeId,
    pub order: usize,
}

impl ComputableVector {
    pub fn new(from: NodeId, to: NodeId, order: usize) -> Self {
        ComputableVector { from, to, order }
    }
}

/// Per-node rotation producer.
pub(crate) enum RotationProducer {
    Identity,
    Const(Matrix3<f64>),
    TimeOnly([DcmClosure; 4]),
    TwoVectors {
        v1: ComputableVector,
        v2: ComputableVector,
        seq: TwoVectorsSeq,
    },
}

/// Cached rotation stamped with the epoch and the order it was filled to.
pub(crate) struct RotEntry<const O: usize> {
    pub epoch: f64,
    pub order: usize,
    pub rot: Rot<O>,
}

/// An axes node: payload of the axes tree.
pub struct AxesNode<const O: usize> {
    pub id: NodeId,
    pub name: String,
    pub class: AxesClass,
    /// Parent axes ID; equal to `id` for the root.
    pub parent: NodeId,
    pub(crate) producer: RotationProducer,
    /// One slot per worker thread; slot `i` is only touched by thread `i`.
    pub(crate) cache: Vec<Mutex<Option<RotEntry<O>>>>,
}

impl<const O: usize> AxesNode<O> {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        class: AxesClass,
        parent: NodeId,
        producer: RotationProducer,
        threads: usize,
    ) -> Self {
        AxesNode {
            id,
            name: name.to_string(),
            class,
            parent,
            producer,
            cache: (0..threads).map(|_| Mutex::new(None)).collect(),
        }
    }
}

/// Build the four per-order closures for a rotating axes from a
/// differentiable base function plus optional analytic derivative overrides.
pub(crate) fn dcm_slots<F: DcmFunction>(
    f: F,
    d1: Option<DcmClosure>,
    d2: Option<DcmClosure>,
    d3: Option<DcmClosure>,
) -> [DcmClosure; 4] {
    let f = Arc::new(f);
    let s0: DcmClosure = {
        let f = Arc::clone(&f);
        Box::new(move |t| f.eval(t))
    };
    let s1 = d1.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| dcm_derivative(&*f, t, 1))
    });
    let s2 = d2.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| dcm_derivative(&*f, t, 2))
    });
    let s3 = d3.unwrap_or_else(|| {
        let f = Arc::clone(&f);
        Box::new(move |t| dcm_derivative(&*f, t, 3))
    });
    [s0, s1, s2, s3]
}

/// Wire a planetary-orientation collaborator as a rotating producer.
///
/// The contract supplies nothing above the second derivative; the jerk slot
/// is zero.
pub(crate) fn orientation_slots(p: Arc<dyn PlanetaryOrientation>) -> [DcmClosure; 4] {
    let s0: DcmClosure = {
        let p = Arc::clone(&p);
        Box::new(move |t| p.dcm(t))
    };
    let s1: DcmClosure = {
        let p = Arc::clone(&p);
        Box::new(move |t| p.ddcm(t))
    };
    let s2: DcmClosure = {
        let p = Arc::clone(&p);
        Box::new(move |t| p.d2dcm(t))
    };
    let s3: DcmClosure = Box::new(|_| Matrix3::zeros());
    [s0, s1, s2, s3]
}
