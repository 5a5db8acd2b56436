//! End-to-end tests for the frame system: registration rules, query
//! invariants, caching, light time and the external-provider seams.

#[cfg(test)]
mod tests {
    use crate::axeslib::ComputableVector;
    use crate::constants::C_KM_S;
    use crate::difflib::{DcmFunction, DiffScalar, VectorFunction};
    use crate::errors::{FrameError, Result};
    use crate::framelib::{FrameSystem, LightTimeCorrection};
    use crate::providers::{EphemerisProvider, EphemerisRecord};
    use crate::rotationlib::twovectors::TwoVectorsSeq;
    use crate::rotationlib::{angles_to_ddcm, angles_to_dcm, RotationSeq};
    use crate::statelib::{Rot, State};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};
    use std::f64::consts::{FRAC_PI_3, FRAC_PI_6};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const ICRF: i32 = 1;
    const ECLIPJ2000: i32 = 17;
    const SYNODIC: i32 = 2;
    const SSB: i32 = 0;
    const EARTH: i32 = 399;

    struct ZSpin;

    impl DcmFunction for ZSpin {
        fn eval<T: DiffScalar>(&self, t: T) -> Matrix3<T> {
            angles_to_dcm(&[t], RotationSeq::Z).unwrap()
        }
    }

    struct Circle;

    impl VectorFunction for Circle {
        fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T> {
            Vector3::new(t.cos(), t.sin(), T::zero())
        }
    }

    struct CountingSpin(Arc<AtomicUsize>);

    impl DcmFunction for CountingSpin {
        fn eval<T: DiffScalar>(&self, t: T) -> Matrix3<T> {
            self.0.fetch_add(1, Ordering::SeqCst);
            angles_to_dcm(&[t], RotationSeq::Z).unwrap()
        }
    }

    fn assert_mat_eq(a: &Matrix3<f64>, b: &Matrix3<f64>, eps: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a[(i, j)], b[(i, j)], epsilon = eps);
            }
        }
    }

    /// ICRF root, ecliptic fixed offset, synodic rotating axes, SSB root
    /// point and a circular dynamical point.
    fn base_system() -> FrameSystem<3> {
        let mut sys = FrameSystem::<3>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_fixed_offset_axes(
            ECLIPJ2000,
            "ECLIPJ2000",
            ICRF,
            angles_to_dcm(&[FRAC_PI_3], RotationSeq::Z).unwrap(),
        )
        .unwrap();
        sys.add_rotating_axes(SYNODIC, "SYNODIC", ICRF, ZSpin).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_dynamical_point(EARTH, "EARTH", SSB, ICRF, Circle)
            .unwrap();
        sys
    }

    // ------------------------------------------------------------------
    // scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_fixed_offset_rotation_both_ways() {
        // ECLIPJ2000 at a constant π/3 Z rotation from ICRF
        let sys = base_system();
        let expected = angles_to_dcm(&[FRAC_PI_3], RotationSeq::Z).unwrap();
        let r = sys.rotation(ICRF, ECLIPJ2000, 123.4).unwrap();
        assert_mat_eq(r.dcm(0), &expected, 1e-15);
        assert_mat_eq(r.dcm(1), &Matrix3::zeros(), 1e-15);

        let back = sys.rotation(ECLIPJ2000, ICRF, 123.4).unwrap();
        let expected_back = angles_to_dcm(&[-FRAC_PI_3], RotationSeq::Z).unwrap();
        assert_mat_eq(back.dcm(0), &expected_back, 1e-15);
    }

    #[test]
    fn test_dynamical_point_state() {
        // r(t) = (cos t, sin t, 0) at t = π/6
        let sys = base_system();
        let t = FRAC_PI_6;
        let s = sys.state(SSB, EARTH, ICRF, t).unwrap();
        assert_relative_eq!(s.position().x, 3.0_f64.sqrt() / 2.0, epsilon = 1e-15);
        assert_relative_eq!(s.position().y, 0.5, epsilon = 1e-15);
        assert_relative_eq!(s.velocity().x, -0.5, epsilon = 1e-15);
        assert_relative_eq!(s.velocity().y, 3.0_f64.sqrt() / 2.0, epsilon = 1e-15);

        // velocity agrees with a finite difference of the position
        let h = 1e-6;
        let sp = sys.state(SSB, EARTH, ICRF, t + h).unwrap();
        let sm = sys.state(SSB, EARTH, ICRF, t - h).unwrap();
        let fd = (sp.position() - sm.position()) / (2.0 * h);
        assert_relative_eq!((s.velocity() - fd).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_updatable_point_stamp_and_staleness() {
        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_updatable_point(10, "SC", SSB, ICRF).unwrap();

        let written = State::<2>::new([
            Vector3::new(10000.0, 200.0, 300.0),
            Vector3::zeros(),
        ]);
        sys.update_point(10, written, 0.1, 2).unwrap();

        let s = sys.state(SSB, 10, ICRF, 0.1).unwrap();
        assert_eq!(s, written);

        // different epoch: stale
        assert!(matches!(
            sys.state(SSB, 10, ICRF, 0.2),
            Err(FrameError::NotUpdated(10))
        ));

        // restamping moves the valid epoch
        sys.update_point(10, written, 0.2, 2).unwrap();
        assert!(sys.state(SSB, 10, ICRF, 0.2).is_ok());
    }

    #[test]
    fn test_updatable_point_order_below_stamp_fails() {
        let mut sys = FrameSystem::<4>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_updatable_point(10, "SC", SSB, ICRF).unwrap();

        sys.update_point(10, State::zero(), 5.0, 2).unwrap();
        assert!(sys.state_at_order(SSB, 10, ICRF, 5.0, 2).is_ok());
        // stamped to order 2 only; reading jerk-depth state must fail
        assert!(matches!(
            sys.state_at_order(SSB, 10, ICRF, 5.0, 4),
            Err(FrameError::NotUpdated(10))
        ));
    }

    #[test]
    fn test_update_non_updatable_point_fails() {
        let sys = base_system();
        assert!(matches!(
            sys.update_point(EARTH, State::zero(), 0.0, 1),
            Err(FrameError::NotUpdatable(EARTH))
        ));
    }

    #[test]
    fn test_rotating_axes_first_derivative_block() {
        // f(t) = angle_to_dcm(t, Z); at t = π/6 the derivative block equals
        // the closed-form DCM rate at unit angular rate, exactly
        let sys = base_system();
        let t = FRAC_PI_6;
        let r = sys.rotation(ICRF, SYNODIC, t).unwrap();
        let expected = angles_to_ddcm(&[[t, 1.0]], RotationSeq::Z).unwrap();
        assert_eq!(*r.dcm(1), expected);
    }

    // ------------------------------------------------------------------
    // rotation invariants
    // ------------------------------------------------------------------

    #[test]
    fn test_self_rotation_is_identity() {
        let sys = base_system();
        for axes in [ICRF, ECLIPJ2000, SYNODIC] {
            let r = sys.rotation(axes, axes, 42.0).unwrap();
            assert_eq!(r, Rot::<3>::identity());
        }
    }

    #[test]
    fn test_rotation_inverse_invariant() {
        let sys = base_system();
        let t = 0.8;
        let fwd = sys.rotation(ECLIPJ2000, SYNODIC, t).unwrap();
        let back = sys.rotation(SYNODIC, ECLIPJ2000, t).unwrap();
        let inv = fwd.inverse();
        for k in 0..3 {
            assert_mat_eq(back.dcm(k), inv.dcm(k), 1e-14);
        }
    }

    #[test]
    fn test_rotation_composition_invariant() {
        // rotation(A,C) = rotation(B,C) · rotation(A,B), order-wise
        let sys = base_system();
        let t = 1.7;
        let (a, b, c) = (ECLIPJ2000, ICRF, SYNODIC);
        let ac = sys.rotation(a, c, t).unwrap();
        let composed = sys.rotation(b, c, t).unwrap() * sys.rotation(a, b, t).unwrap();
        for k in 0..3 {
            assert_mat_eq(ac.dcm(k), composed.dcm(k), 1e-14);
        }
    }

    #[test]
    fn test_rotating_rotation_is_orthonormal_at_order_zero() {
        let sys = base_system();
        let r = sys.rotation(ICRF, SYNODIC, 0.9).unwrap();
        let gram = r.dcm(0) * r.dcm(0).transpose();
        assert_mat_eq(&gram, &Matrix3::identity(), 1e-14);
    }

    // ------------------------------------------------------------------
    // state invariants
    // ------------------------------------------------------------------

    #[test]
    fn test_self_state_is_zero() {
        let sys = base_system();
        let s = sys.state(EARTH, EARTH, ICRF, 3.0).unwrap();
        assert_eq!(s, State::<3>::zero());
    }

    #[test]
    fn test_state_antisymmetry() {
        let sys = base_system();
        let t = 2.2;
        let fwd = sys.state(SSB, EARTH, ICRF, t).unwrap();
        let back = sys.state(EARTH, SSB, ICRF, t).unwrap();
        let sum = fwd + back;
        for k in 0..3 {
            assert_relative_eq!(sum.entry(k).norm(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_state_axes_change_invariant() {
        // state in ax1 = rotation(ax2 → ax1) applied to state in ax2
        let sys = base_system();
        let t = 0.6;
        let in_synodic = sys.state(SSB, EARTH, SYNODIC, t).unwrap();
        let in_ecliptic = sys.state(SSB, EARTH, ECLIPJ2000, t).unwrap();
        let rotated = sys.rotation(SYNODIC, ECLIPJ2000, t).unwrap() * in_synodic;
        for k in 0..3 {
            assert_relative_eq!(
                (rotated.entry(k) - in_ecliptic.entry(k)).norm(),
                0.0,
                epsilon = 1e-13
            );
        }
    }

    #[test]
    fn test_corotating_point_is_stationary_in_synodic_axes() {
        // the synodic frame co-rotates with the point, so the expressed
        // coordinates are constant and every derivative entry vanishes
        let sys = base_system();
        let t = 0.4;
        let s = sys.state(SSB, EARTH, SYNODIC, t).unwrap();
        assert_relative_eq!(s.position().x, 1.0, epsilon = 1e-14);
        assert_relative_eq!(s.position().y, 0.0, epsilon = 1e-14);
        assert_relative_eq!(s.velocity().norm(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(s.entry(2).norm(), 0.0, epsilon = 1e-13);
    }

    // ------------------------------------------------------------------
    // autodiff vs analytic producers
    // ------------------------------------------------------------------

    #[test]
    fn test_autodiff_matches_analytic_derivatives() {
        // one rotating axes differentiated automatically, one with
        // hand-written closed-form derivative closures
        let mut sys = FrameSystem::<3>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_rotating_axes(2, "AUTO", ICRF, ZSpin).unwrap();
        sys.add_rotating_axes_with(
            3,
            "ANALYTIC",
            ICRF,
            ZSpin,
            Some(Box::new(|t: f64| {
                let (s, c) = t.sin_cos();
                #[rustfmt::skip]
                let d = Matrix3::new(
                    -s,   c, 0.0,
                    -c,  -s, 0.0,
                    0.0, 0.0, 0.0,
                );
                d
            })),
            Some(Box::new(|t: f64| {
                let (s, c) = t.sin_cos();
                #[rustfmt::skip]
                let d = Matrix3::new(
                    -c,  -s, 0.0,
                     s,  -c, 0.0,
                    0.0, 0.0, 0.0,
                );
                d
            })),
            None,
        )
        .unwrap();

        let t = 0.77;
        let auto = sys.rotation(ICRF, 2, t).unwrap();
        let analytic = sys.rotation(ICRF, 3, t).unwrap();
        for k in 0..3 {
            assert_mat_eq(auto.dcm(k), analytic.dcm(k), 1e-14);
        }
    }

    // ------------------------------------------------------------------
    // computable axes
    // ------------------------------------------------------------------

    fn computable_system() -> FrameSystem<3> {
        let mut sys = base_system();
        sys.add_computable_axes(
            40,
            "LVLH",
            ICRF,
            ComputableVector::new(SSB, EARTH, 1),
            ComputableVector::new(SSB, EARTH, 2),
            TwoVectorsSeq::XY,
        )
        .unwrap();
        sys
    }

    #[test]
    fn test_computable_axes_align_primary_with_x() {
        // the velocity-based secondary descriptor caps the rotation order at
        // O − 1 inside this system, so query the DCM block only
        let sys = computable_system();
        let t = 0.9;
        let r = sys.rotation_at_order(ICRF, 40, t, 1).unwrap();
        let pos = *sys.state(SSB, EARTH, ICRF, t).unwrap().position();
        let mapped = r.dcm(0) * pos;
        assert_relative_eq!(mapped.x, pos.norm(), epsilon = 1e-14);
        assert_relative_eq!(mapped.y, 0.0, epsilon = 1e-14);
        assert_relative_eq!(mapped.z, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_computable_axes_derivative_matches_finite_difference() {
        let sys = computable_system();
        let t = 1.2;
        let h = 1e-6;
        let r = sys.rotation_at_order(ICRF, 40, t, 2).unwrap();
        let rp = sys.rotation_at_order(ICRF, 40, t + h, 1).unwrap();
        let rm = sys.rotation_at_order(ICRF, 40, t - h, 1).unwrap();
        let fd = (rp.dcm(0) - rm.dcm(0)) / (2.0 * h);
        assert_mat_eq(r.dcm(1), &fd, 1e-8);
    }

    #[test]
    fn test_computable_axes_order_limit() {
        // an acceleration-based descriptor cannot support jerk-order
        // rotations inside O = 3
        let mut sys = base_system();
        sys.add_computable_axes(
            41,
            "ACCFRAME",
            ICRF,
            ComputableVector::new(SSB, EARTH, 3),
            ComputableVector::new(SSB, EARTH, 1),
            TwoVectorsSeq::XY,
        )
        .unwrap();
        assert!(matches!(
            sys.rotation(ICRF, 41, 0.5),
            Err(FrameError::OrderExceeded { .. })
        ));
        // but a position-only query is fine
        assert!(sys.rotation_at_order(ICRF, 41, 0.5, 1).is_ok());
    }

    // ------------------------------------------------------------------
    // caching
    // ------------------------------------------------------------------

    #[test]
    fn test_repeated_query_hits_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sys = FrameSystem::<3>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_rotating_axes(2, "SPIN", ICRF, CountingSpin(Arc::clone(&counter)))
            .unwrap();

        let first = sys.rotation(ICRF, 2, 7.5).unwrap();
        let calls_after_first = counter.load(Ordering::SeqCst);
        assert!(calls_after_first > 0);

        let second = sys.rotation(ICRF, 2, 7.5).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(first, second);

        // a new epoch invalidates the slot
        sys.rotation(ICRF, 2, 8.5).unwrap();
        assert!(counter.load(Ordering::SeqCst) > calls_after_first);
    }

    #[test]
    fn test_cache_upgrade_on_higher_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sys = FrameSystem::<3>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_rotating_axes(2, "SPIN", ICRF, CountingSpin(Arc::clone(&counter)))
            .unwrap();

        sys.rotation_at_order(ICRF, 2, 7.5, 1).unwrap();
        let after_low = counter.load(Ordering::SeqCst);

        // higher order at the same epoch must re-invoke the producer
        sys.rotation_at_order(ICRF, 2, 7.5, 3).unwrap();
        let after_high = counter.load(Ordering::SeqCst);
        assert!(after_high > after_low);

        // and a lower order afterwards is served from the upgraded stamp
        sys.rotation_at_order(ICRF, 2, 7.5, 2).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), after_high);
    }

    #[test]
    fn test_concurrent_queries_through_distinct_slots() {
        let mut sys = FrameSystem::<3>::with_threads(4);
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_rotating_axes(SYNODIC, "SYNODIC", ICRF, ZSpin).unwrap();
        let sys = &sys;

        let reference = sys.rotation_for_thread(0, ICRF, SYNODIC, 3.3, 3).unwrap();
        std::thread::scope(|scope| {
            for slot in 1..4 {
                scope.spawn(move || {
                    for _ in 0..100 {
                        let r = sys.rotation_for_thread(slot, ICRF, SYNODIC, 3.3, 3).unwrap();
                        assert_eq!(r, reference);
                    }
                });
            }
        });
    }

    // ------------------------------------------------------------------
    // registration rules
    // ------------------------------------------------------------------

    #[test]
    fn test_registration_is_transactional() {
        let mut sys = base_system();
        let axes_before = sys.axes_count();
        let points_before = sys.point_count();

        // duplicate ID
        assert!(matches!(
            sys.add_inertial_axes(ICRF, "OTHER", None, None),
            Err(FrameError::DuplicateId(ICRF))
        ));
        // duplicate name
        assert!(matches!(
            sys.add_fixed_offset_axes(99, "ECLIPJ2000", ICRF, Matrix3::identity()),
            Err(FrameError::DuplicateName(_))
        ));
        // unknown parent
        assert!(matches!(
            sys.add_fixed_offset_axes(99, "NEW", 12345, Matrix3::identity()),
            Err(FrameError::UnknownAxes(12345))
        ));
        // computable axes referencing an unknown point
        assert!(matches!(
            sys.add_computable_axes(
                99,
                "NEW",
                ICRF,
                ComputableVector::new(SSB, 777, 1),
                ComputableVector::new(SSB, EARTH, 1),
                TwoVectorsSeq::XY,
            ),
            Err(FrameError::UnknownPoint(777))
        ));

        assert_eq!(sys.axes_count(), axes_before);
        assert_eq!(sys.point_count(), points_before);
        assert!(sys.axes_id("NEW").is_err());
    }

    #[test]
    fn test_root_axes_rules() {
        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        // a second root is rejected
        assert!(matches!(
            sys.add_inertial_axes(5, "GCRF", None, None),
            Err(FrameError::InvalidParent { .. })
        ));
        // a non-root inertial without a DCM is rejected
        assert!(matches!(
            sys.add_inertial_axes(5, "GCRF", Some(ICRF), None),
            Err(FrameError::MissingDcm(5))
        ));
        // inertial axes cannot hang below rotating axes
        sys.add_rotating_axes(SYNODIC, "SYNODIC", ICRF, ZSpin).unwrap();
        assert!(matches!(
            sys.add_inertial_axes(5, "GCRF", Some(SYNODIC), Some(Matrix3::identity())),
            Err(FrameError::InvalidParent { .. })
        ));
    }

    #[test]
    fn test_single_root_point() {
        let mut sys = base_system();
        assert!(matches!(
            sys.add_root_point(50, "OTHER", ICRF),
            Err(FrameError::InvalidParent { .. })
        ));
    }

    #[test]
    fn test_order_exceeded() {
        let sys = base_system();
        assert!(matches!(
            sys.rotation_at_order(ICRF, SYNODIC, 0.0, 4),
            Err(FrameError::OrderExceeded {
                requested: 4,
                max: 3
            })
        ));
        assert!(matches!(
            sys.state_at_order(SSB, EARTH, ICRF, 0.0, 0),
            Err(FrameError::OrderExceeded { .. })
        ));
    }

    // ------------------------------------------------------------------
    // ephemeris provider seam
    // ------------------------------------------------------------------

    /// Circular heliocentric motion with full coverage bookkeeping.
    struct CircularEphemeris {
        radius: f64,
        rate: f64,
        start: f64,
        end: f64,
    }

    impl EphemerisProvider for CircularEphemeris {
        fn position_records(&self) -> Vec<EphemerisRecord> {
            vec![EphemerisRecord {
                target: EARTH,
                center: SSB,
                axes: ICRF,
                start_epoch: self.start,
                end_epoch: self.end,
            }]
        }

        fn compute(
            &self,
            order: usize,
            target: i32,
            _center: i32,
            epoch: f64,
        ) -> Result<[Vector3<f64>; 4]> {
            if epoch < self.start || epoch > self.end {
                return Err(FrameError::DataGap { id: target, epoch });
            }
            let (r, w) = (self.radius, self.rate);
            let (s, c) = (w * epoch).sin_cos();
            let mut out = [Vector3::zeros(); 4];
            let stack = [
                Vector3::new(r * c, r * s, 0.0),
                Vector3::new(-r * w * s, r * w * c, 0.0),
                Vector3::new(-r * w * w * c, -r * w * w * s, 0.0),
                Vector3::new(r * w * w * w * s, -r * w * w * w * c, 0.0),
            ];
            out[..=order].copy_from_slice(&stack[..=order]);
            Ok(out)
        }
    }

    fn ephemeris_system() -> FrameSystem<3> {
        let mut sys = FrameSystem::<3>::new();
        sys.set_ephemeris(Arc::new(CircularEphemeris {
            radius: 1.5e8,
            rate: 2e-7,
            start: 0.0,
            end: 1e9,
        }));
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_ephemeris_point(EARTH, "EARTH").unwrap();
        sys
    }

    #[test]
    fn test_ephemeris_point_state() {
        let sys = ephemeris_system();
        let t = 1e6;
        let s = sys.state(SSB, EARTH, ICRF, t).unwrap();
        let ang = 2e-7 * t;
        assert_relative_eq!(s.position().x, 1.5e8 * ang.cos(), epsilon = 1e-3);
        assert_relative_eq!(s.velocity().y, 1.5e8 * 2e-7 * ang.cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_ephemeris_center_discovery() {
        let sys = ephemeris_system();
        let node = sys.point_node(EARTH).unwrap();
        assert_eq!(node.parent, SSB);
        assert_eq!(node.axes, ICRF);
    }

    #[test]
    fn test_ephemeris_data_gap_surfaces() {
        let sys = ephemeris_system();
        assert!(matches!(
            sys.state(SSB, EARTH, ICRF, -5.0),
            Err(FrameError::DataGap { id: EARTH, .. })
        ));
        // the failure must not poison the cache
        assert!(sys.state(SSB, EARTH, ICRF, 5.0).is_ok());
    }

    struct AmbiguousEphemeris;

    impl EphemerisProvider for AmbiguousEphemeris {
        fn position_records(&self) -> Vec<EphemerisRecord> {
            vec![
                EphemerisRecord {
                    target: EARTH,
                    center: SSB,
                    axes: ICRF,
                    start_epoch: 0.0,
                    end_epoch: 1.0,
                },
                EphemerisRecord {
                    target: EARTH,
                    center: 10,
                    axes: ICRF,
                    start_epoch: 0.0,
                    end_epoch: 1.0,
                },
            ]
        }

        fn compute(&self, _: usize, target: i32, _: i32, epoch: f64) -> Result<[Vector3<f64>; 4]> {
            Err(FrameError::DataGap { id: target, epoch })
        }
    }

    #[test]
    fn test_ambiguous_ephemeris_rejected() {
        let mut sys = FrameSystem::<3>::new();
        sys.set_ephemeris(Arc::new(AmbiguousEphemeris));
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        let before = sys.point_count();
        assert!(matches!(
            sys.add_ephemeris_point(EARTH, "EARTH"),
            Err(FrameError::AmbiguousEphemeris(EARTH))
        ));
        assert_eq!(sys.point_count(), before);
    }

    #[test]
    fn test_ephemeris_point_without_provider() {
        let mut sys = FrameSystem::<3>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        assert!(matches!(
            sys.add_ephemeris_point(EARTH, "EARTH"),
            Err(FrameError::NoEphemeris(EARTH))
        ));
    }

    // ------------------------------------------------------------------
    // light time
    // ------------------------------------------------------------------

    struct Receding {
        offset_km: f64,
        speed_km_s: f64,
    }

    impl VectorFunction for Receding {
        fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T> {
            Vector3::new(
                T::from_f64(self.offset_km) + T::from_f64(self.speed_km_s) * t,
                T::zero(),
                T::zero(),
            )
        }
    }

    #[test]
    fn test_light_time_static_geometry() {
        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_fixed_point(20, "BEACON", SSB, ICRF, Vector3::new(C_KM_S * 10.0, 0.0, 0.0))
            .unwrap();

        // a static target is insensitive to the emission epoch
        let geometric = sys.state(SSB, 20, ICRF, 100.0).unwrap();
        let corrected = sys
            .state_corrected(SSB, 20, ICRF, 100.0, LightTimeCorrection::LightTime)
            .unwrap();
        assert_eq!(geometric, corrected);
    }

    #[test]
    fn test_light_time_receding_target() {
        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        let (d, v) = (C_KM_S * 100.0, 10.0);
        sys.add_dynamical_point(
            21,
            "PROBE",
            SSB,
            ICRF,
            Receding {
                offset_km: d,
                speed_km_s: v,
            },
        )
        .unwrap();

        let t = 50.0;
        let s = sys
            .state_corrected(SSB, 21, ICRF, t, LightTimeCorrection::LightTime)
            .unwrap();
        // closed-form emission solution: lt = (d + v·t) / (c + v)
        let lt = (d + v * t) / (C_KM_S + v);
        assert_relative_eq!(s.position().x, d + v * (t - lt), epsilon = 1e-4);
    }

    #[test]
    fn test_light_time_divergence() {
        // distance blowing up quadratically toward the past: every iterate
        // overshoots harder and the fixed point is repulsive
        struct Runaway;

        impl VectorFunction for Runaway {
            fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T> {
                Vector3::new(T::from_f64(C_KM_S) * t * t, T::zero(), T::zero())
            }
        }

        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_dynamical_point(22, "RUNAWAY", SSB, ICRF, Runaway).unwrap();

        assert!(matches!(
            sys.state_corrected(SSB, 22, ICRF, 10.0, LightTimeCorrection::LightTime),
            Err(FrameError::LightTimeNoConverge { .. })
        ));
    }

    #[test]
    fn test_aberration_shifts_position() {
        struct Transverse;

        impl VectorFunction for Transverse {
            fn eval<T: DiffScalar>(&self, t: T) -> Vector3<T> {
                Vector3::new(T::from_f64(C_KM_S * 10.0), T::from_f64(5.0) * t, T::zero())
            }
        }

        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_dynamical_point(23, "TARGET", SSB, ICRF, Transverse).unwrap();

        let t = 100.0;
        let plain = sys
            .state_corrected(SSB, 23, ICRF, t, LightTimeCorrection::LightTime)
            .unwrap();
        let aberrated = sys
            .state_corrected(SSB, 23, ICRF, t, LightTimeCorrection::Aberration)
            .unwrap();
        let lt = plain.position().norm() / C_KM_S;
        assert_relative_eq!(
            aberrated.position().y,
            plain.position().y - 5.0 * lt,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_aberration_requires_velocity_order() {
        let mut sys = FrameSystem::<2>::new();
        sys.add_inertial_axes(ICRF, "ICRF", None, None).unwrap();
        sys.add_root_point(SSB, "SSB", ICRF).unwrap();
        sys.add_fixed_point(20, "BEACON", SSB, ICRF, Vector3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(matches!(
            sys.state_corrected_for_thread(
                0,
                SSB,
                20,
                ICRF,
                0.0,
                1,
                LightTimeCorrection::Aberration
            ),
            Err(FrameError::OrderExceeded { .. })
        ));
    }

    // ------------------------------------------------------------------
    // lookups
    // ------------------------------------------------------------------

    #[test]
    fn test_name_lookups() {
        let sys = base_system();
        assert_eq!(sys.axes_id("ECLIPJ2000").unwrap(), ECLIPJ2000);
        assert_eq!(sys.point_id("EARTH").unwrap(), EARTH);
        assert!(matches!(
            sys.axes_id("NOPE"),
            Err(FrameError::UnknownName(_))
        ));
    }
}
