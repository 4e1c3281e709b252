//! Property-based tests for the transform algebra.
//!
//! Run with: cargo test -p sim-opensim -- proptest

use approx::relative_eq;
use nalgebra::{Matrix4, Unit, UnitQuaternion, Vector3};
use proptest::prelude::*;
use sim_opensim::{compose, decompose, homogeneous, invert};

// =============================================================================
// Strategies
// =============================================================================

fn arb_translation() -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-10.0..10.0f64).prop_map(Vector3::from)
}

fn arb_rotation() -> impl Strategy<Value = UnitQuaternion<f64>> {
    (prop::array::uniform3(-1.0..1.0f64), -3.1..3.1f64).prop_filter_map(
        "axis must not be degenerate",
        |(axis, angle)| {
            Unit::try_new(Vector3::from(axis), 1e-3)
                .map(|axis| UnitQuaternion::from_axis_angle(&axis, angle))
        },
    )
}

fn arb_transform() -> impl Strategy<Value = Matrix4<f64>> {
    (arb_translation(), arb_rotation()).prop_map(|(t, q)| homogeneous(&t, &q))
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn proptest_decompose_round_trips(t in arb_translation(), q in arb_rotation()) {
        let (t2, q2) = decompose(&homogeneous(&t, &q));
        prop_assert!(relative_eq!(t, t2, epsilon = 1e-9));
        // q and -q are the same rotation
        prop_assert!(q.angle_to(&q2) < 1e-6);
    }

    #[test]
    fn proptest_inverse_composes_to_identity(m in arb_transform()) {
        let product = compose(&m, &invert(&m));
        prop_assert!(relative_eq!(product, Matrix4::identity(), epsilon = 1e-9));
    }

    #[test]
    fn proptest_compose_is_associative(
        a in arb_transform(),
        b in arb_transform(),
        c in arb_transform(),
    ) {
        let left = compose(&compose(&a, &b), &c);
        let right = compose(&a, &compose(&b, &c));
        prop_assert!(relative_eq!(left, right, epsilon = 1e-8));
    }
}
