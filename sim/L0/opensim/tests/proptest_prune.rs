//! Property-based tests for constraint pruning.
//!
//! Run with: cargo test -p sim-opensim -- proptest

use std::collections::HashSet;

use proptest::prelude::*;
use sim_opensim::{ConstraintSet, IDENTITY_POLYCOEF, JointCoupling};

const JOINTS: [&str; 6] = [
    "hip_flexion_r",
    "knee_angle_r",
    "knee_angle_r_translation1",
    "ankle_angle_r",
    "shoulder_elv",
    "shoulder_rot",
];

// =============================================================================
// Strategies
// =============================================================================

fn arb_coupling() -> impl Strategy<Value = JointCoupling> {
    (0..JOINTS.len(), prop::option::of(0..JOINTS.len()), 0..1000u32).prop_map(
        |(j1, j2, id)| match j2 {
            Some(j2) => JointCoupling::coupling(
                format!("c{id}"),
                JOINTS[j1],
                JOINTS[j2],
                IDENTITY_POLYCOEF,
            ),
            None => JointCoupling::lock(format!("c{id}"), JOINTS[j1], 0.0),
        },
    )
}

fn arb_emitted() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), JOINTS.len())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn proptest_prune_keeps_only_referenced_couplings(
        couplings in prop::collection::vec(arb_coupling(), 0..20),
        mask in arb_emitted(),
    ) {
        let emitted: HashSet<&str> = JOINTS
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| *name)
            .collect();

        let mut set = ConstraintSet::new();
        for coupling in &couplings {
            set.push_coupling(coupling.clone());
        }
        let removed = set.prune(&emitted);
        let kept = set.couplings();

        prop_assert_eq!(kept.len() + removed.len(), couplings.len());
        let mut seen = HashSet::new();
        for coupling in kept {
            prop_assert!(couplings.contains(coupling));
            prop_assert!(emitted.contains(coupling.joint1.as_str()));
            if let Some(joint2) = &coupling.joint2 {
                prop_assert!(emitted.contains(joint2.as_str()));
            }
            prop_assert!(seen.insert(coupling.joint1.clone()));
        }
    }

    #[test]
    fn proptest_prune_is_idempotent(
        couplings in prop::collection::vec(arb_coupling(), 0..20),
        mask in arb_emitted(),
    ) {
        let emitted: HashSet<&str> = JOINTS
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| *name)
            .collect();

        let mut set = ConstraintSet::new();
        for coupling in couplings {
            set.push_coupling(coupling);
        }
        set.prune(&emitted);
        let once = set.couplings().to_vec();
        prop_assert!(set.prune(&emitted).is_empty());
        prop_assert_eq!(set.couplings(), once.as_slice());
    }
}
