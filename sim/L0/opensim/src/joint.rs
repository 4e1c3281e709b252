//! Joint reconstruction.
//!
//! Expands one source joint into its emitted target joints and folds every
//! non-emitted contribution into a single static transform:
//!
//! ```text
//! S = P · A(axis_0) · A(axis_1) · ... · A(axis_5)
//! ```
//!
//! where `P` is the parent offset frame and `A` is a rotation (hinge axes) or
//! translation (slide axes) by the axis's static value, evaluated in
//! [`AXIS_EVALUATION_ORDER`].

use nalgebra::Matrix4;
use tracing::debug;

use crate::classify::{AxisClassifier, AxisRole};
use crate::config::ConverterConfig;
use crate::constraint::ConstraintSet;
use crate::error::{ConvertError, Result};
use crate::output::{ConversionWarning, EmittedJoint};
use crate::transform::{compose, rotation_about, translation_along};
use crate::types::{AXIS_EVALUATION_ORDER, AXIS_NAMES, AxisKind, SourceJoint, SourceJointType};

/// A source joint after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedJoint {
    /// Source joint name.
    pub name: String,
    /// Emitted target joints in evaluation order.
    pub joints: Vec<EmittedJoint>,
    /// Parent offset composed with all static axis contributions.
    pub transform: Matrix4<f64>,
}

/// Reconstruct `joint`.
///
/// Couplings discovered on the joint's axes are appended to `constraints`
/// once the whole joint has been classified, so axes of the same joint never
/// redirect through each other.
///
/// # Errors
///
/// - [`ConvertError::AxisOrder`] if a custom joint's axes are not
///   `rotation1..3, translation1..3`.
/// - Any classification error.
pub fn reconstruct(
    joint: &SourceJoint,
    constraints: &mut ConstraintSet,
    config: &ConverterConfig,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<ReconstructedJoint> {
    let parent = joint.parent_offset.to_matrix();
    if joint.joint_type == SourceJointType::Weld {
        return Ok(ReconstructedJoint {
            name: joint.name.clone(),
            joints: Vec::new(),
            transform: parent,
        });
    }

    check_axis_order(joint)?;

    let mut statics = Matrix4::identity();
    let mut emitted = Vec::new();
    let mut discovered = Vec::new();
    {
        let mut classifier = AxisClassifier::new(joint, constraints, config);
        for idx in AXIS_EVALUATION_ORDER {
            let class = classifier.classify(&joint.axes[idx], warnings)?;
            if class.static_value != 0.0 {
                let step = match class.kind {
                    AxisKind::Rotation => rotation_about(&class.axis, class.static_value),
                    AxisKind::Translation => translation_along(&class.axis, class.static_value),
                };
                statics = compose(&statics, &step);
            }
            if let AxisRole::Emitted(j) = class.role {
                emitted.push(j);
            }
            discovered.extend(class.couplings);
        }
    }

    debug!(
        joint = %joint.name,
        emitted = emitted.len(),
        couplings = discovered.len(),
        "reconstructed joint"
    );
    for coupling in discovered {
        constraints.push_coupling(coupling);
    }

    Ok(ReconstructedJoint {
        name: joint.name.clone(),
        joints: emitted,
        transform: compose(&parent, &statics),
    })
}

fn check_axis_order(joint: &SourceJoint) -> Result<()> {
    for (idx, expected) in AXIS_NAMES.iter().enumerate() {
        let found = joint.axes.get(idx).map(|a| a.name.as_str());
        if found != Some(*expected) {
            return Err(ConvertError::AxisOrder {
                joint: joint.name.clone(),
                expected: *expected,
                found: found.unwrap_or("<missing>").to_string(),
            });
        }
    }
    if joint.axes.len() > AXIS_NAMES.len() {
        return Err(ConvertError::AxisOrder {
            joint: joint.name.clone(),
            expected: "end of axes",
            found: joint.axes[AXIS_NAMES.len()].name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::function::MotionFunction;
    use crate::output::JointMotion;
    use crate::types::{Coordinate, FrameOffset, TransformAxis};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_knee_identity_hinge() {
        let joint = SourceJoint::custom("knee", "femur", "tibia")
            .with_coordinate(Coordinate::new("knee").with_range(0.0, 2.1))
            .with_axis(TransformAxis::new(
                "rotation1",
                Vector3::z(),
                Some("knee"),
                MotionFunction::Identity,
            ));
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();

        assert_eq!(r.joints.len(), 1);
        assert_eq!(r.joints[0].name, "knee");
        assert_eq!(r.joints[0].motion, JointMotion::Hinge);
        assert_eq!(r.joints[0].range, Some((0.0, 2.1)));
        assert!(set.couplings().is_empty());
        assert_relative_eq!(r.transform, Matrix4::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_constant_folded_into_transform() {
        let joint = SourceJoint::custom("offset", "a", "b").with_axis(TransformAxis::new(
            "translation2",
            Vector3::y(),
            None,
            MotionFunction::Constant(0.05),
        ));
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();
        assert!(r.joints.is_empty());
        assert_relative_eq!(r.transform[(1, 3)], 0.05, epsilon = 1e-15);
    }

    #[test]
    fn test_rotations_evaluated_in_reverse() {
        let quarter = std::f64::consts::FRAC_PI_2;
        let joint = SourceJoint::custom("j", "a", "b")
            .with_axis(TransformAxis::new(
                "rotation1",
                Vector3::x(),
                None,
                MotionFunction::Constant(quarter),
            ))
            .with_axis(TransformAxis::new(
                "rotation3",
                Vector3::z(),
                None,
                MotionFunction::Constant(quarter),
            ));
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();
        let expected =
            rotation_about(&Vector3::z(), quarter) * rotation_about(&Vector3::x(), quarter);
        assert_relative_eq!(r.transform, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_parent_offset_comes_first() {
        let joint = SourceJoint::custom("j", "a", "b")
            .with_parent_offset(FrameOffset::new(
                Vector3::new(0.0, 0.5, 0.0),
                Vector3::zeros(),
            ))
            .with_axis(TransformAxis::new(
                "translation1",
                Vector3::x(),
                None,
                MotionFunction::Constant(0.2),
            ));
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();
        assert_relative_eq!(r.transform[(0, 3)], 0.2, epsilon = 1e-15);
        assert_relative_eq!(r.transform[(1, 3)], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_weld_has_no_joints() {
        let joint = SourceJoint::weld("attach", "a", "b");
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();
        assert!(r.joints.is_empty());
    }

    #[test]
    fn test_axis_order_is_checked() {
        let mut joint = SourceJoint::custom("j", "a", "b");
        joint.axes.swap(0, 1);
        let mut set = ConstraintSet::new();
        let err = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::AxisOrder { expected: "rotation1", .. }
        ));
    }

    #[test]
    fn test_couplings_land_in_working_set() {
        let x: Vec<f64> = (0..20).map(|i| f64::from(i) * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.01 * v - 0.003 * v * v).collect();
        let joint = SourceJoint::custom("knee_r", "femur_r", "tibia_r")
            .with_coordinate(Coordinate::new("knee_angle_r").with_range(0.0, 2.0))
            .with_axis(TransformAxis::new(
                "rotation3",
                Vector3::z(),
                Some("knee_angle_r"),
                MotionFunction::Identity,
            ))
            .with_axis(TransformAxis::new(
                "translation1",
                Vector3::x(),
                Some("knee_angle_r"),
                MotionFunction::Table(crate::function::SampledFunction {
                    kind: crate::function::SplineKind::NaturalCubic,
                    x,
                    y,
                }),
            ));
        let mut set = ConstraintSet::new();
        let r = reconstruct(&joint, &mut set, &ConverterConfig::default(), &mut Vec::new())
            .unwrap();
        let names: Vec<_> = r.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["knee_angle_r", "knee_angle_r_translation1"]);
        assert_eq!(set.couplings().len(), 1);
        assert_eq!(set.couplings()[0].joint2.as_deref(), Some("knee_angle_r"));
    }
}
