//! Converted model types.
//!
//! A nested body tree in the target's conventions (positions relative to the
//! parent body, `[w, x, y, z]` quaternions, hinge/slide joints) together with
//! the pruned equality constraints and the warnings raised on the way.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constraint::{JointCoupling, WeldConstraint};
use crate::fit::FitQuality;
use crate::types::Site;

// ============================================================================
// Joints
// ============================================================================

/// Target joint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointMotion {
    /// Rotation about the axis.
    Hinge,
    /// Translation along the axis.
    Slide,
}

impl JointMotion {
    /// Target type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hinge => "hinge",
            Self::Slide => "slide",
        }
    }
}

/// How an emitted joint relates to its source coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DofMotion {
    /// Independent, one-to-one with the coordinate.
    Identity,
    /// Independent, negated coordinate (axis flipped).
    Mirrored,
    /// Driven by another joint through a fitted polynomial.
    Dependent,
    /// Driven by another joint through a model-level coupler constraint.
    Coupled,
}

/// A joint of the converted model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmittedJoint {
    /// Unique joint name.
    pub name: String,
    /// Hinge or slide.
    pub motion: JointMotion,
    /// Relationship to the source coordinate.
    pub dof: DofMotion,
    /// Unit axis in the body frame.
    pub axis: Vector3<f64>,
    /// Whether `range` is enforced.
    pub limited: bool,
    /// Joint range, if known.
    pub range: Option<(f64, f64)>,
    /// Range came from a coordinate limit force and may be tuned later.
    pub optimize_limit: bool,
    /// Armature override.
    pub armature: Option<f64>,
    /// Damping override.
    pub damping: Option<f64>,
    /// Stiffness override.
    pub stiffness: Option<f64>,
    /// Fit quality for joints whose range came from a polynomial approximation.
    pub fit: Option<FitQuality>,
}

impl EmittedJoint {
    /// Create an unlimited identity joint.
    #[must_use]
    pub fn new(name: impl Into<String>, motion: JointMotion, axis: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            motion,
            dof: DofMotion::Identity,
            axis,
            limited: false,
            range: None,
            optimize_limit: false,
            armature: None,
            damping: None,
            stiffness: None,
            fit: None,
        }
    }

    /// Set an enforced range.
    #[must_use]
    pub fn with_range(mut self, lower: f64, upper: f64) -> Self {
        self.range = Some((lower, upper));
        self.limited = true;
        self
    }

    /// Returns `true` for joints whose value another joint dictates.
    #[must_use]
    pub fn is_driven(&self) -> bool {
        matches!(self.dof, DofMotion::Dependent | DofMotion::Coupled)
    }

    /// Zero armature, damping and stiffness.
    pub fn make_passive(&mut self) {
        self.armature = Some(0.0);
        self.damping = Some(0.0);
        self.stiffness = Some(0.0);
    }
}

// ============================================================================
// Bodies
// ============================================================================

/// Mass properties of a converted body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Inertial {
    /// Mass in kg.
    pub mass: f64,
    /// Center of mass in the body frame.
    pub pos: Vector3<f64>,
    /// `[ixx, iyy, izz, ixy, ixz, iyz]`, or `None` when only mass is known.
    pub full_inertia: Option<[f64; 6]>,
}

/// Geometry attached to a converted body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Geom {
    /// Default capsule sized from the body mass.
    Capsule {
        /// Geom name.
        name: String,
        /// Radius.
        radius: f64,
        /// Half-length of the cylinder part.
        half_length: f64,
    },
    /// Reference to a mesh asset.
    Mesh {
        /// Geom name, `<body>_<mesh>`.
        name: String,
        /// Asset name.
        mesh: String,
    },
}

impl Geom {
    /// Geom name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Capsule { name, .. } | Self::Mesh { name, .. } => name,
        }
    }
}

/// A mesh asset of the converted model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshAsset {
    /// Asset name (source mesh file stem).
    pub name: String,
    /// File path relative to the output model.
    pub file: String,
    /// Scale factors.
    pub scale: Vector3<f64>,
}

/// A body of the converted tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvertedBody {
    /// Body name.
    pub name: String,
    /// Position relative to the parent body.
    pub pos: Vector3<f64>,
    /// Orientation relative to the parent body, `[w, x, y, z]`.
    pub quat: [f64; 4],
    /// Mass properties, omitted for massless bodies.
    pub inertial: Option<Inertial>,
    /// Attached geometry.
    pub geoms: Vec<Geom>,
    /// Attachment points.
    pub sites: Vec<Site>,
    /// Joints connecting this body to its parent, in evaluation order.
    pub joints: Vec<EmittedJoint>,
    /// Child bodies in joint declaration order.
    pub children: Vec<ConvertedBody>,
}

impl ConvertedBody {
    /// Depth-first iterator over this body and its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &ConvertedBody> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let body = stack.pop()?;
            stack.extend(body.children.iter().rev());
            Some(body)
        })
    }

    /// Find a body by name in this subtree.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ConvertedBody> {
        self.iter().find(|b| b.name == name)
    }

    /// Find an emitted joint by name in this subtree.
    pub fn find_joint_mut(&mut self, name: &str) -> Option<&mut EmittedJoint> {
        if let Some(joint) = self.joints.iter_mut().find(|j| j.name == name) {
            return Some(joint);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_joint_mut(name))
    }

    /// Apply `f` to every joint in this subtree, depth first.
    pub fn for_each_joint_mut(&mut self, f: &mut impl FnMut(&mut EmittedJoint)) {
        for joint in &mut self.joints {
            f(joint);
        }
        for child in &mut self.children {
            child.for_each_joint_mut(f);
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Non-fatal findings surfaced to the operator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConversionWarning {
    /// A designated DoF is a spline and may use different units than its siblings.
    SplineUnitMismatch {
        /// Joint name.
        joint: String,
        /// Axis name.
        axis: String,
    },
    /// A mesh file was replaced by another format.
    GeometryFallback {
        /// Declared file.
        requested: String,
        /// File used instead.
        substituted: String,
    },
    /// A transform axis with an unsupported motion function was skipped.
    SkippedMotionFunction {
        /// Joint name.
        joint: String,
        /// Axis name.
        axis: String,
        /// Function kind.
        function: String,
    },
    /// A body had several parent joints and the last one was used.
    AmbiguousParentJoint {
        /// Body name.
        body: String,
        /// Joint actually used.
        chosen: String,
    },
    /// Inertia was neither positive definite nor zero and was dropped.
    NonPositiveInertia {
        /// Body name.
        body: String,
    },
    /// Body not reachable from the root of the tree.
    UnreachableBody {
        /// Body name.
        body: String,
    },
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SplineUnitMismatch { joint, axis } => write!(
                f,
                "DoF '{axis}' of joint '{joint}' is a spline; its units may differ from other DoFs"
            ),
            Self::GeometryFallback {
                requested,
                substituted,
            } => write!(f, "mesh '{requested}' not usable, using '{substituted}'"),
            Self::SkippedMotionFunction {
                joint,
                axis,
                function,
            } => write!(f, "skipping {function} on axis '{axis}' of joint '{joint}'"),
            Self::AmbiguousParentJoint { body, chosen } => {
                write!(f, "body '{body}' has several parent joints, using '{chosen}'")
            }
            Self::NonPositiveInertia { body } => {
                write!(f, "inertia of body '{body}' is not positive definite, omitted")
            }
            Self::UnreachableBody { body } => {
                write!(f, "body '{body}' is not connected to the kinematic tree")
            }
        }
    }
}

/// Result of converting one model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvertedModel {
    /// Model name.
    pub name: String,
    /// Sites attached to the world (from the ground body).
    pub world_sites: Vec<Site>,
    /// Root of the body tree.
    pub root: ConvertedBody,
    /// Joint-coupling constraints that survived pruning.
    pub joint_equalities: Vec<JointCoupling>,
    /// Weld constraints.
    pub weld_equalities: Vec<WeldConstraint>,
    /// Mesh assets in first-use order.
    pub assets: Vec<MeshAsset>,
    /// Warnings raised during conversion.
    pub warnings: Vec<ConversionWarning>,
}

impl ConvertedModel {
    /// Number of bodies in the tree.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.root.iter().count()
    }

    /// All emitted joints in depth-first order.
    pub fn joints(&self) -> impl Iterator<Item = &EmittedJoint> {
        self.root.iter().flat_map(|b| b.joints.iter())
    }

    /// Find an emitted joint by name.
    #[must_use]
    pub fn joint(&self, name: &str) -> Option<&EmittedJoint> {
        self.joints().find(|j| j.name == name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn body(name: &str, children: Vec<ConvertedBody>) -> ConvertedBody {
        ConvertedBody {
            name: name.into(),
            pos: Vector3::zeros(),
            quat: [1.0, 0.0, 0.0, 0.0],
            inertial: None,
            geoms: Vec::new(),
            sites: Vec::new(),
            joints: Vec::new(),
            children,
        }
    }

    #[test]
    fn test_iter_is_depth_first_in_order() {
        let tree = body(
            "pelvis",
            vec![
                body("femur_r", vec![body("tibia_r", vec![])]),
                body("femur_l", vec![]),
            ],
        );
        let names: Vec<_> = tree.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["pelvis", "femur_r", "tibia_r", "femur_l"]);
        assert!(tree.find("tibia_r").is_some());
        assert!(tree.find("foot").is_none());
    }

    #[test]
    fn test_motion_type_names() {
        assert_eq!(JointMotion::Hinge.as_str(), "hinge");
        assert_eq!(JointMotion::Slide.as_str(), "slide");
    }

    #[test]
    fn test_make_passive() {
        let mut joint = EmittedJoint::new("pelvis_tx", JointMotion::Slide, Vector3::x());
        joint.make_passive();
        assert_eq!(joint.damping, Some(0.0));
        assert!(!joint.is_driven());
    }
}
