//! Source model types.
//!
//! These mirror the OpenSim 4 model structure (bodies, joints with offset
//! frames, coordinates and transform axes) after the attribute tree has been
//! interpreted, but before any target-specific decisions are made.

use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::function::MotionFunction;
use crate::transform::{body_fixed_xyz, homogeneous};

/// Name of the synthetic body standing for the world.
pub const GROUND: &str = "ground";

// ============================================================================
// Bodies
// ============================================================================

/// A mesh attached to a body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshRef {
    /// Mesh file as declared (e.g. `femur.vtp`).
    pub file: String,
    /// Combined scale factors.
    pub scale: Vector3<f64>,
}

impl MeshRef {
    /// Asset name: the file name without its extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.file
            .rsplit_once('.')
            .map_or(self.file.as_str(), |(stem, _)| stem)
    }

    /// Lower-case file extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// A named point fixed on a body (muscle attachment, marker).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Site {
    /// Site name.
    pub name: String,
    /// Position in the body frame.
    pub pos: Vector3<f64>,
}

impl Site {
    /// Create a site.
    #[must_use]
    pub fn new(name: impl Into<String>, pos: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

/// A rigid body of the source model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Unique body name.
    pub name: String,
    /// Mass in kg.
    pub mass: f64,
    /// Center of mass in the body frame.
    pub mass_center: Vector3<f64>,
    /// Inertia `[ixx, iyy, izz, ixy, ixz, iyz]` about the center of mass.
    pub inertia: [f64; 6],
    /// Attached meshes in declaration order.
    pub meshes: Vec<MeshRef>,
    /// Attachment points.
    pub sites: Vec<Site>,
}

impl Body {
    /// Create a body with the given mass and no geometry.
    #[must_use]
    pub fn new(name: impl Into<String>, mass: f64) -> Self {
        Self {
            name: name.into(),
            mass,
            mass_center: Vector3::zeros(),
            inertia: [0.0; 6],
            meshes: Vec::new(),
            sites: Vec::new(),
        }
    }

    /// The synthetic ground body.
    #[must_use]
    pub fn ground() -> Self {
        Self {
            inertia: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            ..Self::new(GROUND, 0.0)
        }
    }

    /// Set the inertia entries.
    #[must_use]
    pub fn with_inertia(mut self, inertia: [f64; 6]) -> Self {
        self.inertia = inertia;
        self
    }

    /// Add a mesh reference.
    #[must_use]
    pub fn with_mesh(mut self, file: impl Into<String>) -> Self {
        self.meshes.push(MeshRef {
            file: file.into(),
            scale: Vector3::repeat(1.0),
        });
        self
    }

    /// Symmetric inertia matrix.
    #[must_use]
    pub fn inertia_matrix(&self) -> Matrix3<f64> {
        let [xx, yy, zz, xy, xz, yz] = self.inertia;
        Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
    }
}

// ============================================================================
// Coordinates
// ============================================================================

/// A generalized coordinate declared in a joint's coordinate set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// Coordinate name.
    pub name: String,
    /// Allowed range, if declared.
    pub range: Option<(f64, f64)>,
    /// Whether the range is enforced.
    pub clamped: bool,
    /// Whether the coordinate is fixed at its default value.
    pub locked: bool,
    /// Default value.
    pub default_value: f64,
}

impl Coordinate {
    /// Create an unclamped, unlocked coordinate.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: None,
            clamped: false,
            locked: false,
            default_value: 0.0,
        }
    }

    /// Set a clamped range.
    #[must_use]
    pub fn with_range(mut self, lower: f64, upper: f64) -> Self {
        self.range = Some((lower, upper));
        self.clamped = true;
        self
    }

    /// Lock the coordinate at `value`.
    #[must_use]
    pub fn locked_at(mut self, value: f64) -> Self {
        self.locked = true;
        self.default_value = value;
        self
    }
}

// ============================================================================
// Joints
// ============================================================================

/// Source joint types the converter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SourceJointType {
    /// General joint with six transform axes.
    Custom,
    /// Rigid attachment, no degrees of freedom.
    Weld,
}

impl SourceJointType {
    /// Map a source type tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CustomJoint" => Some(Self::Custom),
            "WeldJoint" => Some(Self::Weld),
            _ => None,
        }
    }
}

/// Translation plus body-fixed XYZ orientation of a joint frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameOffset {
    /// Translation in the owning body's frame.
    pub translation: Vector3<f64>,
    /// Sequential X, Y, Z rotation angles in radians.
    pub orientation: Vector3<f64>,
}

impl FrameOffset {
    /// Create a frame offset.
    #[must_use]
    pub fn new(translation: Vector3<f64>, orientation: Vector3<f64>) -> Self {
        Self {
            translation,
            orientation,
        }
    }

    /// Orientation as a quaternion.
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        body_fixed_xyz(&self.orientation)
    }

    /// Homogeneous transform.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4<f64> {
        homogeneous(&self.translation, &self.rotation())
    }
}

/// Rotational or translational transform axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisKind {
    /// Rotation about the axis.
    Rotation,
    /// Translation along the axis.
    Translation,
}

/// Names of the six transform axes in declaration order.
pub const AXIS_NAMES: [&str; 6] = [
    "rotation1",
    "rotation2",
    "rotation3",
    "translation1",
    "translation2",
    "translation3",
];

/// Order in which declared axes are evaluated: rotations reversed, then
/// translations forward.
///
/// Pinned because it reproduces known-good reference models. It is not
/// derived from the source format's definition of a spatial transform and
/// may be wrong for models with several non-zero rotation axes.
pub const AXIS_EVALUATION_ORDER: [usize; 6] = [2, 1, 0, 3, 4, 5];

/// One axis of a joint's spatial transform.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformAxis {
    /// Axis name (`rotation1` .. `translation3`).
    pub name: String,
    /// Rotation or translation.
    pub kind: AxisKind,
    /// Axis direction in the child offset frame.
    pub axis: Vector3<f64>,
    /// Coordinate driving this axis, if any.
    pub coordinate: Option<String>,
    /// Mapping from coordinate value to axis motion.
    pub function: MotionFunction,
}

impl TransformAxis {
    /// Create an axis; the kind is derived from the name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        axis: Vector3<f64>,
        coordinate: Option<&str>,
        function: MotionFunction,
    ) -> Self {
        let name = name.into();
        let kind = if name.starts_with("translation") {
            AxisKind::Translation
        } else {
            AxisKind::Rotation
        };
        Self {
            name,
            kind,
            axis,
            coordinate: coordinate.map(str::to_string),
            function,
        }
    }

    /// Axis contributing nothing (zero constant, no coordinate).
    #[must_use]
    pub fn inert(name: &str, axis: Vector3<f64>) -> Self {
        Self::new(name, axis, None, MotionFunction::Constant(0.0))
    }
}

/// A joint of the source model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceJoint {
    /// Joint name.
    pub name: String,
    /// Source joint type.
    pub joint_type: SourceJointType,
    /// Parent body name.
    pub parent: String,
    /// Child body name.
    pub child: String,
    /// Joint frame in the parent body.
    pub parent_offset: FrameOffset,
    /// Joint frame in the child body.
    pub child_offset: FrameOffset,
    /// Transform axes in declaration order (six for custom joints, none for welds).
    pub axes: Vec<TransformAxis>,
    /// Coordinates declared by this joint.
    pub coordinates: Vec<Coordinate>,
}

impl SourceJoint {
    /// Create a custom joint between two bodies with six inert axes.
    #[must_use]
    pub fn custom(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        let unit = [
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
        ];
        Self {
            name: name.into(),
            joint_type: SourceJointType::Custom,
            parent: parent.into(),
            child: child.into(),
            parent_offset: FrameOffset::default(),
            child_offset: FrameOffset::default(),
            axes: AXIS_NAMES
                .iter()
                .zip(unit)
                .map(|(name, axis)| TransformAxis::inert(name, axis))
                .collect(),
            coordinates: Vec::new(),
        }
    }

    /// Create a weld joint between two bodies.
    #[must_use]
    pub fn weld(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            joint_type: SourceJointType::Weld,
            parent: parent.into(),
            child: child.into(),
            parent_offset: FrameOffset::default(),
            child_offset: FrameOffset::default(),
            axes: Vec::new(),
            coordinates: Vec::new(),
        }
    }

    /// Replace the axis with the same name.
    #[must_use]
    pub fn with_axis(mut self, axis: TransformAxis) -> Self {
        if let Some(slot) = self.axes.iter_mut().find(|a| a.name == axis.name) {
            *slot = axis;
        }
        self
    }

    /// Add a coordinate.
    #[must_use]
    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinates.push(coordinate);
        self
    }

    /// Set the parent frame offset.
    #[must_use]
    pub fn with_parent_offset(mut self, offset: FrameOffset) -> Self {
        self.parent_offset = offset;
        self
    }

    /// Set the child frame offset.
    #[must_use]
    pub fn with_child_offset(mut self, offset: FrameOffset) -> Self {
        self.child_offset = offset;
        self
    }

    /// Look up a coordinate declared by this joint.
    #[must_use]
    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Forces
// ============================================================================

/// A coordinate limit force; only its effect on joint limits is converted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinateLimitForce {
    /// Force name.
    pub name: String,
    /// Limited coordinate (and emitted joint) name.
    pub coordinate: String,
    /// `false` if the force is disabled in the source model.
    pub enabled: bool,
}
