//! OpenSim musculoskeletal model to MJCF kinematic tree conversion.
//!
//! This crate reads an [OpenSim](https://simtk.org/projects/opensim) 4 model
//! (`.osim`) and rebuilds its skeleton in the vocabulary of an MJCF-style
//! physics model: nested bodies, hinge and slide joints, and polynomial
//! joint-coupling equality constraints.
//!
//! The translation is semantic, not syntactic. Every OpenSim `CustomJoint`
//! carries a six-axis spatial transform whose axes may be driven by a
//! coordinate directly, through a linear map, through an arbitrary sampled
//! function, or not at all. Each axis is classified and either
//!
//! - emitted as a real hinge/slide joint,
//! - emitted as a *dependent* joint whose motion is tied to its coordinate by
//!   a degree ≤ 4 polynomial fitted to the sampled function, or
//! - folded into the body's static offset transform.
//!
//! # Features
//!
//! - XML reader producing a generic attribute tree ([`parse_xml_str`])
//! - Custom and weld joints with parent/child offset frames
//! - Polynomial approximation of coupling functions with R² quality gating
//! - Model-level coordinate coupler constraints
//! - Constraint pruning against the joints that were actually emitted
//! - Coordinate limit forces mapped to joint limits
//! - Mesh geometry resolution with VTP → STL fallback
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It produces plain
//! data ([`ConvertedModel`]); serialising that to XML and loading it into a
//! simulator are separate steps.
//!
//! # Example
//!
//! ```
//! use sim_opensim::{ConverterConfig, JointMotion, convert_osim_str};
//!
//! let osim = r#"
//!     <OpenSimDocument Version="40000">
//!         <Model name="arm">
//!             <BodySet><objects>
//!                 <Body name="humerus"><mass>2</mass></Body>
//!             </objects></BodySet>
//!             <JointSet><objects>
//!                 <CustomJoint name="shoulder">
//!                     <socket_parent_frame>/ground</socket_parent_frame>
//!                     <socket_child_frame>/bodyset/humerus</socket_child_frame>
//!                     <coordinates>
//!                         <Coordinate name="shoulder_elv">
//!                             <range>0 3</range>
//!                             <clamped>true</clamped>
//!                         </Coordinate>
//!                     </coordinates>
//!                     <SpatialTransform>
//!                         <TransformAxis name="rotation1">
//!                             <coordinates>shoulder_elv</coordinates>
//!                             <axis>0 0 1</axis>
//!                         </TransformAxis>
//!                         <TransformAxis name="rotation2"><axis>0 1 0</axis></TransformAxis>
//!                         <TransformAxis name="rotation3"><axis>1 0 0</axis></TransformAxis>
//!                         <TransformAxis name="translation1"><axis>1 0 0</axis></TransformAxis>
//!                         <TransformAxis name="translation2"><axis>0 1 0</axis></TransformAxis>
//!                         <TransformAxis name="translation3"><axis>0 0 1</axis></TransformAxis>
//!                     </SpatialTransform>
//!                 </CustomJoint>
//!             </objects></JointSet>
//!         </Model>
//!     </OpenSimDocument>
//! "#;
//!
//! let model = convert_osim_str(osim, &ConverterConfig::default(), None).unwrap();
//! let joint = model.joint("shoulder_elv").unwrap();
//! assert_eq!(joint.motion, JointMotion::Hinge);
//! assert_eq!(joint.range, Some((0.0, 3.0)));
//! ```
//!
//! # Coordinate System
//!
//! OpenSim models are Y-up. By default the root joint is pre-rotated by +90°
//! about X so the model stands upright in a Z-up world; see
//! [`ConverterConfig::upright`]. Quaternions are reported as `[w, x, y, z]`.
//!
//! # Limitations
//!
//! - Only `CustomJoint` and `WeldJoint` are converted
//! - Muscles, actuators, markers and contact geometry are not converted
//! - Sampled functions are approximated, never reproduced exactly
//! - Kinematic loops are rejected (tree structures only)

#![doc(html_root_url = "https://docs.rs/sim-opensim/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::unnested_or_patterns,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_wraps,
    clippy::redundant_closure_for_method_calls,
    clippy::should_implement_trait,
    clippy::items_after_statements,
    clippy::unnecessary_lazy_evaluations,
    clippy::needless_pass_by_value,
    clippy::map_unwrap_or,
    clippy::option_if_let_else,
    clippy::unused_self,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]

mod assemble;
mod classify;
mod config;
mod constraint;
mod converter;
mod error;
mod fit;
mod function;
mod geometry;
mod joint;
mod output;
mod parser;
mod transform;
mod tree;
mod types;

// Re-export main types
pub use assemble::{Assembly, ROOT_WELD, apply_limit_forces, assemble, unclamp_joints};
pub use classify::{AxisClass, AxisClassifier, AxisRole};
pub use config::{
    ConverterConfig, DEFAULT_COUPLING_SOLIMP, DEFAULT_MIN_R_SQUARED, DEFAULT_ZERO_THRESHOLD,
    MAX_POLYNOMIAL_DEGREE, ParentJointPolicy,
};
pub use constraint::{ConstraintSet, JointCoupling, WeldConstraint, parse_couplers};
pub use converter::{convert_arena, convert_model, convert_osim_file, convert_osim_str};
pub use error::{ConvertError, Result};
pub use fit::{
    FitQuality, IDENTITY_POLYCOEF, POLY_LEN, PolynomialFit, check_unit_linear, constant_polycoef,
    eval_polynomial, fit_polynomial, linear_polycoef,
};
pub use function::{MotionFunction, SampledFunction, SplineKind};
pub use geometry::{
    DirectoryGeometry, GeometrySource, MeshAction, MeshAssets, OUTPUT_GEOMETRY_DIR, ResolvedMesh,
};
pub use joint::{ReconstructedJoint, reconstruct};
pub use output::{
    ConversionWarning, ConvertedBody, ConvertedModel, DofMotion, EmittedJoint, Geom, Inertial,
    JointMotion, MeshAsset,
};
pub use parser::{ModelArena, normalize_body_path, parse_model};
pub use transform::{
    body_fixed_xyz, compose, decompose, homogeneous, invert, quat_to_wxyz, rotation_about,
    translation_along, upright,
};
pub use tree::{AttrNode, parse_xml_str};
pub use types::{
    AXIS_EVALUATION_ORDER, AXIS_NAMES, AxisKind, Body, Coordinate, CoordinateLimitForce,
    FrameOffset, GROUND, MeshRef, Site, SourceJoint, SourceJointType, TransformAxis,
};
