//! Conversion configuration.
//!
//! Controls numerical thresholds, fallback policies and the handful of
//! output conventions that differ between use cases (e.g. unclamped joints
//! for replay testing).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Values with a magnitude below this are treated as zero.
pub const DEFAULT_ZERO_THRESHOLD: f64 = 10.0 * f64::EPSILON;

/// Fits must explain strictly more than this fraction of the variance.
pub const DEFAULT_MIN_R_SQUARED: f64 = 0.5;

/// Highest polynomial degree the target's joint equality can express.
pub const MAX_POLYNOMIAL_DEGREE: usize = 4;

/// Solver impedance attached to joint-coupling constraints.
///
/// Very tight so that dependent joints do not sag under gravity.
pub const DEFAULT_COUPLING_SOLIMP: [f64; 5] = [0.9999, 0.9999, 0.001, 0.5, 2.0];

/// How to resolve a body that is the child of more than one joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParentJointPolicy {
    /// Fail with [`ConvertError::AmbiguousParentJoint`](crate::ConvertError::AmbiguousParentJoint).
    #[default]
    Strict,
    /// Use the last declared joint and record a warning.
    LastWins,
}

/// Configuration for a single model conversion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConverterConfig {
    /// Magnitude below which constants are dropped and output values snapped to zero.
    pub zero_threshold: f64,
    /// Minimum coefficient of determination (exclusive) for polynomial fits.
    pub min_r_squared: f64,
    /// Highest degree used when fitting tabulated functions (at most 4).
    pub max_polynomial_degree: usize,
    /// Resolution of bodies with multiple parent joints.
    pub parent_joint_policy: ParentJointPolicy,
    /// Rotate the root joint +90° about X so Y-up models stand in a Z-up world.
    pub upright: bool,
    /// Clear `limited` on independent joints (used when replaying recorded motion).
    pub unclamp_joints: bool,
    /// Solver impedance attached to joint-coupling constraints.
    pub coupling_solimp: [f64; 5],
    /// Capsule size factor for bodies without mesh geometry.
    pub capsule_scale: f64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            zero_threshold: DEFAULT_ZERO_THRESHOLD,
            min_r_squared: DEFAULT_MIN_R_SQUARED,
            max_polynomial_degree: MAX_POLYNOMIAL_DEGREE,
            parent_joint_policy: ParentJointPolicy::Strict,
            upright: true,
            unclamp_joints: false,
            coupling_solimp: DEFAULT_COUPLING_SOLIMP,
            capsule_scale: 0.01,
        }
    }
}

impl ConverterConfig {
    /// Configuration that keeps the source frame (no upright rotation).
    #[must_use]
    pub fn source_frame() -> Self {
        Self {
            upright: false,
            ..Default::default()
        }
    }

    /// Configuration for motion replay: independent joints are left unclamped.
    #[must_use]
    pub fn for_replay() -> Self {
        Self {
            unclamp_joints: true,
            ..Default::default()
        }
    }

    /// Set the parent joint policy.
    #[must_use]
    pub fn with_parent_joint_policy(mut self, policy: ParentJointPolicy) -> Self {
        self.parent_joint_policy = policy;
        self
    }

    /// Set whether the root joint is rotated upright.
    #[must_use]
    pub fn with_upright(mut self, upright: bool) -> Self {
        self.upright = upright;
        self
    }

    /// Set the fit acceptance threshold.
    #[must_use]
    pub fn with_min_r_squared(mut self, min_r_squared: f64) -> Self {
        self.min_r_squared = min_r_squared;
        self
    }

    /// Set the maximum polynomial degree (clamped to 4).
    #[must_use]
    pub fn with_max_polynomial_degree(mut self, degree: usize) -> Self {
        self.max_polynomial_degree = degree.min(MAX_POLYNOMIAL_DEGREE);
        self
    }

    /// Set whether independent joints are unclamped.
    #[must_use]
    pub fn with_unclamp_joints(mut self, unclamp: bool) -> Self {
        self.unclamp_joints = unclamp;
        self
    }

    /// Returns `true` if `value` is numerically zero under this configuration.
    #[must_use]
    pub fn is_zero(&self, value: f64) -> bool {
        value.abs() < self.zero_threshold
    }

    /// Snap values below the zero threshold to exactly zero.
    #[must_use]
    pub fn snap(&self, value: f64) -> f64 {
        if self.is_zero(value) { 0.0 } else { value }
    }
}
