//! Error types for OpenSim model conversion.

use thiserror::Error;

/// Errors that abort the conversion of a model.
///
/// Every failure is fatal for the model being converted; there is no partial
/// output. Recoverable conditions are reported as
/// [`ConversionWarning`](crate::ConversionWarning) values instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// A required node is missing or has the wrong shape.
    #[error("schema violation: missing or malformed '{key}' in {context}")]
    SchemaViolation {
        /// The key that was expected.
        key: String,
        /// Where the key was expected.
        context: String,
    },

    /// A node exists but its value cannot be interpreted.
    #[error("invalid value for '{key}' in {context}: {message}")]
    InvalidValue {
        /// The key holding the invalid value.
        key: String,
        /// Where the key was found.
        context: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// Fewer than two sample pairs were given to the approximator.
    #[error("insufficient samples for polynomial fit: got {count}, need at least 2")]
    InsufficientSamples {
        /// Number of samples provided.
        count: usize,
    },

    /// The x and y tables of a sampled function differ in length.
    #[error("sample tables differ in length: {x} x-values, {y} y-values")]
    MismatchedSamples {
        /// Number of x values.
        x: usize,
        /// Number of y values.
        y: usize,
    },

    /// The fitted polynomial does not explain the samples well enough.
    #[error("poor polynomial approximation: R² = {r_squared:.4} (must exceed {threshold})")]
    PoorApproximation {
        /// Coefficient of determination of the fit.
        r_squared: f64,
        /// Acceptance threshold.
        threshold: f64,
    },

    /// A linear function other than `±x` was used to drive a degree of freedom.
    #[error("unsupported linear form: slope {slope}, intercept {intercept} (only ±1, 0 allowed)")]
    UnsupportedLinearForm {
        /// Linear slope.
        slope: f64,
        /// Linear intercept.
        intercept: f64,
    },

    /// A dependency chain resolves through a non-identity coupling.
    #[error("unsupported constraint chain through coordinate '{coordinate}'")]
    UnsupportedConstraintChain {
        /// The intermediate coordinate.
        coordinate: String,
    },

    /// A motion or coupling function that cannot be represented.
    #[error("unsupported motion function: {0}")]
    UnsupportedMotionFunction(String),

    /// The joint set is empty.
    #[error("no root joint found (the model has no joints)")]
    NoRootFound,

    /// Walking up the parent relation did not terminate.
    #[error("cyclic joint hierarchy detected after {steps} steps starting at joint '{joint}'")]
    CyclicHierarchy {
        /// Joint where the walk started.
        joint: String,
        /// Number of steps taken before giving up.
        steps: usize,
    },

    /// A body reached during assembly has no joint connecting it to a parent.
    #[error("no joint connects body '{0}' to a parent body")]
    MissingParentJoint(String),

    /// More than one joint names the same body as its child.
    #[error("body '{body}' is the child of several joints: {joints:?}")]
    AmbiguousParentJoint {
        /// The child body.
        body: String,
        /// All joints naming it as child, in declaration order.
        joints: Vec<String>,
    },

    /// Joint type other than `CustomJoint` or `WeldJoint`.
    #[error("unsupported source joint type: {0}")]
    UnsupportedSourceJointType(String),

    /// A joint references a body that was never declared.
    #[error("reference to undefined body '{body}' in joint '{joint}'")]
    UndefinedBody {
        /// The missing body.
        body: String,
        /// The referencing joint.
        joint: String,
    },

    /// A target joint name was referenced but never emitted.
    #[error("reference to undefined joint '{joint}' in {context}")]
    UndefinedJoint {
        /// The missing joint.
        joint: String,
        /// Where it was referenced.
        context: String,
    },

    /// Transform axes are not declared in the fixed order.
    #[error("joint '{joint}': expected transform axis '{expected}', found '{found}'")]
    AxisOrder {
        /// The joint being reconstructed.
        joint: String,
        /// The axis name required at this position.
        expected: &'static str,
        /// The axis name actually found.
        found: String,
    },

    /// Two bodies share a name.
    #[error("duplicate body name: {0}")]
    DuplicateBody(String),

    /// Geometry lookup failed.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create a schema violation error.
    pub fn schema(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::SchemaViolation {
            key: key.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        key: impl Into<String>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an undefined body error.
    pub fn undefined_body(body: impl Into<String>, joint: impl Into<String>) -> Self {
        Self::UndefinedBody {
            body: body.into(),
            joint: joint.into(),
        }
    }

    /// Create an undefined joint error.
    pub fn undefined_joint(joint: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UndefinedJoint {
            joint: joint.into(),
            context: context.into(),
        }
    }
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_display() {
        let err = ConvertError::schema("mass", "body 'femur_r'");
        assert!(err.to_string().contains("mass"));
        assert!(err.to_string().contains("femur_r"));
    }

    #[test]
    fn test_poor_approximation_display() {
        let err = ConvertError::PoorApproximation {
            r_squared: 0.25,
            threshold: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("0.2500"));
        assert!(msg.contains("0.5"));
    }

    #[test]
    fn test_undefined_joint() {
        let err = ConvertError::undefined_joint("hip_flexion_r", "CoordinateLimitForce");
        assert!(err.to_string().contains("hip_flexion_r"));
        assert!(err.to_string().contains("CoordinateLimitForce"));
    }
}
