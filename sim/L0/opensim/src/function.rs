//! Motion functions attached to transform axes and coupler constraints.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::AttrNode;

/// Kind of tabulated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SplineKind {
    /// `SimmSpline`.
    Simm,
    /// `NaturalCubicSpline`.
    NaturalCubic,
}

/// A function given by sample pairs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampledFunction {
    /// Spline flavour in the source; the converter treats both the same.
    pub kind: SplineKind,
    /// Abscissae.
    pub x: Vec<f64>,
    /// Ordinates.
    pub y: Vec<f64>,
}

/// How a transform axis moves with its coordinate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotionFunction {
    /// One-to-one with the coordinate.
    Identity,
    /// Fixed value, independent of any coordinate.
    Constant(f64),
    /// `slope * q + intercept`.
    Linear {
        /// Slope.
        slope: f64,
        /// Intercept.
        intercept: f64,
    },
    /// Tabulated nonlinear function of the coordinate.
    Table(SampledFunction),
    /// Function kind the converter does not understand (tag name kept).
    Unsupported(String),
}

impl MotionFunction {
    /// Short description used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Identity => "identity",
            Self::Constant(_) => "constant",
            Self::Linear { .. } => "linear",
            Self::Table(_) => "nonlinear-table",
            Self::Unsupported(tag) => tag,
        }
    }

    /// Scale the function's output.
    #[must_use]
    pub fn scaled(self, scale: f64) -> Self {
        #[allow(clippy::float_cmp)]
        if scale == 1.0 {
            return self;
        }
        match self {
            Self::Identity => Self::Linear {
                slope: scale,
                intercept: 0.0,
            },
            Self::Constant(v) => Self::Constant(v * scale),
            Self::Linear { slope, intercept } => Self::Linear {
                slope: slope * scale,
                intercept: intercept * scale,
            },
            Self::Table(mut table) => {
                for y in &mut table.y {
                    *y *= scale;
                }
                Self::Table(table)
            }
            Self::Unsupported(tag) => Self::Unsupported(tag),
        }
    }

    /// Find the function declared among the children of `node`.
    ///
    /// Looks through `function` wrappers and `MultiplierFunction` (applying
    /// its `scale`). Returns `None` if the node declares no function at all.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a recognised function is malformed.
    pub fn from_node(node: &AttrNode, context: &str) -> Result<Option<Self>> {
        for (key, child) in node.entries() {
            let found = match key.as_str() {
                "function" => Self::from_node(child, context)?,
                "Constant" => Some(Self::Constant(child.f64("value", context)?)),
                "LinearFunction" => Some(parse_linear(child, context)?),
                "SimmSpline" => Some(Self::Table(parse_table(child, SplineKind::Simm, context)?)),
                "NaturalCubicSpline" => Some(Self::Table(parse_table(
                    child,
                    SplineKind::NaturalCubic,
                    context,
                )?)),
                "MultiplierFunction" => {
                    let scale = child.opt_f64("scale", context)?.unwrap_or(1.0);
                    let inner = match child.get("function") {
                        Some(wrapped) => Self::from_node(wrapped, context)?,
                        None => Self::from_node(child, context)?,
                    };
                    inner.map(|f| f.scaled(scale))
                }
                other if other.ends_with("Function") || other.ends_with("Spline") => {
                    Some(Self::Unsupported(other.to_string()))
                }
                _ => None,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

fn parse_linear(node: &AttrNode, context: &str) -> Result<MotionFunction> {
    let coefficients = node.floats("coefficients", context)?;
    if coefficients.len() != 2 {
        return Err(crate::ConvertError::invalid_value(
            "coefficients",
            context,
            format!("LinearFunction needs 2 coefficients, got {}", coefficients.len()),
        ));
    }
    Ok(MotionFunction::Linear {
        slope: coefficients[0],
        intercept: coefficients[1],
    })
}

fn parse_table(node: &AttrNode, kind: SplineKind, context: &str) -> Result<SampledFunction> {
    Ok(SampledFunction {
        kind,
        x: node.floats("x", context)?,
        y: node.floats("y", context)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn axis(function_key: &str, function: AttrNode) -> AttrNode {
        AttrNode::map()
            .with("@name", "rotation1")
            .with("coordinates", "knee_angle_r")
            .with("axis", "0 0 1")
            .with(function_key, function)
    }

    #[test]
    fn test_linear() {
        let node = axis(
            "LinearFunction",
            AttrNode::map().with("coefficients", "-1 0"),
        );
        let f = MotionFunction::from_node(&node, "axis").unwrap();
        assert_eq!(
            f,
            Some(MotionFunction::Linear {
                slope: -1.0,
                intercept: 0.0
            })
        );
    }

    #[test]
    fn test_constant_inside_multiplier() {
        let node = axis(
            "MultiplierFunction",
            AttrNode::map().with("scale", "2").with(
                "function",
                AttrNode::map().with("Constant", AttrNode::map().with("value", "0.05")),
            ),
        );
        let f = MotionFunction::from_node(&node, "axis").unwrap();
        assert_eq!(f, Some(MotionFunction::Constant(0.1)));
    }

    #[test]
    fn test_spline_table() {
        let node = axis(
            "SimmSpline",
            AttrNode::map().with("x", "0 1 2").with("y", "0 0.5 0.7"),
        );
        match MotionFunction::from_node(&node, "axis").unwrap() {
            Some(MotionFunction::Table(t)) => {
                assert_eq!(t.kind, SplineKind::Simm);
                assert_eq!(t.x.len(), 3);
                assert_eq!(t.y[2], 0.7);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_is_unsupported() {
        let node = axis("PiecewiseLinearFunction", AttrNode::map());
        let f = MotionFunction::from_node(&node, "axis").unwrap();
        assert_eq!(
            f,
            Some(MotionFunction::Unsupported("PiecewiseLinearFunction".into()))
        );
    }

    #[test]
    fn test_no_function() {
        let node = AttrNode::map().with("axis", "1 0 0");
        assert_eq!(MotionFunction::from_node(&node, "axis").unwrap(), None);
    }

    #[test]
    fn test_malformed_linear() {
        let node = axis("LinearFunction", AttrNode::map().with("coefficients", "1"));
        assert!(MotionFunction::from_node(&node, "axis").is_err());
    }
}
