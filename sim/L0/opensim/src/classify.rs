//! Per-axis DoF classification.
//!
//! Each transform axis of a custom joint ends up as one of:
//!
//! - nothing (a zero constant),
//! - a static offset folded into the joint's fixed transform,
//! - an emitted hinge/slide joint (independent, mirrored, coupled or
//!   dependent on another coordinate through a fitted polynomial),
//! - a skipped axis whose motion function cannot be expressed.
//!
//! One coordinate gets exactly one canonical DoF per joint; further axes
//! driven by the same coordinate are renamed `<coordinate>_<axis>`.

use std::collections::HashSet;

use nalgebra::Vector3;
use tracing::warn;

use crate::config::ConverterConfig;
use crate::constraint::{ConstraintSet, JointCoupling};
use crate::error::{ConvertError, Result};
use crate::fit::{check_unit_linear, fit_polynomial};
use crate::function::{MotionFunction, SampledFunction};
use crate::output::{ConversionWarning, DofMotion, EmittedJoint, JointMotion};
use crate::types::{AxisKind, Coordinate, SourceJoint, TransformAxis};

/// What an axis turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisRole {
    /// Contributes nothing.
    Dropped,
    /// Folded into the static transform, never emitted.
    Static,
    /// Emitted as a target joint.
    Emitted(EmittedJoint),
    /// Motion function skipped as physically inert.
    Skipped,
}

/// Classification of one transform axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisClass {
    /// Outcome for this axis.
    pub role: AxisRole,
    /// Rotation or translation.
    pub kind: AxisKind,
    /// Unit axis in the child body frame, flipped for mirrored DoFs.
    pub axis: Vector3<f64>,
    /// Amount this axis contributes to the joint's static transform.
    pub static_value: f64,
    /// Couplings discovered on this axis.
    pub couplings: Vec<JointCoupling>,
}

/// Classifies the axes of one joint, in evaluation order.
pub struct AxisClassifier<'a> {
    joint: &'a SourceJoint,
    constraints: &'a ConstraintSet,
    config: &'a ConverterConfig,
    designated: HashSet<String>,
    used_names: HashSet<String>,
}

impl<'a> AxisClassifier<'a> {
    /// Start classifying `joint` against the current constraint working set.
    #[must_use]
    pub fn new(
        joint: &'a SourceJoint,
        constraints: &'a ConstraintSet,
        config: &'a ConverterConfig,
    ) -> Self {
        Self {
            joint,
            constraints,
            config,
            designated: HashSet::new(),
            used_names: HashSet::new(),
        }
    }

    /// Classify one axis.
    ///
    /// # Errors
    ///
    /// Propagates fitting errors, [`ConvertError::UnsupportedLinearForm`],
    /// [`ConvertError::UnsupportedConstraintChain`] and
    /// [`ConvertError::UnsupportedMotionFunction`] for axes that drive a free
    /// coordinate with a function the target cannot express.
    pub fn classify(
        &mut self,
        axis: &TransformAxis,
        warnings: &mut Vec<ConversionWarning>,
    ) -> Result<AxisClass> {
        let joint = self.joint;
        let coordinate = axis
            .coordinate
            .as_deref()
            .and_then(|name| joint.coordinate(name));
        let direction = self.local_axis(axis);
        let mut class = AxisClass {
            role: AxisRole::Dropped,
            kind: axis.kind,
            axis: direction,
            static_value: 0.0,
            couplings: Vec::new(),
        };

        match &axis.function {
            MotionFunction::Constant(value) => {
                if !self.config.is_zero(*value) {
                    class.role = AxisRole::Static;
                    class.static_value = *value;
                }
            }
            MotionFunction::Identity => {
                self.emit_independent(axis, coordinate, false, &mut class);
            }
            MotionFunction::Linear { slope, intercept } => {
                let mirrored = check_unit_linear(*slope, *intercept)?;
                if mirrored {
                    class.axis = -class.axis;
                }
                self.emit_independent(axis, coordinate, mirrored, &mut class);
            }
            MotionFunction::Table(table) => {
                self.emit_table(axis, coordinate, table, &mut class, warnings)?;
            }
            MotionFunction::Unsupported(tag) => {
                let droppable = axis.coordinate.is_none() || coordinate.is_some_and(|c| c.locked);
                if !droppable {
                    return Err(ConvertError::UnsupportedMotionFunction(format!(
                        "{tag} on axis '{}' of joint '{}'",
                        axis.name, self.joint.name
                    )));
                }
                warn!(
                    joint = %self.joint.name,
                    axis = %axis.name,
                    function = %tag,
                    "skipping transform axis"
                );
                warnings.push(ConversionWarning::SkippedMotionFunction {
                    joint: self.joint.name.clone(),
                    axis: axis.name.clone(),
                    function: tag.clone(),
                });
                class.role = AxisRole::Skipped;
                class.static_value = coordinate.map_or(0.0, |c| c.default_value);
            }
        }
        Ok(class)
    }

    /// Declared axis re-expressed in the child body frame.
    fn local_axis(&self, axis: &TransformAxis) -> Vector3<f64> {
        let rotated = self.joint.child_offset.rotation() * axis.axis;
        rotated.try_normalize(1e-12).unwrap_or(rotated)
    }

    /// Name for an emitted axis; returns whether it is the coordinate's canonical DoF.
    fn claim_name(
        &mut self,
        axis: &TransformAxis,
        coordinate: Option<&Coordinate>,
    ) -> (String, bool) {
        let mut canonical = false;
        let mut name = match coordinate {
            Some(c) if self.designated.contains(&c.name) => format!("{}_{}", c.name, axis.name),
            Some(c) => {
                if !self.constraints.claims_dependent(&c.name) {
                    self.designated.insert(c.name.clone());
                    canonical = true;
                }
                c.name.clone()
            }
            None => format!("{}_{}", self.joint.name, axis.name),
        };
        if self.used_names.contains(&name) {
            name = format!("{name}_{}", axis.name);
        }
        self.used_names.insert(name.clone());
        (name, canonical)
    }

    fn motion(axis: &TransformAxis) -> JointMotion {
        match axis.kind {
            AxisKind::Rotation => JointMotion::Hinge,
            AxisKind::Translation => JointMotion::Slide,
        }
    }

    fn emit_independent(
        &mut self,
        axis: &TransformAxis,
        coordinate: Option<&Coordinate>,
        mirrored: bool,
        class: &mut AxisClass,
    ) {
        let (name, _) = self.claim_name(axis, coordinate);
        let coupled = coordinate.is_some_and(|c| self.constraints.claims_dependent(&c.name));

        let mut joint = EmittedJoint::new(&name, Self::motion(axis), class.axis);
        joint.dof = if coupled {
            DofMotion::Coupled
        } else if mirrored {
            DofMotion::Mirrored
        } else {
            DofMotion::Identity
        };
        if let Some(c) = coordinate {
            joint.range = c.range;
            joint.limited = c.clamped && c.range.is_some();
            if c.locked {
                class.couplings.push(JointCoupling::lock(
                    format!("{name}_constraint"),
                    &name,
                    c.default_value,
                ));
            }
        }
        class.role = AxisRole::Emitted(joint);
    }

    /// Fit a tabulated axis and emit it.
    ///
    /// A canonical axis stays independent and takes a lock if its coordinate
    /// is locked. A dependent axis is already pinned by its coupling to the
    /// independent coordinate, so a locked coordinate adds no lock for it; a
    /// second constraint on the same `joint1` would be dropped by pruning.
    fn emit_table(
        &mut self,
        axis: &TransformAxis,
        coordinate: Option<&Coordinate>,
        table: &SampledFunction,
        class: &mut AxisClass,
        warnings: &mut Vec<ConversionWarning>,
    ) -> Result<()> {
        let fit = fit_polynomial(
            &table.x,
            &table.y,
            self.config.max_polynomial_degree,
            self.config.min_r_squared,
        )?;
        let (name, canonical) = self.claim_name(axis, coordinate);
        let mut joint = EmittedJoint::new(&name, Self::motion(axis), class.axis);
        joint.range = Some(fit.range);
        joint.fit = Some(fit.quality);

        if canonical {
            // Designated DoF given as a spline: keep it independent over the fitted range
            warn!(
                joint = %self.joint.name,
                axis = %axis.name,
                "designated DoF is a spline; its units may differ from other DoFs"
            );
            warnings.push(ConversionWarning::SplineUnitMismatch {
                joint: self.joint.name.clone(),
                axis: axis.name.clone(),
            });
            joint.limited = coordinate.is_some_and(|c| c.clamped);
            if let Some(c) = coordinate.filter(|c| c.locked) {
                class.couplings.push(JointCoupling::lock(
                    format!("{name}_constraint"),
                    &name,
                    c.default_value,
                ));
            }
            class.role = AxisRole::Emitted(joint);
            return Ok(());
        }

        let source = axis.coordinate.as_deref().ok_or_else(|| {
            ConvertError::schema(
                "coordinates",
                format!("axis '{}' of joint '{}'", axis.name, self.joint.name),
            )
        })?;
        let independent = self.constraints.resolve_independent(source)?;

        joint.dof = DofMotion::Dependent;
        joint.limited = true;
        class.couplings.push(
            JointCoupling::coupling(
                format!("{name}_constraint"),
                &name,
                independent,
                fit.coefficients,
            )
            .with_solimp(self.config.coupling_solimp)
            .with_fit(fit.quality),
        );
        class.static_value = coordinate.map_or(0.0, |c| c.default_value);
        class.role = AxisRole::Emitted(joint);
        Ok(())
    }
}
