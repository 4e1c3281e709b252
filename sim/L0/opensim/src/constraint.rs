//! Equality constraints.
//!
//! The working set collects joint couplings declared at model level and
//! those discovered while classifying transform axes. Once the tree is
//! assembled, [`ConstraintSet::prune`] drops every coupling that refers to a
//! joint which was never emitted.

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::fit::{
    FitQuality, IDENTITY_POLYCOEF, POLY_LEN, constant_polycoef, fit_polynomial, linear_polycoef,
};
use crate::function::MotionFunction;
use crate::tree::AttrNode;

/// `joint1 = polycoef(joint2)`, or `joint1 = polycoef[0]` without a second joint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointCoupling {
    /// Constraint name.
    pub name: String,
    /// Dependent joint.
    pub joint1: String,
    /// Independent joint; `None` pins `joint1` to a constant.
    pub joint2: Option<String>,
    /// Power-basis coefficients, lowest order first.
    pub polycoef: [f64; POLY_LEN],
    /// Whether the constraint is enforced.
    pub active: bool,
    /// Solver impedance.
    pub solimp: Option<[f64; 5]>,
    /// Quality of the polynomial, when it was fitted.
    pub fit: Option<FitQuality>,
}

impl JointCoupling {
    /// Couple `joint1` to `joint2` through `polycoef`.
    #[must_use]
    pub fn coupling(
        name: impl Into<String>,
        joint1: impl Into<String>,
        joint2: impl Into<String>,
        polycoef: [f64; POLY_LEN],
    ) -> Self {
        Self {
            name: name.into(),
            joint1: joint1.into(),
            joint2: Some(joint2.into()),
            polycoef,
            active: true,
            solimp: None,
            fit: None,
        }
    }

    /// Pin `joint` at `value`.
    #[must_use]
    pub fn lock(name: impl Into<String>, joint: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            joint1: joint.into(),
            joint2: None,
            polycoef: constant_polycoef(value),
            active: true,
            solimp: None,
            fit: None,
        }
    }

    /// Set solver impedance.
    #[must_use]
    pub fn with_solimp(mut self, solimp: [f64; 5]) -> Self {
        self.solimp = Some(solimp);
        self
    }

    /// Attach fit quality.
    #[must_use]
    pub fn with_fit(mut self, fit: FitQuality) -> Self {
        self.fit = Some(fit);
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Returns `true` if the polynomial is `q1 = q2`.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.polycoef
            .iter()
            .zip(IDENTITY_POLYCOEF)
            .all(|(a, b)| (a - b).abs() <= f64::EPSILON)
    }
}

/// Rigid attachment of a body to another body (or the world).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeldConstraint {
    /// Constraint name.
    pub name: String,
    /// Welded body.
    pub body1: String,
    /// Reference body; `None` means the world.
    pub body2: Option<String>,
    /// Whether the constraint is enforced.
    pub active: bool,
}

impl WeldConstraint {
    /// Weld `body` to the world.
    #[must_use]
    pub fn to_world(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body1: body.into(),
            body2: None,
            active: true,
        }
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Working set of equality constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    couplings: Vec<JointCoupling>,
    welds: Vec<WeldConstraint>,
}

impl ConstraintSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a joint coupling.
    pub fn push_coupling(&mut self, coupling: JointCoupling) {
        self.couplings.push(coupling);
    }

    /// Append a weld.
    pub fn push_weld(&mut self, weld: WeldConstraint) {
        self.welds.push(weld);
    }

    /// Joint couplings in insertion order.
    #[must_use]
    pub fn couplings(&self) -> &[JointCoupling] {
        &self.couplings
    }

    /// Welds in insertion order.
    #[must_use]
    pub fn welds(&self) -> &[WeldConstraint] {
        &self.welds
    }

    /// Returns `true` if an active coupling makes `coordinate` depend on another joint.
    #[must_use]
    pub fn claims_dependent(&self, coordinate: &str) -> bool {
        self.couplings
            .iter()
            .any(|c| c.active && c.joint2.is_some() && c.joint1 == coordinate)
    }

    /// Follow a coupling on `coordinate` to the joint that actually drives it.
    ///
    /// Only the first coupling whose dependent joint is `coordinate` is
    /// consulted. An inactive coupling leaves `coordinate` as the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedConstraintChain`] if the active
    /// coupling is not the identity.
    pub fn resolve_independent(&self, coordinate: &str) -> Result<String> {
        let Some(coupling) = self
            .couplings
            .iter()
            .find(|c| c.joint2.is_some() && c.joint1 == coordinate)
        else {
            return Ok(coordinate.to_string());
        };
        if !coupling.active {
            return Ok(coordinate.to_string());
        }
        if !coupling.is_identity() {
            return Err(ConvertError::UnsupportedConstraintChain {
                coordinate: coordinate.to_string(),
            });
        }
        Ok(coupling
            .joint2
            .clone()
            .unwrap_or_else(|| coordinate.to_string()))
    }

    /// Drop couplings that reference joints not in `emitted`.
    ///
    /// A coupling survives only if `joint1` and, when present, `joint2` were
    /// emitted. Of several couplings on the same `joint1` only the first is
    /// kept. Returns the removed couplings.
    pub fn prune(&mut self, emitted: &HashSet<&str>) -> Vec<JointCoupling> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.couplings.len());
        for coupling in self.couplings.drain(..) {
            let referenced = emitted.contains(coupling.joint1.as_str())
                && coupling
                    .joint2
                    .as_deref()
                    .is_none_or(|j| emitted.contains(j));
            if referenced && seen.insert(coupling.joint1.clone()) {
                kept.push(coupling);
            } else {
                debug!(constraint = %coupling.name, joint = %coupling.joint1, "pruned coupling");
                removed.push(coupling);
            }
        }
        self.couplings = kept;
        removed
    }

    /// Split into couplings and welds.
    #[must_use]
    pub fn into_parts(self) -> (Vec<JointCoupling>, Vec<WeldConstraint>) {
        (self.couplings, self.welds)
    }
}

// ============================================================================
// Model-level coupler constraints
// ============================================================================

/// Parse the `ConstraintSet/objects` node of a model.
///
/// Every record of every constraint kind is read as a coordinate coupler.
///
/// # Errors
///
/// Propagates schema, fitting and unsupported-function errors.
pub fn parse_couplers(objects: &AttrNode, config: &ConverterConfig) -> Result<Vec<JointCoupling>> {
    let mut couplings = Vec::new();
    for (kind, records) in objects.entries() {
        if kind.starts_with('@') {
            continue;
        }
        for record in records.items() {
            couplings.push(parse_coupler(record, kind, config)?);
        }
    }
    Ok(couplings)
}

fn parse_coupler(record: &AttrNode, kind: &str, config: &ConverterConfig) -> Result<JointCoupling> {
    let name = record
        .name()
        .ok_or_else(|| ConvertError::schema("@name", kind))?
        .to_string();
    let context = format!("{kind} '{name}'");

    let dependent = record.str("dependent_coordinate_name", &context)?;
    let independent = record.str("independent_coordinate_names", &context)?;
    if independent.split_whitespace().count() != 1 {
        return Err(ConvertError::invalid_value(
            "independent_coordinate_names",
            &context,
            format!("expected a single coordinate, got '{independent}'"),
        ));
    }
    let active = record.flag("isEnforced", &context, true)?;

    let function_node = record.require("coupled_coordinates_function", &context)?;
    let function = MotionFunction::from_node(function_node, &context)?
        .ok_or_else(|| ConvertError::schema("coupled_coordinates_function", &context))?;

    let coupling = match function {
        MotionFunction::Table(table) => {
            let fit = fit_polynomial(
                &table.x,
                &table.y,
                config.max_polynomial_degree,
                config.min_r_squared,
            )?;
            JointCoupling::coupling(&name, dependent, independent, fit.coefficients)
                .with_fit(fit.quality)
        }
        MotionFunction::Linear { slope, intercept } => JointCoupling::coupling(
            &name,
            dependent,
            independent,
            linear_polycoef(slope, intercept),
        ),
        MotionFunction::Identity => {
            JointCoupling::coupling(&name, dependent, independent, IDENTITY_POLYCOEF)
        }
        other => {
            return Err(ConvertError::UnsupportedMotionFunction(format!(
                "{} in {context}",
                other.kind_name()
            )));
        }
    };

    Ok(coupling
        .with_active(active)
        .with_solimp(config.coupling_solimp))
}
