//! Kinematic tree assembly.
//!
//! Finds the root joint by walking up the parent relation, then emits bodies
//! strictly parent to child. Each body is placed at
//!
//! ```text
//! T = S · C⁻¹
//! ```
//!
//! relative to its parent, where `S` is the reconstructed joint transform
//! (parent offset plus folded static axes) and `C` is the declared child
//! offset frame. The root additionally gets the upright rotation when the
//! configuration asks for it.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::config::{ConverterConfig, ParentJointPolicy};
use crate::constraint::{ConstraintSet, WeldConstraint};
use crate::error::{ConvertError, Result};
use crate::geometry::{GeometrySource, MeshAssets};
use crate::joint::reconstruct;
use crate::output::{ConversionWarning, ConvertedBody, EmittedJoint, Geom, Inertial, MeshAsset};
use crate::parser::ModelArena;
use crate::transform::{compose, decompose, invert, quat_to_wxyz, upright};
use crate::types::{Body, CoordinateLimitForce, GROUND, Site};

/// Name of the inactive weld that pins the root body to the world.
pub const ROOT_WELD: &str = "origin_to_worldbody";

/// Output of [`assemble`], before limit forces and pruning.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Root body of the emitted tree.
    pub root: ConvertedBody,
    /// Sites of the body the root joint hangs from.
    pub world_sites: Vec<Site>,
    /// Working constraint set: model couplers, discovered couplings, root weld.
    pub constraints: ConstraintSet,
    /// Mesh assets in first-use order.
    pub assets: Vec<MeshAsset>,
    /// Warnings raised so far.
    pub warnings: Vec<ConversionWarning>,
}

/// Assemble the body tree of `arena`.
///
/// # Errors
///
/// - [`ConvertError::NoRootFound`] if the model has no joints.
/// - [`ConvertError::CyclicHierarchy`] if walking up from any joint does not
///   terminate within the joint count.
/// - [`ConvertError::AmbiguousParentJoint`] under the strict policy.
/// - Any joint reconstruction or geometry error.
pub fn assemble(
    arena: &ModelArena,
    config: &ConverterConfig,
    geometry: Option<&mut dyn GeometrySource>,
) -> Result<Assembly> {
    TreeAssembler::new(arena, config, geometry).run()
}

struct TreeAssembler<'a, 'g> {
    arena: &'a ModelArena,
    config: &'a ConverterConfig,
    geometry: Option<&'g mut dyn GeometrySource>,
    constraints: ConstraintSet,
    assets: MeshAssets,
    warnings: Vec<ConversionWarning>,
    /// Joint indices by parent body, in declaration order.
    children_of: HashMap<&'a str, Vec<usize>>,
    /// Joint indices by child body, in declaration order.
    parents_of: HashMap<&'a str, Vec<usize>>,
    ambiguity_reported: HashSet<String>,
    visited: HashSet<String>,
}

impl<'a, 'g> TreeAssembler<'a, 'g> {
    fn new(
        arena: &'a ModelArena,
        config: &'a ConverterConfig,
        geometry: Option<&'g mut dyn GeometrySource>,
    ) -> Self {
        let mut children_of: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut parents_of: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, joint) in arena.joints().iter().enumerate() {
            children_of.entry(joint.parent.as_str()).or_default().push(idx);
            parents_of.entry(joint.child.as_str()).or_default().push(idx);
        }

        let mut constraints = ConstraintSet::new();
        for coupling in arena.couplers() {
            constraints.push_coupling(coupling.clone());
        }

        Self {
            arena,
            config,
            geometry,
            constraints,
            assets: MeshAssets::new(),
            warnings: Vec::new(),
            children_of,
            parents_of,
            ambiguity_reported: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    fn run(mut self) -> Result<Assembly> {
        self.check_acyclic()?;
        let root_idx = self.find_root()?;
        let root_joint = &self.arena.joints()[root_idx];
        let world = root_joint.parent.as_str();
        debug!(joint = %root_joint.name, body = %root_joint.child, "found root joint");

        let root = self.convert_body(&root_joint.child, true)?;

        let world_sites = self
            .arena
            .body(world)
            .map(|b| b.sites.clone())
            .unwrap_or_default();

        self.constraints
            .push_weld(WeldConstraint::to_world(ROOT_WELD, root.name.clone()).with_active(false));

        for body in self.arena.bodies() {
            if body.name == GROUND || body.name == world || self.visited.contains(&body.name) {
                continue;
            }
            warn!(body = %body.name, "body is not connected to the kinematic tree");
            self.warnings.push(ConversionWarning::UnreachableBody {
                body: body.name.clone(),
            });
        }

        debug!(bodies = self.visited.len(), "assembled body tree");
        Ok(Assembly {
            root,
            world_sites,
            constraints: self.constraints,
            assets: self.assets.into_vec(),
            warnings: self.warnings,
        })
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// The single joint whose child is `body`, if any.
    fn resolve_parent(&mut self, body: &str) -> Result<Option<usize>> {
        let Some(candidates) = self.parents_of.get(body) else {
            return Ok(None);
        };
        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            [.., last] => match self.config.parent_joint_policy {
                ParentJointPolicy::Strict => Err(ConvertError::AmbiguousParentJoint {
                    body: body.to_string(),
                    joints: candidates
                        .iter()
                        .map(|&i| self.arena.joints()[i].name.clone())
                        .collect(),
                }),
                ParentJointPolicy::LastWins => {
                    let last = *last;
                    if self.ambiguity_reported.insert(body.to_string()) {
                        let chosen = self.arena.joints()[last].name.clone();
                        warn!(%body, %chosen, "body has several parent joints, using the last");
                        self.warnings.push(ConversionWarning::AmbiguousParentJoint {
                            body: body.to_string(),
                            chosen,
                        });
                    }
                    Ok(Some(last))
                }
            },
        }
    }

    /// Follow parent joints up from `start` until none is left.
    fn walk_up(&mut self, start: usize) -> Result<usize> {
        let joints = self.arena.joints();
        let bound = joints.len();
        let mut current = start;
        for _ in 0..bound {
            match self.resolve_parent(&joints[current].parent)? {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(ConvertError::CyclicHierarchy {
            joint: joints[start].name.clone(),
            steps: bound,
        })
    }

    fn check_acyclic(&mut self) -> Result<()> {
        for idx in 0..self.arena.joints().len() {
            self.walk_up(idx)?;
        }
        Ok(())
    }

    fn find_root(&mut self) -> Result<usize> {
        if self.arena.joints().is_empty() {
            return Err(ConvertError::NoRootFound);
        }
        self.walk_up(0)
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    fn convert_body(&mut self, name: &str, is_root: bool) -> Result<ConvertedBody> {
        self.visited.insert(name.to_string());

        let joint_idx = self
            .resolve_parent(name)?
            .ok_or_else(|| ConvertError::MissingParentJoint(name.to_string()))?;
        let joint = &self.arena.joints()[joint_idx];
        let body = self
            .arena
            .body(name)
            .ok_or_else(|| ConvertError::undefined_body(name, &joint.name))?;

        let reconstructed =
            reconstruct(joint, &mut self.constraints, self.config, &mut self.warnings)?;

        let mut transform = reconstructed.transform;
        if is_root && self.config.upright {
            transform = compose(&upright(), &transform);
        }
        let pose = compose(&transform, &invert(&joint.child_offset.to_matrix()));
        let (pos, rotation) = decompose(&pose);

        let mut joints = reconstructed.joints;
        if is_root {
            joints.iter_mut().for_each(EmittedJoint::make_passive);
        }

        let inertial = self.inertial(body);
        let geoms = self.geoms(body)?;

        let mut children = Vec::new();
        let child_joints = self.children_of.get(name).cloned().unwrap_or_default();
        for idx in child_joints {
            let child = &self.arena.joints()[idx].child;
            if self.visited.contains(child) || self.resolve_parent(child)? != Some(idx) {
                continue;
            }
            children.push(self.convert_body(child, false)?);
        }

        Ok(ConvertedBody {
            name: name.to_string(),
            pos: pos.map(|v| self.config.snap(v)),
            quat: quat_to_wxyz(&rotation).map(|v| self.config.snap(v)),
            inertial,
            geoms,
            sites: body.sites.clone(),
            joints,
            children,
        })
    }

    fn inertial(&mut self, body: &Body) -> Option<Inertial> {
        if body.mass <= 0.0 {
            return None;
        }
        if body.inertia.iter().all(|&v| v == 0.0) {
            return Some(Inertial {
                mass: body.mass,
                pos: body.mass_center,
                full_inertia: None,
            });
        }
        if body.inertia_matrix().cholesky().is_some() {
            return Some(Inertial {
                mass: body.mass,
                pos: body.mass_center,
                full_inertia: Some(body.inertia),
            });
        }
        warn!(body = %body.name, "inertia is not positive definite, omitting inertial");
        self.warnings.push(ConversionWarning::NonPositiveInertia {
            body: body.name.clone(),
        });
        None
    }

    fn geoms(&mut self, body: &Body) -> Result<Vec<Geom>> {
        let Some(source) = self.geometry.as_deref_mut() else {
            if body.mass <= 0.0 {
                return Ok(Vec::new());
            }
            let size = self.config.capsule_scale * body.mass.sqrt();
            return Ok(vec![Geom::Capsule {
                name: body.name.clone(),
                radius: size,
                half_length: size,
            }]);
        };

        let mut geoms = Vec::with_capacity(body.meshes.len());
        for mesh in &body.meshes {
            let stem = mesh.stem().to_string();
            if !self.assets.contains(&stem) {
                let resolved = source.resolve(mesh)?;
                if let Some(fallback) = resolved.fallback {
                    self.warnings.push(fallback);
                }
                self.assets.insert(MeshAsset {
                    name: stem.clone(),
                    file: resolved.file,
                    scale: mesh.scale,
                });
            }
            geoms.push(Geom::Mesh {
                name: format!("{}_{stem}", body.name),
                mesh: stem,
            });
        }
        Ok(geoms)
    }
}

// ============================================================================
// Post-assembly passes
// ============================================================================

/// Enforce ranges of coordinates that carry an enabled limit force.
///
/// A joint with a non-degenerate range becomes limited and is flagged for
/// later limit optimisation.
///
/// # Errors
///
/// Returns [`ConvertError::UndefinedJoint`] if an enabled force names a
/// coordinate that was not emitted as a joint.
pub fn apply_limit_forces(root: &mut ConvertedBody, forces: &[CoordinateLimitForce]) -> Result<()> {
    for force in forces.iter().filter(|f| f.enabled) {
        let joint = root
            .find_joint_mut(&force.coordinate)
            .ok_or_else(|| ConvertError::undefined_joint(&force.coordinate, &force.name))?;
        if let Some((lower, upper)) = joint.range {
            if lower != upper {
                joint.limited = true;
                joint.optimize_limit = true;
            }
        }
    }
    Ok(())
}

/// Clear `limited` on every independent joint not flagged for optimisation.
pub fn unclamp_joints(root: &mut ConvertedBody) {
    root.for_each_joint_mut(&mut |joint| {
        if !joint.is_driven() && !joint.optimize_limit {
            joint.limited = false;
        }
    });
}
