//! OpenSim 4 model parser.
//!
//! Interprets the attribute tree of a `<Model>` element into a
//! [`ModelArena`]: bodies (plus the synthetic ground), joints with resolved
//! offset frames, model-level coupler constraints and coordinate limit
//! forces. Everything is stored in declaration order.

use std::collections::HashMap;

use nalgebra::Vector3;
use tracing::debug;

use crate::config::ConverterConfig;
use crate::constraint::{JointCoupling, parse_couplers};
use crate::error::{ConvertError, Result};
use crate::function::MotionFunction;
use crate::tree::AttrNode;
use crate::types::{
    Body, Coordinate, CoordinateLimitForce, FrameOffset, GROUND, MeshRef, Site, SourceJoint,
    SourceJointType, TransformAxis,
};

/// Parsed source model, addressed by body and joint names.
#[derive(Debug, Clone)]
pub struct ModelArena {
    /// Model name.
    pub name: String,
    bodies: Vec<Body>,
    body_index: HashMap<String, usize>,
    joints: Vec<SourceJoint>,
    couplers: Vec<JointCoupling>,
    limit_forces: Vec<CoordinateLimitForce>,
}

impl ModelArena {
    /// Empty model containing only the ground body.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut body_index = HashMap::new();
        body_index.insert(GROUND.to_string(), 0);
        Self {
            name: name.into(),
            bodies: vec![Body::ground()],
            body_index,
            joints: Vec::new(),
            couplers: Vec::new(),
            limit_forces: Vec::new(),
        }
    }

    /// Add a body.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::DuplicateBody`] if the name is taken.
    pub fn add_body(&mut self, body: Body) -> Result<()> {
        if self.body_index.contains_key(&body.name) {
            return Err(ConvertError::DuplicateBody(body.name));
        }
        self.body_index.insert(body.name.clone(), self.bodies.len());
        self.bodies.push(body);
        Ok(())
    }

    /// Add a joint between two known bodies.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UndefinedBody`] if either body is unknown.
    pub fn add_joint(&mut self, joint: SourceJoint) -> Result<()> {
        for body in [&joint.parent, &joint.child] {
            if !self.body_index.contains_key(body) {
                return Err(ConvertError::undefined_body(body, &joint.name));
            }
        }
        self.joints.push(joint);
        Ok(())
    }

    /// Add a model-level coupling constraint.
    pub fn add_coupler(&mut self, coupling: JointCoupling) {
        self.couplers.push(coupling);
    }

    /// Add a coordinate limit force.
    pub fn add_limit_force(&mut self, force: CoordinateLimitForce) {
        self.limit_forces.push(force);
    }

    /// Attach sites to a body (used by muscle path mapping).
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UndefinedBody`] if the body is unknown.
    pub fn attach_sites(
        &mut self,
        body: &str,
        sites: impl IntoIterator<Item = Site>,
    ) -> Result<()> {
        let idx = *self
            .body_index
            .get(body)
            .ok_or_else(|| ConvertError::undefined_body(body, "site attachment"))?;
        self.bodies[idx].sites.extend(sites);
        Ok(())
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, name: &str) -> Option<&Body> {
        self.body_index.get(name).map(|&i| &self.bodies[i])
    }

    /// All bodies in declaration order, ground first.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// All joints in declaration order.
    #[must_use]
    pub fn joints(&self) -> &[SourceJoint] {
        &self.joints
    }

    /// Model-level couplings in declaration order.
    #[must_use]
    pub fn couplers(&self) -> &[JointCoupling] {
        &self.couplers
    }

    /// Coordinate limit forces in declaration order.
    #[must_use]
    pub fn limit_forces(&self) -> &[CoordinateLimitForce] {
        &self.limit_forces
    }
}

/// Parse a `<Model>` node.
///
/// # Errors
///
/// Returns schema errors for missing or malformed fields,
/// [`ConvertError::UnsupportedSourceJointType`] for joint kinds other than
/// custom and weld joints, and fitting errors from coupler constraints.
pub fn parse_model(model: &AttrNode, config: &ConverterConfig) -> Result<ModelArena> {
    let mut arena = ModelArena::new(model.name().unwrap_or("model"));

    // Couplers first: joint classification consults them
    if let Some(objects) = model.get("ConstraintSet").and_then(|s| s.get("objects")) {
        for coupling in parse_couplers(objects, config)? {
            arena.add_coupler(coupling);
        }
    }

    for node in objects_of(model, "BodySet", "Body") {
        arena.add_body(parse_body(node)?)?;
    }

    if let Some(objects) = model.get("JointSet").and_then(|s| s.get("objects")) {
        for (tag, records) in objects.entries() {
            if tag.starts_with('@') {
                continue;
            }
            let joint_type = SourceJointType::from_tag(tag)
                .ok_or_else(|| ConvertError::UnsupportedSourceJointType(tag.clone()))?;
            for record in records.items() {
                arena.add_joint(parse_joint(record, joint_type)?)?;
            }
        }
    }

    for node in objects_of(model, "ForceSet", "CoordinateLimitForce") {
        arena.add_limit_force(parse_limit_force(node)?);
    }

    debug!(
        model = %arena.name,
        bodies = arena.bodies.len(),
        joints = arena.joints.len(),
        couplers = arena.couplers.len(),
        "parsed model"
    );
    Ok(arena)
}

/// Records of `kind` under `<set>/objects`.
fn objects_of<'a>(model: &'a AttrNode, set: &str, kind: &str) -> Vec<&'a AttrNode> {
    model
        .get(set)
        .and_then(|s| s.get("objects"))
        .map(|objects| objects.items_of(kind))
        .unwrap_or_default()
}

/// Strip component paths down to a body name.
///
/// `/ground` becomes `ground`, `/bodyset/femur` becomes `femur`.
#[must_use]
pub fn normalize_body_path(path: &str) -> &str {
    let path = path.trim();
    path.strip_prefix("/bodyset/")
        .unwrap_or_else(|| path.trim_start_matches('/'))
}

// ============================================================================
// Bodies
// ============================================================================

fn parse_body(node: &AttrNode) -> Result<Body> {
    let name = node
        .name()
        .ok_or_else(|| ConvertError::schema("@name", "Body"))?;
    let context = format!("body '{name}'");

    let mut body = Body::new(name, node.f64("mass", &context)?);
    body.mass_center = node
        .opt_vec3("mass_center", &context)?
        .unwrap_or_else(Vector3::zeros);
    body.inertia = parse_inertia(node, &context)?;

    if let Some(geometry) = node.get("attached_geometry") {
        let shared = geometry
            .opt_vec3("scale_factors", &context)?
            .unwrap_or_else(|| Vector3::repeat(1.0));
        for mesh in geometry.items_of("Mesh") {
            let own = mesh
                .opt_vec3("scale_factors", &context)?
                .unwrap_or_else(|| Vector3::repeat(1.0));
            body.meshes.push(MeshRef {
                file: mesh.str("mesh_file", &context)?.to_string(),
                scale: shared.component_mul(&own),
            });
        }
    }
    Ok(body)
}

fn parse_inertia(node: &AttrNode, context: &str) -> Result<[f64; 6]> {
    if node.has("inertia") {
        let values = node.floats("inertia", context)?;
        return values.try_into().map_err(|v: Vec<f64>| {
            ConvertError::invalid_value(
                "inertia",
                context,
                format!("expected 6 values, got {}", v.len()),
            )
        });
    }
    let mut inertia = [0.0; 6];
    let keys = [
        "inertia_xx",
        "inertia_yy",
        "inertia_zz",
        "inertia_xy",
        "inertia_xz",
        "inertia_yz",
    ];
    for (slot, key) in inertia.iter_mut().zip(keys) {
        *slot = node.opt_f64(key, context)?.unwrap_or(0.0);
    }
    Ok(inertia)
}

// ============================================================================
// Joints
// ============================================================================

fn parse_joint(node: &AttrNode, joint_type: SourceJointType) -> Result<SourceJoint> {
    let name = node
        .name()
        .ok_or_else(|| ConvertError::schema("@name", "JointSet"))?;
    let context = format!("joint '{name}'");

    let frames = node
        .get("frames")
        .map(|f| f.items_of("PhysicalOffsetFrame"))
        .unwrap_or_default();
    let (parent, parent_offset) =
        resolve_frame(&frames, node.str("socket_parent_frame", &context)?, &context)?;
    let (child, child_offset) =
        resolve_frame(&frames, node.str("socket_child_frame", &context)?, &context)?;

    let mut joint = match joint_type {
        SourceJointType::Custom => SourceJoint::custom(name, parent, child),
        SourceJointType::Weld => SourceJoint::weld(name, parent, child),
    }
    .with_parent_offset(parent_offset)
    .with_child_offset(child_offset);

    if let Some(coordinates) = node.get("coordinates") {
        for c in coordinates.items_of("Coordinate") {
            joint.coordinates.push(parse_coordinate(c, &context)?);
        }
    }

    if joint_type == SourceJointType::Custom {
        let transform = node.require("SpatialTransform", &context)?;
        joint.axes = transform
            .items_of("TransformAxis")
            .into_iter()
            .map(|axis| parse_axis(axis, &context))
            .collect::<Result<_>>()?;
    }
    Ok(joint)
}

/// Resolve a socket to `(body, offset)`.
///
/// The socket names one of the joint's offset frames (possibly by path);
/// anything else is taken as a direct body reference with no offset.
fn resolve_frame(
    frames: &[&AttrNode],
    socket: &str,
    context: &str,
) -> Result<(String, FrameOffset)> {
    let frame_name = socket.rsplit('/').next().unwrap_or(socket);
    let Some(frame) = frames.iter().find(|f| f.name() == Some(frame_name)) else {
        return Ok((normalize_body_path(socket).to_string(), FrameOffset::default()));
    };
    let frame_context = format!("{context} frame '{frame_name}'");
    let body = normalize_body_path(frame.str("socket_parent", &frame_context)?).to_string();
    let offset = FrameOffset::new(
        frame
            .opt_vec3("translation", &frame_context)?
            .unwrap_or_else(Vector3::zeros),
        frame
            .opt_vec3("orientation", &frame_context)?
            .unwrap_or_else(Vector3::zeros),
    );
    Ok((body, offset))
}

fn parse_coordinate(node: &AttrNode, context: &str) -> Result<Coordinate> {
    let name = node
        .name()
        .ok_or_else(|| ConvertError::schema("@name", format!("{context} coordinates")))?;
    let context = format!("{context} coordinate '{name}'");

    let range = match node.get("range") {
        Some(_) => {
            let values = node.floats("range", &context)?;
            match values.as_slice() {
                [lower, upper] => Some((*lower, *upper)),
                _ => {
                    return Err(ConvertError::invalid_value(
                        "range",
                        &context,
                        format!("expected 2 values, got {}", values.len()),
                    ));
                }
            }
        }
        None => None,
    };

    Ok(Coordinate {
        name: name.to_string(),
        range,
        clamped: node.flag("clamped", &context, false)?,
        locked: node.flag("locked", &context, false)?,
        default_value: node.opt_f64("default_value", &context)?.unwrap_or(0.0),
    })
}

fn parse_axis(node: &AttrNode, context: &str) -> Result<TransformAxis> {
    let name = node
        .name()
        .ok_or_else(|| ConvertError::schema("@name", format!("{context} SpatialTransform")))?;
    let context = format!("{context} axis '{name}'");

    let coordinate = node.opt_str("coordinates").filter(|c| !c.is_empty());
    let function = match MotionFunction::from_node(node, &context)? {
        Some(function) => function,
        None if coordinate.is_some() => MotionFunction::Identity,
        None => MotionFunction::Constant(0.0),
    };
    Ok(TransformAxis::new(
        name,
        node.vec3("axis", &context)?,
        coordinate,
        function,
    ))
}

// ============================================================================
// Forces
// ============================================================================

fn parse_limit_force(node: &AttrNode) -> Result<CoordinateLimitForce> {
    let name = node.name().unwrap_or("CoordinateLimitForce");
    let context = format!("force '{name}'");
    let disabled = node.flag("isDisabled", &context, false)?;
    let applies = node.flag("appliesForce", &context, true)?;
    Ok(CoordinateLimitForce {
        name: name.to_string(),
        coordinate: node.str("coordinate", &context)?.to_string(),
        enabled: applies && !disabled,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::AxisKind;
    use approx::assert_relative_eq;

    fn offset_frame(name: &str, body: &str, translation: &str) -> AttrNode {
        AttrNode::map()
            .with("@name", name)
            .with("socket_parent", body)
            .with("translation", translation)
            .with("orientation", "0 0 0")
    }

    fn axis(name: &str, coordinate: &str, axis: &str) -> AttrNode {
        AttrNode::map()
            .with("@name", name)
            .with("coordinates", coordinate)
            .with("axis", axis)
    }

    fn model() -> AttrNode {
        let joint = AttrNode::map()
            .with("@name", "hip_r")
            .with("socket_parent_frame", "pelvis_offset")
            .with("socket_child_frame", "femur_r_offset")
            .with(
                "coordinates",
                AttrNode::map().with(
                    "Coordinate",
                    AttrNode::map()
                        .with("@name", "hip_flexion_r")
                        .with("default_value", "0.1")
                        .with("range", "-0.5 2")
                        .with("clamped", "true")
                        .with("locked", "false"),
                ),
            )
            .with(
                "frames",
                AttrNode::map().with(
                    "PhysicalOffsetFrame",
                    vec![
                        offset_frame("pelvis_offset", "/bodyset/pelvis", "-0.07 -0.06 0.08"),
                        offset_frame("femur_r_offset", "/bodyset/femur_r", "0 0 0"),
                    ],
                ),
            )
            .with(
                "SpatialTransform",
                AttrNode::map().with(
                    "TransformAxis",
                    vec![
                        axis("rotation1", "hip_flexion_r", "0 0 1"),
                        axis("rotation2", "", "1 0 0"),
                        axis("rotation3", "", "0 1 0"),
                        axis("translation1", "", "1 0 0"),
                        axis("translation2", "", "0 1 0"),
                        axis("translation3", "", "0 0 1"),
                    ],
                ),
            );
        let weld = AttrNode::map()
            .with("@name", "ground_pelvis")
            .with("socket_parent_frame", "/ground")
            .with("socket_child_frame", "/bodyset/pelvis");

        AttrNode::map()
            .with("@name", "leg")
            .with(
                "BodySet",
                AttrNode::map().with(
                    "objects",
                    AttrNode::map().with(
                        "Body",
                        vec![
                            AttrNode::map()
                                .with("@name", "pelvis")
                                .with("mass", "11.7")
                                .with("mass_center", "-0.07 0 0")
                                .with("inertia", "0.1 0.09 0.05 0 0 0"),
                            AttrNode::map()
                                .with("@name", "femur_r")
                                .with("mass", "9.3")
                                .with("inertia_xx", "0.13")
                                .with(
                                    "attached_geometry",
                                    AttrNode::map().with(
                                        "Mesh",
                                        AttrNode::map()
                                            .with("mesh_file", "femur_r.vtp")
                                            .with("scale_factors", "1 2 1"),
                                    ),
                                ),
                        ],
                    ),
                ),
            )
            .with(
                "JointSet",
                AttrNode::map().with(
                    "objects",
                    AttrNode::map()
                        .with("WeldJoint", weld)
                        .with("CustomJoint", joint),
                ),
            )
            .with(
                "ForceSet",
                AttrNode::map().with(
                    "objects",
                    AttrNode::map().with(
                        "CoordinateLimitForce",
                        AttrNode::map()
                            .with("@name", "hip_limit")
                            .with("coordinate", "hip_flexion_r")
                            .with("appliesForce", "false"),
                    ),
                ),
            )
    }

    #[test]
    fn test_parse_model() {
        let arena = parse_model(&model(), &ConverterConfig::default()).unwrap();
        assert_eq!(arena.name, "leg");
        assert_eq!(arena.bodies().len(), 3);
        assert_eq!(arena.bodies()[0].name, GROUND);

        let femur = arena.body("femur_r").unwrap();
        assert_eq!(femur.inertia, [0.13, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(femur.meshes[0].scale.y, 2.0);

        let joints = arena.joints();
        assert_eq!(joints[0].name, "ground_pelvis");
        assert_eq!(joints[0].parent, "ground");
        assert_eq!(joints[0].child, "pelvis");

        let hip = &joints[1];
        assert_eq!(hip.parent, "pelvis");
        assert_eq!(hip.child, "femur_r");
        assert_relative_eq!(hip.parent_offset.translation.z, 0.08);
        assert_eq!(hip.axes.len(), 6);
        assert_eq!(hip.axes[0].function, MotionFunction::Identity);
        assert_eq!(hip.axes[1].function, MotionFunction::Constant(0.0));
        assert_eq!(hip.axes[3].kind, AxisKind::Translation);

        let coordinate = hip.coordinate("hip_flexion_r").unwrap();
        assert_eq!(coordinate.range, Some((-0.5, 2.0)));
        assert!(coordinate.clamped);
        assert_relative_eq!(coordinate.default_value, 0.1);

        assert!(!arena.limit_forces()[0].enabled);
    }

    #[test]
    fn test_unknown_joint_type() {
        let model = AttrNode::map().with(
            "JointSet",
            AttrNode::map().with(
                "objects",
                AttrNode::map().with("PinJoint", AttrNode::map().with("@name", "j")),
            ),
        );
        let err = parse_model(&model, &ConverterConfig::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedSourceJointType(ref t) if t == "PinJoint"));
    }

    #[test]
    fn test_joint_to_unknown_body() {
        let mut arena = ModelArena::new("m");
        let err = arena
            .add_joint(SourceJoint::weld("w", GROUND, "ghost"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::UndefinedBody { ref body, .. } if body == "ghost"));
    }

    #[test]
    fn test_duplicate_body() {
        let mut arena = ModelArena::new("m");
        arena.add_body(Body::new("a", 1.0)).unwrap();
        assert!(matches!(
            arena.add_body(Body::new("a", 2.0)),
            Err(ConvertError::DuplicateBody(_))
        ));
    }

    #[test]
    fn test_attach_sites() {
        let mut arena = ModelArena::new("m");
        arena
            .attach_sites(GROUND, [Site::new("origin_marker", Vector3::zeros())])
            .unwrap();
        assert_eq!(arena.body(GROUND).unwrap().sites.len(), 1);
        assert!(arena.attach_sites("nowhere", []).is_err());
    }

    #[test]
    fn test_normalize_body_path() {
        assert_eq!(normalize_body_path("/ground"), "ground");
        assert_eq!(normalize_body_path("/bodyset/femur_r"), "femur_r");
        assert_eq!(normalize_body_path("tibia"), "tibia");
    }
}
