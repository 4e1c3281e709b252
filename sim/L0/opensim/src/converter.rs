//! OpenSim to MJCF-style model conversion.
//!
//! Drives the phases in order:
//!
//! 1. parse the `<Model>` tree into a [`ModelArena`]
//! 2. assemble the body tree top-down (joint reconstruction and axis
//!    classification happen per joint, appending couplings as they go)
//! 3. apply coordinate limit forces, then optional unclamping
//! 4. prune couplings against the joints that were actually emitted
//!
//! The result is a [`ConvertedModel`]; writing it out as XML is left to the
//! caller.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::assemble::{Assembly, apply_limit_forces, assemble, unclamp_joints};
use crate::config::ConverterConfig;
use crate::error::Result;
use crate::geometry::GeometrySource;
use crate::output::ConvertedModel;
use crate::parser::{ModelArena, parse_model};
use crate::tree::{AttrNode, parse_xml_str};

/// Convert an `.osim` document held in a string.
///
/// The document root may be `<OpenSimDocument>` wrapping a `<Model>`, or a
/// bare `<Model>`.
///
/// # Example
///
/// ```
/// use sim_opensim::{ConverterConfig, convert_osim_str};
///
/// let osim = r#"
///     <OpenSimDocument Version="40000">
///         <Model name="pendulum">
///             <BodySet><objects>
///                 <Body name="bob"><mass>1</mass></Body>
///             </objects></BodySet>
///             <JointSet><objects>
///                 <WeldJoint name="pin">
///                     <socket_parent_frame>/ground</socket_parent_frame>
///                     <socket_child_frame>/bodyset/bob</socket_child_frame>
///                 </WeldJoint>
///             </objects></JointSet>
///         </Model>
///     </OpenSimDocument>
/// "#;
///
/// let model = convert_osim_str(osim, &ConverterConfig::default(), None).unwrap();
/// assert_eq!(model.root.name, "bob");
/// assert_eq!(model.body_count(), 1);
/// ```
pub fn convert_osim_str(
    xml: &str,
    config: &ConverterConfig,
    geometry: Option<&mut dyn GeometrySource>,
) -> Result<ConvertedModel> {
    let doc = parse_xml_str(xml)?;
    let model = if let Some(wrapper) = doc.get("OpenSimDocument") {
        wrapper.require("Model", "OpenSimDocument")?
    } else {
        doc.require("Model", "document root")?
    };
    convert_model(model, config, geometry)
}

/// Convert an `.osim` file.
///
/// # Errors
///
/// Returns [`ConvertError::Io`](crate::ConvertError::Io) if the file cannot
/// be read, plus anything [`convert_osim_str`] returns.
pub fn convert_osim_file(
    path: impl AsRef<Path>,
    config: &ConverterConfig,
    geometry: Option<&mut dyn GeometrySource>,
) -> Result<ConvertedModel> {
    let xml = std::fs::read_to_string(path.as_ref())?;
    convert_osim_str(&xml, config, geometry)
}

/// Convert a `<Model>` attribute tree.
pub fn convert_model(
    model: &AttrNode,
    config: &ConverterConfig,
    geometry: Option<&mut dyn GeometrySource>,
) -> Result<ConvertedModel> {
    let arena = parse_model(model, config)?;
    convert_arena(&arena, config, geometry)
}

/// Convert an already parsed model.
///
/// Use this when sites have to be attached (see
/// [`ModelArena::attach_sites`]) between parsing and conversion.
///
/// # Errors
///
/// Assembly errors, and
/// [`ConvertError::UndefinedJoint`](crate::ConvertError::UndefinedJoint)
/// for an enabled coordinate limit force whose coordinate was not emitted.
pub fn convert_arena(
    arena: &ModelArena,
    config: &ConverterConfig,
    geometry: Option<&mut dyn GeometrySource>,
) -> Result<ConvertedModel> {
    let Assembly {
        mut root,
        world_sites,
        mut constraints,
        assets,
        warnings,
    } = assemble(arena, config, geometry)?;

    apply_limit_forces(&mut root, arena.limit_forces())?;
    if config.unclamp_joints {
        unclamp_joints(&mut root);
    }

    let removed = {
        let emitted: HashSet<&str> = root
            .iter()
            .flat_map(|b| b.joints.iter().map(|j| j.name.as_str()))
            .collect();
        constraints.prune(&emitted)
    };
    debug!(
        model = %arena.name,
        removed = removed.len(),
        kept = constraints.couplings().len(),
        "pruned joint couplings"
    );

    let (joint_equalities, weld_equalities) = constraints.into_parts();
    Ok(ConvertedModel {
        name: arena.name.clone(),
        world_sites,
        root,
        joint_equalities,
        weld_equalities,
        assets,
        warnings,
    })
}
