//! Geometry collaborator.
//!
//! The converter never reads mesh data. It asks a [`GeometrySource`] where a
//! referenced mesh will live in the output and keeps a [`MeshAssets`]
//! registry so every mesh is emitted as an asset once.
//!
//! [`DirectoryGeometry`] resolves meshes under a folder and plans the file
//! operations (copy STL, transcode VTP) without performing transcoding
//! itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ConvertError, Result};
use crate::output::{ConversionWarning, MeshAsset};
use crate::types::MeshRef;

/// Folder, relative to the output model, that receives converted meshes.
pub const OUTPUT_GEOMETRY_DIR: &str = "Geometry";

/// A mesh reference resolved to an output file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMesh {
    /// File path relative to the output model.
    pub file: String,
    /// Set when a substitute file had to be used.
    pub fallback: Option<ConversionWarning>,
}

/// Resolves mesh references to output files.
pub trait GeometrySource {
    /// Resolve `mesh`. Called once per distinct mesh name.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh cannot be provided.
    fn resolve(&mut self, mesh: &MeshRef) -> Result<ResolvedMesh>;
}

/// Mesh assets emitted so far, in first-use order.
#[derive(Debug, Clone, Default)]
pub struct MeshAssets {
    assets: Vec<MeshAsset>,
    names: HashSet<String>,
}

impl MeshAssets {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an asset called `name` was already emitted.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Register an asset; returns `false` (and keeps the first) on duplicates.
    pub fn insert(&mut self, asset: MeshAsset) -> bool {
        if !self.names.insert(asset.name.clone()) {
            return false;
        }
        self.assets.push(asset);
        true
    }

    /// Emitted assets.
    #[must_use]
    pub fn into_vec(self) -> Vec<MeshAsset> {
        self.assets
    }
}

/// File operation needed to materialise a mesh asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshAction {
    /// Copy an STL file as is.
    Copy {
        /// Source file.
        from: PathBuf,
        /// Destination relative to the output folder.
        to: PathBuf,
    },
    /// Convert a VTP file to STL (done by an external tool).
    Transcode {
        /// Source file.
        from: PathBuf,
        /// Destination relative to the output folder.
        to: PathBuf,
    },
}

/// Meshes looked up in a directory.
///
/// A missing `.vtp` file falls back to an `.stl` file of the same stem,
/// with a warning. Anything else that cannot be found is an error.
#[derive(Debug, Clone)]
pub struct DirectoryGeometry {
    root: PathBuf,
    actions: Vec<MeshAction>,
}

impl DirectoryGeometry {
    /// Resolve meshes under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            actions: Vec::new(),
        }
    }

    /// Planned file operations in resolution order.
    #[must_use]
    pub fn actions(&self) -> &[MeshAction] {
        &self.actions
    }

    /// Perform the planned copies into `output`.
    ///
    /// Transcode actions are left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if a directory or file cannot be written.
    pub fn copy_into(&self, output: &Path) -> Result<usize> {
        let mut copied = 0;
        for action in &self.actions {
            if let MeshAction::Copy { from, to } = action {
                let target = output.join(to);
                if let Some(dir) = target.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::copy(from, &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn locate(&self, mesh: &MeshRef) -> Result<(PathBuf, Option<ConversionWarning>)> {
        let path = self.root.join(&mesh.file);
        if path.is_file() {
            return Ok((path, None));
        }
        if mesh.extension().as_deref() == Some("vtp") {
            let stl = path.with_extension("stl");
            if stl.is_file() {
                let substituted = format!("{}.stl", mesh.stem());
                warn!(requested = %mesh.file, %substituted, "VTP file not found, using STL");
                return Ok((
                    stl,
                    Some(ConversionWarning::GeometryFallback {
                        requested: mesh.file.clone(),
                        substituted,
                    }),
                ));
            }
            return Err(ConvertError::Geometry(format!(
                "neither VTP nor STL file exists for '{}'",
                path.display()
            )));
        }
        Err(ConvertError::Geometry(format!(
            "mesh file '{}' does not exist",
            path.display()
        )))
    }
}

impl GeometrySource for DirectoryGeometry {
    fn resolve(&mut self, mesh: &MeshRef) -> Result<ResolvedMesh> {
        let (from, fallback) = self.locate(mesh)?;
        let to = PathBuf::from(OUTPUT_GEOMETRY_DIR).join(format!("{}.stl", mesh.stem()));
        let extension = from
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let action = match extension.as_deref() {
            Some("stl") => MeshAction::Copy {
                from,
                to: to.clone(),
            },
            Some("vtp") => MeshAction::Transcode {
                from,
                to: to.clone(),
            },
            _ => {
                return Err(ConvertError::Geometry(format!(
                    "mesh file '{}' is neither VTP nor STL",
                    from.display()
                )));
            }
        };
        self.actions.push(action);
        Ok(ResolvedMesh {
            file: format!("{OUTPUT_GEOMETRY_DIR}/{}.stl", mesh.stem()),
            fallback,
        })
    }
}
