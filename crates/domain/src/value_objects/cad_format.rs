//! CAD file format classification.
//!
//! Uploaded files are classified by extension only; the conversion service
//! rejects files whose content doesn't match, so sniffing bytes here would
//! duplicate its job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Solid-body (boundary representation) extensions that require conversion
/// before they can be rendered in a browser viewer.
const BREP_EXTENSIONS: [&str; 10] = [
    "step", "stp", "sldprt", "sldasm", "iges", "igs", "x_t", "x_b", "sat", "prt",
];

/// Mesh formats that are directly renderable.
const MESH_EXTENSIONS: [&str; 6] = ["stl", "obj", "glb", "gltf", "3mf", "ply"];

/// Coarse classification of an uploaded CAD file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadFormat {
    /// Solid-body CAD (STEP, SolidWorks, IGES, Parasolid...). Needs conversion.
    Brep,
    /// Already a renderable mesh (STL, GLB...).
    Mesh,
    /// Anything else (drawings, PDFs, zip bundles).
    Other,
}

impl CadFormat {
    /// Classify a file by its name alone.
    pub fn from_filename(filename: &str) -> Self {
        if filename.rfind('.').is_none() {
            return Self::Other;
        }
        let ext = filename
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if BREP_EXTENSIONS.contains(&ext.as_str()) {
            Self::Brep
        } else if MESH_EXTENSIONS.contains(&ext.as_str()) {
            Self::Mesh
        } else {
            Self::Other
        }
    }

    /// Only solid-body files go through the conversion pipeline.
    pub fn needs_conversion(self) -> bool {
        matches!(self, Self::Brep)
    }
}

impl fmt::Display for CadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Brep => write!(f, "brep"),
            Self::Mesh => write!(f, "mesh"),
            Self::Other => write!(f, "other"),
        }
    }
}
