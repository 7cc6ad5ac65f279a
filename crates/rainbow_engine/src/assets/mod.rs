//! Asset import

pub mod mesh_importer;

pub use mesh_importer::{ImportError, ImportedMesh, MeshImporter};
