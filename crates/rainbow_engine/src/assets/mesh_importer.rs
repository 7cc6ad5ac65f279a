//! Wavefront OBJ mesh import
//!
//! Faces are triangulated and every position/normal/uv triple is welded into a
//! single index stream, so the result maps straight onto one vertex buffer and
//! one index buffer. All models of a file are merged into one mesh.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::render::vertex::StaticVertex;

/// Errors raised while importing a mesh
#[derive(Error, Debug)]
pub enum ImportError {
    /// The file could not be opened or parsed
    #[error("Failed to load {path}: {source}")]
    Load {
        /// File being imported
        path: PathBuf,
        /// Parser error
        #[source]
        source: tobj::LoadError,
    },

    /// The file parsed but holds no triangles
    #[error("No triangles in {0}")]
    Empty(String),
}

/// Flat attribute arrays of an imported mesh
///
/// `normals`, `uvs` and `colors` are either empty or hold one entry per
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals
    pub normals: Vec<[f32; 3]>,
    /// First texture coordinate set
    pub uvs: Vec<[f32; 2]>,
    /// Vertex colours
    pub colors: Vec<[f32; 3]>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

impl ImportedMesh {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Pack the attribute arrays into vertices
    ///
    /// Missing normals default to +Y, missing uvs to zero and missing colours
    /// to white.
    pub fn to_static_vertices(&self) -> Vec<StaticVertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                StaticVertex::new(
                    position,
                    self.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                    self.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
                    self.colors.get(i).copied().unwrap_or([1.0, 1.0, 1.0]),
                )
            })
            .collect()
    }

    fn append(&mut self, mesh: &tobj::Mesh) {
        let base = self.positions.len() as u32;
        let count = mesh.positions.len() / 3;

        self.positions.extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        append_attribute(&mut self.normals, base as usize, count, &mesh.normals, [0.0, 1.0, 0.0]);
        append_attribute(&mut self.uvs, base as usize, count, &mesh.texcoords, [0.0, 0.0]);
        append_attribute(
            &mut self.colors,
            base as usize,
            count,
            &mesh.vertex_color,
            [1.0, 1.0, 1.0],
        );
        self.indices.extend(mesh.indices.iter().map(|&index| base + index));
    }
}

/// Extend `target` by `count` entries read from the flat `source` array
///
/// Keeps `target` either empty or the same length as the positions: when one
/// model has an attribute and another does not, the gaps take `fallback`.
fn append_attribute<const N: usize>(
    target: &mut Vec<[f32; N]>,
    existing: usize,
    count: usize,
    source: &[f32],
    fallback: [f32; N],
) {
    let has_source = source.len() >= count * N && count > 0;
    if !has_source && target.is_empty() {
        return;
    }
    if target.is_empty() {
        target.resize(existing, fallback);
    }
    if has_source {
        target.extend(source.chunks_exact(N).take(count).map(|chunk| {
            let mut value = [0.0; N];
            value.copy_from_slice(chunk);
            value
        }));
    } else {
        target.resize(existing + count, fallback);
    }
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// OBJ importer
pub struct MeshImporter;

impl MeshImporter {
    /// Import the OBJ file at `path`
    pub fn import<P: AsRef<Path>>(path: P) -> Result<ImportedMesh, ImportError> {
        let path = path.as_ref();
        let (models, _materials) =
            tobj::load_obj(path, &load_options()).map_err(|source| ImportError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        let mesh = Self::merge(&models, &path.display().to_string())?;
        log::info!(
            "Imported {}: {} vertices, {} triangles",
            path.display(),
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    /// Import OBJ text from a reader; material libraries are ignored
    pub fn import_from_reader<R: BufRead>(reader: &mut R) -> Result<ImportedMesh, ImportError> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &load_options(), |_| Ok(Default::default())).map_err(
                |source| ImportError::Load {
                    path: PathBuf::from("<reader>"),
                    source,
                },
            )?;

        Self::merge(&models, "<reader>")
    }

    fn merge(models: &[tobj::Model], name: &str) -> Result<ImportedMesh, ImportError> {
        let mut merged = ImportedMesh::default();
        for model in models {
            log::debug!("Model '{}': {} indices", model.name, model.mesh.indices.len());
            merged.append(&model.mesh);
        }

        if merged.indices.is_empty() {
            return Err(ImportError::Empty(name.to_string()));
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const QUAD: &str = "\
o Quad
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 1.0 1.0 0.0
v -1.0 1.0 0.0
vn 0.0 0.0 1.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_is_triangulated() {
        let mesh = MeshImporter::import_from_reader(&mut Cursor::new(QUAD)).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn test_vertices_carry_imported_attributes() {
        let mesh = MeshImporter::import_from_reader(&mut Cursor::new(QUAD)).unwrap();
        let vertices = mesh.to_static_vertices();
        assert_eq!(vertices.len(), 4);
        for vertex in &vertices {
            assert_relative_eq!(vertex.normal[2], 1.0);
            assert_eq!(vertex.color, [1.0, 1.0, 1.0]);
        }
        let corners: Vec<[f32; 2]> = vertices.iter().map(|v| v.uv0).collect();
        assert!(corners.contains(&[1.0, 1.0]));
    }

    #[test]
    fn test_two_models_are_merged_with_offset_indices() {
        let obj = "\
o A
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o B
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
";
        let mesh = MeshImporter::import_from_reader(&mut Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(*mesh.indices.iter().max().unwrap(), 5);
        assert!(mesh.normals.is_empty());
    }

    #[test]
    fn test_file_without_faces_is_empty() {
        let obj = "v 0 0 0\nv 1 0 0\n";
        let result = MeshImporter::import_from_reader(&mut Cursor::new(obj));
        assert!(matches!(result, Err(ImportError::Empty(_))));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = MeshImporter::import("does/not/exist.obj");
        match result {
            Err(ImportError::Load { path, .. }) => {
                assert_eq!(path, PathBuf::from("does/not/exist.obj"))
            }
            other => panic!("expected load error, got {:?}", other),
        }
    }
}
