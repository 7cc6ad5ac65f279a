//! Bundled content checks

use std::path::PathBuf;

use rainbow_engine::assets::MeshImporter;
use rainbow_engine::core::RendererConfig;

fn content_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../resources/content")
}

#[test]
fn default_mesh_imports() {
    let config = RendererConfig::default().with_content_dir(content_dir());
    let mesh = MeshImporter::import(config.mesh_path()).unwrap();

    assert!(mesh.vertex_count() > 0);
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
    assert_eq!(mesh.to_static_vertices().len(), mesh.vertex_count());
}
