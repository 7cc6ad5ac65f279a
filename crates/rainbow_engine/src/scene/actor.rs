//! Actors: placed things in a world
//!
//! An actor is a transform plus an [`ActorKind`]. Whether it can be drawn is
//! never stored; it is derived from its kind and the mesh table it is checked
//! against.

use std::path::Path;

use ash::vk;

use crate::assets::MeshImporter;
use crate::foundation::math::Transform;
use crate::render::backends::vulkan::resources::{MeshKey, ResourceTable, VertexBuffer};
use crate::render::backends::vulkan::CommandList;
use crate::render::RenderError;
use crate::scene::world::WorldId;

/// Buffers and size of one drawable mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDrawInfo {
    /// Vertex buffer handle
    pub vertex_buffer: vk::Buffer,
    /// `u32` index buffer handle
    pub index_buffer: vk::Buffer,
    /// Number of indices
    pub index_count: u32,
}

/// Anything mesh keys can be resolved against
pub trait MeshSource {
    /// Draw information for `key`, if the key still resolves
    fn draw_info(&self, key: MeshKey) -> Option<MeshDrawInfo>;
}

impl MeshSource for ResourceTable<MeshKey, VertexBuffer> {
    fn draw_info(&self, key: MeshKey) -> Option<MeshDrawInfo> {
        self.get(key).map(|mesh| MeshDrawInfo {
            vertex_buffer: mesh.vertex_buffer(),
            index_buffer: mesh.index_buffer(),
            index_count: mesh.index_count(),
        })
    }
}

/// Mesh slot of a mesh actor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshComponent {
    mesh: Option<MeshKey>,
}

impl MeshComponent {
    /// Key of the loaded mesh, if any
    pub fn mesh(&self) -> Option<MeshKey> {
        self.mesh
    }
}

/// What an actor is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorKind {
    /// Placeholder with a transform only; never drawn
    Empty,
    /// Drawn from an uploaded mesh
    Mesh(MeshComponent),
}

impl ActorKind {
    /// Mesh actor with no mesh loaded yet
    pub fn mesh() -> Self {
        Self::Mesh(MeshComponent::default())
    }
}

/// Placed object of a world
#[derive(Debug, Clone)]
pub struct Actor {
    /// Location, rotation and scale
    pub transform: Transform,
    kind: ActorKind,
    world: Option<WorldId>,
}

impl Actor {
    pub(crate) fn new(kind: ActorKind, transform: Transform) -> Self {
        Self {
            transform,
            kind,
            world: None,
        }
    }

    /// Kind of the actor
    pub fn kind(&self) -> &ActorKind {
        &self.kind
    }

    /// World the actor belongs to
    pub fn world(&self) -> Option<WorldId> {
        self.world
    }

    pub(crate) fn set_world(&mut self, world: WorldId) {
        self.world = Some(world);
    }

    /// Mesh key of a mesh actor
    pub fn mesh(&self) -> Option<MeshKey> {
        match &self.kind {
            ActorKind::Empty => None,
            ActorKind::Mesh(component) => component.mesh,
        }
    }

    /// Whether the actor can be drawn from `meshes`
    ///
    /// Empty actors never are. Mesh actors are when their key resolves to a
    /// mesh with a live vertex buffer.
    pub fn is_valid(&self, meshes: &impl MeshSource) -> bool {
        self.draw_info(meshes).is_some()
    }

    /// Draw information when the actor is valid
    pub fn draw_info(&self, meshes: &impl MeshSource) -> Option<MeshDrawInfo> {
        self.mesh()
            .and_then(|key| meshes.draw_info(key))
            .filter(|info| info.vertex_buffer != vk::Buffer::null())
    }

    /// Import the mesh at `path`, upload it and attach it to this actor
    ///
    /// The actor keeps its previous mesh, if any, unless every step succeeds.
    pub fn load(
        &mut self,
        path: &Path,
        command_list: &CommandList,
        meshes: &mut ResourceTable<MeshKey, VertexBuffer>,
    ) -> Result<(), RenderError> {
        if matches!(self.kind, ActorKind::Empty) {
            return Err(RenderError::Scene(format!(
                "Cannot load {} into an empty actor",
                path.display()
            )));
        }

        let imported = MeshImporter::import(path)?;
        let vertices = imported.to_static_vertices();
        let vertex_buffer = command_list.create_vertex_buffer(&vertices, &imported.indices)?;
        let key = meshes.insert(vertex_buffer);

        if let Some(previous) = self.set_mesh(key) {
            meshes.remove(previous);
        }
        Ok(())
    }

    /// Attach `key`, returning the key it replaced
    pub(crate) fn set_mesh(&mut self, key: MeshKey) -> Option<MeshKey> {
        match &mut self.kind {
            ActorKind::Empty => None,
            ActorKind::Mesh(component) => component.mesh.replace(key),
        }
    }
}
