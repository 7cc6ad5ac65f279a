//! Flat actor collection and the meshes they draw from

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::math::{rotation_from_degrees, Mat4, Quat, Transform, Vec3};
use crate::render::backends::vulkan::resources::{MeshKey, ResourceTable, VertexBuffer};
use crate::render::backends::vulkan::{CommandList, DrawSubmission};
use crate::render::RenderError;
use crate::scene::actor::{Actor, ActorKind, MeshSource};
use crate::scene::camera::Camera;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique world identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index of an actor within its world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(usize);

/// Actors, the GPU meshes they reference and the camera they are seen through
pub struct World {
    id: WorldId,
    actors: Vec<Actor>,
    meshes: ResourceTable<MeshKey, VertexBuffer>,
    /// Viewpoint used for rendering
    pub camera: Camera,
}

impl World {
    /// Create an empty world
    pub fn new() -> Self {
        let id = WorldId::next();
        log::debug!("Created world {:?}", id);
        Self {
            id,
            actors: Vec::new(),
            meshes: ResourceTable::new(),
            camera: Camera::default(),
        }
    }

    /// Identifier of this world
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Add an actor and return its id
    pub fn spawn(
        &mut self,
        kind: ActorKind,
        location: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> ActorId {
        let mut actor = Actor::new(kind, Transform::new(location, rotation, scale));
        actor.set_world(self.id);
        self.actors.push(actor);
        ActorId(self.actors.len() - 1)
    }

    /// Actor by id
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id.0)
    }

    /// Mutable actor by id
    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(id.0)
    }

    /// Number of actors
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Uploaded meshes
    pub fn meshes(&self) -> &ResourceTable<MeshKey, VertexBuffer> {
        &self.meshes
    }

    /// Populate the default scene: one mesh actor at the origin
    ///
    /// A mesh that fails to import is logged and leaves the actor invalid;
    /// GPU failures are returned.
    pub fn load_world(
        &mut self,
        command_list: &CommandList,
        content_dir: &Path,
        mesh_file: &str,
    ) -> Result<ActorId, RenderError> {
        let id = self.spawn(
            ActorKind::mesh(),
            Vec3::zeros(),
            rotation_from_degrees(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        );
        let path = content_dir.join(mesh_file);

        let actor = &mut self.actors[id.0];
        match actor.load(&path, command_list, &mut self.meshes) {
            Ok(()) => log::info!("Loaded {}", path.display()),
            Err(RenderError::Import(e)) => log::error!("Mesh import failed: {}", e),
            Err(e) => return Err(e),
        }

        Ok(id)
    }

    /// Draw submissions for every valid actor
    pub fn render(&self) -> Vec<DrawSubmission> {
        self.collect_draws(&self.meshes)
    }

    /// Draw submissions for every actor valid against `meshes`
    pub fn collect_draws(&self, meshes: &impl MeshSource) -> Vec<DrawSubmission> {
        self.actors
            .iter()
            .filter_map(|actor| {
                actor.draw_info(meshes).map(|info| DrawSubmission {
                    vertex_buffer: info.vertex_buffer,
                    index_buffer: info.index_buffer,
                    index_count: info.index_count,
                    transform: actor.transform.model_matrix(),
                })
            })
            .collect()
    }

    /// Camera view-projection for a viewport of the given aspect ratio
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.camera.view_projection(aspect)
    }

    /// Remove every actor and destroy every mesh
    pub fn clear(&mut self) {
        log::debug!(
            "Clearing world {:?}: {} actors, {} meshes",
            self.id,
            self.actors.len(),
            self.meshes.len()
        );
        self.actors.clear();
        self.meshes.clear();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::actor::tests::FakeMeshes;
    use approx::assert_relative_eq;

    #[test]
    fn test_worlds_get_distinct_ids() {
        assert_ne!(World::new().id(), World::new().id());
    }

    #[test]
    fn test_spawn_sets_transform_and_world() {
        let mut world = World::new();
        let id = world.spawn(
            ActorKind::Empty,
            Vec3::new(1.0, 2.0, 3.0),
            Quat::identity(),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let actor = world.actor(id).unwrap();
        assert_eq!(actor.world(), Some(world.id()));
        assert_relative_eq!(actor.transform.location, Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(actor.transform.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_only_valid_actors_are_drawn() {
        let mut meshes = FakeMeshes::default();
        let key = meshes.add(10, 6);

        let mut world = World::new();
        let unit = Vec3::new(1.0, 1.0, 1.0);
        world.spawn(ActorKind::Empty, Vec3::zeros(), Quat::identity(), unit);
        world.spawn(ActorKind::mesh(), Vec3::zeros(), Quat::identity(), unit);
        let above = Vec3::new(0.0, 1.0, 0.0);
        let drawn = world.spawn(ActorKind::mesh(), above, Quat::identity(), unit);
        world.actor_mut(drawn).unwrap().set_mesh(key);

        let draws = world.collect_draws(&meshes);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 6);
        assert_relative_eq!(draws[0].transform, Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut world = World::new();
        world.spawn(ActorKind::mesh(), Vec3::zeros(), Quat::identity(), Vec3::new(1.0, 1.0, 1.0));
        world.clear();
        assert_eq!(world.actor_count(), 0);
        assert!(world.meshes().is_empty());
        assert!(world.render().is_empty());
    }
}
