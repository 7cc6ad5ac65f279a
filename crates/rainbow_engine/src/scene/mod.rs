//! Scene layer
//!
//! A [`World`] is a flat list of [`Actor`]s plus the mesh table they draw from.
//! Rendering a world yields one draw submission per valid actor.

pub mod actor;
pub mod camera;
pub mod world;

pub use actor::{Actor, ActorKind, MeshComponent, MeshDrawInfo, MeshSource};
pub use camera::Camera;
pub use world::{ActorId, World, WorldId};
