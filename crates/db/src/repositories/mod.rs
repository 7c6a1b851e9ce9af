//! Repository layer.
//!
//! Each repository holds a shared connection for standalone reads and writes.
//! Methods that take a `conn` argument run on whatever connection or
//! transaction the caller passes, so they can join a larger atomic unit.

mod actor;
mod delivery_task;
mod follow;
mod note;

pub use actor::ActorRepository;
pub use delivery_task::DeliveryTaskRepository;
pub use follow::FollowRepository;
pub use note::NoteRepository;
