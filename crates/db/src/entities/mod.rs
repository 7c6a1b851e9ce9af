//! Database entities.

pub mod actor;
pub mod delivery_task;
pub mod follow;
pub mod note;

pub use actor::Entity as Actor;
pub use delivery_task::Entity as DeliveryTask;
pub use follow::Entity as Follow;
pub use note::Entity as Note;
