//! Persistent-store collaborator: the trait the coordinator consumes and
//! the bundled in-memory backend

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{
    AdminRecord, ClassRecord, ClassroomStore, SessionRecord, SharedStore, ToolbarRecord,
};
