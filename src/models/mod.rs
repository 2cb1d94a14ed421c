pub mod chat;
pub mod memory;
pub mod message;
pub mod user;

pub use chat::Chat;
pub use memory::{MemoryEntry, MemoryFilter, MemoryHit, MemoryMetadata};
pub use message::{Message, Role};
pub use user::User;
