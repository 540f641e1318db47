pub mod memory;
pub mod slug;

pub use memory::{FileMemoryStore, TokenStore};
pub use slug::slugify;
