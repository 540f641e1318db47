pub mod format;
pub mod service;

pub use format::Format;
pub use service::{AssistantService, EventDraft};
