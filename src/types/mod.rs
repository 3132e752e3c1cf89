// Public modules
pub mod content_item;
pub mod message;
pub mod session_state;

// Re-exports
pub use content_item::{ContentItem, DataUri};
pub use message::{Message, Role};
pub use session_state::SessionState;
