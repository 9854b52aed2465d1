pub mod errors;
pub mod events;
pub mod id;
pub mod types;

pub use errors::{ConfigError, FieldError, LoomError, StoreError};
pub use events::{ChatEvent, EventBus, UpdateTag};
pub use id::{new_correlation_id, new_id, SessionId};
pub use types::{ChatSummary, HistoryEntry, Role, UNNAMED_CHAT};

pub type Result<T> = std::result::Result<T, LoomError>;
