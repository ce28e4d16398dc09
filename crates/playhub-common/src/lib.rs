pub mod errors;
pub mod id;

pub use errors::{ConfigError, PlayhubError};
pub use id::{new_correlation_id, new_id, RoomKey};

pub type Result<T> = std::result::Result<T, PlayhubError>;
