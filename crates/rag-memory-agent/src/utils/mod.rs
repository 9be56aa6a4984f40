pub mod error;
pub mod logger;

pub use error::{AgentError, Result};
pub use logger::{init_logger, LogFormat};
