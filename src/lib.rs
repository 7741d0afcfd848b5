pub mod api;
pub mod config;
pub mod error;
pub mod quiz;
pub mod store;

pub use config::Config;
pub use error::{QuizError, Result};
pub use quiz::QuizServer;
