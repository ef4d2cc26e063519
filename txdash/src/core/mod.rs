pub mod config;
pub mod error;
pub mod state;

pub mod prelude {
    pub use super::{
        config::{Config, ConfigError, DatabaseLocation},
        error::AppError,
        state::AppState,
    };
}
