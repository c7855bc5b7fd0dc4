pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod schedule;

pub use audit::*;
pub use config::Config;
pub use entity::*;
pub use error::*;
pub use schedule::*;
