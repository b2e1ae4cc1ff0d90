pub mod config;
pub mod entity;
pub mod project;
pub mod task;
pub mod tree;

pub use config::*;
pub use entity::*;
pub use project::*;
pub use task::*;
