pub mod board_io;
pub mod cache;
pub mod config_io;
pub mod gateway;
pub mod lock;
pub mod state;
pub mod sync;
