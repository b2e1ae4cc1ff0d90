pub mod aggregate;
pub mod check;
pub mod clipboard;
pub mod refnum;
pub mod schedule;
pub mod search;
pub mod tree_ops;
pub mod undo;
