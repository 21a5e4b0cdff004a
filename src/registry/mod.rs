// src/registry/mod.rs

//! Task records and the shared registry that owns them.

pub mod store;
pub mod task;

pub use store::TaskRegistry;
pub use task::{Task, TaskSnapshot};
