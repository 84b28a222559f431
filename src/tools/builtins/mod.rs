//! Built-in tool implementations.
//!
//! Each sub-module registers a family of tools on a caller-owned
//! [`ToolRegistry`](crate::tools::ToolRegistry).

pub mod activity;

pub use activity::{register_activity_tools, SharedTracker};
