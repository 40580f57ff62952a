//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node action, built-in or user-written, implements [`ExecutableNode`].
//! The engine crate dispatches each step through this trait object.

pub mod error;
pub mod traits;
pub mod shape;
pub mod builtin;
pub mod catalog;
pub mod mock;

pub use error::NodeError;
pub use traits::{ExecutableNode, ExecutionContext, Payload};
pub use shape::PayloadShape;
pub use builtin::{from_fn, FnNode};
pub use catalog::NodeCatalog;
