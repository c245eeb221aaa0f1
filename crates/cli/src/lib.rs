//! Library side of the `hearth` binary: the composition root, shared by the
//! CLI commands and the end-to-end tests.

pub mod runtime;

pub use runtime::{Runtime, Stores};
