//! Whole-program inlining of methods.
//!
//! The entry point is `inline_methods`, which inlines a set of candidate
//! methods into their callers across all method bodies of a program.
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::too_many_arguments)]

pub mod call_graph;
pub mod config;
pub mod error;
mod inline;
pub mod mir;
pub mod resolver;
pub mod shrink;
pub mod state;
pub mod stats;
pub mod summary;
pub mod visibility;


pub use crate::inline::{inline_methods, InlineResult, Inliner, MAX_REGISTERS};
pub use crate::state::State;
