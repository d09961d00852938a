//! Tri-state approval of every package in the graph.
//!
//! [`rules`] holds the rule tables applied to a single package; [`engine`]
//! walks the graph so each package is judged after its dependencies.

pub mod engine;
pub mod rules;

pub use engine::{evaluate, Verdicts};
