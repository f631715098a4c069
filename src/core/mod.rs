//! Core synthesis logic.

pub mod builder;
pub mod codegen;
pub mod executor;
pub mod graph;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod types;
