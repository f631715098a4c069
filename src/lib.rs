//! cfalbasg: CloudFront + ALB + Auto Scaling topology as code.
//!
//! Typed resource graph, deterministic logical IDs, CloudFormation synthesis.
//! BLAKE3 manifests and a provenance log guard the output against drift.

pub mod cli;
pub mod core;
pub mod engine;
pub mod error;
pub mod resources;
pub mod tripwire;
