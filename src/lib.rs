//! # infralib-agent
//!
//! A tick-based agent that reconciles a declared set of infrastructure
//! steps against upstream module releases: resolves which version each
//! module should be at, materializes Terraform or Argo CD artefacts for
//! it, and drives the resulting change through a build/approve/apply
//! pipeline.

pub mod agent;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod materializer;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod resolver;
pub mod runtime;
pub mod template;
