//! # Template Engine
//!
//! Parses `{{ ... }}` placeholders found in configuration and generated
//! artefact text, dispatches each by replace type, and formats the
//! result with the typing rules a caller composing HCL or YAML needs
//! (unquoted scalars, comma-joined lists, JSON-with-warning maps).

mod config_table;
mod engine;
mod output;
mod tag;

pub use engine::{TemplateContext, TemplateEngine};
pub use output::{OutputCache, OutputEntry, OutputMap};
pub use tag::{scan, Index, ReplaceType, Source, Tag};
