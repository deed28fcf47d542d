//! Glyphmap core library: turns per-symbol source metrics into visual
//! encoding parameters.
//!
//! The pipeline is declarative. An [`encoding::index::IndexDef`] extracts a
//! raw number from a [`models::Node`], a [`encoding::normalizer::NormalizerDef`]
//! maps the distribution of that number over the whole node set into `[0, 1]`,
//! and a [`encoding::percept::PerceptDef`] maps that into a visual range.
//! Bindings pair an index with a percept; settings extend a preset from the
//! [`encoding::catalog::Catalog`] and override it binding by binding.
//!
//! With the `python` feature the crate also builds the `_glyphmap_core`
//! extension module, a thin JSON-in/JSON-out surface over the built-in
//! catalog.

pub mod domain;
pub mod encoding;
pub mod errors;
pub mod evaluator;
pub mod models;
pub mod report;
pub mod settings;

#[cfg(feature = "python")]
mod python;

pub use domain::{DomainClassifier, DomainMap, DomainRule, DomainRules};
pub use encoding::binding::{BindingDef, NormalizerRef};
pub use encoding::catalog::{Catalog, CatalogBuilder, PresetDef};
pub use encoding::index::IndexDef;
pub use encoding::normalizer::NormalizerDef;
pub use encoding::percept::PerceptDef;
pub use errors::{GlyphError, GlyphResult};
pub use evaluator::{classify_json_impl, evaluate_json_impl, EvalOptions, Evaluator};
pub use models::{Node, Range};
pub use report::Report;
pub use settings::{Settings, SettingsDocument, SettingsInput, SettingsResolver};
