//! Bindings: one index driving one percept.

use crate::encoding::index::IndexDef;
use crate::encoding::normalizer::NormalizerDef;
use crate::encoding::percept::PerceptDef;
use crate::errors::{GlyphError, GlyphResult};

/// A binding-level normalizer override: a catalog name or a definition used
/// as is.
#[derive(Clone, Debug)]
pub enum NormalizerRef {
    Named(String),
    Def(NormalizerDef),
}

impl NormalizerRef {
    pub fn label(&self) -> &str {
        match self {
            NormalizerRef::Named(name) => name,
            NormalizerRef::Def(def) => def.name(),
        }
    }
}

impl From<&str> for NormalizerRef {
    fn from(name: &str) -> Self {
        NormalizerRef::Named(name.to_string())
    }
}

impl From<String> for NormalizerRef {
    fn from(name: String) -> Self {
        NormalizerRef::Named(name)
    }
}

impl From<NormalizerDef> for NormalizerRef {
    fn from(def: NormalizerDef) -> Self {
        NormalizerRef::Def(def)
    }
}

/// Loose ingredient of a binding, for callers assembling one from a list.
#[derive(Clone, Debug)]
pub enum BindingPart {
    Index(IndexDef),
    Percept(PerceptDef),
    Normalize(NormalizerRef),
}

/// Pairing of one index and one percept, keyed by the percept name.
#[derive(Clone, Debug)]
pub struct BindingDef {
    index: IndexDef,
    percept: PerceptDef,
    normalize: Option<NormalizerRef>,
}

fn check_override(normalize: &NormalizerRef) -> GlyphResult<()> {
    if let NormalizerRef::Named(name) = normalize {
        if name.trim().is_empty() {
            return Err(GlyphError::Construction(
                "binding normalizer override must not be an empty name".to_string(),
            ));
        }
    }
    Ok(())
}

impl BindingDef {
    pub fn new(index: IndexDef, percept: PerceptDef) -> Self {
        Self {
            index,
            percept,
            normalize: None,
        }
    }

    /// Replace the index's default normalizer for this binding only.
    pub fn with_normalizer(mut self, normalize: impl Into<NormalizerRef>) -> GlyphResult<Self> {
        let normalize = normalize.into();
        check_override(&normalize)?;
        self.normalize = Some(normalize);
        Ok(self)
    }

    /// Assemble a binding from loose parts: exactly one index, exactly one
    /// percept and at most one normalizer override.
    pub fn from_parts(parts: impl IntoIterator<Item = BindingPart>) -> GlyphResult<Self> {
        let mut indexes = Vec::new();
        let mut percepts = Vec::new();
        let mut overrides = Vec::new();
        for part in parts {
            match part {
                BindingPart::Index(index) => indexes.push(index),
                BindingPart::Percept(percept) => percepts.push(percept),
                BindingPart::Normalize(normalize) => overrides.push(normalize),
            }
        }
        if indexes.len() != 1 {
            return Err(GlyphError::Construction(format!(
                "binding needs exactly one index, got {}",
                indexes.len()
            )));
        }
        if percepts.len() != 1 {
            return Err(GlyphError::Construction(format!(
                "binding needs exactly one percept, got {}",
                percepts.len()
            )));
        }
        if overrides.len() > 1 {
            return Err(GlyphError::Construction(format!(
                "binding takes at most one normalizer override, got {}",
                overrides.len()
            )));
        }
        let binding = Self::new(indexes.remove(0), percepts.remove(0));
        match overrides.pop() {
            Some(normalize) => binding.with_normalizer(normalize),
            None => Ok(binding),
        }
    }

    /// Merge key: the percept name.
    pub fn key(&self) -> &str {
        self.percept.name()
    }

    pub fn index(&self) -> &IndexDef {
        &self.index
    }

    pub fn percept(&self) -> &PerceptDef {
        &self.percept
    }

    pub fn normalize(&self) -> Option<&NormalizerRef> {
        self.normalize.as_ref()
    }
}
