//! Settings: user input, the preset merge, and the resolved configuration
//! an evaluation runs on.

pub mod document;
pub mod merge;
pub mod resolver;

use crate::domain::DomainRules;
use crate::encoding::binding::BindingDef;
use crate::encoding::index::IndexDef;
use crate::encoding::normalizer::NormalizerDef;
use crate::encoding::percept::PerceptDef;

pub use document::{BindingSpec, SettingsDocument};
pub use merge::{merge_bindings, MergedBindings};
pub use resolver::SettingsResolver;

/// Unresolved user configuration.
#[derive(Clone, Debug, Default)]
pub struct SettingsInput {
    /// Preset to start from.
    pub extends: Option<String>,
    pub bindings: Vec<BindingDef>,
    pub rules: DomainRules,
}

impl SettingsInput {
    pub fn extending(preset: impl Into<String>) -> Self {
        Self {
            extends: Some(preset.into()),
            ..Self::default()
        }
    }

    pub fn with_binding(mut self, binding: BindingDef) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_rules(mut self, rules: DomainRules) -> Self {
        self.rules = rules;
        self
    }
}

/// A binding with its effective normalizer attached.
#[derive(Clone, Debug)]
pub struct ResolvedBinding {
    binding: BindingDef,
    normalizer: NormalizerDef,
}

impl ResolvedBinding {
    pub fn new(binding: BindingDef, normalizer: NormalizerDef) -> Self {
        Self {
            binding,
            normalizer,
        }
    }

    pub fn key(&self) -> &str {
        self.binding.key()
    }

    pub fn binding(&self) -> &BindingDef {
        &self.binding
    }

    pub fn index(&self) -> &IndexDef {
        self.binding.index()
    }

    pub fn percept(&self) -> &PerceptDef {
        self.binding.percept()
    }

    pub fn normalizer(&self) -> &NormalizerDef {
        &self.normalizer
    }
}

/// Fully resolved evaluation configuration.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub bindings: Vec<ResolvedBinding>,
    pub rules: DomainRules,
}

impl Settings {
    pub fn binding(&self, percept: &str) -> Option<&ResolvedBinding> {
        self.bindings.iter().find(|b| b.key() == percept)
    }

    pub fn percept_names(&self) -> Vec<&str> {
        self.bindings.iter().map(ResolvedBinding::key).collect()
    }
}
