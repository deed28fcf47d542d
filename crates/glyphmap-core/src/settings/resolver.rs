//! Settings resolution: preset lookup, merge, uniqueness, and normalizer
//! binding.
//!
//! An unknown `extends` name resolves to no preset bindings and only logs a
//! warning. A preset that exists but is not a bindings list, a repeated
//! percept, or an unknown normalizer name all stop resolution.

use tracing::{debug, warn};

use crate::encoding::binding::{BindingDef, NormalizerRef};
use crate::encoding::catalog::{Catalog, PresetDef};
use crate::encoding::normalizer::NormalizerDef;
use crate::errors::{GlyphError, GlyphResult};
use crate::settings::document::{preset_document_bindings, SettingsDocument};
use crate::settings::merge::merge_bindings;
use crate::settings::{ResolvedBinding, Settings, SettingsInput};

pub struct SettingsResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, input: SettingsInput) -> GlyphResult<Settings> {
        let preset = self.preset_bindings(input.extends.as_deref())?;
        let merged = merge_bindings(preset, input.bindings)?;
        let bindings = merged
            .bindings
            .into_iter()
            .map(|binding| {
                let normalizer = self.resolve_normalizer(&binding)?;
                debug!(
                    percept = binding.key(),
                    index = binding.index().name(),
                    normalizer = normalizer.name(),
                    "resolved binding"
                );
                Ok(ResolvedBinding::new(binding, normalizer))
            })
            .collect::<GlyphResult<Vec<_>>>()?;
        Ok(Settings {
            bindings,
            rules: input.rules,
        })
    }

    pub fn resolve_document(&self, document: SettingsDocument) -> GlyphResult<Settings> {
        self.resolve(document.into_input(self.catalog)?)
    }

    pub fn resolve_json(&self, text: &str) -> GlyphResult<Settings> {
        self.resolve_document(SettingsDocument::from_json(text)?)
    }

    /// Bindings of the preset named by `extends`; empty when none is named
    /// or the name is unknown.
    pub fn preset_bindings(&self, extends: Option<&str>) -> GlyphResult<Vec<BindingDef>> {
        let Some(name) = extends else {
            return Ok(Vec::new());
        };
        match self.catalog.preset(name) {
            None => {
                warn!(
                    preset = name,
                    known = %self.catalog.preset_names().join(", "),
                    "unknown preset; extending nothing"
                );
                Ok(Vec::new())
            }
            Some(PresetDef::Bindings(bindings)) => Ok(bindings.clone()),
            Some(PresetDef::Document(document)) => {
                preset_document_bindings(name, document, self.catalog)
            }
        }
    }

    /// Binding override first, then the index default.
    pub fn resolve_normalizer(&self, binding: &BindingDef) -> GlyphResult<NormalizerDef> {
        match binding.normalize() {
            Some(NormalizerRef::Def(def)) => Ok(def.clone()),
            Some(NormalizerRef::Named(name)) => self.lookup_normalizer(name, binding),
            None => self.lookup_normalizer(binding.index().default_normalizer(), binding),
        }
    }

    fn lookup_normalizer(&self, name: &str, binding: &BindingDef) -> GlyphResult<NormalizerDef> {
        self.catalog.normalizer(name).cloned().ok_or_else(|| {
            GlyphError::Resolution(format!(
                "binding `{}`: unknown normalizer `{name}` (known: {})",
                binding.key(),
                self.catalog.normalizer_names().join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::DomainRule;
    use crate::encoding::catalog::CatalogBuilder;
    use crate::encoding::index::IndexDef;
    use crate::encoding::percept::PerceptDef;

    fn catalog() -> Catalog {
        Catalog::builtin().unwrap()
    }

    fn keyed(settings: &Settings) -> Vec<(&str, &str, &str)> {
        settings
            .bindings
            .iter()
            .map(|b| (b.key(), b.index().name(), b.normalizer().name()))
            .collect()
    }

    #[test]
    fn test_extends_recommended() {
        let catalog = catalog();
        let settings = SettingsResolver::new(&catalog)
            .resolve(SettingsInput::extending("recommended"))
            .unwrap();
        assert_eq!(
            keyed(&settings),
            vec![
                ("hue", "churn", "percentile"),
                ("size", "lines", "percentile"),
                ("border", "params", "rank"),
                ("opacity", "depth", "rank"),
                ("clarity", "coverage", "minmax"),
            ]
        );
        assert_eq!(settings.rules.fallback, "unknown");
        assert!(settings.rules.domains.is_empty());
        assert!(settings.rules.exclude.is_empty());
    }

    #[test]
    fn test_unknown_preset_is_soft() {
        let catalog = catalog();
        let resolver = SettingsResolver::new(&catalog);
        let settings = resolver.resolve(SettingsInput::extending("no-such-preset")).unwrap();
        assert!(settings.bindings.is_empty());

        let lines = catalog.index("lines").unwrap().clone();
        let size = catalog.percept("size").unwrap().clone();
        let settings = resolver
            .resolve(SettingsInput::extending("no-such-preset").with_binding(BindingDef::new(lines, size)))
            .unwrap();
        assert_eq!(settings.percept_names(), vec!["size"]);
    }

    #[test]
    fn test_malformed_preset_is_fatal() {
        let catalog = CatalogBuilder::new()
            .preset("broken", PresetDef::Document(json!({"bindings": "churn->hue"})))
            .unwrap()
            .build();
        let err = SettingsResolver::new(&catalog)
            .resolve(SettingsInput::extending("broken"))
            .unwrap_err();
        assert!(matches!(err, GlyphError::Resolution(_)));
    }

    #[test]
    fn test_document_preset_resolves() {
        let catalog = catalog();
        let settings = SettingsResolver::new(&catalog)
            .resolve_json(r#"{"extends": "complexity"}"#)
            .unwrap();
        assert_eq!(
            settings.percept_names(),
            vec!["hue", "size", "border", "opacity"]
        );
        assert_eq!(settings.binding("size").unwrap().index().name(), "span");
    }

    #[test]
    fn test_user_override_replaces_in_place() {
        let catalog = catalog();
        let settings = SettingsResolver::new(&catalog)
            .resolve_json(
                r#"{
                    "extends": "recommended",
                    "bindings": [
                        {"index": "exported_score", "percept": "saturation"},
                        {"index": "cyclomatic", "percept": "size", "normalize": "log"}
                    ]
                }"#,
            )
            .unwrap();
        assert_eq!(
            keyed(&settings),
            vec![
                ("hue", "churn", "percentile"),
                ("size", "cyclomatic", "log"),
                ("border", "params", "rank"),
                ("opacity", "depth", "rank"),
                ("clarity", "coverage", "minmax"),
                ("saturation", "exported_score", "minmax"),
            ]
        );
    }

    #[test]
    fn test_duplicate_percept_is_fatal() {
        let catalog = catalog();
        let err = SettingsResolver::new(&catalog)
            .resolve_json(
                r#"{"bindings": [
                    {"index": "lines", "percept": "size"},
                    {"index": "depth", "percept": "size"}
                ]}"#,
            )
            .unwrap_err();
        assert!(matches!(err, GlyphError::Resolution(_)));
    }

    #[test]
    fn test_unknown_normalizer_lists_known_names() {
        let catalog = catalog();
        let err = SettingsResolver::new(&catalog)
            .resolve_json(
                r#"{"bindings": [{"index": "lines", "percept": "size", "normalize": "zscore"}]}"#,
            )
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("zscore"));
        assert!(message.contains("percentile, rank, minmax, log"));
    }

    #[test]
    fn test_unknown_index_default_normalizer_is_fatal() {
        let catalog = catalog();
        let odd = IndexDef::source("odd", "lines", "sigmoid").unwrap();
        let size = PerceptDef::continuous("size", 0.0, 1.0).unwrap();
        let input = SettingsInput::default().with_binding(BindingDef::new(odd, size));
        assert!(SettingsResolver::new(&catalog).resolve(input).is_err());
    }

    #[test]
    fn test_normalizer_object_used_directly() {
        let catalog = catalog();
        let lines = catalog.index("lines").unwrap().clone();
        let size = catalog.percept("size").unwrap().clone();
        let custom = NormalizerDef::custom("halves", |_: &[f64]| {
            Box::new(|raw: f64| raw / 2.0) as crate::encoding::normalizer::QueryFn
        })
        .unwrap();
        let binding = BindingDef::new(lines, size).with_normalizer(custom).unwrap();
        let settings = SettingsResolver::new(&catalog)
            .resolve(SettingsInput::default().with_binding(binding))
            .unwrap();
        assert_eq!(settings.bindings[0].normalizer().name(), "halves");
    }

    #[test]
    fn test_rules_pass_through() {
        let catalog = catalog();
        let rules = crate::domain::DomainRules {
            domains: vec![DomainRule::new("auth", ["auth"])],
            exclude: vec!["index".to_string()],
            fallback: "misc".to_string(),
        };
        let settings = SettingsResolver::new(&catalog)
            .resolve(SettingsInput::default().with_rules(rules.clone()))
            .unwrap();
        assert_eq!(settings.rules, rules);
    }
}
