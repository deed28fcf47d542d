//! Serialized settings: the JSON form users write, with bindings that name
//! catalog entries instead of carrying definitions.

use serde::{Deserialize, Serialize};

use crate::domain::{DomainRule, DomainRules};
use crate::encoding::binding::BindingDef;
use crate::encoding::catalog::Catalog;
use crate::errors::{GlyphError, GlyphResult};
use crate::settings::SettingsInput;

/// `{"index": "...", "percept": "...", "normalize"?: "..."}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingSpec {
    pub index: String,
    pub percept: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<String>,
}

impl BindingSpec {
    /// Look the index and percept up in the catalog. The normalizer name is
    /// kept as an override and checked at resolution.
    pub fn to_binding(&self, catalog: &Catalog) -> GlyphResult<BindingDef> {
        let index = catalog.index(&self.index).ok_or_else(|| {
            GlyphError::Resolution(format!(
                "unknown index `{}` (known: {})",
                self.index,
                catalog.index_names().join(", ")
            ))
        })?;
        let percept = catalog.percept(&self.percept).ok_or_else(|| {
            GlyphError::Resolution(format!(
                "unknown percept `{}` (known: {})",
                self.percept,
                catalog.percept_names().join(", ")
            ))
        })?;
        let binding = BindingDef::new(index.clone(), percept.clone());
        match &self.normalize {
            Some(name) => binding.with_normalizer(name.as_str()),
            None => Ok(binding),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
    #[serde(default)]
    pub domains: Vec<DomainRule>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl SettingsDocument {
    pub fn from_json(text: &str) -> GlyphResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn into_input(self, catalog: &Catalog) -> GlyphResult<SettingsInput> {
        let bindings = self
            .bindings
            .iter()
            .map(|spec| spec.to_binding(catalog))
            .collect::<GlyphResult<Vec<_>>>()?;
        let mut rules = DomainRules {
            domains: self.domains,
            exclude: self.exclude,
            ..DomainRules::default()
        };
        if let Some(fallback) = self.fallback {
            rules.fallback = fallback;
        }
        Ok(SettingsInput {
            extends: self.extends,
            bindings,
            rules,
        })
    }
}

/// Parse the bindings of a preset document. Anything other than
/// `{"bindings": [spec, ...]}` is malformed.
pub fn preset_document_bindings(
    name: &str,
    document: &serde_json::Value,
    catalog: &Catalog,
) -> GlyphResult<Vec<BindingDef>> {
    let malformed = |detail: String| {
        GlyphError::Resolution(format!(
            "preset `{name}` is malformed: {detail}; expected {{\"bindings\": [...]}}"
        ))
    };
    let items = document
        .get("bindings")
        .ok_or_else(|| malformed("missing `bindings`".to_string()))?
        .as_array()
        .ok_or_else(|| malformed("`bindings` is not a list".to_string()))?;
    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let spec: BindingSpec = serde_json::from_value(item.clone())
                .map_err(|e| malformed(format!("binding #{position}: {e}")))?;
            spec.to_binding(catalog)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_roundtrip_defaults() {
        let doc = SettingsDocument::from_json(r#"{"extends": "recommended"}"#).unwrap();
        assert_eq!(doc.extends.as_deref(), Some("recommended"));
        assert!(doc.bindings.is_empty());
        let input = doc.into_input(&Catalog::builtin().unwrap()).unwrap();
        assert_eq!(input.rules.fallback, "unknown");
        assert!(input.rules.is_empty());
    }

    #[test]
    fn test_document_bindings_resolve_through_catalog() {
        let doc = SettingsDocument::from_json(
            r#"{
                "bindings": [{"index": "cyclomatic", "percept": "size", "normalize": "rank"}],
                "domains": [{"name": "auth", "patterns": ["auth"]}],
                "exclude": ["test"],
                "fallback": "other"
            }"#,
        )
        .unwrap();
        let input = doc.into_input(&Catalog::builtin().unwrap()).unwrap();
        assert_eq!(input.bindings.len(), 1);
        assert_eq!(input.bindings[0].index().name(), "cyclomatic");
        assert_eq!(input.bindings[0].normalize().map(|n| n.label()), Some("rank"));
        assert_eq!(input.rules.fallback, "other");
        assert_eq!(input.rules.domains[0].patterns, vec!["auth".to_string()]);
    }

    #[test]
    fn test_unknown_index_or_percept() {
        let catalog = Catalog::builtin().unwrap();
        let spec = BindingSpec {
            index: "nope".to_string(),
            percept: "hue".to_string(),
            normalize: None,
        };
        let err = spec.to_binding(&catalog).unwrap_err();
        assert!(matches!(err, GlyphError::Resolution(_)));
        assert!(err.to_string().contains("churn"));

        let spec = BindingSpec {
            index: "lines".to_string(),
            percept: "glow".to_string(),
            normalize: None,
        };
        assert!(spec.to_binding(&catalog).is_err());
    }

    #[test]
    fn test_binding_spec_rejects_unknown_keys() {
        let result: Result<BindingSpec, _> =
            serde_json::from_value(json!({"index": "lines", "percept": "size", "weight": 2}));
        assert!(result.is_err());
    }

    #[test]
    fn test_preset_document_shapes() {
        let catalog = Catalog::builtin().unwrap();
        let ok = json!({"bindings": [{"index": "lines", "percept": "size"}]});
        assert_eq!(preset_document_bindings("p", &ok, &catalog).unwrap().len(), 1);

        for bad in [
            json!({"bindings": {"index": "lines"}}),
            json!({"items": []}),
            json!([{"index": "lines", "percept": "size"}]),
            json!({"bindings": [42]}),
        ] {
            let err = preset_document_bindings("p", &bad, &catalog).unwrap_err();
            assert!(err.to_string().contains("malformed"), "{bad}");
        }
    }
}
