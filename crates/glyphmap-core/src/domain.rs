//! Pattern-based domain classification of nodes.
//!
//! Patterns are plain substrings: regex metacharacters are escaped before
//! compilation. Exclude patterns are checked first and send a node to the
//! reserved `_excluded` domain; otherwise the first domain rule with a
//! matching pattern wins, and unmatched nodes land in the fallback domain.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::GlyphResult;
use crate::models::{Node, DEFAULT_FALLBACK_DOMAIN, EXCLUDED_DOMAIN};

/// One user-declared domain bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainRule {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl DomainRule {
    pub fn new<I, S>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK_DOMAIN.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainRules {
    #[serde(default)]
    pub domains: Vec<DomainRule>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for DomainRules {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            exclude: Vec::new(),
            fallback: default_fallback(),
        }
    }
}

impl DomainRules {
    /// No domain or exclude rule: every node would land in the fallback.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.exclude.is_empty()
    }
}

/// Node identifier → domain name, in node order.
pub type DomainMap = IndexMap<String, String>;

/// Compiled form of [`DomainRules`].
#[derive(Clone, Debug)]
pub struct DomainClassifier {
    exclude: Vec<Regex>,
    domains: Vec<(String, Vec<Regex>)>,
    fallback: String,
}

fn literal(pattern: &str) -> GlyphResult<Regex> {
    Ok(Regex::new(&regex::escape(pattern))?)
}

fn hits(pattern: &Regex, node: &Node) -> bool {
    pattern.is_match(node.name())
        || pattern.is_match(node.file())
        || pattern.is_match(node.short_name())
}

impl DomainClassifier {
    pub fn new(rules: &DomainRules) -> GlyphResult<Self> {
        let exclude = rules
            .exclude
            .iter()
            .map(|p| literal(p))
            .collect::<GlyphResult<Vec<_>>>()?;
        let domains = rules
            .domains
            .iter()
            .map(|rule| {
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|p| literal(p))
                    .collect::<GlyphResult<Vec<_>>>()?;
                Ok((rule.name.clone(), patterns))
            })
            .collect::<GlyphResult<Vec<_>>>()?;
        Ok(Self {
            exclude,
            domains,
            fallback: rules.fallback.clone(),
        })
    }

    pub fn classify(&self, node: &Node) -> &str {
        if self.exclude.iter().any(|p| hits(p, node)) {
            return EXCLUDED_DOMAIN;
        }
        self.domains
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| hits(p, node)))
            .map(|(name, _)| name.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    pub fn build_domain_map(&self, nodes: &[Node]) -> DomainMap {
        nodes
            .iter()
            .map(|node| (node.name().to_string(), self.classify(node).to_string()))
            .collect()
    }
}

pub fn classify(node: &Node, rules: &DomainRules) -> GlyphResult<String> {
    Ok(DomainClassifier::new(rules)?.classify(node).to_string())
}

pub fn build_domain_map(nodes: &[Node], rules: &DomainRules) -> GlyphResult<DomainMap> {
    Ok(DomainClassifier::new(rules)?.build_domain_map(nodes))
}
