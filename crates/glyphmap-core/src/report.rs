//! Evaluation report: the read-only output handed to formatting layers.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::Serialize;

use crate::domain::DomainMap;
use crate::encoding::normalizer::ordinal;
use crate::errors::GlyphResult;
use crate::models::{Node, EXCLUDED_DOMAIN};
use crate::settings::ResolvedBinding;

/// Per-node view. A percept whose index was absent for this node has no key
/// in either map.
#[derive(Clone, Debug, Serialize)]
pub struct Entry<'a> {
    pub node: &'a Node,
    pub normalized: IndexMap<String, f64>,
    pub percept: IndexMap<String, f64>,
}

/// Aggregate of one percept's normalized values within a group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerceptStats {
    pub avg: f64,
    pub max: f64,
    pub p90: f64,
    pub valid: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Group {
    pub name: String,
    pub count: usize,
    /// Share of the non-excluded nodes, in percent.
    pub pct: f64,
    pub stats: IndexMap<String, PerceptStats>,
}

/// What drove each percept in this run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BindingSummary {
    pub percept: String,
    pub index: String,
    pub index_kind: &'static str,
    pub normalizer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

impl From<&ResolvedBinding> for BindingSummary {
    fn from(binding: &ResolvedBinding) -> Self {
        Self {
            percept: binding.key().to_string(),
            index: binding.index().name().to_string(),
            index_kind: binding.index().kind().label(),
            normalizer: binding.normalizer().name().to_string(),
            steps: binding.percept().steps(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Report<'a> {
    pub entries: Vec<Entry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Group>>,
    pub total: usize,
    pub excluded: usize,
    pub bindings: Vec<BindingSummary>,
}

impl<'a> Report<'a> {
    pub fn to_json(&self) -> GlyphResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> GlyphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn entry(&self, node_name: &str) -> Option<&Entry<'a>> {
        self.entries.iter().find(|e| e.node.name() == node_name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.as_ref()?.iter().find(|g| g.name == name)
    }

    /// Entries with a value for `percept`, highest normalized value first;
    /// ties go to the lexically smaller node name.
    pub fn top_entries(&self, percept: &str, limit: usize) -> Vec<&Entry<'a>> {
        let mut ranked: Vec<(&Entry<'a>, f64)> = self
            .entries
            .iter()
            .filter_map(|e| e.normalized.get(percept).map(|v| (e, *v)))
            .collect();
        ranked.sort_by(|(a, va), (b, vb)| {
            vb.partial_cmp(va)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node.name().cmp(b.node.name()))
        });
        ranked.into_iter().take(limit).map(|(e, _)| e).collect()
    }
}

fn percept_stats(values: &mut [f64]) -> Option<PerceptStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let valid = values.len();
    Some(PerceptStats {
        avg: values.iter().sum::<f64>() / valid as f64,
        max: values[valid - 1],
        p90: ordinal(values, 0.9),
        valid,
    })
}

/// Bucket entries by domain. Excluded nodes are only counted; the rest are
/// grouped and summarized per percept. Groups are ordered by size, largest
/// first, keeping first-seen order between equal sizes.
pub fn build_groups(
    entries: &[Entry<'_>],
    domains: &DomainMap,
    fallback: &str,
    percepts: &[&str],
) -> (Vec<Group>, usize) {
    let mut members: IndexMap<&str, Vec<&Entry<'_>>> = IndexMap::new();
    let mut excluded = 0usize;
    for entry in entries {
        let domain = domains
            .get(entry.node.name())
            .map(String::as_str)
            .unwrap_or(fallback);
        if domain == EXCLUDED_DOMAIN {
            excluded += 1;
            continue;
        }
        members.entry(domain).or_default().push(entry);
    }

    let classified = entries.len() - excluded;
    let mut groups: Vec<Group> = members
        .into_iter()
        .map(|(name, group_entries)| {
            let mut stats = IndexMap::new();
            for percept in percepts {
                let mut values: Vec<f64> = group_entries
                    .iter()
                    .filter_map(|e| e.normalized.get(*percept).copied())
                    .collect();
                if let Some(summary) = percept_stats(&mut values) {
                    stats.insert((*percept).to_string(), summary);
                }
            }
            Group {
                name: name.to_string(),
                count: group_entries.len(),
                pct: 100.0 * group_entries.len() as f64 / classified as f64,
                stats,
            }
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    (groups, excluded)
}
