//! Batch evaluation of resolved settings over a node set.
//!
//! Each binding is an independent column: collect the defined raw values,
//! fit its normalizer once, then resolve every node again and map through
//! normalizer and percept. Columns share nothing, so they can be computed on
//! the rayon pool; the entries are assembled afterwards in node order.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{build_domain_map, DomainClassifier, DomainMap};
use crate::encoding::catalog::Catalog;
use crate::errors::GlyphResult;
use crate::models::Node;
use crate::report::{build_groups, BindingSummary, Entry, Report};
use crate::settings::{ResolvedBinding, Settings, SettingsDocument, SettingsResolver};

/// `(normalized, percept value)` per node position; `None` when absent.
type Column = Vec<Option<(f64, f64)>>;

/// `GLYPHMAP_PARALLEL` value: on when unset or anything but `0|false|no|off`.
fn parse_parallel(raw: Option<&str>) -> bool {
    match raw {
        Some(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        None => true,
    }
}

/// `GLYPHMAP_WORKERS` value: a positive integer, otherwise rayon's default.
fn parse_workers(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|val| val.trim().parse::<usize>().ok())
        .filter(|workers| *workers > 0)
}

/// Runtime knobs for an evaluation. The default is sequential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalOptions {
    pub parallel: bool,
    /// Pool size when parallel; `None` lets rayon decide.
    pub workers: Option<usize>,
}

impl EvalOptions {
    /// Read `GLYPHMAP_PARALLEL` (on unless `0|false|no|off`) and
    /// `GLYPHMAP_WORKERS`.
    pub fn from_env() -> Self {
        let parallel = std::env::var("GLYPHMAP_PARALLEL").ok();
        let workers = std::env::var("GLYPHMAP_WORKERS").ok();
        Self {
            parallel: parse_parallel(parallel.as_deref()),
            workers: parse_workers(workers.as_deref()),
        }
    }
}

fn evaluate_column(binding: &ResolvedBinding, nodes: &[Node]) -> Column {
    let index = binding.index();
    let values: Vec<f64> = nodes.iter().filter_map(|node| index.resolve(node)).collect();
    let normalize = binding.normalizer().fit(&values);
    nodes
        .iter()
        .map(|node| {
            index.resolve(node).map(|raw| {
                let t = normalize.apply(raw);
                (t, binding.percept().map(t))
            })
        })
        .collect()
}

/// A binding whose pipeline panics (a user normalizer, say) yields an
/// all-absent column instead of taking the run down.
fn guarded_column(binding: &ResolvedBinding, nodes: &[Node]) -> Column {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluate_column(binding, nodes))) {
        Ok(column) => column,
        Err(_) => {
            warn!(
                percept = binding.key(),
                index = binding.index().name(),
                "binding pipeline panicked; every value treated as absent"
            );
            vec![None; nodes.len()]
        }
    }
}

pub struct Evaluator<'s> {
    settings: &'s Settings,
    options: EvalOptions,
}

impl<'s> Evaluator<'s> {
    pub fn new(settings: &'s Settings) -> Self {
        Self::with_options(settings, EvalOptions::default())
    }

    pub fn with_options(settings: &'s Settings, options: EvalOptions) -> Self {
        Self { settings, options }
    }

    fn columns(&self, nodes: &[Node]) -> Vec<Column> {
        let bindings = &self.settings.bindings;
        if !self.options.parallel || bindings.len() < 2 {
            return bindings.iter().map(|b| guarded_column(b, nodes)).collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.unwrap_or(0))
            .build();
        match pool {
            Ok(pool) => pool.install(|| {
                bindings
                    .par_iter()
                    .map(|b| guarded_column(b, nodes))
                    .collect()
            }),
            Err(e) => {
                warn!(error = %e, "could not build evaluation pool; running sequentially");
                bindings.iter().map(|b| guarded_column(b, nodes)).collect()
            }
        }
    }

    /// Run every binding over `nodes`. Groups are only built when a
    /// non-empty domain map is supplied; nodes missing from it fall back to
    /// the settings' fallback domain.
    pub fn evaluate<'n>(&self, nodes: &'n [Node], domains: Option<&DomainMap>) -> Report<'n> {
        let started = Instant::now();
        let bindings = &self.settings.bindings;
        let columns = self.columns(nodes);

        let entries: Vec<Entry<'n>> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| {
                let mut normalized = IndexMap::new();
                let mut percept = IndexMap::new();
                for (binding, column) in bindings.iter().zip(&columns) {
                    if let Some((t, value)) = column[position] {
                        normalized.insert(binding.key().to_string(), t);
                        percept.insert(binding.key().to_string(), value);
                    }
                }
                Entry {
                    node,
                    normalized,
                    percept,
                }
            })
            .collect();

        let (groups, excluded) = match domains.filter(|map| !map.is_empty()) {
            Some(map) => {
                let percepts: Vec<&str> = bindings.iter().map(ResolvedBinding::key).collect();
                let (groups, excluded) =
                    build_groups(&entries, map, &self.settings.rules.fallback, &percepts);
                (Some(groups), excluded)
            }
            None => (None, 0),
        };

        let report = Report {
            entries,
            groups,
            total: nodes.len(),
            excluded,
            bindings: bindings.iter().map(BindingSummary::from).collect(),
        };
        info!(
            nodes = report.total,
            bindings = report.bindings.len(),
            excluded = report.excluded,
            groups = report.groups.as_ref().map_or(0, Vec::len),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation finished"
        );
        report
    }

    /// Classify with the settings' own domain rules, then evaluate. Without
    /// any domain or exclude rule the report carries no groups.
    pub fn evaluate_classified<'n>(&self, nodes: &'n [Node]) -> GlyphResult<Report<'n>> {
        let rules = &self.settings.rules;
        if rules.is_empty() {
            return Ok(self.evaluate(nodes, None));
        }
        let domains = DomainClassifier::new(rules)?.build_domain_map(nodes);
        Ok(self.evaluate(nodes, Some(&domains)))
    }
}

// ---------------------------------------------------------------------------
// JSON entry points (built-in catalog)
// ---------------------------------------------------------------------------

/// Evaluate a JSON node array against a JSON settings document and return
/// the report as JSON. Parallelism follows [`EvalOptions::from_env`].
pub fn evaluate_json_impl(nodes_json: &str, settings_json: &str) -> GlyphResult<String> {
    let catalog = Catalog::builtin()?;
    let nodes = Node::list_from_json(nodes_json)?;
    let settings = SettingsResolver::new(&catalog).resolve_json(settings_json)?;
    let report =
        Evaluator::with_options(&settings, EvalOptions::from_env()).evaluate_classified(&nodes)?;
    report.to_json()
}

/// Node name → domain for a JSON node array, as a JSON object in node
/// order. Only the domain rules of the settings document are used.
pub fn classify_json_impl(nodes_json: &str, settings_json: &str) -> GlyphResult<String> {
    let catalog = Catalog::builtin()?;
    let nodes = Node::list_from_json(nodes_json)?;
    let input = SettingsDocument::from_json(settings_json)?.into_input(&catalog)?;
    let domains = build_domain_map(&nodes, &input.rules)?;
    Ok(serde_json::to_string(&domains)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::{DomainRule, DomainRules};
    use crate::encoding::binding::BindingDef;
    use crate::errors::GlyphError;
    use crate::encoding::catalog::Catalog;
    use crate::encoding::index::{ComputeError, IndexDef};
    use crate::encoding::normalizer::{NormalizerDef, QueryFn};
    use crate::encoding::percept::PerceptDef;
    use crate::settings::{SettingsInput, SettingsResolver};

    fn scenario_nodes() -> Vec<Node> {
        vec![
            Node::from_value(json!({
                "name": "auth.ts::login",
                "short_name": "login",
                "file": "auth.ts",
                "semantic_type": "function",
                "lines": 40,
                "depth": 2,
                "params": 3,
                "git_churn_30d": 12,
                "coverage": 0.8,
            }))
            .unwrap(),
            Node::from_value(json!({
                "name": "crypto.ts::hash",
                "short_name": "hash",
                "file": "crypto.ts",
                "semantic_type": "function",
                "lines": 12,
                "coverage": null,
            }))
            .unwrap(),
        ]
    }

    fn recommended(catalog: &Catalog, rules: DomainRules) -> Settings {
        SettingsResolver::new(catalog)
            .resolve(SettingsInput::extending("recommended").with_rules(rules))
            .unwrap()
    }

    #[test]
    fn test_scenario_recommended_two_nodes() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let nodes = scenario_nodes();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);

        assert_eq!(report.total, 2);
        assert_eq!(report.excluded, 0);
        assert!(report.groups.is_none());
        assert_eq!(report.bindings.len(), 5);

        let login = report.entry("auth.ts::login").unwrap();
        assert!(login.percept.contains_key("clarity"));
        let hash = report.entry("crypto.ts::hash").unwrap();
        assert!(!hash.percept.contains_key("clarity"));
        assert!(!hash.normalized.contains_key("clarity"));
        assert_eq!(hash.percept.len(), 4);

        // churn sample [12, 0]: p10 = 0, p90 = 12
        assert_eq!(login.normalized["hue"], 1.0);
        assert_eq!(login.percept["hue"], 0.0);
        assert_eq!(hash.normalized["hue"], 0.0);
        assert_eq!(hash.percept["hue"], 240.0);
    }

    #[test]
    fn test_percept_keys_follow_binding_order() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let nodes = scenario_nodes();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);
        let keys: Vec<&str> = report.entries[0].percept.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["hue", "size", "border", "opacity", "clarity"]);
    }

    #[test]
    fn test_stats_span_whole_node_set() {
        let catalog = Catalog::builtin().unwrap();
        let settings = SettingsResolver::new(&catalog)
            .resolve_json(r#"{"bindings": [{"index": "lines", "percept": "size"}]}"#)
            .unwrap();
        let nodes: Vec<Node> = (1..=10)
            .map(|i| {
                Node::builder(format!("m{i}"), format!("m{i}"), "m.ts", "function")
                    .lines(f64::from(i))
                    .build()
                    .unwrap()
            })
            .collect();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);
        assert_eq!(report.entry("m1").unwrap().normalized["size"], 0.0);
        assert_eq!(report.entry("m9").unwrap().normalized["size"], 1.0);
        assert_eq!(report.entry("m10").unwrap().normalized["size"], 1.0);
        assert_eq!(report.entry("m1").unwrap().percept["size"], 8.0);
        assert_eq!(report.entry("m10").unwrap().percept["size"], 48.0);
    }

    #[test]
    fn test_failing_index_does_not_abort_run() {
        let catalog = Catalog::builtin().unwrap();
        let flaky = IndexDef::compute("flaky", "percentile", |node: &Node| {
            if node.short_name() == "hash" {
                Err(ComputeError::from("no metric for hash"))
            } else {
                Ok(3.0)
            }
        })
        .unwrap();
        let saturation = catalog.percept("saturation").unwrap().clone();
        let settings = SettingsResolver::new(&catalog)
            .resolve(
                SettingsInput::extending("recommended")
                    .with_binding(BindingDef::new(flaky, saturation)),
            )
            .unwrap();
        let nodes = scenario_nodes();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);
        assert!(report.entry("auth.ts::login").unwrap().percept.contains_key("saturation"));
        assert!(!report.entry("crypto.ts::hash").unwrap().percept.contains_key("saturation"));
        assert!(report.entry("crypto.ts::hash").unwrap().percept.contains_key("size"));
    }

    #[test]
    fn test_panicking_normalizer_degrades_to_absence() {
        let catalog = Catalog::builtin().unwrap();
        let exploding = NormalizerDef::custom("exploding", |_: &[f64]| -> QueryFn {
            panic!("fit failed")
        })
        .unwrap();
        let lines = catalog.index("lines").unwrap().clone();
        let size = catalog.percept("size").unwrap().clone();
        let depth = catalog.index("depth").unwrap().clone();
        let opacity = catalog.percept("opacity").unwrap().clone();
        let settings = SettingsResolver::new(&catalog)
            .resolve(
                SettingsInput::default()
                    .with_binding(BindingDef::new(lines, size).with_normalizer(exploding).unwrap())
                    .with_binding(BindingDef::new(depth, opacity)),
            )
            .unwrap();
        let nodes = scenario_nodes();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);
        for entry in &report.entries {
            assert!(!entry.percept.contains_key("size"));
            assert!(entry.percept.contains_key("opacity"));
        }
    }

    #[test]
    fn test_groups_from_settings_rules() {
        let catalog = Catalog::builtin().unwrap();
        let rules = DomainRules {
            domains: vec![DomainRule::new("auth", ["auth"])],
            exclude: vec!["index".to_string()],
            ..DomainRules::default()
        };
        let settings = recommended(&catalog, rules);
        let mut nodes = scenario_nodes();
        nodes.push(
            Node::builder("index.ts::foo", "foo", "index.ts", "function")
                .build()
                .unwrap(),
        );
        nodes.push(
            Node::builder("utils.ts::helper", "helper", "utils.ts", "function")
                .build()
                .unwrap(),
        );
        let report = Evaluator::new(&settings).evaluate_classified(&nodes).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.entries.len(), 4);

        let groups = report.groups.as_ref().unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["unknown", "auth"]);
        assert_eq!(groups[0].count, 2);
        assert!(report.group("_excluded").is_none());

        let auth = report.group("auth").unwrap();
        assert_eq!(auth.stats["hue"].valid, 1);
        assert_eq!(auth.stats["clarity"].valid, 1);
        let unknown = report.group("unknown").unwrap();
        // crypto.ts::hash has no coverage, utils.ts::helper has none either
        assert!(!unknown.stats.contains_key("clarity"));
        assert_eq!(unknown.stats["hue"].valid, 2);
    }

    #[test]
    fn test_empty_domain_map_means_no_groups() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let nodes = scenario_nodes();
        let report = Evaluator::new(&settings).evaluate(&nodes, Some(&DomainMap::new()));
        assert!(report.groups.is_none());
        assert!(Evaluator::new(&settings)
            .evaluate_classified(&nodes)
            .unwrap()
            .groups
            .is_none());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let nodes: Vec<Node> = (0..200)
            .map(|i| {
                Node::builder(format!("f{i}.ts::f"), "f", format!("f{i}.ts"), "function")
                    .lines(f64::from(i % 37 + 1))
                    .depth(f64::from(i % 5))
                    .params(f64::from(i % 7))
                    .git_churn_30d(f64::from((i * 13) % 29))
                    .coverage(if i % 3 == 0 { None } else { Some(f64::from(i % 10) / 10.0) })
                    .build()
                    .unwrap()
            })
            .collect();
        let sequential = Evaluator::new(&settings).evaluate(&nodes, None);
        let parallel = Evaluator::with_options(
            &settings,
            EvalOptions {
                parallel: true,
                workers: Some(4),
            },
        )
        .evaluate(&nodes, None);
        assert_eq!(sequential.to_json().unwrap(), parallel.to_json().unwrap());
    }

    #[test]
    fn test_empty_node_set() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let report = Evaluator::new(&settings).evaluate(&[], None);
        assert_eq!(report.total, 0);
        assert!(report.entries.is_empty());
        assert_eq!(report.bindings.len(), 5);
    }

    #[test]
    fn test_binding_summaries() {
        let catalog = Catalog::builtin().unwrap();
        let settings = recommended(&catalog, DomainRules::default());
        let report = Evaluator::new(&settings).evaluate(&[], None);
        let border = &report.bindings[2];
        assert_eq!(border.percept, "border");
        assert_eq!(border.index, "params");
        assert_eq!(border.index_kind, "source");
        assert_eq!(border.normalizer, "rank");
        assert_eq!(border.steps, Some(4));
    }

    #[test]
    fn test_quantized_percept_levels_in_report() {
        let catalog = Catalog::builtin().unwrap();
        let settings = SettingsResolver::new(&catalog)
            .resolve(SettingsInput::default().with_binding(BindingDef::new(
                catalog.index("lines").unwrap().clone(),
                PerceptDef::stepped("steps3", 0.0, 2.0, 3).unwrap(),
            )))
            .unwrap();
        let nodes: Vec<Node> = (1..=20)
            .map(|i| {
                Node::builder(format!("n{i}"), "n", "n.ts", "function")
                    .lines(f64::from(i))
                    .build()
                    .unwrap()
            })
            .collect();
        let report = Evaluator::new(&settings).evaluate(&nodes, None);
        let mut levels: Vec<f64> = report.entries.iter().map(|e| e.percept["steps3"]).collect();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        assert_eq!(levels, vec![0.0, 1.0, 2.0]);
    }

    const SCENARIO_NODES_JSON: &str = r#"[
        {"name": "auth.ts::login", "short_name": "login", "file": "auth.ts",
         "semantic_type": "function", "lines": 40, "depth": 2, "params": 3,
         "git_churn_30d": 12, "coverage": 0.8},
        {"name": "crypto.ts::hash", "short_name": "hash", "file": "crypto.ts",
         "semantic_type": "function", "lines": 12, "coverage": null},
        {"name": "index.ts::foo", "short_name": "foo", "file": "index.ts",
         "semantic_type": "function"},
        {"name": "utils.ts::helper", "short_name": "helper", "file": "utils.ts",
         "semantic_type": "function"}
    ]"#;

    const AUTH_RULES_JSON: &str = r#"{
        "extends": "recommended",
        "domains": [{"name": "auth", "patterns": ["auth"]}],
        "exclude": ["index"]
    }"#;

    #[test]
    fn test_evaluate_json_recommended_without_rules() {
        let nodes = r#"[
            {"name": "auth.ts::login", "short_name": "login", "file": "auth.ts",
             "semantic_type": "function", "lines": 40, "depth": 2, "params": 3,
             "git_churn_30d": 12, "coverage": 0.8},
            {"name": "crypto.ts::hash", "short_name": "hash", "file": "crypto.ts",
             "semantic_type": "function", "lines": 12, "coverage": null}
        ]"#;
        let text = evaluate_json_impl(nodes, r#"{"extends": "recommended"}"#).unwrap();
        let report: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(report["total"], 2);
        assert_eq!(report["excluded"], 0);
        assert!(report.get("groups").is_none());
        assert_eq!(report["bindings"].as_array().unwrap().len(), 5);
        assert_eq!(report["entries"][0]["node"]["name"], "auth.ts::login");
        assert_eq!(report["entries"][0]["percept"]["hue"], 0.0);
        assert_eq!(report["entries"][1]["percept"]["hue"], 240.0);
        assert!(report["entries"][0]["percept"].get("clarity").is_some());
        assert!(report["entries"][1]["percept"].get("clarity").is_none());
    }

    #[test]
    fn test_evaluate_json_groups_by_domain() {
        let text = evaluate_json_impl(SCENARIO_NODES_JSON, AUTH_RULES_JSON).unwrap();
        let report: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(report["total"], 4);
        assert_eq!(report["excluded"], 1);
        assert_eq!(report["entries"].as_array().unwrap().len(), 4);
        let groups = report["groups"].as_array().unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["unknown", "auth"]);
        assert_eq!(groups[0]["count"], 2);
        assert_eq!(groups[1]["count"], 1);
        assert_eq!(groups[1]["stats"]["clarity"]["valid"], 1);
        assert!(groups[0]["stats"].get("clarity").is_none());
    }

    #[test]
    fn test_evaluate_json_errors() {
        let err = evaluate_json_impl(r#"{"name": "a"}"#, "{}").unwrap_err();
        assert!(matches!(err, GlyphError::Schema(_)));

        let err = evaluate_json_impl(
            SCENARIO_NODES_JSON,
            r#"{"bindings": [{"index": "lines", "percept": "size", "normalize": "zscore"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, GlyphError::Resolution(_)));

        let err = evaluate_json_impl(SCENARIO_NODES_JSON, "{not json").unwrap_err();
        assert!(matches!(err, GlyphError::Json(_)));
    }

    #[test]
    fn test_classify_json_domain_map() {
        let text = classify_json_impl(SCENARIO_NODES_JSON, AUTH_RULES_JSON).unwrap();
        assert_eq!(
            text,
            r#"{"auth.ts::login":"auth","crypto.ts::hash":"unknown","index.ts::foo":"_excluded","utils.ts::helper":"unknown"}"#
        );

        let text = classify_json_impl(SCENARIO_NODES_JSON, r#"{"fallback": "misc"}"#).unwrap();
        let domains: IndexMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(domains.len(), 4);
        assert!(domains.values().all(|d| d == "misc"));
    }

    #[test]
    fn test_parse_parallel_toggle() {
        assert!(parse_parallel(None));
        assert!(parse_parallel(Some("1")));
        assert!(parse_parallel(Some("yes")));
        assert!(parse_parallel(Some("")));
        for off in ["0", "false", "no", "off", " OFF ", "False"] {
            assert!(!parse_parallel(Some(off)), "{off}");
        }
    }

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers(None), None);
        assert_eq!(parse_workers(Some("4")), Some(4));
        assert_eq!(parse_workers(Some(" 8 ")), Some(8));
        assert_eq!(parse_workers(Some("0")), None);
        assert_eq!(parse_workers(Some("-2")), None);
        assert_eq!(parse_workers(Some("many")), None);
    }
}
