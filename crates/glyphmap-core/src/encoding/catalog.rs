//! Read-only registries of normalizers, indexes, percepts and presets.
//!
//! A [`Catalog`] is assembled once through [`CatalogBuilder`] and then only
//! lent out by reference; nothing mutates it afterwards.

use indexmap::IndexMap;
use serde_json::json;

use crate::encoding::binding::BindingDef;
use crate::encoding::index::{ComputeError, IndexDef};
use crate::encoding::normalizer::NormalizerDef;
use crate::encoding::percept::PerceptDef;
use crate::errors::{GlyphError, GlyphResult};
use crate::models::{Node, NodeField};

/// Name of the preset most settings extend.
pub const RECOMMENDED_PRESET: &str = "recommended";

/// A named base set of bindings.
#[derive(Clone, Debug)]
pub enum PresetDef {
    Bindings(Vec<BindingDef>),
    /// Unvalidated `{"bindings": [{"index", "percept", "normalize"?}]}`
    /// document; its shape is checked when settings are resolved.
    Document(serde_json::Value),
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    normalizers: IndexMap<String, NormalizerDef>,
    indexes: IndexMap<String, IndexDef>,
    percepts: IndexMap<String, PerceptDef>,
    presets: IndexMap<String, PresetDef>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// The stock registry: percentile/rank/minmax/log normalizers, the
    /// node-metric indexes, the six visual channels and two presets.
    pub fn builtin() -> GlyphResult<Self> {
        let lines = IndexDef::source("lines", "lines", "percentile")?;
        let depth = IndexDef::source("depth", "depth", "rank")?;
        let params = IndexDef::source("params", "params", "rank")?;
        let field_count = IndexDef::source("field_count", "field_count", "rank")?;
        let cyclomatic = IndexDef::source("cyclomatic", "cyclomatic", "percentile")?;
        let churn = IndexDef::source("churn", "git_churn_30d", "percentile")?;
        let coverage = IndexDef::source("coverage", "coverage", "minmax")?;
        let exported_score = IndexDef::source("exported_score", "exported_score", "minmax")?;
        let span = IndexDef::compute("span", "percentile", |node: &Node| {
            let start = node.numeric(NodeField::StartLine).unwrap_or(0.0);
            let end = node.numeric(NodeField::EndLine).unwrap_or(0.0);
            if end < start {
                return Err(ComputeError::from(format!(
                    "end_line {end} precedes start_line {start}"
                )));
            }
            Ok(end - start + 1.0)
        })?;
        let density =
            IndexDef::combine("density", &cyclomatic, &lines, "percentile", |paths, size| {
                if size <= 0.0 {
                    return Err(ComputeError::from("symbol has no lines"));
                }
                Ok(paths / size)
            })?;
        let uncovered = IndexDef::map("uncovered", &coverage, |c| Ok(1.0 - c))?;
        let risk = IndexDef::combine("risk", &churn, &uncovered, "percentile", |c, u| Ok(c * u))?;

        let hue = PerceptDef::continuous("hue", 240.0, 0.0)?;
        let size = PerceptDef::continuous("size", 8.0, 48.0)?;
        let border = PerceptDef::stepped("border", 0.0, 6.0, 4)?;
        let opacity = PerceptDef::continuous("opacity", 0.3, 1.0)?;
        let clarity = PerceptDef::stepped("clarity", 0.0, 1.0, 5)?;
        let saturation = PerceptDef::continuous("saturation", 0.2, 1.0)?;

        let recommended = vec![
            BindingDef::new(churn.clone(), hue.clone()),
            BindingDef::new(lines.clone(), size.clone()),
            BindingDef::new(params.clone(), border.clone()),
            BindingDef::new(depth.clone(), opacity.clone()),
            BindingDef::new(coverage.clone(), clarity.clone()),
        ];
        let complexity = json!({
            "bindings": [
                {"index": "cyclomatic", "percept": "hue"},
                {"index": "span", "percept": "size"},
                {"index": "field_count", "percept": "border"},
                {"index": "density", "percept": "opacity"},
            ]
        });

        let mut builder = CatalogBuilder::new()
            .normalizer(NormalizerDef::minmax())?
            .normalizer(NormalizerDef::log())?;
        for index in [
            lines,
            depth,
            params,
            field_count,
            cyclomatic,
            churn,
            coverage,
            exported_score,
            span,
            density,
            uncovered,
            risk,
        ] {
            builder = builder.index(index)?;
        }
        for percept in [hue, size, border, opacity, clarity, saturation] {
            builder = builder.percept(percept)?;
        }
        Ok(builder
            .preset(RECOMMENDED_PRESET, PresetDef::Bindings(recommended))?
            .preset("complexity", PresetDef::Document(complexity))?
            .build())
    }

    pub fn normalizer(&self, name: &str) -> Option<&NormalizerDef> {
        self.normalizers.get(name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }

    pub fn percept(&self, name: &str) -> Option<&PerceptDef> {
        self.percepts.get(name)
    }

    pub fn preset(&self, name: &str) -> Option<&PresetDef> {
        self.presets.get(name)
    }

    pub fn normalizer_names(&self) -> Vec<&str> {
        self.normalizers.keys().map(String::as_str).collect()
    }

    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }

    pub fn percept_names(&self) -> Vec<&str> {
        self.percepts.keys().map(String::as_str).collect()
    }

    pub fn preset_names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }
}

/// Registration front for a [`Catalog`]. Starts with the `percentile` and
/// `rank` normalizers every catalog must carry; names are unique per kind.
#[derive(Debug)]
pub struct CatalogBuilder {
    catalog: Catalog,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_unique<T>(
    map: &mut IndexMap<String, T>,
    kind: &str,
    name: &str,
    value: T,
) -> GlyphResult<()> {
    if map.contains_key(name) {
        return Err(GlyphError::Construction(format!(
            "{kind} `{name}` is already registered"
        )));
    }
    map.insert(name.to_string(), value);
    Ok(())
}

impl CatalogBuilder {
    pub fn new() -> Self {
        let mut catalog = Catalog::default();
        for def in [NormalizerDef::percentile(), NormalizerDef::rank()] {
            catalog.normalizers.insert(def.name().to_string(), def);
        }
        Self { catalog }
    }

    pub fn normalizer(mut self, def: NormalizerDef) -> GlyphResult<Self> {
        let name = def.name().to_string();
        insert_unique(&mut self.catalog.normalizers, "normalizer", &name, def)?;
        Ok(self)
    }

    pub fn index(mut self, def: IndexDef) -> GlyphResult<Self> {
        let name = def.name().to_string();
        insert_unique(&mut self.catalog.indexes, "index", &name, def)?;
        Ok(self)
    }

    pub fn percept(mut self, def: PerceptDef) -> GlyphResult<Self> {
        let name = def.name().to_string();
        insert_unique(&mut self.catalog.percepts, "percept", &name, def)?;
        Ok(self)
    }

    pub fn preset(mut self, name: &str, def: PresetDef) -> GlyphResult<Self> {
        insert_unique(&mut self.catalog.presets, "preset", name, def)?;
        Ok(self)
    }

    pub fn build(self) -> Catalog {
        self.catalog
    }
}
