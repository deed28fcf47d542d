//! Shared typed models: the per-symbol node record, its schema, and the
//! numeric range used by percepts.

use serde::{Deserialize, Serialize};

use crate::errors::{GlyphError, GlyphResult};

// ---------------------------------------------------------------------------
// Schema / contract constants
// ---------------------------------------------------------------------------

/// Domain reserved for nodes matched by an exclude pattern.
pub const EXCLUDED_DOMAIN: &str = "_excluded";

/// Domain assigned when no rule matches and the settings name no fallback.
pub const DEFAULT_FALLBACK_DOMAIN: &str = "unknown";

/// Value type of a node schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    NullableNumber,
    Bool,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::NullableNumber)
    }
}

/// Every field of the node record, in declaration order, with its type and
/// whether the loader must supply it.
pub const NODE_SCHEMA: &[(&str, FieldType, bool)] = &[
    ("name", FieldType::String, true),
    ("short_name", FieldType::String, true),
    ("file", FieldType::String, true),
    ("semantic_type", FieldType::String, true),
    ("lines", FieldType::Number, false),
    ("start_line", FieldType::Number, false),
    ("end_line", FieldType::Number, false),
    ("depth", FieldType::Number, false),
    ("params", FieldType::Number, false),
    ("field_count", FieldType::Number, false),
    ("cyclomatic", FieldType::Number, false),
    ("exported", FieldType::Bool, false),
    ("exported_score", FieldType::Number, false),
    ("visibility", FieldType::String, false),
    ("git_churn_30d", FieldType::Number, false),
    ("coverage", FieldType::NullableNumber, false),
];

// ---------------------------------------------------------------------------
// 1. NodeField
// ---------------------------------------------------------------------------

/// A numeric node field a source index can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeField {
    Lines,
    StartLine,
    EndLine,
    Depth,
    Params,
    FieldCount,
    Cyclomatic,
    ExportedScore,
    GitChurn30d,
    Coverage,
}

impl NodeField {
    /// Resolve a schema field name, rejecting unknown and non-numeric fields.
    pub fn parse(name: &str) -> GlyphResult<Self> {
        let field_type = NODE_SCHEMA
            .iter()
            .find(|(field, _, _)| *field == name)
            .map(|(_, field_type, _)| *field_type)
            .ok_or_else(|| {
                GlyphError::Construction(format!("unknown node field `{name}`"))
            })?;
        if !field_type.is_numeric() {
            return Err(GlyphError::Construction(format!(
                "node field `{name}` is not numeric"
            )));
        }
        let field = match name {
            "lines" => NodeField::Lines,
            "start_line" => NodeField::StartLine,
            "end_line" => NodeField::EndLine,
            "depth" => NodeField::Depth,
            "params" => NodeField::Params,
            "field_count" => NodeField::FieldCount,
            "cyclomatic" => NodeField::Cyclomatic,
            "exported_score" => NodeField::ExportedScore,
            "git_churn_30d" => NodeField::GitChurn30d,
            "coverage" => NodeField::Coverage,
            other => {
                return Err(GlyphError::Construction(format!(
                    "node field `{other}` cannot be read as a metric"
                )))
            }
        };
        Ok(field)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeField::Lines => "lines",
            NodeField::StartLine => "start_line",
            NodeField::EndLine => "end_line",
            NodeField::Depth => "depth",
            NodeField::Params => "params",
            NodeField::FieldCount => "field_count",
            NodeField::Cyclomatic => "cyclomatic",
            NodeField::ExportedScore => "exported_score",
            NodeField::GitChurn30d => "git_churn_30d",
            NodeField::Coverage => "coverage",
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Node
// ---------------------------------------------------------------------------

fn default_one() -> f64 {
    1.0
}

fn default_visibility() -> String {
    "private".to_string()
}

/// Immutable per-symbol metric record supplied by the extraction layer.
///
/// Fields are private: a node is only obtained through [`Node::from_value`],
/// [`Node::from_json`] or [`NodeBuilder::build`], all of which validate the
/// record, and nothing can change it afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    name: String,
    short_name: String,
    file: String,
    semantic_type: String,
    #[serde(default = "default_one")]
    lines: f64,
    #[serde(default)]
    start_line: f64,
    #[serde(default)]
    end_line: f64,
    #[serde(default)]
    depth: f64,
    #[serde(default)]
    params: f64,
    #[serde(default)]
    field_count: f64,
    #[serde(default = "default_one")]
    cyclomatic: f64,
    #[serde(default)]
    exported: bool,
    #[serde(default)]
    exported_score: f64,
    #[serde(default = "default_visibility")]
    visibility: String,
    #[serde(default)]
    git_churn_30d: f64,
    #[serde(default)]
    coverage: Option<f64>,
}

impl Node {
    /// Start a node with the four required identity fields; every metric
    /// takes its schema default until set.
    pub fn builder(
        name: impl Into<String>,
        short_name: impl Into<String>,
        file: impl Into<String>,
        semantic_type: impl Into<String>,
    ) -> NodeBuilder {
        NodeBuilder {
            node: Node {
                name: name.into(),
                short_name: short_name.into(),
                file: file.into(),
                semantic_type: semantic_type.into(),
                lines: 1.0,
                start_line: 0.0,
                end_line: 0.0,
                depth: 0.0,
                params: 0.0,
                field_count: 0.0,
                cyclomatic: 1.0,
                exported: false,
                exported_score: 0.0,
                visibility: default_visibility(),
                git_churn_30d: 0.0,
                coverage: None,
            },
        }
    }

    /// Build a node from a loader-supplied JSON object.
    pub fn from_value(value: serde_json::Value) -> GlyphResult<Self> {
        let Some(record) = value.as_object() else {
            return Err(GlyphError::Schema(format!(
                "node record must be an object, got {value}"
            )));
        };
        let missing: Vec<&str> = NODE_SCHEMA
            .iter()
            .filter(|(field, _, required)| {
                *required && record.get(*field).map_or(true, serde_json::Value::is_null)
            })
            .map(|(field, _, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(GlyphError::Schema(format!(
                "node record is missing required field(s): {}",
                missing.join(", ")
            )));
        }
        let node: Node =
            serde_json::from_value(value).map_err(|e| GlyphError::Schema(e.to_string()))?;
        node.validate()?;
        Ok(node)
    }

    pub fn from_json(text: &str) -> GlyphResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Parse a JSON array of node records, failing on the first bad record.
    pub fn list_from_json(text: &str) -> GlyphResult<Vec<Self>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            other => {
                return Err(GlyphError::Schema(format!(
                    "expected an array of node records, got {other}"
                )))
            }
        };
        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                Self::from_value(item).map_err(|e| match e {
                    GlyphError::Schema(msg) => {
                        GlyphError::Schema(format!("node #{position}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect()
    }

    fn validate(&self) -> GlyphResult<()> {
        let numbers = [
            ("lines", self.lines),
            ("start_line", self.start_line),
            ("end_line", self.end_line),
            ("depth", self.depth),
            ("params", self.params),
            ("field_count", self.field_count),
            ("cyclomatic", self.cyclomatic),
            ("exported_score", self.exported_score),
            ("git_churn_30d", self.git_churn_30d),
        ];
        for (field, value) in numbers {
            if !value.is_finite() {
                return Err(GlyphError::Schema(format!(
                    "node `{}`: field `{field}` must be a finite number",
                    self.name
                )));
            }
        }
        if let Some(coverage) = self.coverage {
            if !coverage.is_finite() {
                return Err(GlyphError::Schema(format!(
                    "node `{}`: field `coverage` must be a finite number or null",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Read a numeric field; only `coverage` can be absent.
    pub fn numeric(&self, field: NodeField) -> Option<f64> {
        match field {
            NodeField::Lines => Some(self.lines),
            NodeField::StartLine => Some(self.start_line),
            NodeField::EndLine => Some(self.end_line),
            NodeField::Depth => Some(self.depth),
            NodeField::Params => Some(self.params),
            NodeField::FieldCount => Some(self.field_count),
            NodeField::Cyclomatic => Some(self.cyclomatic),
            NodeField::ExportedScore => Some(self.exported_score),
            NodeField::GitChurn30d => Some(self.git_churn_30d),
            NodeField::Coverage => self.coverage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn semantic_type(&self) -> &str {
        &self.semantic_type
    }

    pub fn exported(&self) -> bool {
        self.exported
    }

    pub fn visibility(&self) -> &str {
        &self.visibility
    }

    pub fn coverage(&self) -> Option<f64> {
        self.coverage
    }
}

/// Programmatic construction of a [`Node`]; `build` applies the same
/// validation as the JSON path.
#[derive(Clone, Debug)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn lines(mut self, value: f64) -> Self {
        self.node.lines = value;
        self
    }

    pub fn span(mut self, start_line: f64, end_line: f64) -> Self {
        self.node.start_line = start_line;
        self.node.end_line = end_line;
        self
    }

    pub fn depth(mut self, value: f64) -> Self {
        self.node.depth = value;
        self
    }

    pub fn params(mut self, value: f64) -> Self {
        self.node.params = value;
        self
    }

    pub fn field_count(mut self, value: f64) -> Self {
        self.node.field_count = value;
        self
    }

    pub fn cyclomatic(mut self, value: f64) -> Self {
        self.node.cyclomatic = value;
        self
    }

    pub fn exported(mut self, exported: bool, score: f64) -> Self {
        self.node.exported = exported;
        self.node.exported_score = score;
        self
    }

    pub fn visibility(mut self, value: impl Into<String>) -> Self {
        self.node.visibility = value.into();
        self
    }

    pub fn git_churn_30d(mut self, value: f64) -> Self {
        self.node.git_churn_30d = value;
        self
    }

    pub fn coverage(mut self, value: Option<f64>) -> Self {
        self.node.coverage = value;
        self
    }

    pub fn build(self) -> GlyphResult<Node> {
        self.node.validate()?;
        Ok(self.node)
    }
}

// ---------------------------------------------------------------------------
// 3. Range
// ---------------------------------------------------------------------------

/// Numeric interval with a linear interpolation mapper. `lo > hi` is
/// allowed and encodes an inverted channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    lo: f64,
    hi: f64,
}

impl Range {
    pub fn new(lo: f64, hi: f64) -> GlyphResult<Self> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(GlyphError::Construction(format!(
                "range bounds must be finite numbers, got ({lo}, {hi})"
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> f64 {
        self.lo
    }

    pub fn hi(&self) -> f64 {
        self.hi
    }

    pub fn map(&self, t: f64) -> f64 {
        self.lo + t * (self.hi - self.lo)
    }
}
