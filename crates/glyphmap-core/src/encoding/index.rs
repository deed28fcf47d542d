//! Indexes: named metric extractors `Node -> Option<f64>`.
//!
//! Every user-supplied function runs behind a single guarded call. An error,
//! a panic or a non-finite result turns into `None` so one bad metric never
//! aborts the rest of a run.
//!
//! Catching a panic does not silence the process panic hook: with the
//! default hook, every node whose function panics still prints a panic
//! message to stderr. Callers that expect panicking metrics over large node
//! sets should install their own hook (`std::panic::set_hook`).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{GlyphError, GlyphResult};
use crate::models::{Node, NodeField};

pub type ComputeError = Box<dyn std::error::Error + Send + Sync>;
pub type ComputeResult = Result<f64, ComputeError>;
pub type ComputeFn = Arc<dyn Fn(&Node) -> ComputeResult + Send + Sync>;
pub type CombineFn = Arc<dyn Fn(f64, f64) -> ComputeResult + Send + Sync>;
pub type MapFn = Arc<dyn Fn(f64) -> ComputeResult + Send + Sync>;

#[derive(Clone)]
pub enum IndexKind {
    /// Reads one numeric node field.
    Source(NodeField),
    Compute(ComputeFn),
    /// Absent when either side is absent.
    Combine {
        left: Arc<IndexDef>,
        right: Arc<IndexDef>,
        combine: CombineFn,
    },
    Map {
        inner: Arc<IndexDef>,
        map: MapFn,
    },
}

impl IndexKind {
    pub fn label(&self) -> &'static str {
        match self {
            IndexKind::Source(_) => "source",
            IndexKind::Compute(_) => "compute",
            IndexKind::Combine { .. } => "combine",
            IndexKind::Map { .. } => "map",
        }
    }
}

impl fmt::Debug for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Source(field) => f.debug_tuple("Source").field(&field.as_str()).finish(),
            IndexKind::Compute(_) => f.write_str("Compute(..)"),
            IndexKind::Combine { left, right, .. } => f
                .debug_struct("Combine")
                .field("left", &left.name())
                .field("right", &right.name())
                .finish(),
            IndexKind::Map { inner, .. } => {
                f.debug_struct("Map").field("inner", &inner.name()).finish()
            }
        }
    }
}

/// A named metric with the normalizer it is read through by default.
#[derive(Clone, Debug)]
pub struct IndexDef {
    name: String,
    default_normalizer: String,
    kind: IndexKind,
}

fn require_name(what: &str, value: &str) -> GlyphResult<()> {
    if value.trim().is_empty() {
        return Err(GlyphError::Construction(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Run a user function, converting every failure mode into `None`.
fn guarded<F>(index: &str, call: F) -> Option<f64>
where
    F: FnOnce() -> ComputeResult,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) if value.is_finite() => Some(value),
        Ok(Ok(value)) => {
            debug!(index, value, "non-finite metric treated as absent");
            None
        }
        Ok(Err(err)) => {
            debug!(index, error = %err, "metric failed; treated as absent");
            None
        }
        Err(_) => {
            debug!(index, "metric panicked; treated as absent");
            None
        }
    }
}

impl IndexDef {
    fn build(name: String, default_normalizer: String, kind: IndexKind) -> GlyphResult<Self> {
        require_name("index name", &name)?;
        require_name(&format!("index `{name}` default normalizer"), &default_normalizer)?;
        Ok(Self {
            name,
            default_normalizer,
            kind,
        })
    }

    /// Index over a numeric node field, checked against the node schema.
    pub fn source(
        name: impl Into<String>,
        field: &str,
        default_normalizer: impl Into<String>,
    ) -> GlyphResult<Self> {
        let name = name.into();
        let field = NodeField::parse(field)
            .map_err(|e| GlyphError::Construction(format!("index `{name}`: {e}")))?;
        Self::build(name, default_normalizer.into(), IndexKind::Source(field))
    }

    pub fn compute<F>(
        name: impl Into<String>,
        default_normalizer: impl Into<String>,
        compute: F,
    ) -> GlyphResult<Self>
    where
        F: Fn(&Node) -> ComputeResult + Send + Sync + 'static,
    {
        Self::build(
            name.into(),
            default_normalizer.into(),
            IndexKind::Compute(Arc::new(compute)),
        )
    }

    pub fn combine<F>(
        name: impl Into<String>,
        left: &IndexDef,
        right: &IndexDef,
        default_normalizer: impl Into<String>,
        combine: F,
    ) -> GlyphResult<Self>
    where
        F: Fn(f64, f64) -> ComputeResult + Send + Sync + 'static,
    {
        Self::build(
            name.into(),
            default_normalizer.into(),
            IndexKind::Combine {
                left: Arc::new(left.clone()),
                right: Arc::new(right.clone()),
                combine: Arc::new(combine),
            },
        )
    }

    /// Post-transform another index, keeping its default normalizer.
    pub fn map<F>(name: impl Into<String>, inner: &IndexDef, map: F) -> GlyphResult<Self>
    where
        F: Fn(f64) -> ComputeResult + Send + Sync + 'static,
    {
        let normalizer = inner.default_normalizer.clone();
        Self::map_with_normalizer(name, inner, normalizer, map)
    }

    pub fn map_with_normalizer<F>(
        name: impl Into<String>,
        inner: &IndexDef,
        default_normalizer: impl Into<String>,
        map: F,
    ) -> GlyphResult<Self>
    where
        F: Fn(f64) -> ComputeResult + Send + Sync + 'static,
    {
        Self::build(
            name.into(),
            default_normalizer.into(),
            IndexKind::Map {
                inner: Arc::new(inner.clone()),
                map: Arc::new(map),
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_normalizer(&self) -> &str {
        &self.default_normalizer
    }

    pub fn kind(&self) -> &IndexKind {
        &self.kind
    }

    /// Resolve the metric for one node; `None` means absent.
    pub fn resolve(&self, node: &Node) -> Option<f64> {
        match &self.kind {
            IndexKind::Source(field) => node.numeric(*field).filter(|v| v.is_finite()),
            IndexKind::Compute(compute) => guarded(&self.name, || compute(node)),
            IndexKind::Combine {
                left,
                right,
                combine,
            } => {
                let a = left.resolve(node)?;
                let b = right.resolve(node)?;
                guarded(&self.name, || combine(a, b))
            }
            IndexKind::Map { inner, map } => {
                let value = inner.resolve(node)?;
                guarded(&self.name, || map(value))
            }
        }
    }
}
