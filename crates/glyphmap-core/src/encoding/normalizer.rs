//! Normalizers: map a raw metric distribution onto `[0, 1]`.
//!
//! A normalizer is two pure steps. `stats` runs once over every defined raw
//! value of a binding across the whole node set; `normalize` turns those
//! stats into a query function. Every query function stays inside `[0, 1]`
//! and an empty sample answers `0.5` for every query.

use std::fmt;
use std::sync::Arc;

use crate::errors::{GlyphError, GlyphResult};

/// Answer for every query when the distribution carries no information.
pub const NEUTRAL: f64 = 0.5;

pub type QueryFn = Box<dyn Fn(f64) -> f64 + Send + Sync>;
pub type FitFn = Arc<dyn Fn(&[f64]) -> QueryFn + Send + Sync>;

#[derive(Clone)]
pub enum NormalizerKind {
    Percentile,
    Rank,
    MinMax,
    Log,
    Custom(FitFn),
}

impl fmt::Debug for NormalizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizerKind::Percentile => f.write_str("Percentile"),
            NormalizerKind::Rank => f.write_str("Rank"),
            NormalizerKind::MinMax => f.write_str("MinMax"),
            NormalizerKind::Log => f.write_str("Log"),
            NormalizerKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named normalizer definition.
#[derive(Clone, Debug)]
pub struct NormalizerDef {
    name: String,
    kind: NormalizerKind,
}

/// Order statistics of a sample. `pQ` is the `⌈n·Q⌉`-th sorted element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PercentileStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundsStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
}

/// Distribution summary produced by [`NormalizerDef::stats`].
#[derive(Clone, Debug, PartialEq)]
pub enum Stats {
    Percentile(PercentileStats),
    /// Ascending copy of the sample.
    Rank(Vec<f64>),
    MinMax(BoundsStats),
    /// Percentile stats over `ln(1 + max(raw, 0))`.
    Log(PercentileStats),
    /// Ascending copy handed to the custom fit function.
    Custom(Vec<f64>),
}

impl Stats {
    pub fn sample_size(&self) -> usize {
        match self {
            Stats::Percentile(s) | Stats::Log(s) => s.count,
            Stats::Rank(sorted) | Stats::Custom(sorted) => sorted.len(),
            Stats::MinMax(s) => s.count,
        }
    }
}

enum Mapping {
    Constant(f64),
    Clamp { lo: f64, hi: f64, log: bool },
    Rank(Vec<f64>),
    Custom(QueryFn),
}

/// Query function built from a sample's stats.
pub struct Normalize {
    mapping: Mapping,
}

impl fmt::Debug for Normalize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.mapping {
            Mapping::Constant(v) => format!("Constant({v})"),
            Mapping::Clamp { lo, hi, log } => format!("Clamp({lo}, {hi}, log={log})"),
            Mapping::Rank(sorted) => format!("Rank(n={})", sorted.len()),
            Mapping::Custom(_) => "Custom(..)".to_string(),
        };
        f.debug_tuple("Normalize").field(&label).finish()
    }
}

impl Normalize {
    pub fn constant(value: f64) -> Self {
        Self {
            mapping: Mapping::Constant(value),
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        let value = match &self.mapping {
            Mapping::Constant(v) => *v,
            Mapping::Clamp { lo, hi, log } => {
                let x = if *log { log_transform(raw) } else { raw };
                (x.clamp(*lo, *hi) - lo) / (hi - lo)
            }
            Mapping::Rank(sorted) => rank_position(sorted, raw),
            Mapping::Custom(query) => query(raw),
        };
        if value.is_nan() {
            NEUTRAL
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

fn log_transform(raw: f64) -> f64 {
    raw.max(0.0).ln_1p()
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// `⌈n·q⌉`-th element (1-based) of an ascending, non-empty sample.
pub(crate) fn ordinal(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let position = (n as f64 * q).ceil() as usize;
    sorted[position.clamp(1, n) - 1]
}

fn percentile_stats(sorted: &[f64]) -> PercentileStats {
    if sorted.is_empty() {
        return PercentileStats::default();
    }
    PercentileStats {
        count: sorted.len(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p10: ordinal(sorted, 0.1),
        p50: ordinal(sorted, 0.5),
        p90: ordinal(sorted, 0.9),
    }
}

fn clamp_mapping(lo: f64, hi: f64, log: bool) -> Mapping {
    if hi <= lo {
        Mapping::Constant(NEUTRAL)
    } else {
        Mapping::Clamp { lo, hi, log }
    }
}

/// Average tie rank on an exact hit, floor rank on a miss, `1.0` above the
/// sample.
fn rank_position(sorted: &[f64], raw: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return NEUTRAL;
    }
    let lower = sorted.partition_point(|v| *v < raw);
    if lower == n {
        return 1.0;
    }
    if n <= 1 {
        return NEUTRAL;
    }
    let denom = (n - 1) as f64;
    if sorted[lower] == raw {
        let upper = sorted.partition_point(|v| *v <= raw) - 1;
        return ((lower + upper) as f64 / 2.0) / denom;
    }
    (lower as f64 - 1.0).max(0.0) / denom
}

impl NormalizerDef {
    pub fn percentile() -> Self {
        Self::builtin("percentile", NormalizerKind::Percentile)
    }

    pub fn rank() -> Self {
        Self::builtin("rank", NormalizerKind::Rank)
    }

    pub fn minmax() -> Self {
        Self::builtin("minmax", NormalizerKind::MinMax)
    }

    pub fn log() -> Self {
        Self::builtin("log", NormalizerKind::Log)
    }

    fn builtin(name: &str, kind: NormalizerKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// A user normalizer. `fit` receives the ascending sample (never empty)
    /// and returns the query function; its answers are clamped into `[0, 1]`.
    pub fn custom<F>(name: impl Into<String>, fit: F) -> GlyphResult<Self>
    where
        F: Fn(&[f64]) -> QueryFn + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GlyphError::Construction(
                "normalizer name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            kind: NormalizerKind::Custom(Arc::new(fit)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NormalizerKind {
        &self.kind
    }

    pub fn stats(&self, values: &[f64]) -> Stats {
        match &self.kind {
            NormalizerKind::Percentile => Stats::Percentile(percentile_stats(&sorted_copy(values))),
            NormalizerKind::Rank => Stats::Rank(sorted_copy(values)),
            NormalizerKind::MinMax => {
                let sorted = sorted_copy(values);
                Stats::MinMax(match (sorted.first(), sorted.last()) {
                    (Some(&min), Some(&max)) => BoundsStats {
                        count: sorted.len(),
                        min,
                        max,
                    },
                    _ => BoundsStats::default(),
                })
            }
            NormalizerKind::Log => {
                let transformed: Vec<f64> = values.iter().map(|v| log_transform(*v)).collect();
                Stats::Log(percentile_stats(&sorted_copy(&transformed)))
            }
            NormalizerKind::Custom(_) => Stats::Custom(sorted_copy(values)),
        }
    }

    /// Build the query function. Stats produced by a different normalizer
    /// kind are treated as an empty sample.
    pub fn normalize(&self, stats: &Stats) -> Normalize {
        if stats.sample_size() == 0 {
            return Normalize::constant(NEUTRAL);
        }
        let mapping = match (&self.kind, stats) {
            (NormalizerKind::Percentile, Stats::Percentile(s)) => clamp_mapping(s.p10, s.p90, false),
            (NormalizerKind::Log, Stats::Log(s)) => clamp_mapping(s.p10, s.p90, true),
            (NormalizerKind::MinMax, Stats::MinMax(s)) => clamp_mapping(s.min, s.max, false),
            (NormalizerKind::Rank, Stats::Rank(sorted)) => Mapping::Rank(sorted.clone()),
            (NormalizerKind::Custom(fit), Stats::Custom(sorted)) => Mapping::Custom(fit(sorted)),
            _ => Mapping::Constant(NEUTRAL),
        };
        Normalize { mapping }
    }

    /// `stats` followed by `normalize`.
    pub fn fit(&self, values: &[f64]) -> Normalize {
        self.normalize(&self.stats(values))
    }
}
