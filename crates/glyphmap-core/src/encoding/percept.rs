//! Percepts: map a normalized value onto a visual range.

use crate::errors::{GlyphError, GlyphResult};
use crate::models::Range;

/// A named visual channel. The name is the binding merge key.
#[derive(Clone, Debug, PartialEq)]
pub struct PerceptDef {
    name: String,
    range: Range,
    steps: Option<u32>,
}

impl PerceptDef {
    /// `steps`, when given, must be an integer of at least 2.
    pub fn new(name: impl Into<String>, range: Range, steps: Option<f64>) -> GlyphResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GlyphError::Construction(
                "percept name must not be empty".to_string(),
            ));
        }
        let steps = match steps {
            None => None,
            Some(s) if s.is_finite() && s.fract() == 0.0 && s >= 2.0 && s <= u32::MAX as f64 => {
                Some(s as u32)
            }
            Some(s) => {
                return Err(GlyphError::Construction(format!(
                    "percept `{name}`: steps must be an integer >= 2, got {s}"
                )))
            }
        };
        Ok(Self { name, range, steps })
    }

    pub fn continuous(name: impl Into<String>, lo: f64, hi: f64) -> GlyphResult<Self> {
        Self::new(name, Range::new(lo, hi)?, None)
    }

    pub fn stepped(name: impl Into<String>, lo: f64, hi: f64, steps: u32) -> GlyphResult<Self> {
        Self::new(name, Range::new(lo, hi)?, Some(f64::from(steps)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn steps(&self) -> Option<u32> {
        self.steps
    }

    /// Map a normalized value, quantizing to `steps` levels first.
    pub fn map(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        let t = match self.steps {
            Some(steps) => {
                let top = f64::from(steps - 1);
                (t * top).round() / top
            }
            None => t,
        };
        self.range.map(t)
    }

    /// The distinct outputs of a quantized percept, lowest level first.
    pub fn levels(&self) -> Option<Vec<f64>> {
        let steps = self.steps?;
        let top = f64::from(steps - 1);
        Some(
            (0..steps)
                .map(|level| self.range.map(f64::from(level) / top))
                .collect(),
        )
    }
}
