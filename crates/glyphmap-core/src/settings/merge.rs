//! Preset + user binding merge.
//!
//! The merge is keyed by percept name. A user binding whose key matches a
//! preset binding takes that binding's slot; user bindings that match
//! nothing are appended in their declared order. The merged list must carry
//! every key exactly once.

use indexmap::IndexMap;

use crate::encoding::binding::BindingDef;
use crate::errors::{GlyphError, GlyphResult};

/// Ordered merge result plus its key index (`percept name → position`).
#[derive(Clone, Debug)]
pub struct MergedBindings {
    pub bindings: Vec<BindingDef>,
    pub keys: IndexMap<String, usize>,
}

pub fn merge_bindings(preset: Vec<BindingDef>, user: Vec<BindingDef>) -> GlyphResult<MergedBindings> {
    // key -> user positions not yet consumed, in declared order
    let mut pending: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (position, binding) in user.iter().enumerate() {
        pending
            .entry(binding.key().to_string())
            .or_default()
            .push(position);
    }
    let mut slots: Vec<Option<BindingDef>> = user.into_iter().map(Some).collect();

    let mut merged = Vec::with_capacity(preset.len() + slots.len());
    for base in preset {
        let replacement = pending
            .get_mut(base.key())
            .filter(|positions| !positions.is_empty())
            .map(|positions| positions.remove(0))
            .and_then(|position| slots[position].take());
        merged.push(replacement.unwrap_or(base));
    }
    merged.extend(slots.into_iter().flatten());

    let keys = key_index(&merged)?;
    Ok(MergedBindings {
        bindings: merged,
        keys,
    })
}

/// Index bindings by key, failing on the first repeated percept.
pub fn key_index(bindings: &[BindingDef]) -> GlyphResult<IndexMap<String, usize>> {
    let mut keys: IndexMap<String, usize> = IndexMap::with_capacity(bindings.len());
    for (position, binding) in bindings.iter().enumerate() {
        if let Some(first) = keys.get(binding.key()) {
            return Err(GlyphError::Resolution(format!(
                "percept `{}` is bound more than once (positions {first} and {position}); \
                 each percept must be driven by exactly one binding",
                binding.key()
            )));
        }
        keys.insert(binding.key().to_string(), position);
    }
    Ok(keys)
}
