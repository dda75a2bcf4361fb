use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EditError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectSpec {
    pub id: Uuid,
    pub tag: String,
    pub enabled: bool,
    pub params: BTreeMap<String, String>,
}

impl EffectSpec {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// What an effect stack is attached to. Each target has its own index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    Clip { clip_id: Uuid },
    Track { track: usize },
}

/// Index changes produced by a single stack operation. Indices are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRemap {
    pub added: Option<usize>,
    pub removed: Option<usize>,
    /// `(old, new)` for every surviving effect whose index changed.
    pub moved: Vec<(usize, usize)>,
}

impl IndexRemap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_none() && self.removed.is_none() && self.moved.is_empty()
    }

    /// Where the effect formerly at `old` lives now; `None` if it was removed.
    #[must_use]
    pub fn resolve(&self, old: usize) -> Option<usize> {
        if self.removed == Some(old) {
            return None;
        }
        Some(
            self.moved
                .iter()
                .find(|(from, _)| *from == old)
                .map_or(old, |(_, to)| *to),
        )
    }
}

/// Ordered effects of one clip or track.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EffectStack {
    effects: Vec<EffectSpec>,
}

impl EffectStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    #[must_use]
    pub fn list(&self) -> &[EffectSpec] {
        &self.effects
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EffectSpec> {
        index.checked_sub(1).and_then(|slot| self.effects.get(slot))
    }

    #[must_use]
    pub fn index_of(&self, effect_id: Uuid) -> Option<usize> {
        self.effects
            .iter()
            .position(|effect| effect.id == effect_id)
            .map(|slot| slot + 1)
    }

    /// Enabled effects in order, as the engine applies them.
    #[must_use]
    pub fn active(&self) -> Vec<EffectSpec> {
        self.effects
            .iter()
            .filter(|effect| effect.enabled)
            .cloned()
            .collect()
    }

    pub fn add(&mut self, effect: EffectSpec) -> usize {
        self.effects.push(effect);
        self.effects.len()
    }

    pub fn remove(&mut self, index: usize) -> Result<(EffectSpec, IndexRemap), EditError> {
        let slot = self.slot(index)?;
        let removed = self.effects.remove(slot);
        let moved = (index + 1..=self.effects.len() + 1)
            .map(|old| (old, old - 1))
            .collect();
        Ok((
            removed,
            IndexRemap {
                added: None,
                removed: Some(index),
                moved,
            },
        ))
    }

    /// Moves the effect at `old` so it ends up at `new`, shifting the effects
    /// in between by one.
    pub fn move_to(&mut self, old: usize, new: usize) -> Result<IndexRemap, EditError> {
        let from = self.slot(old)?;
        let to = self.slot(new)?;
        if from == to {
            return Ok(IndexRemap::default());
        }

        let effect = self.effects.remove(from);
        self.effects.insert(to, effect);

        let mut moved = vec![(old, new)];
        if old < new {
            moved.extend((old + 1..=new).map(|index| (index, index - 1)));
        } else {
            moved.extend((new..old).map(|index| (index, index + 1)));
        }
        Ok(IndexRemap {
            added: None,
            removed: None,
            moved,
        })
    }

    /// Merges `params` into the effect, or replaces its parameters entirely.
    pub fn edit(
        &mut self,
        index: usize,
        params: BTreeMap<String, String>,
        replace: bool,
    ) -> Result<(), EditError> {
        let slot = self.slot(index)?;
        let effect = &mut self.effects[slot];
        if replace {
            effect.params = params;
        } else {
            effect.params.extend(params);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), EditError> {
        let slot = self.slot(index)?;
        self.effects[slot].enabled = enabled;
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<usize, EditError> {
        if index == 0 || index > self.effects.len() {
            return Err(EditError::EffectNotFound {
                index,
                len: self.effects.len(),
            });
        }
        Ok(index - 1)
    }
}

impl FromIterator<EffectSpec> for EffectStack {
    fn from_iter<T: IntoIterator<Item = EffectSpec>>(iter: T) -> Self {
        Self {
            effects: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(tags: &[&str]) -> EffectStack {
        tags.iter().map(|tag| EffectSpec::new(*tag)).collect()
    }

    fn tags(stack: &EffectStack) -> Vec<&str> {
        stack.list().iter().map(|effect| effect.tag.as_str()).collect()
    }

    #[test]
    fn remove_compacts_following_indices() {
        let mut effects = stack(&["blur", "sepia", "gamma", "crop"]);
        let (removed, remap) = effects.remove(2).expect("index 2 exists");

        assert_eq!(removed.tag, "sepia");
        assert_eq!(tags(&effects), ["blur", "gamma", "crop"]);
        assert_eq!(remap.removed, Some(2));
        assert_eq!(remap.moved, vec![(3, 2), (4, 3)]);
        assert_eq!(remap.resolve(1), Some(1));
        assert_eq!(remap.resolve(2), None);
        assert_eq!(remap.resolve(4), Some(3));
    }

    #[test]
    fn move_forward_and_backward() {
        let mut effects = stack(&["a", "b", "c", "d"]);
        let remap = effects.move_to(1, 3).expect("valid move");
        assert_eq!(tags(&effects), ["b", "c", "a", "d"]);
        assert_eq!(remap.moved, vec![(1, 3), (2, 1), (3, 2)]);

        let remap = effects.move_to(4, 1).expect("valid move");
        assert_eq!(tags(&effects), ["d", "b", "c", "a"]);
        assert_eq!(remap.resolve(4), Some(1));
        assert_eq!(remap.resolve(1), Some(2));
        assert_eq!(remap.resolve(3), Some(4));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut effects = stack(&["a"]);
        assert_eq!(
            effects.remove(0),
            Err(EditError::EffectNotFound { index: 0, len: 1 })
        );
        assert!(effects.move_to(1, 2).is_err());
        assert!(effects.move_to(1, 1).expect("noop move").is_empty());
    }

    #[test]
    fn edit_merges_or_replaces() {
        let mut effects = EffectStack::new();
        let index = effects.add(EffectSpec::new("brightness").with_param("level", "1.0"));
        effects
            .edit(
                index,
                BTreeMap::from([("gamma".to_string(), "2.2".to_string())]),
                false,
            )
            .expect("edit should succeed");
        assert_eq!(effects.get(index).map(|effect| effect.params.len()), Some(2));

        effects
            .edit(index, BTreeMap::new(), true)
            .expect("replace should succeed");
        assert!(effects.get(index).is_some_and(|effect| effect.params.is_empty()));
    }
}
