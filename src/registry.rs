use std::collections::HashMap;

use crate::types::StimulusDefinition;

#[derive(Debug, Clone, PartialEq)]
pub struct TestEntry {
    pub stimuli: Vec<StimulusDefinition>,
    pub max_difficulty: f64,
}

impl TestEntry {
    pub fn new(stimuli: Vec<StimulusDefinition>) -> Self {
        let max_difficulty = max_difficulty(&stimuli);
        Self {
            stimuli,
            max_difficulty,
        }
    }

    /// Difficulty on a 0..1 scale relative to the hardest stimulus in the test.
    pub fn normalized(&self, difficulty: f64) -> f64 {
        if self.max_difficulty > 0.0 {
            difficulty / self.max_difficulty
        } else {
            difficulty
        }
    }
}

fn max_difficulty(stimuli: &[StimulusDefinition]) -> f64 {
    let max = stimuli
        .iter()
        .map(|s| s.difficulty)
        .fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() && max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Static stimulus catalog keyed by test id, kept in first-registration order.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    order: Vec<String>,
    entries: HashMap<String, TestEntry>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `stimuli` is empty and nothing was stored.
    /// Re-registering a test replaces its entry but keeps its position.
    pub fn register(&mut self, test_id: &str, stimuli: Vec<StimulusDefinition>) -> bool {
        if stimuli.is_empty() {
            return false;
        }
        let entry = TestEntry::new(stimuli);
        if self.entries.insert(test_id.to_string(), entry).is_none() {
            self.order.push(test_id.to_string());
        }
        true
    }

    pub fn get(&self, test_id: &str) -> Option<&TestEntry> {
        self.entries.get(test_id)
    }

    pub fn test_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered tests restricted to `allowed` (all when `None`), in
    /// registration order. Unknown ids in `allowed` are skipped.
    pub fn iter_allowed<'a>(
        &'a self,
        allowed: Option<&'a [String]>,
    ) -> impl Iterator<Item = (&'a str, &'a TestEntry)> + 'a {
        self.order
            .iter()
            .filter(move |id| allowed.map_or(true, |list| list.iter().any(|a| a == *id)))
            .filter_map(move |id| self.entries.get(id).map(|entry| (id.as_str(), entry)))
    }
}
