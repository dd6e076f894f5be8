use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::PromptId;

/// Upper bound for a prompt weight (the range a controller knob sweeps).
pub const MAX_PROMPT_WEIGHT: f32 = 2.0;

/// A text prompt steering the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_id: PromptId,
    pub text: String,
    pub weight: f32,
    /// Display color as `#rrggbb`.
    pub color: String,
    /// MIDI CC number bound to this prompt's weight, if any.
    pub controller_binding: Option<u8>,
}

impl Prompt {
    pub fn new(
        prompt_id: PromptId,
        text: impl Into<String>,
        weight: f32,
        color: impl Into<String>,
    ) -> Self {
        Self {
            prompt_id,
            text: text.into(),
            weight: clamp_weight(weight),
            color: color.into(),
            controller_binding: None,
        }
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = clamp_weight(weight);
    }
}

fn clamp_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, MAX_PROMPT_WEIGHT)
    }
}

/// The `{text, weight}` pair pushed to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f32,
}

/// Prompts keyed by id. Ordering only matters to the UI; the engine treats
/// this as an unordered map and receives it as an immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSet {
    prompts: BTreeMap<PromptId, Prompt>,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prompt: Prompt) -> Option<Prompt> {
        self.prompts.insert(prompt.prompt_id.clone(), prompt)
    }

    pub fn remove(&mut self, id: &PromptId) -> Option<Prompt> {
        self.prompts.remove(id)
    }

    pub fn get(&self, id: &PromptId) -> Option<&Prompt> {
        self.prompts.get(id)
    }

    pub fn get_mut(&mut self, id: &PromptId) -> Option<&mut Prompt> {
        self.prompts.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.values()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Find the prompt bound to a MIDI controller number.
    pub fn bound_to(&self, controller: u8) -> Option<&Prompt> {
        self.prompts
            .values()
            .find(|p| p.controller_binding == Some(controller))
    }

    /// Prompts with a nonzero weight whose text has not been filtered,
    /// projected to what the service expects.
    pub fn active_prompts(&self, filtered: &FilteredTextSet) -> Vec<WeightedPrompt> {
        self.prompts
            .values()
            .filter(|p| p.weight != 0.0 && !filtered.contains(&p.text))
            .map(|p| WeightedPrompt {
                text: p.text.clone(),
                weight: p.weight,
            })
            .collect()
    }
}

impl FromIterator<Prompt> for PromptSet {
    fn from_iter<I: IntoIterator<Item = Prompt>>(iter: I) -> Self {
        let mut set = PromptSet::new();
        for prompt in iter {
            set.insert(prompt);
        }
        set
    }
}

/// Prompt texts the service refused. Only grows for the lifetime of a
/// session; a new session starts with an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredTextSet {
    texts: HashSet<String>,
}

impl FilteredTextSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the text was not already filtered.
    pub fn insert(&mut self, text: impl Into<String>) -> bool {
        self.texts.insert(text.into())
    }

    pub fn contains(&self, text: &str) -> bool {
        self.texts.contains(text)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn clear(&mut self) {
        self.texts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(id: &str, text: &str, weight: f32) -> Prompt {
        Prompt::new(PromptId::new(id), text, weight, "#ffffff")
    }

    #[test]
    fn active_view_skips_zero_weight() {
        let set: PromptSet = vec![prompt("a", "Bossa Nova", 1.0), prompt("b", "Chillwave", 0.0)]
            .into_iter()
            .collect();

        let active = set.active_prompts(&FilteredTextSet::new());
        assert_eq!(
            active,
            vec![WeightedPrompt {
                text: "Bossa Nova".to_string(),
                weight: 1.0
            }]
        );
    }

    #[test]
    fn active_view_skips_filtered_text() {
        let set: PromptSet = vec![prompt("a", "Bossa Nova", 1.0), prompt("b", "Thrash", 0.5)]
            .into_iter()
            .collect();
        let mut filtered = FilteredTextSet::new();
        filtered.insert("Thrash");

        let active = set.active_prompts(&filtered);
        assert_eq!(active.len(), 1);
        assert!(active.iter().all(|p| p.text != "Thrash"));
    }

    #[test]
    fn weight_is_clamped() {
        let mut p = prompt("a", "Funk", 5.0);
        assert_eq!(p.weight, MAX_PROMPT_WEIGHT);
        p.set_weight(-1.0);
        assert_eq!(p.weight, 0.0);
        p.set_weight(f32::NAN);
        assert_eq!(p.weight, 0.0);
    }

    #[test]
    fn bound_to_finds_controller() {
        let mut p = prompt("a", "Funk", 1.0);
        p.controller_binding = Some(21);
        let set: PromptSet = vec![p, prompt("b", "Dubstep", 1.0)].into_iter().collect();

        assert_eq!(set.bound_to(21).map(|p| p.text.as_str()), Some("Funk"));
        assert!(set.bound_to(22).is_none());
    }

    #[test]
    fn filtered_set_reports_new_insertions() {
        let mut filtered = FilteredTextSet::new();
        assert!(filtered.insert("K Pop"));
        assert!(!filtered.insert("K Pop"));
        assert_eq!(filtered.len(), 1);
        filtered.clear();
        assert!(filtered.is_empty());
    }
}
