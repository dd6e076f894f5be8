//! The default prompt bank: sixteen genres and textures, one knob each.

use promptdj_types::{Prompt, PromptId, PromptSet};

const TEXTS: [&str; 16] = [
    "Bossa Nova",
    "Chillwave",
    "Drum and Bass",
    "Post Punk",
    "Shoegaze",
    "Funk",
    "Chiptune",
    "Lush Strings",
    "Sparkling Arpeggios",
    "Staccato Rhythms",
    "Punchy Kick",
    "Dubstep",
    "K Pop",
    "Neo Soul",
    "Trip Hop",
    "Thrash",
];

const COLORS: [&str; 8] = [
    "#9900ff", "#5200ff", "#ff25f6", "#2af6de", "#ffdd28", "#3dffab", "#d8ff3e", "#d9b2ff",
];

/// How many prompts start out audible.
pub const STARTING_ACTIVE: usize = 3;

/// Build the bank. Prompt `i` is bound to CC `i`; `seed` picks which
/// prompts start at weight 1.
pub fn default_prompts(seed: u64) -> PromptSet {
    let active = pick_starting(seed);
    TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let weight = if active.contains(&i) { 1.0 } else { 0.0 };
            let mut prompt = Prompt::new(
                PromptId::new(format!("prompt-{}", i)),
                *text,
                weight,
                COLORS[i % COLORS.len()],
            );
            prompt.controller_binding = Some(i as u8);
            prompt
        })
        .collect()
}

/// Distinct indices from a small LCG.
fn pick_starting(seed: u64) -> Vec<usize> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut picked = Vec::with_capacity(STARTING_ACTIVE);
    while picked.len() < STARTING_ACTIVE {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let idx = ((state >> 33) % TEXTS.len() as u64) as usize;
        if !picked.contains(&idx) {
            picked.push(idx);
        }
    }
    picked
}
