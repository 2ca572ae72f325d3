//! Deterministic offline drafts used when no provider answers.
//!
//! Output depends only on `(domain, instruction, context_len)`. Choices are
//! driven by a SHA-256 digest of those inputs, so the same request produces
//! byte-identical text in every process.

use sha2::{Digest, Sha256};

use super::prompts::Domain;

pub const MAX_OFFLINE_CHARS: usize = 4000;
pub const OFFLINE_NOTICE: &str = "AI unavailable: set OPENAI_API_KEY for live responses.";

const MAX_PREMISE_CHARS: usize = 240;

const GENRES: &[&str] = &["Sci-Fi", "Thriller", "Drama", "Mystery", "Action", "Comedy"];
const TONES: &[&str] = &["Hopeful", "Dark", "Bittersweet", "Urgent", "Whimsical"];
const CAMERA_STYLES: &[&str] = &[
    "Handheld energy",
    "Steady cinematic",
    "Slow dolly",
    "Wide tableau",
    "Tight intimate closeups",
];
const PALETTES: &[&str] = &[
    "Neon cyan + amber",
    "Muted earth + steel",
    "Cold blue + white",
    "Warm tungsten + shadow",
    "High contrast monochrome",
];
const PIVOTS: &[&str] = &[
    "a leaked recording",
    "a failed rehearsal",
    "an impossible deadline",
    "an anonymous message",
    "a missing memory shard",
    "a locked archive",
];
const COSTS: &[&str] = &[
    "trust",
    "time",
    "reputation",
    "the team dynamic",
    "their backup plan",
];
const OBSTACLES: &[&str] = &[
    "a corrupted control grid",
    "a traitor on comms",
    "a storm that will not break",
    "a rival crew with better funding",
    "a secret the lead cannot say aloud",
];
const CAMERA_TEMPLATES: &[&str] = &[
    "Wide establish",
    "Medium push-in",
    "Over-shoulder",
    "Close-up",
    "Tracking shot",
    "Locked final composition",
];
const SOUND_TEMPLATES: &[&str] = &[
    "Low atmosphere, distant mechanical hum.",
    "Pulse percussion starts under room tone.",
    "Sharp transient cue then ambient ducking.",
    "Breathing detail and cloth movement.",
    "Rising tonal swell with warning beeps.",
    "Silence before one signature final sound.",
];
const PACING_PRESETS: &[&str] = &["Fast", "Balanced", "Slow burn"];

/// Keywords that flag a known edit issue, paired with the note it produces.
const ISSUE_RULES: &[(&[&str], &str)] = &[
    (
        &["dialogue", "muddy", "audio", "mumble"],
        "Denoise dialogue and add a 2-3 kHz presence boost for clarity.",
    ),
    (
        &["slow", "drag", "middle", "boring"],
        "Trim 15-20% from the midpoint beat and replace one transition with a hard cut.",
    ),
    (
        &["flat", "dull", "grade", "colour", "color"],
        "Add contrast curve and separate subject/background with selective saturation.",
    ),
    (
        &["geography", "confus", "orient", "lost"],
        "Insert one orienting wide shot before the conflict peak.",
    ),
    (
        &["ending", "finale", "climax", "impact"],
        "Add a 1-2 second hold after the impact moment.",
    ),
];

/// Produce the offline draft for a request. Never fails and never exceeds
/// [`MAX_OFFLINE_CHARS`].
pub fn generate(domain: Domain, instruction: &str, context_len: usize) -> String {
    let premise = normalise_premise(instruction);
    let mut seed = Seed::new(domain, &premise, context_len);
    let body = match domain {
        Domain::Script => script_pack(&premise, &mut seed),
        Domain::Storyboard => storyboard(&premise, &mut seed),
        Domain::Video => edit_notes(&premise, &mut seed),
    };

    let mut out = String::new();
    if context_len > 0 {
        out.push_str(&format!(
            "_Continuing from {context_len} earlier turn{}._\n\n",
            if context_len == 1 { "" } else { "s" }
        ));
    }
    out.push_str(&body);
    out.push_str("\n\n---\n");
    out.push_str(OFFLINE_NOTICE);
    truncate_chars(&out, MAX_OFFLINE_CHARS)
}

fn script_pack(premise: &str, seed: &mut Seed) -> String {
    let genre = seed.pick(GENRES);
    let tone = seed.pick(TONES);
    let obstacle = seed.pick(OBSTACLES);
    let reveal = seed.pick(PIVOTS);
    let cost = seed.pick(COSTS);
    let energy = seed.range(40, 90);
    let pace = seed.range(40, 90);

    let logline = format!(
        "A {} {} short film about {premise}, where {obstacle} threatens to break the mission.",
        tone.to_lowercase(),
        genre.to_lowercase(),
    );
    let beats = [
        "Opening image: show the world and emotional weather in one striking visual.".to_string(),
        "Setup: establish what the protagonist wants and why now.".to_string(),
        "Catalyst: a disruption forces a decision.".to_string(),
        format!("Debate: the team hesitates after {reveal}."),
        "Break into action: the plan starts moving fast.".to_string(),
        format!("Midpoint: a partial win raises stakes and costs {cost}."),
        "All is lost: the core strategy collapses.".to_string(),
        "Finale: rebuild from truth, execute a riskier final move, and resolve the arc.".to_string(),
    ];

    let mut lines = vec!["### Logline".to_string(), logline, String::new()];
    lines.push("### 8-Beat Outline".to_string());
    for (idx, beat) in beats.iter().enumerate() {
        lines.push(format!("{}. {beat}", idx + 1));
    }
    lines.push(String::new());
    lines.push("### Scene Excerpt".to_string());
    lines.push("```text".to_string());
    lines.push("INT. MAKESHIFT CONTROL ROOM - NIGHT".to_string());
    lines.push(String::new());
    lines.push("THE LEAD stares at the monitor wall. A timer bleeds red in the corner.".to_string());
    lines.push(String::new());
    lines.push("THE LEAD".to_string());
    lines.push("If we miss this window, we lose everything.".to_string());
    lines.push(String::new());
    lines.push("PARTNER".to_string());
    lines.push("Then we do not miss.".to_string());
    lines.push(String::new());
    lines.push("The room hums. Then silence. The first alarm begins to ring.".to_string());
    lines.push(String::new());
    lines.push(format!(
        "Tone target: {tone}. Energy: {energy}/100. Pace: {pace}/100."
    ));
    lines.push("```".to_string());
    lines.join("\n")
}

fn storyboard(premise: &str, seed: &mut Seed) -> String {
    let style = seed.pick(CAMERA_STYLES).to_lowercase();
    let palette = seed.pick(PALETTES).to_lowercase();
    let frame_count = seed.range(4, 6) as usize;
    let base: String = premise.chars().take(180).collect();

    let mut rows = vec![
        "### Shot Grid".to_string(),
        "| Frame | Camera | Visual | Sound |".to_string(),
        "|---|---|---|---|".to_string(),
    ];
    for idx in 0..frame_count {
        let camera = CAMERA_TEMPLATES[idx % CAMERA_TEMPLATES.len()];
        let sound = SOUND_TEMPLATES[idx % SOUND_TEMPLATES.len()];
        rows.push(format!(
            "| {} | {camera} ({style}) | {base}. Decision tension is staged with {palette} accents. | {sound} |",
            idx + 1
        ));
    }
    rows.push(String::new());
    rows.push("### Continuity Guardrails".to_string());
    rows.push("- Keep eye-line direction consistent from frame 2 onward.".to_string());
    rows.push("- Use one repeating color accent to anchor tone.".to_string());
    rows.push(
        "- Reserve the clearest composition for the final consequence frame.".to_string(),
    );
    rows.join("\n")
}

fn edit_notes(premise: &str, seed: &mut Seed) -> String {
    let pacing = seed.pick(PACING_PRESETS);
    let energy = seed.range(40, 90);
    let pace = seed.range(40, 90);
    let lowered = premise.to_lowercase();

    let mut notes = vec![
        format!("Pacing preset: {pacing}. Prioritize {lowered} in the first 45 seconds."),
        format!("Rhythm target: energy {energy}/100, pace {pace}/100."),
        "Front-load the strongest visual by moving it into the first 10 seconds.".to_string(),
        "Use L-cuts to keep momentum through exposition lines.".to_string(),
    ];
    for (keywords, note) in ISSUE_RULES {
        if keywords.iter().any(|k| lowered.contains(k)) {
            notes.push((*note).to_string());
        }
    }

    let mut lines = vec!["### Edit Notes".to_string()];
    for (idx, note) in notes.iter().enumerate() {
        lines.push(format!("{}. {note}", idx + 1));
    }
    lines.join("\n")
}

fn normalise_premise(instruction: &str) -> String {
    let collapsed = instruction.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(['.', '!', '?']);
    if trimmed.is_empty() {
        "a high-stakes decision under pressure".to_string()
    } else {
        trimmed.chars().take(MAX_PREMISE_CHARS).collect()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Byte stream drawn from a SHA-256 digest; re-hashes when exhausted.
struct Seed {
    digest: [u8; 32],
    cursor: usize,
}

impl Seed {
    fn new(domain: Domain, premise: &str, context_len: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(premise.to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(context_len.to_le_bytes());
        Self {
            digest: hasher.finalize().into(),
            cursor: 0,
        }
    }

    fn next_u16(&mut self) -> u16 {
        if self.cursor + 2 > self.digest.len() {
            self.digest = Sha256::digest(self.digest).into();
            self.cursor = 0;
        }
        let value = u16::from_le_bytes([self.digest[self.cursor], self.digest[self.cursor + 1]]);
        self.cursor += 2;
        value
    }

    fn pick<'a>(&mut self, options: &[&'a str]) -> &'a str {
        options[self.next_u16() as usize % options.len()]
    }

    /// Inclusive range.
    fn range(&mut self, low: u16, high: u16) -> u16 {
        low + self.next_u16() % (high - low + 1)
    }
}
