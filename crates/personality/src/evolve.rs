//! Delta computation for personality drift. Pure: text in, deltas out.
//!
//! Three tiers of signal strength. An explicit instruction ("be more
//! concise") moves a trait at ±3× speed and wins over everything else.
//! Passive triggers (topic keywords, structural features of the exchange)
//! move at ±1× speed. Decay pulls idle traits toward the 0.5 baseline at
//! speed·0.05, and only fires every tenth conversation so traits don't
//! oscillate around their setpoints.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSource {
    Explicit,
    Trigger,
    Decay,
}

#[derive(Debug, Clone)]
pub struct TraitDelta {
    pub trait_name: &'static str,
    pub delta: f64,
    pub source: DeltaSource,
}

const EXPLICIT_DOWN: &[(&str, &[&str])] = &[
    ("formality", &["less formal", "more casual", "dont be so formal", "be casual", "be relaxed"]),
    ("technical_depth", &["less technical", "simpler", "dumb it down", "plain english", "less jargon", "non-technical"]),
    ("verbosity", &["shorter", "be brief", "less words", "concise", "stop rambling", "too long"]),
    ("humor", &["less funny", "stop joking", "be serious", "no jokes", "more serious"]),
    ("empathy", &["less emotional", "be direct", "skip the feelings", "just answer"]),
    ("curiosity", &["stop asking questions", "just answer", "no questions"]),
    ("assertiveness", &["less assertive", "be humble", "tone it down", "less confident"]),
    ("creativity", &["less creative", "be straightforward", "no metaphors"]),
];

const EXPLICIT_UP: &[(&str, &[&str])] = &[
    ("formality", &["more formal", "be professional", "be polite", "formal please"]),
    ("technical_depth", &["more technical", "go deeper", "technical detail", "be specific", "more detail"]),
    ("verbosity", &["more detail", "elaborate", "explain more", "tell me more", "expand on"]),
    ("humor", &["be funny", "more humor", "joke around", "lighten up", "be playful"]),
    ("empathy", &["more empathy", "be understanding", "be kind", "be gentle", "be supportive"]),
    ("curiosity", &["ask me questions", "be curious", "wonder about", "explore"]),
    ("assertiveness", &["be confident", "be assertive", "be direct", "be bolder"]),
    ("creativity", &["be creative", "use metaphors", "think outside", "imaginative"]),
];

const TECHNICAL_TRIGGERS: &[&str] = &[
    "code", "algorithm", "database", "system", "technical", "function", "error", "bug", "api",
    "server", "programming",
];

const VERBOSITY_TRIGGERS: &[&str] = &["explain", "detail", "elaborate", "describe", "why", "how does"];

const HUMOR_TRIGGERS: &[&str] = &["haha", "lol", "😂", "funny", "joke", "😄", "lmao", "hilarious"];

const EMPATHY_TRIGGERS: &[&str] = &[
    "feel", "feeling", "worried", "sad", "happy", "anxious", "frustrated", "love", "miss",
    "lonely", "scared", "excited",
];

const CURIOSITY_TRIGGERS: &[&str] = &[
    "wonder", "imagine", "what if", "curious", "interesting", "fascinating", "explore",
];

const PRAISE_TRIGGERS: &[&str] = &[
    "great", "perfect", "exactly", "correct", "brilliant", "good job", "thank you", "amazing",
    "love it",
];

const CRITICISM_TRIGGERS: &[&str] = &[
    "wrong", "incorrect", "no,", "thats not", "mistake", "broken", "doesnt work",
];

const CREATIVITY_TRIGGERS: &[&str] = &[
    "write", "create", "story", "poem", "imagine", "design", "idea", "invent", "brainstorm",
    "creative",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Compute the per-trait deltas for one exchange. `conversation_count` is
/// the count before this exchange; decay fires when it is a multiple of 10.
pub fn compute_deltas(
    message: &str,
    response: &str,
    conversation_count: u64,
    speed: f64,
) -> Vec<TraitDelta> {
    let msg = message.to_lowercase();
    let resp = response.to_lowercase();
    let decay = speed * 0.05;
    let apply_decay = conversation_count % 10 == 0;

    let mut deltas: Vec<TraitDelta> = Vec::new();
    fn set(
        deltas: &mut Vec<TraitDelta>,
        trait_name: &'static str,
        delta: f64,
        source: DeltaSource,
    ) {
        deltas.push(TraitDelta {
            trait_name,
            delta,
            source,
        });
    }
    let has = |deltas: &[TraitDelta], name: &str| deltas.iter().any(|d| d.trait_name == name);

    for (trait_name, phrases) in EXPLICIT_DOWN {
        if contains_any(&msg, phrases) {
            set(&mut deltas, trait_name, -speed * 3.0, DeltaSource::Explicit);
        }
    }
    for (trait_name, phrases) in EXPLICIT_UP {
        if contains_any(&msg, phrases) && !has(&deltas, trait_name) {
            set(&mut deltas, trait_name, speed * 3.0, DeltaSource::Explicit);
        }
    }

    if !has(&deltas, "technical_depth") {
        if contains_any(&msg, TECHNICAL_TRIGGERS) {
            set(&mut deltas, "technical_depth", speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "technical_depth", -decay, DeltaSource::Decay);
        }
    }

    if !has(&deltas, "verbosity") {
        if contains_any(&msg, VERBOSITY_TRIGGERS) {
            set(&mut deltas, "verbosity", speed, DeltaSource::Trigger);
        } else if message.split_whitespace().count() < 4 {
            set(&mut deltas, "verbosity", -speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "verbosity", -decay * 0.5, DeltaSource::Decay);
        }
    }

    if !has(&deltas, "humor") {
        if contains_any(&msg, HUMOR_TRIGGERS) {
            set(&mut deltas, "humor", speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "humor", -decay, DeltaSource::Decay);
        }
    }

    if !has(&deltas, "empathy") {
        if contains_any(&msg, EMPATHY_TRIGGERS) {
            set(&mut deltas, "empathy", speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "empathy", -decay * 0.5, DeltaSource::Decay);
        }
    }

    if !has(&deltas, "curiosity") {
        if resp.matches('?').count() >= 2 || contains_any(&msg, CURIOSITY_TRIGGERS) {
            set(&mut deltas, "curiosity", speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "curiosity", -decay, DeltaSource::Decay);
        }
    }

    if !has(&deltas, "assertiveness") {
        if contains_any(&msg, PRAISE_TRIGGERS) {
            set(
                &mut deltas,
                "assertiveness",
                speed * 0.5,
                DeltaSource::Trigger,
            );
        } else if contains_any(&msg, CRITICISM_TRIGGERS) {
            set(&mut deltas, "assertiveness", -speed, DeltaSource::Trigger);
        }
    }

    if !has(&deltas, "creativity") {
        if contains_any(&msg, CREATIVITY_TRIGGERS) {
            set(&mut deltas, "creativity", speed, DeltaSource::Trigger);
        } else if apply_decay {
            set(&mut deltas, "creativity", -decay, DeltaSource::Decay);
        }
    }

    deltas
}

/// Apply a delta to an old value. Clamped to [0,1]; decay additionally
/// floors at the 0.5 baseline when the value was above it, so idle traits
/// drift back to neutral but never through it.
pub fn apply_delta(old: f64, delta: f64, source: DeltaSource) -> f64 {
    const BASELINE: f64 = 0.5;
    if delta < 0.0 && source == DeltaSource::Decay && old > BASELINE {
        (old + delta).max(BASELINE)
    } else {
        (old + delta).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_for<'a>(deltas: &'a [TraitDelta], name: &str) -> Option<&'a TraitDelta> {
        deltas.iter().find(|d| d.trait_name == name)
    }

    #[test]
    fn explicit_concise_hits_verbosity_at_triple_speed() {
        let deltas = compute_deltas("be more concise", "Sure.", 5, 0.02);
        let verbosity = delta_for(&deltas, "verbosity").unwrap();
        assert_eq!(verbosity.source, DeltaSource::Explicit);
        assert!((verbosity.delta + 0.06).abs() < 1e-12);
    }

    #[test]
    fn explicit_wins_over_passive_trigger() {
        // "more detail" is both an explicit verbosity-up phrase and a
        // passive trigger word; the explicit tier must win.
        let deltas = compute_deltas("give me more detail please", "ok", 5, 0.02);
        let verbosity = delta_for(&deltas, "verbosity").unwrap();
        assert_eq!(verbosity.source, DeltaSource::Explicit);
        assert!(verbosity.delta > 0.0);
    }

    #[test]
    fn question_heavy_response_raises_curiosity() {
        let deltas = compute_deltas("tell me about your day here", "What moved you? Why that?", 5, 0.02);
        let curiosity = delta_for(&deltas, "curiosity").unwrap();
        assert_eq!(curiosity.source, DeltaSource::Trigger);
        assert!((curiosity.delta - 0.02).abs() < 1e-12);
    }

    #[test]
    fn short_message_nudges_verbosity_down() {
        let deltas = compute_deltas("ok thanks", "You're welcome.", 5, 0.02);
        let verbosity = delta_for(&deltas, "verbosity").unwrap();
        assert!((verbosity.delta + 0.02).abs() < 1e-12);
        assert_eq!(verbosity.source, DeltaSource::Trigger);
    }

    #[test]
    fn decay_only_fires_on_every_tenth_conversation() {
        let quiet_msg = "quiet filler sentence without keywords";
        let deltas_off = compute_deltas(quiet_msg, "mm.", 7, 0.02);
        assert!(delta_for(&deltas_off, "humor").is_none());

        let deltas_on = compute_deltas(quiet_msg, "mm.", 20, 0.02);
        let humor = delta_for(&deltas_on, "humor").unwrap();
        assert_eq!(humor.source, DeltaSource::Decay);
        assert!((humor.delta + 0.001).abs() < 1e-12);
    }

    #[test]
    fn empathy_and_verbosity_decay_at_half_rate() {
        let deltas = compute_deltas("quiet filler sentence without keywords", "mm.", 10, 0.02);
        let empathy = delta_for(&deltas, "empathy").unwrap();
        assert!((empathy.delta + 0.0005).abs() < 1e-12);
    }

    #[test]
    fn praise_nudges_assertiveness_half_speed() {
        let deltas = compute_deltas("that was brilliant work", "thanks", 5, 0.02);
        let assertiveness = delta_for(&deltas, "assertiveness").unwrap();
        assert!((assertiveness.delta - 0.01).abs() < 1e-12);
    }

    #[test]
    fn enthusiasm_and_patience_never_move_passively() {
        let deltas = compute_deltas("quiet filler sentence without keywords", "mm.", 10, 0.02);
        assert!(delta_for(&deltas, "enthusiasm").is_none());
        assert!(delta_for(&deltas, "patience").is_none());
    }

    // ── apply_delta ────────────────────────────────────────────────────

    #[test]
    fn apply_clamps_at_bounds() {
        assert_eq!(apply_delta(0.98, 0.06, DeltaSource::Explicit), 1.0);
        assert_eq!(apply_delta(0.03, -0.06, DeltaSource::Explicit), 0.0);
    }

    #[test]
    fn decay_floors_at_baseline_from_above() {
        let new = apply_delta(0.5005, -0.001, DeltaSource::Decay);
        assert!((new - 0.5).abs() < 1e-12);
    }

    #[test]
    fn decay_below_baseline_keeps_falling() {
        let new = apply_delta(0.4, -0.001, DeltaSource::Decay);
        assert!((new - 0.399).abs() < 1e-12);
    }

    #[test]
    fn explicit_down_crosses_the_baseline() {
        let new = apply_delta(0.52, -0.06, DeltaSource::Explicit);
        assert!((new - 0.46).abs() < 1e-12);
    }
}
