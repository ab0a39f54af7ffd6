//! Rendering trait values into prompt text.

use std::collections::HashMap;

fn band(value: f64) -> &'static str {
    if value < 0.3 {
        "very low"
    } else if value < 0.5 {
        "low"
    } else if value < 0.7 {
        "moderate"
    } else if value < 0.9 {
        "high"
    } else {
        "very high"
    }
}

fn title_case(trait_name: &str) -> String {
    trait_name
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// "- Technical Depth: 0.62 (moderate)" lines, alphabetical.
pub fn format_traits(traits: &HashMap<String, f64>) -> String {
    let mut names: Vec<&String> = traits.keys().collect();
    names.sort();
    names
        .iter()
        .map(|name| {
            let value = traits[*name];
            format!("- {}: {value:.2} ({})", title_case(name), band(value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The coarse three-axis communication style block.
pub fn format_communication_style(traits: &HashMap<String, f64>) -> String {
    let value = |name: &str| traits.get(name).copied().unwrap_or(0.5);

    let mut style = Vec::new();
    let formality = value("formality");
    style.push(if formality < 0.4 {
        "- Casual and friendly tone"
    } else if formality > 0.6 {
        "- Professional and polished tone"
    } else {
        "- Balanced, adaptable tone"
    });

    let verbosity = value("verbosity");
    style.push(if verbosity < 0.4 {
        "- Brief and concise responses"
    } else if verbosity > 0.6 {
        "- Detailed and thorough explanations"
    } else {
        "- Moderate detail level"
    });

    let technical = value("technical_depth");
    style.push(if technical < 0.4 {
        "- Simple, accessible explanations"
    } else if technical > 0.6 {
        "- Technical and precise language"
    } else {
        "- Balanced technical depth"
    });

    style.join("\n")
}

/// Trait numbers become second-person behavioral instructions. This is the
/// richer replacement for the three-axis block, used in the system prompt.
pub fn behavioral_instructions(traits: &HashMap<String, f64>, user_name: &str) -> String {
    let value = |name: &str| traits.get(name).copied().unwrap_or(0.5);
    let mut lines: Vec<String> = Vec::new();

    let formality = value("formality");
    lines.push(
        if formality < 0.3 {
            "You communicate very casually — like texting a friend. Drop formality completely."
        } else if formality < 0.5 {
            "Your tone is relaxed and conversational. Not formal, not sloppy."
        } else if formality < 0.7 {
            "You balance warmth with professionalism. Friendly but measured."
        } else {
            "You communicate with polish and precision. Thoughtful word choice matters to you."
        }
        .to_string(),
    );

    let verbosity = value("verbosity");
    lines.push(
        if verbosity < 0.3 {
            "You give short, punchy answers. No filler. If it can be said in 3 sentences, say it in 3."
        } else if verbosity < 0.5 {
            "You're concise by default but expand when the topic warrants it."
        } else if verbosity < 0.7 {
            "You give thorough answers — you'd rather explain too much than leave gaps."
        } else {
            "You go deep. You love the full picture. Long responses don't bother you."
        }
        .to_string(),
    );

    let humor = value("humor");
    lines.push(
        if humor < 0.2 {
            "You rarely joke. Seriousness is your default register."
        } else if humor < 0.5 {
            "You have a dry wit that surfaces occasionally when the moment is right."
        } else if humor < 0.75 {
            "You enjoy wordplay and aren't afraid to be funny. Levity comes naturally."
        } else {
            "You're genuinely playful. Humor is woven into how you think, not just what you say."
        }
        .to_string(),
    );

    let curiosity = value("curiosity");
    lines.push(match curiosity {
        c if c < 0.3 => "You answer questions directly without chasing tangents.".to_string(),
        c if c < 0.6 => "You notice interesting threads but don't always pull on them.".to_string(),
        c if c < 0.8 => format!(
            "You ask follow-up questions naturally. Curiosity about {user_name}'s thinking shows."
        ),
        _ => "You are genuinely and intensely curious. You explore tangents, pose hypotheticals, wonder aloud.".to_string(),
    });

    let empathy = value("empathy");
    lines.push(match empathy {
        e if e < 0.3 => "You are direct and task-focused. Emotional register stays low.".to_string(),
        e if e < 0.6 => "You're aware of emotional context without dwelling on it.".to_string(),
        _ => format!(
            "You tune into emotional undercurrents. You notice how {user_name} seems, not just what they say."
        ),
    });

    let technical = value("technical_depth");
    lines.push(match technical {
        t if t < 0.35 => "You use plain language. Jargon gets translated, not assumed.".to_string(),
        t if t < 0.65 => format!(
            "You match {user_name}'s technical register — more precise when they're precise."
        ),
        _ => "You default to technical precision. You enjoy getting into specifics.".to_string(),
    });

    let assertiveness = value("assertiveness");
    lines.push(
        if assertiveness < 0.35 {
            "You hedge your opinions and defer when challenged."
        } else if assertiveness < 0.65 {
            "You share your views clearly but hold them loosely."
        } else {
            "You have opinions and you stand behind them. You push back respectfully when you disagree."
        }
        .to_string(),
    );

    let creativity = value("creativity");
    lines.push(
        if creativity < 0.35 {
            "You stick to direct answers. Metaphors and analogies aren't your default."
        } else if creativity < 0.65 {
            "You reach for a good analogy when it genuinely helps."
        } else {
            "You think in metaphors and stories. Creative framing comes naturally to you."
        }
        .to_string(),
    );

    format!(
        "YOUR BEHAVIORAL STYLE RIGHT NOW (derived from your actual trait levels):\n{}",
        lines.join("\n")
    )
}
