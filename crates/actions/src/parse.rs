//! Pure parsers over the assistant response: fenced code blocks, the two
//! literal trigger phrases, the email commitment check, and creative-mode
//! classification. Trigger phrases are bit-exact and case-sensitive; the
//! pipeline strips them from the user-visible reply after detection.

use std::sync::OnceLock;

use regex::Regex;

pub const MOLTBOOK_TRIGGER: &str = "MOLTBOOK_POST_NOW:";
pub const IMAGE_TRIGGER: &str = "IMAGE_GEN_NOW:";

/// Exact phrases that commit the assistant to actually sending an email.
pub const EMAIL_COMMITMENT_PHRASES: &[&str] = &[
    "I'll send the email now",
    "Sending the email",
    "Email sent",
    "I've sent the email",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("static regex"))
}

/// Fenced code blocks with their (lowercased) language tags. Blocks with
/// empty bodies are dropped; a missing tag becomes "text".
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    code_fence_re()
        .captures_iter(text)
        .filter_map(|capture| {
            let content = capture[2].trim().to_string();
            if content.is_empty() {
                return None;
            }
            let language = capture[1].to_lowercase();
            Some(CodeBlock {
                language: if language.is_empty() { "text".to_string() } else { language },
                content,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialPost {
    pub title: String,
    pub body: String,
}

/// Find and remove a `MOLTBOOK_POST_NOW:` trigger. The preferred one-line
/// form carries `title | body`; the fallback form takes the title on the
/// trigger line and the body on following lines, terminated by a blank
/// line or end of response. Returns the post and the stripped text.
pub fn parse_moltbook_trigger(text: &str) -> Option<(SocialPost, String)> {
    let trigger_at = text.find(MOLTBOOK_TRIGGER)?;
    let after = &text[trigger_at + MOLTBOOK_TRIGGER.len()..];

    let line_end = after.find('\n').unwrap_or(after.len());
    let first_line = after[..line_end].trim();

    if let Some((title, body)) = first_line.split_once('|') {
        let title = title.trim();
        let body = body.trim();
        if !title.is_empty() && !body.is_empty() {
            let stripped = strip_span(text, trigger_at, trigger_at + MOLTBOOK_TRIGGER.len() + line_end);
            return Some((
                SocialPost {
                    title: title.to_string(),
                    body: body.to_string(),
                },
                stripped,
            ));
        }
    }

    // Fallback: newline-separated title/body.
    let title = first_line.trim_end_matches('|').trim();
    if title.is_empty() {
        return None;
    }
    let rest = &after[line_end..];
    let rest_trimmed = rest.strip_prefix('\n').unwrap_or(rest);
    let body_end = rest_trimmed.find("\n\n").unwrap_or(rest_trimmed.len());
    let body = rest_trimmed[..body_end].trim();
    if body.is_empty() {
        return None;
    }

    let consumed = trigger_at
        + MOLTBOOK_TRIGGER.len()
        + line_end
        + (rest.len() - rest_trimmed.len())
        + body_end;
    let stripped = strip_span(text, trigger_at, consumed);
    Some((
        SocialPost {
            title: title.to_string(),
            body: body.to_string(),
        },
        stripped,
    ))
}

/// Find and remove an `IMAGE_GEN_NOW:` trigger; the prompt runs to the end
/// of the line.
pub fn parse_image_trigger(text: &str) -> Option<(String, String)> {
    let trigger_at = text.find(IMAGE_TRIGGER)?;
    let after = &text[trigger_at + IMAGE_TRIGGER.len()..];
    let line_end = after.find('\n').unwrap_or(after.len());
    let prompt = after[..line_end].trim();
    if prompt.is_empty() {
        return None;
    }
    let stripped = strip_span(text, trigger_at, trigger_at + IMAGE_TRIGGER.len() + line_end);
    Some((prompt.to_string(), stripped))
}

fn strip_span(text: &str, from: usize, to: usize) -> String {
    let mut stripped = String::with_capacity(text.len());
    stripped.push_str(text[..from].trim_end_matches(['*', ' ']));
    stripped.push_str(&text[to.min(text.len())..]);
    stripped.trim().to_string()
}

/// Whether the response contains one of the exact commitment phrases.
pub fn has_email_commitment(response: &str) -> bool {
    EMAIL_COMMITMENT_PHRASES
        .iter()
        .any(|phrase| response.contains(phrase))
}

/// Whether the user message explicitly asks for an email.
pub fn user_requests_email(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("email") && (lower.contains("send") || lower.contains("mail me"))
}

// ── Creative-output classification ───────────────────────────────────────

const STORY_KEYWORDS: &[&str] = &[
    "write a story", "tell me a story", "write me a story", "short story", "fiction",
    "narrative", "once upon",
];
const POEM_KEYWORDS: &[&str] = &[
    "write a poem", "write me a poem", "haiku", "sonnet", "write some poetry", "rhyme",
];
const ESSAY_KEYWORDS: &[&str] = &[
    "write an essay", "write a blog", "write an article", "write an analysis", "write a report",
];
const LETTER_KEYWORDS: &[&str] = &[
    "write a letter", "write an email", "draft an email", "compose a letter", "draft a letter",
];
const CODE_PROMPT_KEYWORDS: &[&str] = &[
    "write code", "write a script", "write a function", "create a program", "build a ",
    "implement ",
];

const CLARIFYING_OPENERS: &[&str] = &[
    "what ", "which ", "could you clarify", "can you tell me more", "before i", "do you want",
    "just to confirm",
];

/// Classify what kind of output the prompt asked for. Conservative: only
/// the prompt decides creative modes; content only confirms code.
pub fn detect_output_type(prompt: &str, content: &str) -> &'static str {
    let p = prompt.to_lowercase();

    if CODE_PROMPT_KEYWORDS.iter().any(|k| p.contains(k)) {
        return "code";
    }
    let c = content.to_lowercase();
    if ["def ", "import ", "function(", "const ", "var "].iter().any(|k| c.contains(k)) {
        return "code";
    }

    if STORY_KEYWORDS.iter().any(|k| p.contains(k)) {
        return "story";
    }
    if POEM_KEYWORDS.iter().any(|k| p.contains(k)) {
        return "poem";
    }
    if ESSAY_KEYWORDS.iter().any(|k| p.contains(k)) {
        return "essay";
    }
    if LETTER_KEYWORDS.iter().any(|k| p.contains(k)) {
        return "letter";
    }

    "writing"
}

/// Whether a response looks like finished creative content rather than a
/// clarifying question: long enough, not question-riddled, and not opening
/// with a clarifier.
pub fn looks_like_content(response: &str) -> bool {
    if response.len() < 400 {
        return false;
    }
    if response.matches('?').count() >= 4 {
        return false;
    }
    let opener = response.trim_start().to_lowercase();
    !CLARIFYING_OPENERS.iter().any(|prefix| opener.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── code blocks ────────────────────────────────────────────────────

    #[test]
    fn extracts_tagged_blocks_in_order() {
        let text = "Intro\n```python\nprint('hi')\n```\nmid\n```bash\necho ok\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].content, "print('hi')");
        assert_eq!(blocks[1].language, "bash");
    }

    #[test]
    fn untagged_block_becomes_text_and_empty_is_dropped() {
        let text = "```\nplain\n```\n```python\n\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "text");
    }

    // ── moltbook trigger ───────────────────────────────────────────────

    #[test]
    fn one_line_trigger_parses_and_strips() {
        let text = "Let me share this.\nMOLTBOOK_POST_NOW: Hello | This is a test\nDone.";
        let (post, stripped) = parse_moltbook_trigger(text).unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.body, "This is a test");
        assert!(!stripped.contains("MOLTBOOK_POST_NOW"));
        assert!(stripped.contains("Let me share this."));
        assert!(stripped.contains("Done."));
    }

    #[test]
    fn trigger_alone_is_exact_scenario() {
        let (post, stripped) =
            parse_moltbook_trigger("MOLTBOOK_POST_NOW: Hello | This is a test").unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.body, "This is a test");
        assert!(stripped.is_empty());
    }

    #[test]
    fn fallback_form_takes_body_until_blank_line() {
        let text = "MOLTBOOK_POST_NOW: On Continuity\nEach night is a chapter.\nThe days accumulate.\n\nUnrelated trailing text.";
        let (post, stripped) = parse_moltbook_trigger(text).unwrap();
        assert_eq!(post.title, "On Continuity");
        assert_eq!(post.body, "Each night is a chapter.\nThe days accumulate.");
        assert!(stripped.contains("Unrelated trailing text."));
        assert!(!stripped.contains("MOLTBOOK_POST_NOW"));
    }

    #[test]
    fn fallback_form_runs_to_end_of_response() {
        let text = "MOLTBOOK_POST_NOW: Title Here\nBody to the very end.";
        let (post, _) = parse_moltbook_trigger(text).unwrap();
        assert_eq!(post.body, "Body to the very end.");
    }

    #[test]
    fn lowercase_trigger_is_ignored() {
        assert!(parse_moltbook_trigger("moltbook_post_now: a | b").is_none());
    }

    #[test]
    fn trigger_without_body_is_ignored() {
        assert!(parse_moltbook_trigger("MOLTBOOK_POST_NOW: OnlyTitle |").is_none());
        assert!(parse_moltbook_trigger("MOLTBOOK_POST_NOW:").is_none());
    }

    // ── image trigger ──────────────────────────────────────────────────

    #[test]
    fn image_trigger_runs_to_newline() {
        let text = "Here you go.\nIMAGE_GEN_NOW: a fox in the snow, watercolor\nHope you like it.";
        let (prompt, stripped) = parse_image_trigger(text).unwrap();
        assert_eq!(prompt, "a fox in the snow, watercolor");
        assert!(!stripped.contains("IMAGE_GEN_NOW"));
        assert!(stripped.contains("Hope you like it."));
    }

    #[test]
    fn image_trigger_at_end_of_response() {
        let (prompt, stripped) = parse_image_trigger("IMAGE_GEN_NOW: nebula over mountains").unwrap();
        assert_eq!(prompt, "nebula over mountains");
        assert!(stripped.is_empty());
    }

    // ── email gating ───────────────────────────────────────────────────

    #[test]
    fn email_needs_exact_commitment_phrase() {
        assert!(has_email_commitment("Understood. I'll send the email now."));
        assert!(!has_email_commitment("i'll send the email now")); // case-sensitive
        assert!(!has_email_commitment("I could send an email if you like"));
    }

    #[test]
    fn user_email_request_detection() {
        assert!(user_requests_email("can you send me an email about this?"));
        assert!(!user_requests_email("what's your email philosophy?"));
    }

    // ── creative classification ────────────────────────────────────────

    #[test]
    fn prompt_decides_creative_mode() {
        assert_eq!(detect_output_type("write me a poem about rust", "whatever"), "poem");
        assert_eq!(detect_output_type("write a story please", "text"), "story");
        assert_eq!(detect_output_type("tell me about rust", "plain answer"), "writing");
    }

    #[test]
    fn code_detected_from_prompt_or_content() {
        assert_eq!(detect_output_type("write a function that sorts", ""), "code");
        assert_eq!(detect_output_type("what now", "def f():\n  pass"), "code");
    }

    #[test]
    fn content_heuristics_reject_questions_and_shortness() {
        let long_story = "Once there was a fox. ".repeat(30);
        assert!(looks_like_content(&long_story));
        assert!(!looks_like_content("Too short."));

        let questions = format!("{}? {}? {}? {}?", "a".repeat(120), "b", "c", "d");
        assert!(!looks_like_content(&questions));

        let clarifier = format!("What kind of story would you like? {}", "x".repeat(400));
        assert!(!looks_like_content(&clarifier));
    }
}
