//! Sandboxed code execution: temp-file subprocess with a per-language
//! wall-clock timeout and a 2 KB output cap.

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

const OUTPUT_CAP: usize = 2000;

#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub runner: &'static str,
    pub extension: &'static str,
    pub timeout_secs: u64,
}

/// Executable allow-list. Anything else is saved but never run.
pub fn language_spec(language: &str) -> Option<LanguageSpec> {
    match language.to_lowercase().as_str() {
        "python" | "python3" => Some(LanguageSpec {
            runner: "python3",
            extension: "py",
            timeout_secs: 10,
        }),
        "bash" | "shell" => Some(LanguageSpec {
            runner: "bash",
            extension: "sh",
            timeout_secs: 5,
        }),
        "js" | "javascript" | "node" => Some(LanguageSpec {
            runner: "node",
            extension: "js",
            timeout_secs: 8,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub output: String,
}

/// Write the code to a temp file and run it under its language's runner.
/// Never propagates an error — a missing runner or a timeout becomes a
/// failed outcome with a message.
pub async fn execute_code(code: &str, language: &str) -> ExecOutcome {
    let Some(spec) = language_spec(language) else {
        return ExecOutcome {
            success: false,
            output: format!("Language '{language}' not supported for execution"),
        };
    };

    let file = match tempfile::Builder::new()
        .suffix(&format!(".{}", spec.extension))
        .tempfile()
    {
        Ok(file) => file,
        Err(err) => {
            return ExecOutcome {
                success: false,
                output: format!("Could not create temp file: {err}"),
            };
        }
    };
    if let Err(err) = std::fs::write(file.path(), code) {
        return ExecOutcome {
            success: false,
            output: format!("Could not write temp file: {err}"),
        };
    }

    debug!(runner = spec.runner, path = %file.path().display(), "executing code block");
    let run = Command::new(spec.runner)
        .arg(file.path())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(Duration::from_secs(spec.timeout_secs), run).await {
        Ok(Ok(result)) => {
            let mut output = String::new();
            output.push_str(&String::from_utf8_lossy(&result.stdout));
            if !result.stderr.is_empty() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&String::from_utf8_lossy(&result.stderr));
            }
            let output = output.trim().to_string();
            let output: String = if output.is_empty() {
                "(no output)".to_string()
            } else {
                output.chars().take(OUTPUT_CAP).collect()
            };
            ExecOutcome {
                success: result.status.success(),
                output,
            }
        }
        Ok(Err(err)) => ExecOutcome {
            success: false,
            output: format!("'{}' is not available on this system: {err}", spec.runner),
        },
        Err(_) => ExecOutcome {
            success: false,
            output: format!("Execution timed out after {}s", spec.timeout_secs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_covers_aliases() {
        assert!(language_spec("python").is_some());
        assert!(language_spec("Python3").is_some());
        assert!(language_spec("javascript").is_some());
        assert!(language_spec("shell").is_some());
        assert!(language_spec("rust").is_none());
        assert!(language_spec("text").is_none());
    }

    #[test]
    fn timeouts_are_per_language() {
        assert_eq!(language_spec("python").unwrap().timeout_secs, 10);
        assert_eq!(language_spec("bash").unwrap().timeout_secs, 5);
        assert_eq!(language_spec("node").unwrap().timeout_secs, 8);
    }

    #[tokio::test]
    async fn unsupported_language_fails_cleanly() {
        let outcome = execute_code("fn main() {}", "rust").await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("not supported"));
    }

    #[tokio::test]
    async fn bash_echo_captures_stdout() {
        let outcome = execute_code("echo $((100+23))", "bash").await;
        // Skip silently when bash is unavailable in the environment.
        if outcome.output.contains("not available") {
            return;
        }
        assert!(outcome.success);
        assert_eq!(outcome.output, "123");
    }

    #[tokio::test]
    async fn failing_script_reports_stderr() {
        let outcome = execute_code("exit 3", "bash").await;
        if outcome.output.contains("not available") {
            return;
        }
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn output_is_capped() {
        let outcome = execute_code("for i in $(seq 1 2000); do echo aaaaaaaaaa; done", "bash").await;
        if outcome.output.contains("not available") {
            return;
        }
        assert!(outcome.output.len() <= 2000);
    }
}
