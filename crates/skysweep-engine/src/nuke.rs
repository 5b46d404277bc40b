//! Driver for external tools that demand an interactive confirmation.
//!
//! cloud-nuke prints a prompt and waits for the operator to type `nuke`.
//! This driver streams the tool's stdout, watches for the prompt with a
//! closed pattern set, and writes the confirmation token exactly once. If no
//! prompt is ever detected, an optional force-send fires after a delay as a
//! safety net against prompt-format drift; it is configurable and on by
//! default. The whole run is bounded by a hard deadline.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Prompt formats cloud-nuke has shipped over time.
static PROMPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Enter 'nuke' to confirm",
        r"Enter \*nuke\*",
        r"type.*nuke.*to proceed",
        r"please confirm.*nuke",
        r"to continue.*nuke",
        r".*nuke.*to delete",
        r"Are you sure you want to nuke",
        r"Enter 'nuke' to confirm \(or exit with \^C\)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("valid prompt pattern"))
    .collect()
});

#[derive(Debug, Clone)]
pub struct PromptedToolOptions {
    /// Token written to stdin when the prompt appears.
    pub confirmation: String,
    /// Send the token anyway after this long without a detected prompt.
    /// `None` disables the fallback.
    pub force_send_after: Option<Duration>,
    /// Hard deadline for the whole run.
    pub timeout: Duration,
}

impl Default for PromptedToolOptions {
    fn default() -> Self {
        Self {
            confirmation: "nuke".to_string(),
            force_send_after: Some(Duration::from_secs(10)),
            timeout: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug)]
pub struct PromptedRun {
    pub exit_code: Option<i32>,
    pub confirmation_sent: bool,
    /// True when the token went out via the force-send fallback.
    pub force_sent: bool,
    pub output_tail: String,
}

/// A subprocess with environment overrides whose prompt we answer.
pub struct PromptedTool {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

/// Check a buffer against the prompt pattern set.
pub fn detect_prompt(buffer: &str) -> bool {
    PROMPT_PATTERNS.iter().any(|p| p.is_match(buffer))
}

impl PromptedTool {
    pub async fn run(
        &self,
        options: &PromptedToolOptions,
        cancel: &CancellationToken,
    ) -> Result<PromptedRun, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::ToolMissing {
                        tool: self.program.clone(),
                    }
                } else {
                    EngineError::Subprocess(format!("{}: {e}", self.program))
                }
            })?;

        let mut stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Subprocess("no stdout pipe".into()))?;

        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);
        let force_timer = async {
            match options.force_send_after {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(force_timer);

        let mut buffer = String::new();
        let mut chunk = [0u8; 4096];
        let mut confirmation_sent = false;
        let mut force_sent = false;
        let mut exited = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(EngineError::Cancelled);
                }
                _ = &mut deadline => {
                    tracing::error!(program = %self.program, "prompted tool deadline exceeded, killing");
                    let _ = child.kill().await;
                    return Err(EngineError::Timeout {
                        what: format!("{} run", self.program),
                    });
                }
                _ = &mut force_timer, if !confirmation_sent => {
                    tracing::warn!(
                        program = %self.program,
                        "no prompt detected in time, force-sending confirmation"
                    );
                    send_confirmation(&mut stdin, &options.confirmation).await?;
                    confirmation_sent = true;
                    force_sent = true;
                }
                read = stdout.read(&mut chunk) => {
                    match read {
                        Ok(0) => {
                            // stdout closed; collect the exit status.
                            let status = child.wait().await.map_err(|e| {
                                EngineError::Subprocess(format!("{}: {e}", self.program))
                            })?;
                            exited = Some(status);
                        }
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&chunk[..n]);
                            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                                tracing::info!(tool = %self.program, line = %line.trim_end(), "tool output");
                            }
                            buffer.push_str(&text);
                            if !confirmation_sent && detect_prompt(&buffer) {
                                tracing::info!(program = %self.program, "confirmation prompt detected");
                                send_confirmation(&mut stdin, &options.confirmation).await?;
                                confirmation_sent = true;
                            }
                            // Bound the scan window; prompts are short.
                            if buffer.len() > 8192 {
                                let keep = buffer.len() - 1024;
                                buffer.drain(..keep);
                            }
                        }
                        Err(e) => {
                            return Err(EngineError::Subprocess(format!(
                                "{} stdout: {e}", self.program
                            )));
                        }
                    }
                }
            }

            if let Some(status) = exited {
                let tail: String = buffer.chars().rev().take(1024).collect::<Vec<_>>()
                    .into_iter().rev().collect();
                return Ok(PromptedRun {
                    exit_code: status.code(),
                    confirmation_sent,
                    force_sent,
                    output_tail: tail,
                });
            }
        }
    }
}

async fn send_confirmation(
    stdin: &mut Option<tokio::process::ChildStdin>,
    token: &str,
) -> Result<(), EngineError> {
    let Some(pipe) = stdin.as_mut() else {
        return Err(EngineError::Subprocess("stdin already closed".into()));
    };
    pipe.write_all(format!("{token}\n").as_bytes())
        .await
        .map_err(|e| EngineError::Subprocess(format!("confirmation write: {e}")))?;
    pipe.flush()
        .await
        .map_err(|e| EngineError::Subprocess(format!("confirmation flush: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_prompt_is_detected() {
        assert!(detect_prompt("Enter 'nuke' to confirm (or exit with ^C): "));
    }

    #[test]
    fn detection_is_case_insensitive() {
        assert!(detect_prompt("ARE YOU SURE YOU WANT TO NUKE this account?"));
        assert!(detect_prompt("please CONFIRM by typing nuke"));
    }

    #[test]
    fn prompt_spanning_reads_is_detected_from_buffer() {
        let mut buffer = String::from("Enter 'nu");
        assert!(!detect_prompt(&buffer));
        buffer.push_str("ke' to confirm");
        assert!(detect_prompt(&buffer));
    }

    #[test]
    fn unrelated_output_does_not_trigger(){
        assert!(!detect_prompt("Scanning resources in us-east-1..."));
        assert!(!detect_prompt("Found 3 EC2 instances"));
    }

    #[tokio::test]
    async fn echo_tool_runs_to_completion_without_prompt() {
        let tool = PromptedTool {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo scanning; echo done".to_string()],
            envs: vec![],
        };
        let options = PromptedToolOptions {
            force_send_after: None,
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let run = tool
            .run(&options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.exit_code, Some(0));
        assert!(!run.confirmation_sent);
        assert!(run.output_tail.contains("done"));
    }

    #[tokio::test]
    async fn prompting_tool_receives_confirmation() {
        let tool = PromptedTool {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                // Prints the prompt, then requires the token on stdin.
                "echo \"Enter 'nuke' to confirm\"; read answer; test \"$answer\" = nuke"
                    .to_string(),
            ],
            envs: vec![],
        };
        let options = PromptedToolOptions {
            force_send_after: None,
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let run = tool
            .run(&options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.exit_code, Some(0));
        assert!(run.confirmation_sent);
        assert!(!run.force_sent);
    }

    #[tokio::test]
    async fn missing_binary_reports_tool_missing() {
        let tool = PromptedTool {
            program: "definitely-not-a-real-binary-4a7f".to_string(),
            args: vec![],
            envs: vec![],
        };
        let result = tool
            .run(&PromptedToolOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::ToolMissing { .. })));
    }
}
