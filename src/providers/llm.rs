//! Subprocess-backed LLM provider
//!
//! Invokes a configured CLI (a `claude`-style binary) with the prompt on
//! stdin. Both output pipes are drained from spawn onward; pipe buffers
//! are finite and an undrained stderr can deadlock the child. A hard
//! timeout kills the process outright.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::LlmProvider;
use crate::error::{CortexError, Result};

/// Environment variable naming the LLM command
pub const LLM_CMD_ENV: &str = "CORTEX_LLM_CMD";

const DEFAULT_LLM_CMD: &str = "claude";

/// LLM provider that shells out to a CLI
pub struct CommandLlm {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLlm {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from `CORTEX_LLM_CMD` (program plus arguments, whitespace
    /// separated), defaulting to `claude -p`.
    pub fn from_env(timeout: Duration) -> Self {
        let raw = std::env::var(LLM_CMD_ENV).unwrap_or_else(|_| DEFAULT_LLM_CMD.to_string());
        let mut parts = raw.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| DEFAULT_LLM_CMD.to_string());
        let mut args: Vec<String> = parts.collect();
        if program == DEFAULT_LLM_CMD && args.is_empty() {
            args.push("-p".to_string());
        }
        Self::new(program, args, timeout)
    }

    fn resolve_on_path(&self) -> bool {
        if self.program.contains('/') {
            return std::path::Path::new(&self.program).exists();
        }
        let Ok(path) = std::env::var("PATH") else {
            return false;
        };
        std::env::split_paths(&path).any(|dir| dir.join(&self.program).is_file())
    }
}

#[async_trait]
impl LlmProvider for CommandLlm {
    fn available(&self) -> bool {
        self.resolve_on_path()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.available() {
            return Err(CortexError::ProviderUnavailable(format!(
                "{} not found on PATH",
                self.program
            )));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CortexError::ProviderFailed(format!("spawn failed: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CortexError::ProviderFailed("no stdin pipe".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CortexError::ProviderFailed("no stdout pipe".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CortexError::ProviderFailed("no stderr pipe".to_string()))?;

        let prompt = prompt.as_bytes().to_vec();
        let run = async {
            // Write the prompt, then drain both pipes concurrently until
            // the child exits.
            stdin.write_all(&prompt).await?;
            drop(stdin);

            let mut out = Vec::new();
            let mut err = Vec::new();
            let (out_read, err_read, status) = tokio::join!(
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
                child.wait(),
            );
            out_read?;
            err_read?;
            let status = status?;
            Ok::<_, std::io::Error>((out, err, status))
        };

        let outcome = tokio::time::timeout(self.timeout, run).await;
        let (out, err, status) = match outcome {
            Ok(result) => {
                result.map_err(|e| CortexError::ProviderFailed(format!("io error: {}", e)))?
            }
            Err(_) => {
                // Hard kill; a stuck provider must not hang the session hook
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(CortexError::Timeout(self.timeout.as_secs()));
            }
        };

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&err);
            return Err(CortexError::ProviderFailed(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                stderr_text.trim().chars().take(500).collect::<String>()
            )));
        }

        let text = String::from_utf8_lossy(&out).trim().to_string();
        if text.is_empty() {
            return Err(CortexError::ProviderFailed(format!(
                "{} produced no output",
                self.program
            )));
        }
        Ok(text)
    }
}
