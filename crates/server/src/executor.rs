//! Runs solid-modeling DSL programs through an external interpreter.
//!
//! The interpreter is any command that reads the program on stdin and writes
//! an STL file to the path given as its last argument. It may print a JSON
//! status line (`{"status": "...", "message": "..."}`) as its last line of
//! stdout. When no interpreter is configured, or a run fails, the placeholder
//! cube is stored instead and the result is flagged as a fallback.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::code::validate_dsl_code;
use crate::storage::{ModelStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("DSL code cannot be empty")]
    EmptyCode,

    #[error("Model ID cannot be empty")]
    EmptyModelId,

    #[error("Code validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct Execution {
    pub path: PathBuf,
    pub fallback: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct StatusLine {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Environment {
    pub interpreter_configured: bool,
    pub interpreter: Option<String>,
    pub temp_dir_exists: bool,
    pub temp_dir_writable: bool,
}

pub struct DslExecutor {
    command: Option<Vec<String>>,
    timeout: Duration,
    storage: Arc<ModelStorage>,
}

impl DslExecutor {
    pub fn new(command: Option<Vec<String>>, timeout: Duration, storage: Arc<ModelStorage>) -> Self {
        Self { command, timeout, storage }
    }

    pub fn is_available(&self) -> bool {
        self.command.is_some()
    }

    /// Run `code` and store the resulting STL under `model_id`.
    ///
    /// Input problems are errors. Interpreter problems are not: they produce
    /// the fallback model with `fallback = true`.
    pub async fn execute_and_export(
        &self,
        code: &str,
        model_id: &str,
        validate: bool,
    ) -> Result<Execution, ExecError> {
        if code.trim().is_empty() {
            return Err(ExecError::EmptyCode);
        }
        if model_id.is_empty() {
            return Err(ExecError::EmptyModelId);
        }
        if validate {
            validate_dsl_code(code).map_err(ExecError::Validation)?;
        }

        tracing::info!("Executing DSL code for model {}", model_id);
        let path = self
            .storage
            .temp_file_path(&format!("model_{}_", model_id), ".stl");

        let outcome = match &self.command {
            Some(command) => self.run(command, code, &path).await,
            None => Err("DSL interpreter not configured".to_string()),
        };

        let execution = match outcome {
            Ok(message) => {
                tracing::info!("Exported STL for {}: {}", model_id, path.display());
                Execution { path, fallback: false, message }
            }
            Err(reason) => {
                tracing::warn!("DSL execution for {} failed, using fallback model: {}", model_id, reason);
                write_file(&path, shared::stl::fallback_cube().as_bytes()).await?;
                Execution {
                    path,
                    fallback: true,
                    message: format!("Fallback model created: {}", reason),
                }
            }
        };

        self.storage.store_model(model_id, execution.path.clone()).await;
        Ok(execution)
    }

    async fn run(&self, command: &[String], code: &str, output: &Path) -> Result<String, String> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| "empty interpreter command".to_string())?;

        let mut child = Command::new(program)
            .args(args)
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("could not start {}: {}", program, e))?;

        // stdin is fed alongside the wait so a child that never reads it
        // cannot hold the request past the timeout
        let stdin = child.stdin.take();
        let input = code.as_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // an early exit shows up in the exit status
                if let Err(e) = stdin.write_all(input).await {
                    tracing::debug!("Interpreter closed stdin early: {}", e);
                }
            }
        };
        let exchange = async move { tokio::join!(feed, child.wait_with_output()).1 };

        // on timeout the child is dropped, and kill_on_drop ends it
        let result = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| format!("interpreter timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("interpreter failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        let status = parse_status_line(&stdout);

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let detail = status
                .and_then(|s| s.message)
                .or_else(|| stderr.lines().last().map(str::to_string))
                .unwrap_or_default();
            return Err(format!("interpreter exited with {}: {}", result.status, detail.trim()));
        }
        if let Some(StatusLine { status, message }) = &status {
            if status.eq_ignore_ascii_case("error") {
                return Err(message.clone().unwrap_or_else(|| "interpreter reported an error".into()));
            }
        }

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err("interpreter produced an empty STL file".into());
        }

        Ok(status
            .and_then(|s| s.message)
            .unwrap_or_else(|| "Model generated successfully".into()))
    }

    pub async fn environment(&self) -> Environment {
        let dir = self.storage.dir();
        let temp_dir_exists = tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false);
        let temp_dir_writable = temp_dir_exists && probe_writable(dir).await;
        Environment {
            interpreter_configured: self.command.is_some(),
            interpreter: self.command.as_ref().map(|c| c.join(" ")),
            temp_dir_exists,
            temp_dir_writable,
        }
    }
}

fn parse_status_line(stdout: &str) -> Option<StatusLine> {
    let last = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(last.trim()).ok()
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| StorageError::Io {
            operation: "write fallback model",
            path: path.to_path_buf(),
            source,
        })
}

async fn probe_writable(dir: &Path) -> bool {
    let probe = dir.join(format!(".probe-{}", uuid::Uuid::new_v4()));
    match tokio::fs::write(&probe, b"").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::temp_root;

    const CODE: &str = "from badcad import *\nmodel = sphere(r=8)";

    fn executor(command: Option<&[&str]>) -> DslExecutor {
        executor_with_timeout(command, Duration::from_secs(5))
    }

    fn executor_with_timeout(command: Option<&[&str]>, timeout: Duration) -> DslExecutor {
        let storage = Arc::new(ModelStorage::new(temp_root("exec"), Duration::from_secs(3600)).unwrap());
        DslExecutor::new(
            command.map(|c| c.iter().map(|s| s.to_string()).collect()),
            timeout,
            storage,
        )
    }

    #[tokio::test]
    async fn input_errors() {
        let exec = executor(None);
        assert!(matches!(exec.execute_and_export(" ", "id", true).await, Err(ExecError::EmptyCode)));
        assert!(matches!(exec.execute_and_export(CODE, "", true).await, Err(ExecError::EmptyModelId)));
        match exec.execute_and_export("model = 1", "id", true).await {
            Err(ExecError::Validation(msg)) => assert!(msg.contains("import")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unconfigured_interpreter_stores_fallback() {
        let exec = executor(None);
        let run = exec.execute_and_export(CODE, "abc123", true).await.unwrap();
        assert!(run.fallback);
        assert!(run.message.contains("not configured"));
        let bytes = std::fs::read(&run.path).unwrap();
        assert!(bytes.starts_with(b"solid cube"));
        assert_eq!(exec.storage.model_path("abc123").await, Some(run.path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interpreter_output_is_stored() {
        // copies stdin to the output path, then reports success
        let exec = executor(Some(&[
            "sh",
            "-c",
            "cat > \"$0\"; echo '{\"status\": \"success\", \"message\": \"ok from interpreter\"}'",
        ]));
        let run = exec.execute_and_export(CODE, "model-1", true).await.unwrap();
        assert!(!run.fallback);
        assert_eq!(run.message, "ok from interpreter");
        assert_eq!(std::fs::read_to_string(&run.path).unwrap(), CODE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_interpreter_falls_back() {
        let exec = executor(Some(&["sh", "-c", "cat > /dev/null; echo boom >&2; exit 3"]));
        let run = exec.execute_and_export(CODE, "model-2", false).await.unwrap();
        assert!(run.fallback);
        assert!(run.message.contains("boom"), "{}", run.message);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_output_falls_back() {
        let exec = executor(Some(&["sh", "-c", "cat > /dev/null; : > \"$0\""]));
        let run = exec.execute_and_export(CODE, "model-3", true).await.unwrap();
        assert!(run.fallback);
        assert!(run.message.contains("empty STL"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_interpreter_times_out() {
        let exec = executor_with_timeout(Some(&["sh", "-c", "exec sleep 5"]), Duration::from_secs(1));
        // larger than a pipe buffer, and the interpreter never reads it
        let code = format!("{}\n#{}", CODE, "x".repeat(512 * 1024));
        let started = std::time::Instant::now();
        let run = exec.execute_and_export(&code, "model-4", false).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert!(run.fallback);
        assert!(run.message.contains("timed out"), "{}", run.message);
        assert!(std::fs::read(&run.path).unwrap().starts_with(b"solid cube"));
    }

    #[test]
    fn status_line_is_last_json_line() {
        let parsed = parse_status_line("log line\n{\"status\": \"error\", \"message\": \"bad\"}\n\n").unwrap();
        assert_eq!(parsed.status, "error");
        assert_eq!(parsed.message.as_deref(), Some("bad"));
        assert!(parse_status_line("no json here").is_none());
    }

    #[tokio::test]
    async fn environment_reports_temp_dir() {
        let env = executor(None).environment().await;
        assert!(!env.interpreter_configured);
        assert!(env.temp_dir_exists);
        assert!(env.temp_dir_writable);
    }
}
