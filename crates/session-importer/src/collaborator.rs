//! External script collaborators.
//!
//! Browser automation and OS cookie-store extraction run as scripts. The
//! contract: JSON input on stdin, JSON result written to the file named by
//! `FORKFUL_OUTPUT_PATH`, exit zero on success. A failing script may still
//! write `{"error": "..."}` to the output file, so it is read regardless of
//! the exit status.

use crate::CollaboratorError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable carrying the output file path to the script.
pub const OUTPUT_PATH_ENV: &str = "FORKFUL_OUTPUT_PATH";
pub const DEFAULT_PROGRAM: &str = "node";
pub const DEFAULT_NPM: &str = "npm";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// npm package the cookie extraction script reads the browser store with.
pub const CHROME_COOKIES_PACKAGE: &str = "chrome-cookies-secure";
const CHROME_COOKIES_VERSION: &str = "^2.1.1";

const STDERR_TAIL_CHARS: usize = 500;

/// npm dependencies a script needs installed in its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmProject {
    pub npm: String,
    /// Package name -> version requirement.
    pub dependencies: BTreeMap<String, String>,
}

impl NpmProject {
    pub fn new<'a>(dependencies: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            npm: DEFAULT_NPM.to_string(),
            dependencies: dependencies
                .into_iter()
                .map(|(name, version)| (name.to_string(), version.to_string()))
                .collect(),
        }
    }

    /// The project the Chrome cookie extraction script runs in.
    pub fn chrome_cookies() -> Self {
        Self::new([(CHROME_COOKIES_PACKAGE, CHROME_COOKIES_VERSION)])
    }

    pub fn with_npm(mut self, npm: impl Into<String>) -> Self {
        self.npm = npm.into();
        self
    }

    /// Every dependency has a `package.json` under `node_modules`.
    pub fn is_installed(&self, dir: &Path) -> bool {
        self.dependencies.keys().all(|name| {
            dir.join("node_modules")
                .join(name)
                .join("package.json")
                .is_file()
        })
    }

    fn manifest(&self) -> Value {
        json!({
            "name": "forkful-collaborators",
            "private": true,
            "dependencies": self.dependencies,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CollaboratorRequest {
    /// Interpreter used to run `script`.
    pub program: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub input: Value,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    /// Installed into `working_dir` before the script runs.
    pub project: Option<NpmProject>,
}

impl CollaboratorRequest {
    pub fn new(script: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, input: Value) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            script: script.into(),
            working_dir: working_dir.into(),
            input,
            timeout: DEFAULT_TIMEOUT,
            env: Vec::new(),
            project: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_project(mut self, project: NpmProject) -> Self {
        self.project = Some(project);
        self
    }
}

/// Capability to run an external collaborator and collect its JSON result.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn run(
        &self,
        request: &CollaboratorRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, CollaboratorError>;
}

/// Runs collaborators as real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ScriptCollaborator;

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

fn spawn(cmd: &mut Command, program: &str) -> Result<Child, CollaboratorError> {
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(CollaboratorError::NotFound {
            program: program.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Feed the child and wait for it, all within `limit`.
///
/// The child is killed on timeout or cancellation. Returns the exit status
/// and everything it wrote to stderr.
async fn supervise<F>(
    mut child: Child,
    feed: F,
    label: &str,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<(ExitStatus, String), CollaboratorError>
where
    F: Future<Output = std::io::Result<()>>,
{
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    });

    let waited = {
        let run = async {
            match feed.await {
                Ok(()) => child.wait().await,
                Err(err) => Err(err),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Waited::Cancelled,
            result = timeout(limit, run) => match result {
                Ok(status) => Waited::Exited(status),
                Err(_) => Waited::TimedOut,
            },
        }
    };

    match waited {
        Waited::Exited(status) => {
            let status = status?;
            let stderr = stderr_task.await.unwrap_or_default();
            Ok((status, stderr))
        }
        Waited::TimedOut => {
            let _ = child.kill().await;
            warn!(script = %label, timeout_secs = limit.as_secs(), "Collaborator timed out");
            Err(CollaboratorError::Timeout {
                script: label.to_string(),
                timeout_secs: limit.as_secs(),
            })
        }
        Waited::Cancelled => {
            let _ = child.kill().await;
            Err(CollaboratorError::Cancelled)
        }
    }
}

/// Write `package.json` and run `npm install` unless the dependencies are
/// already in place.
pub async fn ensure_npm_project(
    project: &NpmProject,
    dir: &Path,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<(), CollaboratorError> {
    if project.is_installed(dir) {
        debug!(dir = %dir.display(), "npm project already installed");
        return Ok(());
    }

    tokio::fs::create_dir_all(dir).await?;
    let manifest = serde_json::to_vec_pretty(&project.manifest())
        .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
    tokio::fs::write(dir.join("package.json"), manifest).await?;

    info!(npm = %project.npm, dir = %dir.display(), "Installing collaborator dependencies");
    let started = Instant::now();

    let mut cmd = Command::new(&project.npm);
    cmd.args(["install", "--no-audit", "--no-fund", "--silent"]);
    cmd.current_dir(dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = spawn(&mut cmd, &project.npm)?;
    let label = format!("{} install", project.npm);
    let (status, stderr) = supervise(
        child,
        std::future::ready(Ok::<(), std::io::Error>(())),
        &label,
        limit,
        cancel,
    )
    .await?;

    if !status.success() {
        return Err(CollaboratorError::Failed {
            exit_code: status.code(),
            stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
        });
    }
    if !project.is_installed(dir) {
        return Err(CollaboratorError::Failed {
            exit_code: status.code(),
            stderr: format!("{label} left dependencies missing"),
        });
    }

    debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Collaborator dependencies installed"
    );
    Ok(())
}

#[async_trait]
impl Collaborator for ScriptCollaborator {
    async fn run(
        &self,
        request: &CollaboratorRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, CollaboratorError> {
        let script = request.script.display().to_string();
        tokio::fs::create_dir_all(&request.working_dir).await?;

        if let Some(project) = &request.project {
            ensure_npm_project(project, &request.working_dir, request.timeout, cancel).await?;
        }

        let output_path = request
            .working_dir
            .join(format!("output-{}.json", uuid::Uuid::new_v4()));
        let payload = serde_json::to_vec(&request.input)
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?;

        let mut cmd = Command::new(&request.program);
        cmd.arg(&request.script);
        cmd.current_dir(&request.working_dir);
        cmd.env(OUTPUT_PATH_ENV, &output_path);
        cmd.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(program = %request.program, script = %script, "Starting collaborator");
        let started = Instant::now();

        let mut child = spawn(&mut cmd, &request.program)?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(err) = stdin.write_all(&payload).await {
                    // Scripts that ignore their input may exit before reading it
                    if err.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(err);
                    }
                }
            }
            Ok(())
        };

        let (status, stderr) =
            match supervise(child, feed, &script, request.timeout, cancel).await {
                Ok(done) => done,
                Err(err) => {
                    remove_quietly(&output_path).await;
                    return Err(err);
                }
            };

        let output = match tokio::fs::read_to_string(&output_path).await {
            Ok(content) => Some(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        remove_quietly(&output_path).await;

        info!(
            program = %request.program,
            script = %script,
            exit_code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collaborator finished"
        );

        interpret_output(status.success(), status.code(), output.as_deref(), &stderr)
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

/// Map exit status and output file contents onto a result.
fn interpret_output(
    success: bool,
    exit_code: Option<i32>,
    output: Option<&str>,
    stderr: &str,
) -> Result<Value, CollaboratorError> {
    let parsed = output
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| serde_json::from_str::<Value>(s).ok());

    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
    {
        return Err(CollaboratorError::Reported(message.to_string()));
    }

    match (success, parsed) {
        (true, Some(value)) => Ok(value),
        (true, None) => Err(CollaboratorError::Decode(
            "collaborator produced no JSON output".to_string(),
        )),
        (false, _) => Err(CollaboratorError::Failed {
            exit_code,
            stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
        }),
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("…{skipped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_error_beats_exit_status() {
        let err = interpret_output(false, Some(1), Some(r#"{"error":"no cookies"}"#), "trace").unwrap_err();
        assert!(matches!(err, CollaboratorError::Reported(m) if m == "no cookies"));

        let err = interpret_output(true, Some(0), Some(r#"{"error":"late failure"}"#), "").unwrap_err();
        assert!(matches!(err, CollaboratorError::Reported(_)));
    }

    #[test]
    fn test_nonzero_exit_without_structured_error() {
        let err = interpret_output(false, Some(2), Some("not json"), "boom").unwrap_err();
        match err {
            CollaboratorError::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = interpret_output(false, None, Some(r#"{"ok":true}"#), "").unwrap_err();
        assert_eq!(err.code(), "collaborator_failed");
    }

    #[test]
    fn test_success_requires_output() {
        let value = interpret_output(true, Some(0), Some(r#"{"cookie_count":2}"#), "").unwrap();
        assert_eq!(value, json!({"cookie_count": 2}));

        let err = interpret_output(true, Some(0), None, "").unwrap_err();
        assert_eq!(err.code(), "decode");
    }

    #[test]
    fn test_npm_project_manifest_and_install_check() {
        let dir = tempfile::tempdir().unwrap();
        let project = NpmProject::chrome_cookies();
        assert_eq!(
            project.manifest()["dependencies"][CHROME_COOKIES_PACKAGE],
            CHROME_COOKIES_VERSION
        );
        assert!(!project.is_installed(dir.path()));

        let pkg = dir.path().join("node_modules").join(CHROME_COOKIES_PACKAGE);
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("package.json"), "{}").unwrap();
        assert!(project.is_installed(dir.path()));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "…def");
        assert_eq!(tail("abc", 3), "abc");
    }
}
