//! Matching push events to repository rules and running their commands

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::process::Output;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{HookConfig, RepositoryRule};
use crate::error::{HookError, error_body};
use crate::webhook::PushEvent;

const NO_ARGS: [&str; 0] = [];
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one command invocation
#[derive(Debug)]
pub struct ExecutionResult {
    pub command: String,
    /// Combined stdout and stderr.
    pub output: Vec<u8>,
    pub error: Option<HookError>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything one dispatch produced, ready to be written as the response
#[derive(Debug)]
pub struct DispatchResult {
    /// Key of the rule that matched, if any.
    pub rule: Option<String>,
    pub results: Vec<ExecutionResult>,
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl IntoResponse for DispatchResult {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

/// Finds the first rule whose name equals the repository full name or its html URL.
pub fn find_matching_rule<'a>(
    config: &'a HookConfig,
    event: &PushEvent,
) -> Option<&'a RepositoryRule> {
    config
        .repositories
        .iter()
        .find(|rule| rule.name == event.repo_full_name || rule.name == event.repo_html_url)
}

/// Extra environment variables every command receives on top of the parent environment.
pub fn command_env(event: &PushEvent) -> Vec<(&'static str, String)> {
    vec![
        ("REPO_NAME", event.repo_full_name.clone()),
        ("REPO_OWNER", event.repo_owner_email.clone()),
        ("REPO_REF", event.git_ref.clone()),
        ("REPO_HEAD_COMMIT", event.head_commit_id.clone()),
        ("REPO_HEAD_AUTHOR", event.head_commit_author_email.clone()),
    ]
}

/// Runs the commands of the matching repository rule.
pub struct CommandDispatcher {
    limiter: Option<Arc<Semaphore>>,
}

impl CommandDispatcher {
    /// `max_concurrent` caps subprocesses running at once; `None` or `Some(0)` leaves it unbounded.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            limiter: max_concurrent
                .filter(|n| *n > 0)
                .map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Runs every command of the first matching rule, in order.
    ///
    /// A failing command does not stop the ones after it. The status is taken
    /// from the first failure; output of successful commands and an error block
    /// for each failed one are appended to the body in execution order.
    pub async fn dispatch(&self, event: &PushEvent, config: &HookConfig) -> DispatchResult {
        let mut dispatch = DispatchResult {
            rule: None,
            results: Vec::new(),
            status: StatusCode::OK,
            body: Vec::new(),
        };

        let Some(rule) = find_matching_rule(config, event) else {
            info!(
                "No repository rule matches '{}' or '{}', skipping.",
                event.repo_full_name, event.repo_html_url
            );
            return dispatch;
        };
        dispatch.rule = Some(rule.name.clone());

        let env = command_env(event);
        let timeout = config.command_timeout();

        for command in &rule.commands {
            let _permit = match &self.limiter {
                Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
                None => None,
            };

            let result = run_command(command, &env, timeout).await;

            match &result.error {
                None => {
                    info!("Executed: {} ({:?})", command, result.elapsed);
                    info!("Output: {}", String::from_utf8_lossy(&result.output));
                    dispatch.body.extend_from_slice(&result.output);
                }
                Some(e) => {
                    error!("{}", e);
                    if !result.output.is_empty() {
                        warn!(
                            "Output of failed command {}: {}",
                            command,
                            String::from_utf8_lossy(&result.output)
                        );
                    }
                    if dispatch.status == StatusCode::OK {
                        dispatch.status = StatusCode::INTERNAL_SERVER_ERROR;
                    }
                    let block = error_body(StatusCode::INTERNAL_SERVER_ERROR, e);
                    dispatch.body.extend_from_slice(block.as_bytes());
                }
            }
            dispatch.results.push(result);
        }

        dispatch
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Runs one command on the blocking pool and captures its combined output.
pub async fn run_command(
    command: &str,
    env: &[(&'static str, String)],
    timeout: Option<Duration>,
) -> ExecutionResult {
    let owned_command = command.to_string();
    let env = env.to_vec();

    match tokio::task::spawn_blocking(move || run_command_blocking(&owned_command, &env, timeout))
        .await
    {
        Ok(result) => result,
        Err(e) => ExecutionResult {
            command: command.to_string(),
            output: Vec::new(),
            error: Some(HookError::ExecutionFailed {
                command: command.to_string(),
                reason: format!("execution task failed: {}", e),
            }),
            elapsed: Duration::ZERO,
        },
    }
}

fn run_command_blocking(
    command: &str,
    env: &[(&'static str, String)],
    timeout: Option<Duration>,
) -> ExecutionResult {
    let started = Instant::now();
    let failed = |reason: String, output: Vec<u8>| ExecutionResult {
        command: command.to_string(),
        output,
        error: Some(HookError::ExecutionFailed {
            command: command.to_string(),
            reason,
        }),
        elapsed: started.elapsed(),
    };

    // Invoked directly, no shell: the command is a program path or name without arguments.
    let mut expression = duct::cmd(command, NO_ARGS);
    for (key, value) in env {
        expression = expression.env(*key, value);
    }
    debug!("Running: {}", command);

    let handle = match expression
        .stdin_null()
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .start()
    {
        Ok(handle) => handle,
        Err(e) => return failed(e.to_string(), Vec::new()),
    };

    let output = match timeout {
        Some(limit) => wait_with_deadline(&handle, started, limit),
        None => handle.wait().cloned().map_err(|e| e.to_string()),
    };

    match output {
        Ok(output) if output.status.success() => ExecutionResult {
            command: command.to_string(),
            output: output.stdout,
            error: None,
            elapsed: started.elapsed(),
        },
        Ok(output) => {
            let reason = exit_reason(&output);
            failed(reason, output.stdout)
        }
        Err(reason) => failed(reason, Vec::new()),
    }
}

fn wait_with_deadline(
    handle: &duct::Handle,
    started: Instant,
    limit: Duration,
) -> Result<Output, String> {
    loop {
        match handle.try_wait() {
            Ok(Some(output)) => return Ok(output.clone()),
            Ok(None) => {}
            Err(e) => return Err(e.to_string()),
        }
        if started.elapsed() >= limit {
            if let Err(e) = handle.kill() {
                warn!("Failed to kill timed out command: {}", e);
            }
            return Err(format!("timed out after {}s", limit.as_secs_f64()));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn exit_reason(output: &Output) -> String {
    match output.status.code() {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}
