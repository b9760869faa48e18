use crate::error::{ProcessErrorDetails, RicolError};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
    pub capture: bool,
}

impl ProcessRequest {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn render(&self) -> String {
        fn shell_quote(part: &str) -> String {
            if part.is_empty() {
                return "\"\"".to_string();
            }
            if part.chars().any(|c| c.is_whitespace()) {
                return format!("\"{}\"", part.replace('"', "\\\""));
            }
            part.to_string()
        }
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(shell_quote(&self.program));
        parts.extend(self.args.iter().map(|arg| shell_quote(arg)));
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[cfg(test)]
    pub fn ok() -> Self {
        Self::with_stdout(0, "")
    }

    #[cfg(test)]
    pub fn with_stdout(status_code: i32, stdout: &str) -> Self {
        Self {
            status_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn failed(status_code: i32, stderr: &str) -> Self {
        Self {
            status_code,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

pub trait ProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<CommandOutput, io::Error>;

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

pub struct RealProcessRunner;

impl ProcessRunner for RealProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<CommandOutput, io::Error> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        if request.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn()?;
        if let Some(input) = &request.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())?;
            }
        }
        let output = child.wait_with_output()?;
        let status_code = output
            .status
            .code()
            .unwrap_or(if output.status.success() { 0 } else { 1 });
        Ok(CommandOutput {
            status_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn spawn_error_details(err: &io::Error, request: &ProcessRequest) -> ProcessErrorDetails {
    if err.kind() == io::ErrorKind::NotFound {
        return ProcessErrorDetails {
            error_code: "tool_not_found".to_string(),
            hint: Some(format!(
                "Install `{}` and ensure it is on your PATH.",
                request.program
            )),
            command: Some(request.render()),
            raw_stderr: None,
        };
    }
    ProcessErrorDetails {
        error_code: "process_command_failed".to_string(),
        hint: None,
        command: Some(request.render()),
        raw_stderr: None,
    }
}

pub fn classify_command_failure(stderr: &str) -> (String, Option<String>) {
    let lower = stderr.to_lowercase();

    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("error during connect")
    {
        return (
            "docker_daemon_unreachable".to_string(),
            Some("Docker daemon is unreachable. Start Docker (or dockerd) and retry.".to_string()),
        );
    }

    if lower.contains("is not a docker command") || lower.contains("unknown command: docker compose")
    {
        return (
            "docker_compose_unavailable".to_string(),
            Some("Install the Docker Compose plugin or the standalone docker-compose.".to_string()),
        );
    }

    if lower.contains("port is already allocated") || lower.contains("address already in use") {
        return (
            "docker_port_conflict".to_string(),
            Some(
                "A required host port is already in use (80/443/3306). Stop the conflicting service and retry."
                    .to_string(),
            ),
        );
    }

    if lower.contains("no such container") || lower.contains("is not running") {
        return (
            "container_not_running".to_string(),
            Some("Start the shared environment with `ricol global start`.".to_string()),
        );
    }

    if lower.contains("access denied for user") {
        return (
            "database_access_denied".to_string(),
            Some("Check global.db_root_user / global.db_root_password in the config.".to_string()),
        );
    }

    if lower.contains("pool overlaps") {
        return (
            "network_subnet_conflict".to_string(),
            Some(
                "Another docker network already uses this subnet; remove it or change global.isolated_network.subnet."
                    .to_string(),
            ),
        );
    }

    ("process_command_failed".to_string(), None)
}

pub fn execute<R: ProcessRunner>(
    runner: &R,
    request: &ProcessRequest,
) -> Result<CommandOutput, RicolError> {
    let command = request.render();
    debug!(command = %command, cwd = ?request.cwd, "running external command");
    let output = runner.run(request).map_err(|err| RicolError::External {
        message: format!("failed to run command `{command}`: {err}"),
        details: spawn_error_details(&err, request),
    })?;
    if output.success() {
        return Ok(output);
    }
    let stderr = output.stderr_text();
    let (error_code, hint) = classify_command_failure(&stderr);
    debug!(command = %command, status = output.status_code, error_code = %error_code, "external command failed");
    let mut message = format!(
        "command failed with status {} while running `{}`",
        output.status_code, command
    );
    if !stderr.is_empty() {
        message = format!("{message}: {stderr}");
    }
    if let Some(ref hint_message) = hint {
        message = format!("{message}\nHint: {hint_message}");
    }
    Err(RicolError::External {
        message,
        details: ProcessErrorDetails {
            error_code,
            hint,
            command: Some(command),
            raw_stderr: if stderr.is_empty() { None } else { Some(stderr) },
        },
    })
}

pub fn probe<R: ProcessRunner>(runner: &R, request: &ProcessRequest) -> bool {
    let command = request.render();
    match runner.run(request) {
        Ok(output) => {
            debug!(command = %command, status = output.status_code, "probe");
            output.success()
        }
        Err(err) => {
            debug!(command = %command, error = %err, "probe could not spawn");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRunner;

    #[test]
    fn render_quotes_whitespace_arguments() {
        let request = ProcessRequest::new("docker", ["exec", "global-mariadb", "mysql", "-e", "FLUSH PRIVILEGES"]);
        assert_eq!(
            request.render(),
            "docker exec global-mariadb mysql -e \"FLUSH PRIVILEGES\""
        );
    }

    #[test]
    fn execute_maps_nonzero_exit_to_classified_error() {
        let runner = MockRunner::default();
        runner.respond(
            "docker ps",
            CommandOutput::failed(1, "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"),
        );
        let err = execute(&runner, &ProcessRequest::new("docker", ["ps"]).capture())
            .expect_err("should fail");
        let details = err.details().expect("details");
        assert_eq!(details.error_code, "docker_daemon_unreachable");
        assert_eq!(details.command.as_deref(), Some("docker ps"));
        assert!(err.to_string().contains("Hint:"));
    }

    #[test]
    fn execute_maps_spawn_not_found() {
        let runner = MockRunner::default();
        runner.fail_spawn("mkcert");
        let err = execute(&runner, &ProcessRequest::new("mkcert", ["-install"]))
            .expect_err("spawn failure");
        assert_eq!(err.error_code(), "tool_not_found");
    }

    #[test]
    fn probe_is_false_on_failure() {
        let runner = MockRunner::default();
        runner.respond("docker --version", CommandOutput::failed(127, ""));
        assert!(!probe(&runner, &ProcessRequest::new("docker", ["--version"])));
        assert!(probe(&runner, &ProcessRequest::new("docker", ["info"])));
    }

    #[test]
    fn classify_recognizes_subnet_conflict() {
        let (code, hint) = classify_command_failure(
            "Error response from daemon: Pool overlaps with other one on this address space",
        );
        assert_eq!(code, "network_subnet_conflict");
        assert!(hint.is_some());
    }
}
