use crate::adapters::container::states_report_failure;
use crate::adapters::fsops;
use crate::error::{ProcessErrorDetails, RicolError};
use crate::global::GlobalEnvironment;
use crate::poller::{await_ready, RetryPolicy};
use crate::process::ProcessRunner;
use crate::project::{find_compose_file, validate_project_name, EnvironmentFile};
use crate::session::Session;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub name: String,
    pub path: PathBuf,
    pub site_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub name: String,
    pub path: PathBuf,
    pub containers_stopped: bool,
}

pub fn project_dir<R: ProcessRunner>(session: &Session<'_, R>, name: &str) -> Result<PathBuf, RicolError> {
    validate_project_name(name)?;
    let dir = session.workspace.project_dir(name);
    if !dir.is_dir() || find_compose_file(&dir).is_none() {
        return Err(RicolError::Validation(format!(
            "no project named '{name}' under {}; run `ricol list` to see the candidates",
            session.workspace.sites.display()
        )));
    }
    Ok(dir)
}

pub fn await_containers<R: ProcessRunner>(
    session: &Session<'_, R>,
    dir: &Path,
) -> Result<String, RicolError> {
    let policy = RetryPolicy::new(
        session.cfg.readiness.containers_attempts,
        session.cfg.readiness.containers_interval_ms,
    );
    let settled = await_ready(
        || match session.runtime.compose_states(dir) {
            Ok(states) => !states_report_failure(&states),
            Err(err) => {
                warn!(error = %err, "container state lookup failed");
                false
            }
        },
        policy,
        session.sleeper,
    );
    if settled {
        return session.runtime.compose_status(dir);
    }
    let status = session.runtime.compose_status(dir).unwrap_or_default();
    Err(RicolError::External {
        message: format!("some containers did not start correctly:\n{status}"),
        details: ProcessErrorDetails {
            error_code: "containers_exited".to_string(),
            hint: Some(format!(
                "inspect the logs with `docker compose logs` in {}",
                dir.display()
            )),
            command: None,
            raw_stderr: None,
        },
    })
}

pub fn start_project<R: ProcessRunner>(
    session: &Session<'_, R>,
    name: &str,
) -> Result<StartReport, RicolError> {
    let dir = project_dir(session, name)?;
    GlobalEnvironment::new(session).ensure_healthy()?;

    let env_file = match EnvironmentFile::read(&dir) {
        Ok(env_file) => Some(env_file),
        Err(err) => {
            session
                .reporter
                .warn(&format!("could not read {}/.env: {err}", dir.display()));
            None
        }
    };
    let runtime_env = env_file
        .as_ref()
        .map(EnvironmentFile::runtime_env)
        .unwrap_or_default();

    session.reporter.step(&format!("Starting {name}"));
    session.runtime.compose_up(&dir, &runtime_env, false)?;
    let status = await_containers(session, &dir)?;
    Ok(StartReport {
        name: name.to_string(),
        path: dir,
        site_url: env_file.map(|env| env.site_url),
        status,
    })
}

pub fn stop_project<R: ProcessRunner>(session: &Session<'_, R>, name: &str) -> Result<PathBuf, RicolError> {
    let dir = project_dir(session, name)?;
    session.reporter.step(&format!("Stopping {name}"));
    session.runtime.compose_down(&dir)?;
    Ok(dir)
}

pub fn delete_project<R: ProcessRunner>(
    session: &Session<'_, R>,
    name: &str,
) -> Result<DeleteReport, RicolError> {
    let dir = project_dir(session, name)?;
    session.reporter.step(&format!("Stopping containers for {name}"));
    let containers_stopped = match session.runtime.compose_down(&dir) {
        Ok(()) => true,
        Err(err) => {
            session
                .reporter
                .warn(&format!("could not stop containers, continuing: {err}"));
            false
        }
    };
    session.reporter.step(&format!("Removing {}", dir.display()));
    fsops::delete_tree(&dir)?;
    Ok(DeleteReport {
        name: name.to_string(),
        path: dir,
        containers_stopped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::paths::Workspace;
    use crate::process::CommandOutput;
    use crate::testing::{FakeSleeper, MockRunner};
    use crate::ui::Reporter;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn workspace_with_project() -> (TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::from_base(dir.path());
        ws.ensure().unwrap();
        fs::write(ws.global.join("docker-compose.yml"), "").unwrap();
        let blog = ws.project_dir("blog");
        fs::create_dir_all(&blog).unwrap();
        fs::write(blog.join("docker-compose.yml"), "").unwrap();
        EnvironmentFile::new("blog.dev.localhost", "blog").write(&blog).unwrap();
        (dir, ws)
    }

    #[test]
    fn start_checks_global_then_passes_env() {
        let (_dir, ws) = workspace_with_project();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond(
            "docker ps --format",
            CommandOutput::with_stdout(0, "global-traefik\nglobal-mariadb\n"),
        );
        runner.respond("compose ps", CommandOutput::with_stdout(0, "blog-php  Up 2 seconds\n"));
        runner.respond("ps --all -q", CommandOutput::with_stdout(0, "f00d\n"));
        runner.respond("docker inspect", CommandOutput::with_stdout(0, "running\n"));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());

        let report = start_project(&session, "blog").unwrap();
        assert_eq!(report.site_url.as_deref(), Some("blog.dev.localhost"));
        assert!(report.status.contains("Up"));
        let up = runner
            .calls()
            .into_iter()
            .find(|call| call.args.contains(&"up".to_string()))
            .unwrap();
        assert_eq!(up.env.get("COMPOSE_PROJECT_NAME").map(String::as_str), Some("blog"));
        assert!(runner.position("docker ps --format") < runner.position("compose up"));
    }

    #[test]
    fn start_reports_exited_containers_after_polling() {
        let (_dir, ws) = workspace_with_project();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond(
            "docker ps --format",
            CommandOutput::with_stdout(0, "global-traefik\nglobal-mariadb\n"),
        );
        runner.respond("compose ps", CommandOutput::with_stdout(0, "blog-php  Exited (255)\n"));
        runner.respond("ps --all -q", CommandOutput::with_stdout(0, "f00d\nbeef\n"));
        runner.respond("docker inspect", CommandOutput::with_stdout(0, "running\nexited\n"));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());

        let err = start_project(&session, "blog").unwrap_err();
        assert_eq!(err.error_code(), "containers_exited");
        assert!(err.to_string().contains("Exited (255)"));
        assert_eq!(runner.count("docker inspect"), 3);
    }

    #[test]
    fn project_named_like_an_exit_status_still_starts() {
        let (_dir, ws) = workspace_with_project();
        let brexit = ws.project_dir("brexit");
        fs::create_dir_all(&brexit).unwrap();
        fs::write(brexit.join("docker-compose.yml"), "").unwrap();
        EnvironmentFile::new("brexit.dev.localhost", "brexit").write(&brexit).unwrap();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond(
            "docker ps --format",
            CommandOutput::with_stdout(0, "global-traefik\nglobal-mariadb\n"),
        );
        runner.respond(
            "compose ps",
            CommandOutput::with_stdout(
                0,
                "brexit-php-1  php:8.3-fpm  \"docker-php-entrypoint\"  Up 4 seconds\n",
            ),
        );
        runner.respond("ps --all -q", CommandOutput::with_stdout(0, "a1b2\nc3d4\n"));
        runner.respond("docker inspect", CommandOutput::with_stdout(0, "running\nrunning\n"));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());

        let report = start_project(&session, "brexit").unwrap();
        assert!(report.status.contains("brexit-php-1"));
        assert_eq!(runner.count("docker inspect"), 1);
    }

    #[test]
    fn stop_never_touches_global_runtime() {
        let (_dir, ws) = workspace_with_project();
        let cfg = Config::default();
        let runner = MockRunner::default();
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        stop_project(&session, "blog").unwrap();
        assert_eq!(runner.count("docker ps"), 0);
        assert_eq!(runner.count("compose down"), 1);
    }

    #[test]
    fn delete_survives_failed_down() {
        let (_dir, ws) = workspace_with_project();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond(
            "compose down",
            CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
        );
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let report = delete_project(&session, "blog").unwrap();
        assert!(!report.containers_stopped);
        assert!(!ws.project_dir("blog").exists());
    }

    #[test]
    fn directories_without_compose_file_are_not_candidates() {
        let (_dir, ws) = workspace_with_project();
        fs::create_dir_all(ws.project_dir("notes")).unwrap();
        let cfg = Config::default();
        let runner = MockRunner::default();
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        assert_eq!(
            delete_project(&session, "notes").unwrap_err().error_code(),
            "validation_error"
        );
        assert!(ws.project_dir("notes").exists());
        assert!(runner.calls().is_empty());
    }
}
