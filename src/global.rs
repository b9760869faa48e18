use crate::error::RicolError;
use crate::poller::{await_ready, RetryPolicy};
use crate::process::ProcessRunner;
use crate::project::find_compose_file;
use crate::session::Session;
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalState {
    Unconfigured,
    Stopped,
    Starting,
    Healthy,
    Degraded,
}

impl GlobalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalStatus {
    pub state: GlobalState,
    pub running: Vec<String>,
    pub missing: Vec<String>,
}

pub struct GlobalEnvironment<'s, 'a, R: ProcessRunner> {
    session: &'s Session<'a, R>,
    state: Cell<GlobalState>,
}

impl<'s, 'a, R: ProcessRunner> GlobalEnvironment<'s, 'a, R> {
    pub fn new(session: &'s Session<'a, R>) -> Self {
        Self {
            session,
            state: Cell::new(GlobalState::Stopped),
        }
    }

    pub fn state(&self) -> GlobalState {
        self.state.get()
    }

    fn transition(&self, next: GlobalState) {
        let previous = self.state.replace(next);
        if previous != next {
            info!(from = previous.as_str(), to = next.as_str(), "global environment state");
        }
    }

    fn require_configured(&self) -> Result<(), RicolError> {
        let global = &self.session.workspace.global;
        if global.is_dir() && find_compose_file(global).is_some() {
            return Ok(());
        }
        self.transition(GlobalState::Unconfigured);
        Err(RicolError::precondition(
            format!(
                "the global environment is not configured ({} has no compose file)",
                global.display()
            ),
            "run `ricol config` first",
        ))
    }

    fn service_split(&self) -> Result<(Vec<String>, Vec<String>), RicolError> {
        let running = self.session.runtime.list_running_service_names()?;
        Ok(self
            .session
            .cfg
            .global
            .services
            .iter()
            .cloned()
            .partition(|name| running.contains(name)))
    }

    fn database_accepts_queries(&self) -> bool {
        self.session
            .runtime
            .db_exec(&self.session.cfg.global, "SELECT 1")
            .is_ok()
    }

    pub fn ensure_healthy(&self) -> Result<GlobalState, RicolError> {
        self.require_configured()?;
        let (_, missing) = self.service_split()?;
        if missing.is_empty() {
            self.transition(GlobalState::Healthy);
            return Ok(GlobalState::Healthy);
        }
        self.session.reporter.step(&format!(
            "Starting the global environment (not running: {})",
            missing.join(", ")
        ));
        self.bring_up(false)
    }

    fn bring_up(&self, force_recreate: bool) -> Result<GlobalState, RicolError> {
        let session = self.session;
        let global_cfg = &session.cfg.global;
        self.transition(GlobalState::Starting);

        session.runtime.network_ensure(&global_cfg.edge_network, None)?;
        session
            .runtime
            .network_ensure(&global_cfg.isolated_network.name, Some(&global_cfg.isolated_network))?;
        session
            .runtime
            .compose_up(&session.workspace.global, &BTreeMap::new(), force_recreate)?;

        session.reporter.detail("Waiting for the database to accept connections...");
        let policy = RetryPolicy::new(
            session.cfg.readiness.database_attempts,
            session.cfg.readiness.database_interval_ms,
        );
        if !await_ready(|| self.database_accepts_queries(), policy, session.sleeper) {
            self.transition(GlobalState::Degraded);
            return Err(RicolError::ReadinessTimeout {
                what: format!("database container `{}`", global_cfg.db_container),
                attempts: policy.max_attempts,
                hint: format!(
                    "check the logs with `docker logs {}` or `ricol global status`",
                    global_cfg.db_container
                ),
            });
        }
        self.transition(GlobalState::Healthy);
        Ok(GlobalState::Healthy)
    }

    pub fn start(&self, force_recreate: bool) -> Result<String, RicolError> {
        self.require_configured()?;
        let result = if force_recreate {
            self.bring_up(true)
        } else {
            self.ensure_healthy()
        };
        if let Err(err) = result {
            self.session.reporter.warn("global environment failed to start; recent logs follow");
            if let Err(log_err) = self.session.runtime.compose_logs(&self.session.workspace.global) {
                warn!(error = %log_err, "could not read global compose logs");
            }
            return Err(err);
        }
        self.session.runtime.compose_status(&self.session.workspace.global)
    }

    pub fn stop(&self) -> Result<(), RicolError> {
        self.require_configured()?;
        self.session.runtime.compose_down(&self.session.workspace.global)?;
        self.transition(GlobalState::Stopped);
        Ok(())
    }

    pub fn status(&self) -> Result<GlobalStatus, RicolError> {
        if self.require_configured().is_err() {
            return Ok(GlobalStatus {
                state: GlobalState::Unconfigured,
                running: Vec::new(),
                missing: self.session.cfg.global.services.clone(),
            });
        }
        let (running, missing) = self.service_split()?;
        let state = if missing.is_empty() {
            GlobalState::Healthy
        } else if running.is_empty() {
            GlobalState::Stopped
        } else {
            GlobalState::Degraded
        };
        self.transition(state);
        Ok(GlobalStatus {
            state,
            running,
            missing,
        })
    }
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

    fn configured_workspace() -> (TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::from_base(dir.path());
        ws.ensure().unwrap();
        fs::write(ws.global.join("docker-compose.yml"), "services: {}\n").unwrap();
        (dir, ws)
    }

    const BOTH_RUNNING: &str = "global-traefik\nglobal-mariadb\n";

    #[test]
    fn missing_global_dir_is_precondition_without_calls() {
        let dir = tempdir().unwrap();
        let ws = Workspace::from_base(dir.path());
        let cfg = Config::default();
        let runner = MockRunner::default();
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let env = GlobalEnvironment::new(&session);
        let err = env.ensure_healthy().unwrap_err();
        assert_eq!(err.error_code(), "precondition_missing");
        assert_eq!(env.state(), GlobalState::Unconfigured);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn fast_path_never_runs_compose_up() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond("docker ps --format", CommandOutput::with_stdout(0, BOTH_RUNNING));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let env = GlobalEnvironment::new(&session);
        assert_eq!(env.ensure_healthy().unwrap(), GlobalState::Healthy);
        assert_eq!(runner.count("up -d"), 0);
        assert_eq!(runner.count("network"), 0);
    }

    #[test]
    fn starts_networks_then_compose_then_polls_database() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond("docker ps --format", CommandOutput::with_stdout(0, "global-traefik\n"));
        runner.respond("network inspect", CommandOutput::failed(1, "No such network"));
        runner.respond_seq(
            "SELECT 1",
            vec![
                CommandOutput::failed(1, "Can't connect to local server"),
                CommandOutput::failed(1, "Can't connect to local server"),
                CommandOutput::ok(),
            ],
        );
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let env = GlobalEnvironment::new(&session);
        assert_eq!(env.ensure_healthy().unwrap(), GlobalState::Healthy);

        let edge = runner.position("network create sr-reverse-proxy").unwrap();
        let isolated = runner
            .position("network create --subnet=10.0.120.0/24 --gateway=10.0.120.1 sr-public_network")
            .unwrap();
        let up = runner.position("compose up -d").unwrap();
        let first_probe = runner.position("SELECT 1").unwrap();
        assert!(edge < isolated && isolated < up && up < first_probe);
        assert_eq!(runner.count("SELECT 1"), 3);
        assert_eq!(sleeper.slept.borrow().len(), 2);
    }

    #[test]
    fn exhausted_database_poll_is_degraded_timeout() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond("docker ps --format", CommandOutput::with_stdout(0, ""));
        runner.respond("SELECT 1", CommandOutput::failed(1, "Can't connect"));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let env = GlobalEnvironment::new(&session);
        let err = env.ensure_healthy().unwrap_err();
        assert_eq!(err.error_code(), "readiness_timeout");
        assert_eq!(env.state(), GlobalState::Degraded);
        assert_eq!(runner.count("SELECT 1"), 5);
    }

    #[test]
    fn status_reports_partial_runtime_as_degraded() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond("docker ps --format", CommandOutput::with_stdout(0, "global-mariadb\nblog-php\n"));
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let status = GlobalEnvironment::new(&session).status().unwrap();
        assert_eq!(status.state, GlobalState::Degraded);
        assert_eq!(status.running, vec!["global-mariadb"]);
        assert_eq!(status.missing, vec!["global-traefik"]);
    }

    #[test]
    fn start_failure_shows_logs_before_error() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        runner.respond("docker ps --format", CommandOutput::with_stdout(0, ""));
        runner.respond(
            "compose up",
            CommandOutput::failed(1, "Bind for 0.0.0.0:443 failed: port is already allocated"),
        );
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let err = GlobalEnvironment::new(&session).start(false).unwrap_err();
        assert_eq!(err.error_code(), "docker_port_conflict");
        assert!(runner.position("compose logs").unwrap() > runner.position("compose up").unwrap());
    }

    #[test]
    fn stop_runs_down_unconditionally() {
        let (_dir, ws) = configured_workspace();
        let cfg = Config::default();
        let runner = MockRunner::default();
        let sleeper = FakeSleeper::default();
        let session = Session::new(&cfg, &ws, &runner, &sleeper, Reporter::silent());
        let env = GlobalEnvironment::new(&session);
        env.stop().unwrap();
        env.stop().unwrap();
        assert_eq!(runner.count("compose down"), 2);
        assert_eq!(runner.count("docker ps"), 0);
    }
}
