use crate::config::{GlobalConfig, IsolatedNetwork};
use crate::error::RicolError;
use crate::process::{execute, probe, ProcessRequest, ProcessRunner};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    Plugin,
    Standalone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    Created,
    AlreadyExists,
}

pub struct ContainerRuntime<'a, R: ProcessRunner> {
    runner: &'a R,
    flavor: OnceCell<ComposeFlavor>,
}

pub fn states_report_failure(states: &[String]) -> bool {
    states
        .iter()
        .any(|state| state.eq_ignore_ascii_case("exited") || state.eq_ignore_ascii_case("dead"))
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl<'a, R: ProcessRunner> ContainerRuntime<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            flavor: OnceCell::new(),
        }
    }

    pub fn runtime_available(&self) -> bool {
        probe(
            self.runner,
            &ProcessRequest::new("docker", ["--version"]).capture(),
        )
    }

    pub fn compose_flavor(&self) -> ComposeFlavor {
        *self.flavor.get_or_init(|| {
            if probe(
                self.runner,
                &ProcessRequest::new("docker", ["compose", "version"]).capture(),
            ) {
                ComposeFlavor::Plugin
            } else {
                ComposeFlavor::Standalone
            }
        })
    }

    pub fn compose_available(&self) -> bool {
        match self.compose_flavor() {
            ComposeFlavor::Plugin => true,
            ComposeFlavor::Standalone => self.runner.locate("docker-compose").is_some(),
        }
    }

    fn compose(&self, dir: &Path, args: &[&str]) -> ProcessRequest {
        let (program, mut full_args) = match self.compose_flavor() {
            ComposeFlavor::Plugin => ("docker", vec!["compose".to_string()]),
            ComposeFlavor::Standalone => ("docker-compose", Vec::new()),
        };
        full_args.extend(args.iter().map(|arg| arg.to_string()));
        ProcessRequest::new(program, full_args).cwd(dir)
    }

    // Create-if-absent. An existing network (or a create that races with
    // another process and reports "already exists") is success.
    pub fn network_ensure(
        &self,
        name: &str,
        subnet: Option<&IsolatedNetwork>,
    ) -> Result<NetworkOutcome, RicolError> {
        let inspect = ProcessRequest::new("docker", ["network", "inspect", name]).capture();
        if probe(self.runner, &inspect) {
            return Ok(NetworkOutcome::AlreadyExists);
        }
        let mut args = vec!["network".to_string(), "create".to_string()];
        if let Some(network) = subnet {
            args.push(format!("--subnet={}", network.subnet));
            args.push(format!("--gateway={}", network.gateway));
        }
        args.push(name.to_string());
        match execute(self.runner, &ProcessRequest::new("docker", args).capture()) {
            Ok(_) => Ok(NetworkOutcome::Created),
            Err(err)
                if err
                    .details()
                    .and_then(|d| d.raw_stderr.as_deref())
                    .map(|stderr| stderr.to_lowercase().contains("already exists"))
                    .unwrap_or(false) =>
            {
                Ok(NetworkOutcome::AlreadyExists)
            }
            Err(err) => Err(err),
        }
    }

    pub fn compose_up(
        &self,
        dir: &Path,
        env: &BTreeMap<String, String>,
        force_recreate: bool,
    ) -> Result<(), RicolError> {
        let mut args = vec!["up", "-d"];
        if force_recreate {
            args.push("--force-recreate");
        }
        execute(self.runner, &self.compose(dir, &args).envs(env))?;
        Ok(())
    }

    pub fn compose_down(&self, dir: &Path) -> Result<(), RicolError> {
        execute(self.runner, &self.compose(dir, &["down"]))?;
        Ok(())
    }

    pub fn compose_status(&self, dir: &Path) -> Result<String, RicolError> {
        let args: &[&str] = match self.compose_flavor() {
            ComposeFlavor::Plugin => &["ps", "--all"],
            ComposeFlavor::Standalone => &["ps"],
        };
        let output = execute(self.runner, &self.compose(dir, args).capture())?;
        Ok(output.stdout_text())
    }

    // Engine state of every project container, looked up by container id.
    pub fn compose_states(&self, dir: &Path) -> Result<Vec<String>, RicolError> {
        let args: &[&str] = match self.compose_flavor() {
            ComposeFlavor::Plugin => &["ps", "--all", "-q"],
            ComposeFlavor::Standalone => &["ps", "-q"],
        };
        let listed = execute(self.runner, &self.compose(dir, args).capture())?;
        let ids = non_empty_lines(&listed.stdout_text());
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut inspect = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
        ];
        inspect.extend(ids);
        let output = execute(self.runner, &ProcessRequest::new("docker", inspect).capture())?;
        Ok(non_empty_lines(&output.stdout_text()))
    }

    pub fn compose_logs(&self, dir: &Path) -> Result<(), RicolError> {
        execute(self.runner, &self.compose(dir, &["logs", "--tail", "100"]))?;
        Ok(())
    }

    pub fn list_running_service_names(&self) -> Result<BTreeSet<String>, RicolError> {
        let output = execute(
            self.runner,
            &ProcessRequest::new("docker", ["ps", "--format", "{{.Names}}"]).capture(),
        )?;
        Ok(non_empty_lines(&output.stdout_text()).into_iter().collect())
    }

    // Runs one SQL statement inside the shared database container. The root
    // password is forwarded from the docker client's environment
    // (`-e MYSQL_PWD` without a value), so it never appears in any argv.
    pub fn db_exec(&self, global: &GlobalConfig, sql: &str) -> Result<(), RicolError> {
        let env = BTreeMap::from([("MYSQL_PWD".to_string(), global.db_root_password.clone())]);
        let request = ProcessRequest::new(
            "docker",
            [
                "exec".to_string(),
                "-e".to_string(),
                "MYSQL_PWD".to_string(),
                global.db_container.clone(),
                "mysql".to_string(),
                format!("-u{}", global.db_root_user),
                "-e".to_string(),
                sql.to_string(),
            ],
        )
        .envs(&env)
        .capture();
        execute(self.runner, &request)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::MockRunner;
    use std::path::PathBuf;

    #[test]
    fn network_ensure_skips_create_when_inspect_succeeds() {
        let runner = MockRunner::default();
        let runtime = ContainerRuntime::new(&runner);
        let outcome = runtime.network_ensure("sr-reverse-proxy", None).unwrap();
        assert_eq!(outcome, NetworkOutcome::AlreadyExists);
        assert_eq!(runner.count("network create"), 0);
    }

    #[test]
    fn network_ensure_creates_subnet_network() {
        let runner = MockRunner::default();
        runner.respond("network inspect", CommandOutput::failed(1, "No such network"));
        let runtime = ContainerRuntime::new(&runner);
        let outcome = runtime
            .network_ensure("sr-public_network", Some(&IsolatedNetwork::default()))
            .unwrap();
        assert_eq!(outcome, NetworkOutcome::Created);
        let create = runner
            .calls()
            .into_iter()
            .find(|call| call.args.iter().any(|a| a == "create"))
            .expect("create call");
        assert_eq!(
            create.args,
            vec![
                "network",
                "create",
                "--subnet=10.0.120.0/24",
                "--gateway=10.0.120.1",
                "sr-public_network"
            ]
        );
    }

    #[test]
    fn network_ensure_treats_already_exists_as_success() {
        let runner = MockRunner::default();
        runner.respond("network inspect", CommandOutput::failed(1, "No such network"));
        runner.respond(
            "network create",
            CommandOutput::failed(1, "Error response from daemon: network with name sr-reverse-proxy already exists"),
        );
        let runtime = ContainerRuntime::new(&runner);
        assert_eq!(
            runtime.network_ensure("sr-reverse-proxy", None).unwrap(),
            NetworkOutcome::AlreadyExists
        );
    }

    #[test]
    fn compose_falls_back_to_standalone_binary() {
        let runner = MockRunner::default();
        runner.respond("docker compose version", CommandOutput::failed(1, "not a docker command"));
        let runtime = ContainerRuntime::new(&runner);
        runtime.compose_down(&PathBuf::from("/tmp/site")).unwrap();
        let last = runner.calls().pop().unwrap();
        assert_eq!(last.program, "docker-compose");
        assert_eq!(last.args, vec!["down"]);
        assert_eq!(last.cwd, Some(PathBuf::from("/tmp/site")));
    }

    #[test]
    fn compose_up_passes_environment() {
        let runner = MockRunner::default();
        let runtime = ContainerRuntime::new(&runner);
        let mut env = BTreeMap::new();
        env.insert("SITE_URL".to_string(), "blog.dev.localhost".to_string());
        runtime
            .compose_up(&PathBuf::from("/tmp/blog"), &env, false)
            .unwrap();
        let up = runner.calls().pop().unwrap();
        assert_eq!(up.args, vec!["compose", "up", "-d"]);
        assert_eq!(up.env.get("SITE_URL").map(String::as_str), Some("blog.dev.localhost"));
    }

    #[test]
    fn running_service_names_are_trimmed_set() {
        let runner = MockRunner::default();
        runner.respond(
            "docker ps --format",
            CommandOutput::with_stdout(0, "global-traefik\n  global-mariadb \n\nblog-nginx\n"),
        );
        let runtime = ContainerRuntime::new(&runner);
        let names = runtime.list_running_service_names().unwrap();
        assert!(names.contains("global-traefik"));
        assert!(names.contains("global-mariadb"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn db_exec_keeps_password_out_of_argv() {
        let runner = MockRunner::default();
        let runtime = ContainerRuntime::new(&runner);
        runtime
            .db_exec(&GlobalConfig::default(), "FLUSH PRIVILEGES")
            .unwrap();
        let call = runner.calls().pop().unwrap();
        assert_eq!(
            call.args,
            vec![
                "exec",
                "-e",
                "MYSQL_PWD",
                "global-mariadb",
                "mysql",
                "-uroot",
                "-e",
                "FLUSH PRIVILEGES"
            ]
        );
        assert_eq!(call.env.get("MYSQL_PWD").map(String::as_str), Some("root"));
    }

    #[test]
    fn only_exited_or_dead_states_count_as_failure() {
        let states = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(states_report_failure(&states(&["running", "Exited"])));
        assert!(states_report_failure(&states(&["dead"])));
        assert!(!states_report_failure(&states(&["running", "restarting"])));
        assert!(!states_report_failure(&[]));
    }

    #[test]
    fn compose_states_inspects_container_ids() {
        let runner = MockRunner::default();
        runner.respond("ps --all -q", CommandOutput::with_stdout(0, "a1b2\nc3d4\n"));
        runner.respond("docker inspect", CommandOutput::with_stdout(0, "running\nexited\n"));
        let runtime = ContainerRuntime::new(&runner);
        let states = runtime.compose_states(&PathBuf::from("/tmp/exitpoll")).unwrap();
        assert_eq!(states, vec!["running", "exited"]);
        let inspect = runner.calls().pop().unwrap();
        assert_eq!(
            inspect.args,
            vec!["inspect", "--format", "{{.State.Status}}", "a1b2", "c3d4"]
        );
    }

    #[test]
    fn compose_states_without_containers_skips_inspect() {
        let runner = MockRunner::default();
        let runtime = ContainerRuntime::new(&runner);
        assert!(runtime.compose_states(&PathBuf::from("/tmp/blog")).unwrap().is_empty());
        assert_eq!(runner.count("docker inspect"), 0);
    }
}
