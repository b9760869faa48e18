use crate::adapters::{CertIssuer, ContainerRuntime, PackageTools};
use crate::config::Config;
use crate::paths::Workspace;
use crate::poller::Sleeper;
use crate::process::ProcessRunner;
use crate::ui::Reporter;

pub struct Session<'a, R: ProcessRunner> {
    pub cfg: &'a Config,
    pub workspace: &'a Workspace,
    pub runner: &'a R,
    pub runtime: ContainerRuntime<'a, R>,
    pub sleeper: &'a dyn Sleeper,
    pub reporter: Reporter,
}

impl<'a, R: ProcessRunner> Session<'a, R> {
    pub fn new(
        cfg: &'a Config,
        workspace: &'a Workspace,
        runner: &'a R,
        sleeper: &'a dyn Sleeper,
        reporter: Reporter,
    ) -> Self {
        Self {
            cfg,
            workspace,
            runner,
            runtime: ContainerRuntime::new(runner),
            sleeper,
            reporter,
        }
    }

    pub fn packages(&self) -> PackageTools<'a, R> {
        PackageTools::new(self.runner, &self.workspace.bin)
    }

    pub fn certs(&self) -> CertIssuer<'a, R> {
        CertIssuer::new(self.runner)
    }
}
