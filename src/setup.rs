use crate::adapters::{fsops, NetworkOutcome};
use crate::error::RicolError;
use crate::process::{probe, ProcessRequest, ProcessRunner};
use crate::project::find_compose_file;
use crate::session::Session;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CERT_FILE: &str = "localhost-cert.pem";
pub const KEY_FILE: &str = "localhost-key.pem";

const GLOBAL_BUNDLE: &str = "ricol-global-docker-local-ssl";

const TEMPLATE_BUNDLES: [(&str, &str); 2] = [
    ("ricol-stack-wp-nginx", "wordpress"),
    ("ricol-stack-laravel-nginx", "laravel"),
];

fn has_bundle(dir: &Path) -> bool {
    dir.join(GLOBAL_BUNDLE).is_dir()
}

// `--bundle-dir`, then `$RICOL_BUNDLE_DIR`, then the directory of the
// executable (following a symlinked install), then the working directory.
pub fn resolve_bundle_dir(override_dir: Option<&PathBuf>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.clone();
    }
    if let Ok(dir) = env::var("RICOL_BUNDLE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(exe) = env::current_exe() {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(parent) = exe.parent() {
            candidates.push(parent.to_path_buf());
        }
        if let Ok(canonical) = exe.canonicalize() {
            if let Some(parent) = canonical.parent() {
                candidates.push(parent.to_path_buf());
                candidates.push(parent.join("../share/ricol"));
            }
        }
        if let Some(found) = candidates.into_iter().find(|dir| has_bundle(dir)) {
            return found;
        }
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub name: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub base: PathBuf,
    pub created_dirs: Vec<PathBuf>,
    pub templates: Vec<PathBuf>,
    pub certificates_issued: bool,
    pub networks: Vec<NetworkReport>,
}

pub fn configure<R: ProcessRunner>(
    session: &Session<'_, R>,
    bundle_dir: &Path,
) -> Result<SetupReport, RicolError> {
    let workspace = session.workspace;
    let reporter = &session.reporter;
    let certs = session.certs();

    reporter.step("Checking required tools");
    if !session.runtime.runtime_available() {
        return Err(RicolError::precondition(
            "docker is not installed or not on PATH",
            "install Docker (https://docs.docker.com/get-docker/) and re-run `ricol config`",
        ));
    }
    if !certs.available() {
        return Err(RicolError::precondition(
            "mkcert is not installed or not on PATH",
            "install mkcert (https://github.com/FiloSottile/mkcert) and re-run `ricol config`",
        ));
    }
    let mut sources: Vec<(PathBuf, PathBuf)> = TEMPLATE_BUNDLES
        .iter()
        .map(|(source, target)| (bundle_dir.join(source), workspace.template_dir(target)))
        .collect();
    sources.push((bundle_dir.join(GLOBAL_BUNDLE), workspace.global.clone()));
    if let Some((missing, _)) = sources.iter().find(|(source, _)| !source.is_dir()) {
        return Err(RicolError::precondition(
            format!("template bundle not found at {}", missing.display()),
            "pass --bundle-dir (or set RICOL_BUNDLE_DIR) to the directory holding the ricol-* stacks",
        ));
    }

    reporter.step("Creating the workspace");
    let created_dirs = workspace.ensure()?;
    for dir in &created_dirs {
        reporter.detail(&format!("created {}", dir.display()));
    }

    reporter.step("Installing templates and the global environment");
    for (source, target) in &sources {
        fsops::copy_tree(source, target)?;
        fsops::chmod_tree(target, 0o755)?;
    }

    let certs_dir = workspace.certs_dir();
    let cert = certs_dir.join(CERT_FILE);
    let key = certs_dir.join(KEY_FILE);
    let certificates_issued = if cert.is_file() && key.is_file() {
        reporter.detail("TLS certificates already present");
        false
    } else {
        reporter.step("Issuing local TLS certificates");
        if let Err(err) = certs.install_ca() {
            warn!(error = %err, "mkcert -install failed");
            reporter.warn("could not install the local CA; browsers may not trust the certificates");
        }
        certs.issue(&session.cfg.domains.certificate_patterns(), &cert, &key)?;
        true
    };

    reporter.step("Creating docker networks");
    let global_cfg = &session.cfg.global;
    let mut networks = Vec::new();
    for (name, subnet) in [
        (&global_cfg.edge_network, None),
        (&global_cfg.isolated_network.name, Some(&global_cfg.isolated_network)),
    ] {
        let outcome = session.runtime.network_ensure(name, subnet)?;
        networks.push(NetworkReport {
            name: name.clone(),
            created: outcome == NetworkOutcome::Created,
        });
    }

    Ok(SetupReport {
        base: workspace.base.clone(),
        created_dirs,
        templates: sources.into_iter().map(|(_, target)| target).collect(),
        certificates_issued,
        networks,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub id: String,
    pub ok: bool,
    pub severity: String,
    pub message: String,
    pub remediation: String,
}

fn doctor_check(id: &str, ok: bool, severity: &str, message: &str, remediation: &str) -> DoctorCheck {
    DoctorCheck {
        id: id.to_string(),
        ok,
        severity: severity.to_string(),
        message: message.to_string(),
        remediation: remediation.to_string(),
    }
}

pub fn collect_doctor_checks<R: ProcessRunner>(session: &Session<'_, R>) -> Vec<DoctorCheck> {
    let runner = session.runner;
    let workspace = session.workspace;
    let mut checks = Vec::new();

    let docker_installed = runner.locate("docker").is_some();
    let docker_ok = docker_installed
        && probe(runner, &ProcessRequest::new("docker", ["info"]).capture());
    checks.push(doctor_check(
        "docker_runtime",
        docker_ok,
        "error",
        if docker_ok {
            "docker daemon reachable"
        } else if docker_installed {
            "docker is installed but the daemon is unreachable"
        } else {
            "docker is not installed or not on PATH"
        },
        "Install/start Docker and rerun `ricol doctor`.",
    ));

    let compose_ok = docker_installed && session.runtime.compose_available();
    checks.push(doctor_check(
        "docker_compose",
        compose_ok,
        "error",
        if compose_ok {
            "docker compose is available"
        } else {
            "neither `docker compose` nor `docker-compose` is available"
        },
        "Install the Docker Compose plugin.",
    ));

    for (tool, severity, remediation) in [
        ("mkcert", "error", "Install mkcert, then run `ricol config`."),
        ("php", "warning", "Install the PHP CLI (needed for WordPress and Laravel bootstrap)."),
        ("composer", "warning", "Install Composer (needed for Laravel projects)."),
        ("npm", "warning", "Install Node.js and npm (needed for Laravel projects)."),
    ] {
        let ok = runner.locate(tool).is_some();
        let message = if ok {
            format!("{tool} found")
        } else {
            format!("{tool} not found on PATH")
        };
        checks.push(doctor_check(
            &format!("tool_{tool}"),
            ok,
            severity,
            &message,
            remediation,
        ));
    }

    let layout_ok = workspace.is_materialized();
    checks.push(doctor_check(
        "workspace_layout",
        layout_ok,
        "error",
        &if layout_ok {
            format!("workspace ready at {}", workspace.base.display())
        } else {
            format!("workspace at {} is incomplete", workspace.base.display())
        },
        "Run `ricol config`.",
    ));

    let global_ok = find_compose_file(&workspace.global).is_some();
    checks.push(doctor_check(
        "global_environment",
        global_ok,
        "error",
        if global_ok {
            "global environment installed"
        } else {
            "global environment compose file missing"
        },
        "Run `ricol config`.",
    ));

    let certs_ok = workspace.certs_dir().join(CERT_FILE).is_file()
        && workspace.certs_dir().join(KEY_FILE).is_file();
    checks.push(doctor_check(
        "tls_certificates",
        certs_ok,
        "warning",
        if certs_ok {
            "TLS certificates present"
        } else {
            "TLS certificates missing"
        },
        "Run `ricol config` to issue them with mkcert.",
    ));

    for (_, template) in TEMPLATE_BUNDLES {
        let ok = find_compose_file(&workspace.template_dir(template)).is_some();
        checks.push(doctor_check(
            &format!("template_{template}"),
            ok,
            "error",
            &if ok {
                format!("{template} template installed")
            } else {
                format!("{template} template missing")
            },
            "Run `ricol config`.",
        ));
    }

    checks
}
