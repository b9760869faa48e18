use crate::adapters::fsops;
use crate::bootstrap::{bootstrap_laravel, bootstrap_wordpress, LaravelOptions};
use crate::error::RicolError;
use crate::global::GlobalEnvironment;
use crate::grant::DatabaseGrant;
use crate::lifecycle::await_containers;
use crate::process::ProcessRunner;
use crate::project::{
    current_user_name, find_compose_file, php_image, rewrite_templates, EnvironmentFile,
    ProjectIdentity, ProjectKind, TemplateValues,
};
use crate::session::Session;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: ProjectKind,
    pub url: String,
    pub php_version: String,
    pub laravel: LaravelOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub project: ProjectIdentity,
    pub path: PathBuf,
    pub env_file: PathBuf,
    pub php_image: String,
    pub status: String,
}

fn environment_file(identity: &ProjectIdentity, grant: &DatabaseGrant) -> EnvironmentFile {
    let env = EnvironmentFile::new(&identity.url, &identity.compose_id);
    match identity.kind {
        ProjectKind::WordPress => env.with_extra("WORDPRESS_DB_NAME", &grant.database),
        ProjectKind::Laravel => env
            .with_extra("DB_DATABASE", &grant.database)
            .with_extra("DB_USERNAME", &grant.user)
            .with_extra("DB_PASSWORD", &grant.password),
    }
}

// Steps run in order and are not rolled back; a failure after the copy leaves
// the project directory in place for manual cleanup and a re-run.
pub fn create_project<R: ProcessRunner, G: Rng>(
    session: &Session<'_, R>,
    request: &CreateRequest,
    rng: &mut G,
) -> Result<ProvisionReport, RicolError> {
    let cfg = session.cfg;
    let workspace = session.workspace;
    let reporter = &session.reporter;

    let identity = ProjectIdentity::new(request.kind, &request.url, &cfg.domains.suffixes)?;
    let image = php_image(&request.php_version)?;
    if identity.kind == ProjectKind::Laravel {
        request.laravel.validate()?;
    }
    let grant = DatabaseGrant::for_project(&identity, cfg);
    grant.statements()?;

    let project_dir = workspace.project_dir(&identity.name);
    if project_dir.exists() {
        return Err(RicolError::AlreadyExists(format!(
            "project '{}' already exists at {}",
            identity.name,
            project_dir.display()
        )));
    }
    let template = workspace.template_dir(identity.kind.template_name());
    if find_compose_file(&template).is_none() {
        return Err(RicolError::precondition(
            format!(
                "{} template not found at {}",
                identity.kind.label(),
                template.display()
            ),
            "run `ricol config` to install the templates",
        ));
    }
    workspace.ensure()?;

    reporter.step(&format!("Copying the {} template", identity.kind.label()));
    fsops::copy_tree(&template, &project_dir)?;
    fsops::chmod_tree(&project_dir, 0o755)?;

    let env_file = environment_file(&identity, &grant).write(&project_dir)?;
    let values = TemplateValues::for_project(&identity, &image, &current_user_name());
    rewrite_templates(&project_dir, &values)?;
    info!(project = %identity.name, path = %project_dir.display(), "project files materialized");

    reporter.step("Checking the global environment");
    GlobalEnvironment::new(session).ensure_healthy()?;

    reporter.step(&format!("Creating database {}", grant.database));
    grant.ensure(&session.runtime, &cfg.global)?;

    match identity.kind {
        ProjectKind::WordPress => bootstrap_wordpress(session, &project_dir, &identity, &grant, rng)?,
        ProjectKind::Laravel => {
            bootstrap_laravel(session, &project_dir, &identity, &grant, &request.laravel)?
        }
    }

    reporter.step("Starting the project containers");
    let runtime_env = EnvironmentFile::read(&project_dir)?.runtime_env();
    session.runtime.compose_up(&project_dir, &runtime_env, false)?;
    let status = await_containers(session, &project_dir)?;

    Ok(ProvisionReport {
        project: identity,
        path: project_dir,
        env_file,
        php_image: image,
        status,
    })
}
