use crate::adapters::fsops;
use crate::error::RicolError;
use crate::paths::{LegacyLayout, Workspace};
use crate::project::find_compose_file;
use crate::ui::Reporter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub sites: Option<PathBuf>,
    pub global: Option<PathBuf>,
    pub projects: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.sites.is_none() && self.global.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub projects: Vec<String>,
    pub global_moved: bool,
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn colliding_files(src: &Path, dst: &Path, found: &mut Vec<PathBuf>) -> Result<(), RicolError> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            colliding_files(&entry.path(), &target, found)?;
        } else if target.exists() {
            found.push(target);
        }
    }
    Ok(())
}

fn check_overwrites(workspace: &Workspace, plan: &MigrationPlan) -> Result<(), RicolError> {
    let conflicts: Vec<&String> = plan
        .projects
        .iter()
        .filter(|name| workspace.project_dir(name).exists())
        .collect();
    if !conflicts.is_empty() {
        return Err(RicolError::AlreadyExists(format!(
            "projects already present in {}: {}; move or remove them before migrating",
            workspace.sites.display(),
            conflicts
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    if let Some(sites) = &plan.sites {
        for entry in fs::read_dir(sites)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let target = workspace.sites.join(entry.file_name());
            if target.exists() {
                return Err(RicolError::AlreadyExists(format!(
                    "{} already exists; move or remove it before migrating",
                    target.display()
                )));
            }
        }
    }

    if let Some(global) = &plan.global {
        if let Some(compose) = find_compose_file(&workspace.global) {
            return Err(RicolError::AlreadyExists(format!(
                "a global environment is already configured ({}); remove {} or the legacy one at {}",
                compose.display(),
                workspace.global.display(),
                global.display()
            )));
        }
        if workspace.global.is_dir() {
            let mut found = Vec::new();
            colliding_files(global, &workspace.global, &mut found)?;
            if let Some(first) = found.first() {
                return Err(RicolError::AlreadyExists(format!(
                    "{} already exists; move or remove it before migrating",
                    first.display()
                )));
            }
        }
    }
    Ok(())
}

pub fn plan(legacy: &LegacyLayout) -> Result<MigrationPlan, RicolError> {
    let sites = legacy.sites.is_dir().then(|| legacy.sites.clone());
    let global = legacy.global.is_dir().then(|| legacy.global.clone());
    let projects = match &sites {
        Some(dir) => fsops::list_subdirs(dir)?.iter().map(|p| entry_name(p)).collect(),
        None => Vec::new(),
    };
    Ok(MigrationPlan {
        sites,
        global,
        projects,
    })
}

// Moves the legacy flat layout into the workspace. Each legacy tree is
// deleted only after everything under it was copied.
pub fn migrate(
    workspace: &Workspace,
    legacy: &LegacyLayout,
    reporter: &Reporter,
) -> Result<MigrationReport, RicolError> {
    let plan = plan(legacy)?;
    if plan.is_empty() {
        return Ok(MigrationReport::default());
    }

    check_overwrites(workspace, &plan)?;

    workspace.ensure()?;
    let mut report = MigrationReport::default();

    if let Some(sites) = &plan.sites {
        let entries = fs::read_dir(sites)?;
        for entry in entries {
            let source = entry?.path();
            let name = entry_name(&source);
            let target = workspace.sites.join(&name);
            if source.is_dir() {
                reporter.detail(&format!("copying project {name}"));
                fsops::copy_tree(&source, &target)?;
                report.projects.push(name);
            } else {
                fs::copy(&source, &target)?;
            }
        }
        report.projects.sort();
        fsops::delete_tree(sites)?;
        info!(from = %sites.display(), count = report.projects.len(), "legacy projects migrated");
    }

    if let Some(global) = &plan.global {
        reporter.detail("copying the global environment");
        fsops::copy_tree(global, &workspace.global)?;
        fsops::delete_tree(global)?;
        report.global_moved = true;
        info!(from = %global.display(), "legacy global environment migrated");
    }
    Ok(report)
}
