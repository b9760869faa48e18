use crate::config::{expand_home_path, Config};
use crate::error::RicolError;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const SITES_DIR: &str = "sites";
pub const GLOBAL_DIR: &str = "global";
pub const TEMPLATES_DIR: &str = "templates";
pub const LOGS_DIR: &str = "logs";
pub const BIN_DIR: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub base: PathBuf,
    pub sites: PathBuf,
    pub global: PathBuf,
    pub templates: PathBuf,
    pub logs: PathBuf,
    pub bin: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyLayout {
    pub sites: PathBuf,
    pub global: PathBuf,
}

pub fn normalize_slashes(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

impl Workspace {
    pub fn from_base(base: &Path) -> Self {
        let base = normalize_slashes(base);
        Self {
            sites: base.join(SITES_DIR),
            global: base.join(GLOBAL_DIR),
            templates: base.join(TEMPLATES_DIR),
            logs: base.join(LOGS_DIR),
            bin: base.join(BIN_DIR),
            base,
        }
    }

    pub fn subdirs(&self) -> [&Path; 5] {
        [
            self.sites.as_path(),
            self.global.as_path(),
            self.templates.as_path(),
            self.logs.as_path(),
            self.bin.as_path(),
        ]
    }

    pub fn ensure(&self) -> Result<Vec<PathBuf>, RicolError> {
        let mut created = Vec::new();
        for dir in self.subdirs() {
            if dir.is_dir() {
                continue;
            }
            match fs::create_dir_all(dir) {
                Ok(()) => created.push(dir.to_path_buf()),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(created)
    }

    pub fn is_materialized(&self) -> bool {
        self.subdirs().iter().all(|dir| dir.is_dir())
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.sites.join(name)
    }

    pub fn template_dir(&self, template: &str) -> PathBuf {
        self.templates.join(template)
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.global.join("certs")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.logs.join("ricol.log")
    }
}

pub fn resolve_paths(home: &Path, base_dir: &str) -> Result<Workspace, RicolError> {
    let base = expand_home_path(base_dir, home, "paths.base_dir")?;
    Ok(Workspace::from_base(&base))
}

pub fn resolve_legacy_layout(home: &Path, cfg: &Config) -> Result<LegacyLayout, RicolError> {
    Ok(LegacyLayout {
        sites: normalize_slashes(&expand_home_path(
            &cfg.paths.legacy_sites_dir,
            home,
            "paths.legacy_sites_dir",
        )?),
        global: normalize_slashes(&expand_home_path(
            &cfg.paths.legacy_global_dir,
            home,
            "paths.legacy_global_dir",
        )?),
    })
}

pub fn required_home_dir() -> Result<PathBuf, RicolError> {
    let home = dirs::home_dir().ok_or_else(|| {
        RicolError::Config("unable to resolve $HOME; set HOME to an existing directory".to_string())
    })?;
    if !home.is_absolute() {
        return Err(RicolError::Config(format!(
            "resolved HOME path is not absolute: {}",
            home.display()
        )));
    }
    Ok(home)
}

pub fn resolve_workspace(cfg: &Config, home: &Path) -> Result<Workspace, RicolError> {
    if let Ok(base) = env::var("RICOL_HOME") {
        if !base.trim().is_empty() {
            return resolve_paths(home, &base);
        }
    }
    resolve_paths(home, &cfg.paths.base_dir)
}

pub fn display_path_with_home(path: &Path, home: Option<&Path>) -> String {
    if let Some(home_path) = home {
        if let Ok(relative) = path.strip_prefix(home_path) {
            if relative.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}
