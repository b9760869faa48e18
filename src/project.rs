use crate::adapters::fsops;
use crate::error::RicolError;
use clap::ValueEnum;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const PHP_VERSIONS: [&str; 6] = ["8.3", "8.2", "8.1", "8.0", "7.4", "7.3"];

pub const COMPOSE_FILE_NAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

pub const ENV_FILE: &str = ".env";
const NGINX_SITE_CONF: &str = "nginx/default.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[value(name = "wordpress")]
    WordPress,
    Laravel,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WordPress => "wordpress",
            Self::Laravel => "laravel",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::WordPress => "WordPress",
            Self::Laravel => "Laravel",
        }
    }

    pub fn template_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn database_prefix(&self) -> &'static str {
        match self {
            Self::WordPress => "wp",
            Self::Laravel => "laravel",
        }
    }
}

pub fn validate_url(url: &str, suffixes: &[String]) -> Result<String, RicolError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RicolError::Validation("the project URL must not be empty".to_string()));
    }
    if let Some(bad) = url
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
    {
        return Err(RicolError::Validation(format!(
            "the project URL '{url}' contains '{bad}'; only letters, digits, '.' and '-' are allowed"
        )));
    }
    if url.starts_with('.') || url.ends_with('.') || url.contains("..") {
        return Err(RicolError::Validation(format!(
            "the project URL '{url}' has an empty label"
        )));
    }
    let name = derive_project_name(url, suffixes).ok_or_else(|| {
        RicolError::Validation(format!(
            "the project URL must end with one of: {}",
            suffixes
                .iter()
                .map(|suffix| format!("*{suffix}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;
    if name.is_empty() || derive_compose_id(&name).is_empty() {
        return Err(RicolError::Validation(format!(
            "the project URL '{url}' has no name before the domain suffix"
        )));
    }
    Ok(url.to_string())
}

pub fn derive_project_name(url: &str, suffixes: &[String]) -> Option<String> {
    suffixes
        .iter()
        .filter(|suffix| url.ends_with(suffix.as_str()))
        .max_by_key(|suffix| suffix.len())
        .map(|suffix| url[..url.len() - suffix.len()].to_string())
}

pub fn derive_compose_id(name: &str) -> String {
    name.to_lowercase()
        .replace('.', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

pub fn database_name(kind: ProjectKind, compose_id: &str) -> String {
    format!("{}_{}", kind.database_prefix(), compose_id)
}

pub fn php_image(version: &str) -> Result<String, RicolError> {
    let version = version.trim();
    if !PHP_VERSIONS.contains(&version) {
        return Err(RicolError::Validation(format!(
            "unsupported PHP version '{version}'; choose one of {}",
            PHP_VERSIONS.join(", ")
        )));
    }
    Ok(format!("php:{version}-fpm"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectIdentity {
    pub kind: ProjectKind,
    pub url: String,
    pub name: String,
    pub compose_id: String,
    pub database: String,
}

impl ProjectIdentity {
    pub fn new(kind: ProjectKind, url: &str, suffixes: &[String]) -> Result<Self, RicolError> {
        let url = validate_url(url, suffixes)?;
        let name = derive_project_name(&url, suffixes).ok_or_else(|| {
            RicolError::Validation(format!("the project URL '{url}' has no known suffix"))
        })?;
        let compose_id = derive_compose_id(&name);
        Ok(Self {
            kind,
            database: database_name(kind, &compose_id),
            url,
            name,
            compose_id,
        })
    }
}

pub fn validate_project_name(name: &str) -> Result<(), RicolError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(RicolError::Validation(format!(
            "'{name}' is not a valid project name"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentFile {
    pub site_url: String,
    pub compose_project_name: String,
    pub extras: Vec<(String, String)>,
}

impl EnvironmentFile {
    pub fn new(site_url: &str, compose_project_name: &str) -> Self {
        Self {
            site_url: site_url.to_string(),
            compose_project_name: compose_project_name.to_string(),
            extras: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.push((key.to_string(), value.to_string()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "SITE_URL={}\nCOMPOSE_PROJECT_NAME={}\n",
            self.site_url, self.compose_project_name
        );
        for (key, value) in &self.extras {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }

    pub fn parse(content: &str) -> Result<Self, RicolError> {
        let mut site_url = None;
        let mut compose_project_name = None;
        let mut extras = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "SITE_URL" => site_url = Some(value),
                "COMPOSE_PROJECT_NAME" => compose_project_name = Some(value),
                other => extras.push((other.to_string(), value)),
            }
        }
        let site_url = site_url
            .ok_or_else(|| RicolError::external("SITE_URL is missing from the project .env", None))?;
        Ok(Self {
            compose_project_name: compose_project_name.unwrap_or_default(),
            site_url,
            extras,
        })
    }

    pub fn write(&self, project_dir: &Path) -> Result<PathBuf, RicolError> {
        let path = project_dir.join(ENV_FILE);
        fs::write(&path, self.render())?;
        Ok(path)
    }

    pub fn read(project_dir: &Path) -> Result<Self, RicolError> {
        let content = fs::read_to_string(project_dir.join(ENV_FILE))?;
        Self::parse(&content)
    }

    pub fn runtime_env(&self) -> std::collections::BTreeMap<String, String> {
        let mut env = std::collections::BTreeMap::new();
        env.insert("SITE_URL".to_string(), self.site_url.clone());
        env.insert(
            "COMPOSE_PROJECT_NAME".to_string(),
            self.compose_project_name.clone(),
        );
        env
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    pub db_name: String,
    pub labels: String,
    pub site_name: String,
    pub site_url: String,
    pub user_name: String,
    pub php_image: String,
}

impl TemplateValues {
    pub fn for_project(identity: &ProjectIdentity, php_image: &str, user_name: &str) -> Self {
        Self {
            db_name: identity.database.clone(),
            labels: identity.compose_id.clone(),
            site_name: identity.name.clone(),
            site_url: identity.url.clone(),
            user_name: user_name.to_string(),
            php_image: php_image.to_string(),
        }
    }
}

// Literal token replacement. Older templates carry hard-coded sample values
// instead of tokens; those are rewritten first so a URL that happens to
// contain a sample value is never rewritten twice.
pub fn substitute_placeholders(text: &str, values: &TemplateValues) -> String {
    let legacy_db = format!("WORDPRESS_DB_NAME: {}", values.db_name);
    let replacements: [(&str, &str); 8] = [
        ("WORDPRESS_DB_NAME: wordpress", legacy_db.as_str()),
        ("example.localhost", values.site_url.as_str()),
        ("<DB_NAME>", values.db_name.as_str()),
        ("<labels>", values.labels.as_str()),
        ("<SITE_NAME>", values.site_name.as_str()),
        ("<SITE_URL>", values.site_url.as_str()),
        ("<USER_NAME>", values.user_name.as_str()),
        ("<PHP_IMAGE>", values.php_image.as_str()),
    ];
    replacements
        .iter()
        .fold(text.to_string(), |acc, (token, value)| acc.replace(token, value))
}

pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
    COMPOSE_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

pub fn rewrite_templates(
    project_dir: &Path,
    values: &TemplateValues,
) -> Result<Vec<PathBuf>, RicolError> {
    let mut targets: Vec<PathBuf> = find_compose_file(project_dir).into_iter().collect();
    let nginx = project_dir.join(NGINX_SITE_CONF);
    if nginx.is_file() {
        targets.push(nginx);
    }
    for path in &targets {
        let original = fs::read_to_string(path)?;
        let rewritten = substitute_placeholders(&original, values);
        if rewritten != original {
            fs::write(path, rewritten)?;
        }
    }
    Ok(targets)
}

pub fn current_user_name() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "developer".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    pub site_url: Option<String>,
}

pub fn list_projects(sites: &Path) -> Result<Vec<ProjectEntry>, RicolError> {
    let mut entries = Vec::new();
    for dir in fsops::list_subdirs(sites)? {
        if find_compose_file(&dir).is_none() {
            continue;
        }
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let site_url = EnvironmentFile::read(&dir).ok().map(|env| env.site_url);
        entries.push(ProjectEntry {
            name,
            path: dir,
            site_url,
        });
    }
    Ok(entries)
}
