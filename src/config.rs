use crate::error::RicolError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub paths: PathsConfig,
    pub domains: Domains,
    pub global: GlobalConfig,
    pub readiness: Readiness,
    pub wordpress: WordPressConfig,
    pub laravel: LaravelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub base_dir: String,
    pub legacy_sites_dir: String,
    pub legacy_global_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Domains {
    pub suffixes: Vec<String>,
    pub extra_cert_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    pub services: Vec<String>,
    pub db_container: String,
    pub db_root_user: String,
    pub db_root_password: String,
    pub db_host_address: String,
    pub db_port: u16,
    pub edge_network: String,
    pub isolated_network: IsolatedNetwork,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IsolatedNetwork {
    pub name: String,
    pub subnet: String,
    pub gateway: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Readiness {
    pub database_attempts: u32,
    pub database_interval_ms: u64,
    pub containers_attempts: u32,
    pub containers_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct WordPressConfig {
    pub db_user: String,
    pub db_password: String,
    pub locale: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LaravelConfig {
    pub locale: String,
    pub timezone: String,
    pub db_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            paths: PathsConfig::default(),
            domains: Domains::default(),
            global: GlobalConfig::default(),
            readiness: Readiness::default(),
            wordpress: WordPressConfig::default(),
            laravel: LaravelConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: "~/ricol-sites".to_string(),
            legacy_sites_dir: "~/meus-sites".to_string(),
            legacy_global_dir: "~/ricol-global-docker-local-ssl".to_string(),
        }
    }
}

impl Default for Domains {
    fn default() -> Self {
        Self {
            suffixes: vec![
                ".dev.localhost".to_string(),
                ".dev.local".to_string(),
                ".dev.test".to_string(),
            ],
            extra_cert_patterns: vec!["*.docker.localhost".to_string()],
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            services: vec!["global-traefik".to_string(), "global-mariadb".to_string()],
            db_container: "global-mariadb".to_string(),
            db_root_user: "root".to_string(),
            db_root_password: "root".to_string(),
            db_host_address: "10.0.120.10".to_string(),
            db_port: 3306,
            edge_network: "sr-reverse-proxy".to_string(),
            isolated_network: IsolatedNetwork::default(),
        }
    }
}

impl Default for IsolatedNetwork {
    fn default() -> Self {
        Self {
            name: "sr-public_network".to_string(),
            subnet: "10.0.120.0/24".to_string(),
            gateway: "10.0.120.1".to_string(),
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            database_attempts: 5,
            database_interval_ms: 3_000,
            containers_attempts: 3,
            containers_interval_ms: 5_000,
        }
    }
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            db_user: "wordpress".to_string(),
            db_password: "wordpress".to_string(),
            locale: "pt_BR".to_string(),
        }
    }
}

impl Default for LaravelConfig {
    fn default() -> Self {
        Self {
            locale: "pt_BR".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            db_password: "laravel".to_string(),
        }
    }
}

impl Domains {
    pub fn certificate_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.extra_cert_patterns.clone();
        for suffix in &self.suffixes {
            let pattern = format!("*{suffix}");
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        patterns
    }
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var("RICOL_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("ricol");
    base
}

pub fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var("RICOL_CONFIG") {
        return PathBuf::from(path);
    }
    default_config_dir().join("config.yaml")
}

pub fn read_config_from_str(content: &str) -> Result<Config, RicolError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    if cfg.version != CONFIG_VERSION {
        return Err(RicolError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn read_config(path: &Path) -> Result<Config, RicolError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

pub fn validate_config(cfg: &Config) -> Result<(), RicolError> {
    if cfg.paths.base_dir.trim().is_empty() {
        return Err(RicolError::Config(
            "paths.base_dir must be non-empty".to_string(),
        ));
    }
    if cfg.domains.suffixes.is_empty() {
        return Err(RicolError::Config(
            "domains.suffixes must contain at least one suffix".to_string(),
        ));
    }
    for suffix in &cfg.domains.suffixes {
        if !suffix.starts_with('.') || suffix.len() < 2 {
            return Err(RicolError::Config(format!(
                "domains.suffixes entry '{suffix}' must start with '.'"
            )));
        }
    }
    if cfg.global.services.is_empty() {
        return Err(RicolError::Config(
            "global.services must name at least one service".to_string(),
        ));
    }
    for (field, value) in [
        ("global.db_container", &cfg.global.db_container),
        ("global.db_root_user", &cfg.global.db_root_user),
        ("global.edge_network", &cfg.global.edge_network),
        ("global.isolated_network.name", &cfg.global.isolated_network.name),
    ] {
        if value.trim().is_empty() {
            return Err(RicolError::Config(format!("{field} must be non-empty")));
        }
    }
    parse_cidr(&cfg.global.isolated_network.subnet).ok_or_else(|| {
        RicolError::Config(format!(
            "global.isolated_network.subnet '{}' is not an IPv4 CIDR",
            cfg.global.isolated_network.subnet
        ))
    })?;
    cfg.global
        .isolated_network
        .gateway
        .parse::<Ipv4Addr>()
        .map_err(|_| {
            RicolError::Config(format!(
                "global.isolated_network.gateway '{}' is not an IPv4 address",
                cfg.global.isolated_network.gateway
            ))
        })?;
    if cfg.readiness.database_attempts == 0 || cfg.readiness.containers_attempts == 0 {
        return Err(RicolError::Config(
            "readiness attempts must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn parse_cidr(value: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = value.split_once('/')?;
    let addr = addr.parse::<Ipv4Addr>().ok()?;
    let prefix = prefix.parse::<u8>().ok()?;
    (prefix <= 32).then_some((addr, prefix))
}

pub fn expand_home_path(input: &str, home: &Path, field: &str) -> Result<PathBuf, RicolError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RicolError::Config(format!("{field} must be non-empty")));
    }
    if trimmed == "~" {
        return Ok(home.to_path_buf());
    }
    if let Some(stripped) = trimmed.strip_prefix("~/") {
        return Ok(home.join(stripped));
    }
    if trimmed.starts_with('~') {
        return Err(RicolError::Config(format!(
            "{field} uses unsupported '~' syntax; use '~/' or an absolute path"
        )));
    }
    let path = PathBuf::from(trimmed);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(home.join(path))
    }
}
