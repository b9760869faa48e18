use crate::adapters::ContainerRuntime;
use crate::config::{Config, GlobalConfig};
use crate::error::RicolError;
use crate::process::ProcessRunner;
use crate::project::{ProjectIdentity, ProjectKind};
use serde::Serialize;
use tracing::info;

const MAX_USER_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseGrant {
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    // Dedicated accounts get their password reset on every run so re-runs
    // converge; the shared account is left alone.
    pub dedicated: bool,
}

fn validate_identifier(kind: &str, value: &str) -> Result<(), RicolError> {
    let ok = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(RicolError::Validation(format!(
            "{kind} '{value}' may only contain letters, digits, '_' and '-'"
        )))
    }
}

fn validate_password(value: &str) -> Result<(), RicolError> {
    if value.is_empty() || value.contains(['\'', '\\', '\n', '\r']) {
        return Err(RicolError::Validation(
            "database password must be non-empty and must not contain quotes, backslashes or newlines"
                .to_string(),
        ));
    }
    Ok(())
}

impl DatabaseGrant {
    pub fn for_project(identity: &ProjectIdentity, cfg: &Config) -> Self {
        match identity.kind {
            ProjectKind::WordPress => Self {
                database: identity.database.clone(),
                user: cfg.wordpress.db_user.clone(),
                password: cfg.wordpress.db_password.clone(),
                dedicated: false,
            },
            ProjectKind::Laravel => Self {
                database: identity.database.clone(),
                user: identity.database.chars().take(MAX_USER_LEN).collect(),
                password: cfg.laravel.db_password.clone(),
                dedicated: true,
            },
        }
    }

    pub fn statements(&self) -> Result<Vec<String>, RicolError> {
        validate_identifier("database name", &self.database)?;
        validate_identifier("database user", &self.user)?;
        validate_password(&self.password)?;
        let account = format!("'{}'@'%'", self.user);
        let mut statements = vec![
            format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database),
            format!(
                "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY '{}'",
                self.password
            ),
        ];
        if self.dedicated {
            statements.push(format!("ALTER USER {account} IDENTIFIED BY '{}'", self.password));
        }
        statements.push(format!(
            "GRANT ALL PRIVILEGES ON `{}`.* TO {account}",
            self.database
        ));
        statements.push("FLUSH PRIVILEGES".to_string());
        Ok(statements)
    }

    pub fn ensure<R: ProcessRunner>(
        &self,
        runtime: &ContainerRuntime<'_, R>,
        global: &GlobalConfig,
    ) -> Result<(), RicolError> {
        let statements = self.statements()?;
        for sql in &statements {
            runtime.db_exec(global, sql)?;
        }
        info!(database = %self.database, user = %self.user, "database grant ensured");
        Ok(())
    }
}
