use crate::adapters::fsops;
use crate::config::Config;
use crate::error::RicolError;
use crate::grant::DatabaseGrant;
use crate::process::ProcessRunner;
use crate::project::ProjectIdentity;
use crate::session::Session;
use clap::ValueEnum;
use rand::Rng;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const WORDPRESS_DIR: &str = "system";
pub const LARAVEL_DIR: &str = "laravel";

const TABLE_PREFIX_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

pub fn table_prefix<G: Rng>(rng: &mut G) -> String {
    let letters: String = (0..5)
        .map(|_| TABLE_PREFIX_LETTERS[rng.gen_range(0..TABLE_PREFIX_LETTERS.len())] as char)
        .collect();
    format!("{letters}_wp_")
}

pub fn wordpress_extra_php(url: &str) -> String {
    [
        "define( 'WP_DEBUG', true );".to_string(),
        "define( 'WP_DEBUG_DISPLAY', false );".to_string(),
        "define( 'WP_DEBUG_LOG', true );".to_string(),
        "define( 'AUTOMATIC_UPDATER_DISABLED', true );".to_string(),
        "define( 'WP_AUTO_UPDATE_CORE', false );".to_string(),
        format!("define( 'WP_HOME', 'https://{url}' );"),
        format!("define( 'WP_SITEURL', 'https://{url}' );"),
    ]
    .join("\n")
        + "\n"
}

pub fn bootstrap_wordpress<R: ProcessRunner, G: Rng>(
    session: &Session<'_, R>,
    project_dir: &Path,
    identity: &ProjectIdentity,
    grant: &DatabaseGrant,
    rng: &mut G,
) -> Result<(), RicolError> {
    let tools = session.packages();
    let wp = tools.ensure_wp_cli()?;
    let core_path = project_dir.join(WORDPRESS_DIR);
    let path_arg = format!("--path={}", core_path.to_string_lossy());

    session.reporter.step("Downloading WordPress core");
    tools.run(
        &wp,
        &[
            "core".to_string(),
            "download".to_string(),
            path_arg.clone(),
            format!("--locale={}", session.cfg.wordpress.locale),
        ],
        project_dir,
    )?;

    session.reporter.step("Writing wp-config.php");
    let args = vec![
        "config".to_string(),
        "create".to_string(),
        path_arg,
        format!("--dbname={}", grant.database),
        format!("--dbuser={}", grant.user),
        format!("--dbpass={}", grant.password),
        format!("--dbhost={}", session.cfg.global.db_container),
        "--dbcharset=utf8mb4".to_string(),
        format!("--dbprefix={}", table_prefix(rng)),
        format!("--locale={}", session.cfg.wordpress.locale),
        "--skip-check".to_string(),
        "--extra-php".to_string(),
    ];
    tools.run_with_stdin(&wp, &args, project_dir, &wordpress_extra_php(&identity.url))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StarterKit {
    None,
    Breeze,
    Jetstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestFramework {
    Pest,
    Phpunit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LaravelDatabase {
    Mysql,
    Mariadb,
}

impl LaravelDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
        }
    }
}

pub const BREEZE_STACKS: [&str; 4] = ["blade", "react", "vue", "inertia"];
pub const JETSTREAM_STACKS: [&str; 2] = ["livewire", "inertia"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaravelOptions {
    pub starter_kit: StarterKit,
    pub stack: Option<String>,
    pub typescript: bool,
    pub eslint: bool,
    pub api: bool,
    pub teams: bool,
    pub verification: bool,
    pub database: LaravelDatabase,
    pub test_framework: TestFramework,
    pub git_branch: Option<String>,
}

impl Default for LaravelOptions {
    fn default() -> Self {
        Self {
            starter_kit: StarterKit::None,
            stack: None,
            typescript: false,
            eslint: false,
            api: false,
            teams: false,
            verification: false,
            database: LaravelDatabase::Mariadb,
            test_framework: TestFramework::Pest,
            git_branch: None,
        }
    }
}

impl LaravelOptions {
    pub fn validate(&self) -> Result<(), RicolError> {
        let allowed: &[&str] = match self.starter_kit {
            StarterKit::None => &[],
            StarterKit::Breeze => &BREEZE_STACKS,
            StarterKit::Jetstream => &JETSTREAM_STACKS,
        };
        match (&self.stack, self.starter_kit) {
            (Some(stack), StarterKit::None) => {
                return Err(RicolError::Validation(format!(
                    "--stack {stack} needs a starter kit"
                )))
            }
            (Some(stack), _) if !allowed.contains(&stack.as_str()) => {
                return Err(RicolError::Validation(format!(
                    "stack '{stack}' is not available for this starter kit; choose one of {}",
                    allowed.join(", ")
                )))
            }
            _ => {}
        }
        if let Some(branch) = &self.git_branch {
            let ok = !branch.is_empty()
                && !branch.starts_with('-')
                && branch
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'));
            if !ok {
                return Err(RicolError::Validation(format!(
                    "'{branch}' is not a valid branch name"
                )));
            }
        }
        Ok(())
    }

    pub fn installer_args(&self) -> Vec<String> {
        let mut args = vec!["new".to_string(), LARAVEL_DIR.to_string()];
        match self.starter_kit {
            StarterKit::None => {}
            StarterKit::Breeze => {
                args.push("--breeze".to_string());
                args.push(format!(
                    "--stack={}",
                    self.stack.as_deref().unwrap_or(BREEZE_STACKS[0])
                ));
                if self.typescript {
                    args.push("--typescript".to_string());
                }
                if self.eslint {
                    args.push("--eslint".to_string());
                }
            }
            StarterKit::Jetstream => {
                args.push("--jet".to_string());
                args.push(format!(
                    "--stack={}",
                    self.stack.as_deref().unwrap_or(JETSTREAM_STACKS[0])
                ));
                for (enabled, flag) in [
                    (self.api, "--api"),
                    (self.teams, "--teams"),
                    (self.verification, "--verification"),
                ] {
                    if enabled {
                        args.push(flag.to_string());
                    }
                }
            }
        }
        args.push(format!("--database={}", self.database.as_str()));
        args.push(match self.test_framework {
            TestFramework::Pest => "--pest".to_string(),
            TestFramework::Phpunit => "--phpunit".to_string(),
        });
        if let Some(branch) = &self.git_branch {
            args.push("--git".to_string());
            args.push(format!("--branch={branch}"));
        }
        args.push("--no-interaction".to_string());
        args
    }
}

pub fn set_env_key(content: &str, key: &str, value: &str) -> String {
    let line = format!("{key}={value}");
    let prefix = format!("{key}=");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    if let Some(existing) = lines.iter_mut().find(|l| l.trim_start().starts_with(&prefix)) {
        *existing = line;
    } else if let Some(commented) = lines.iter_mut().find(|l| {
        l.trim_start()
            .strip_prefix('#')
            .map(|rest| rest.trim_start().starts_with(&prefix))
            .unwrap_or(false)
    }) {
        *commented = line;
    } else {
        lines.push(line);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn laravel_env_settings(
    cfg: &Config,
    identity: &ProjectIdentity,
    grant: &DatabaseGrant,
    options: &LaravelOptions,
) -> Vec<(String, String)> {
    let global = &cfg.global;
    let laravel = &cfg.laravel;
    vec![
        ("APP_ENV".to_string(), "local".to_string()),
        ("APP_URL".to_string(), format!("https://{}", identity.url)),
        ("APP_LOCALE".to_string(), laravel.locale.clone()),
        ("APP_TIMEZONE".to_string(), laravel.timezone.clone()),
        ("DB_CONNECTION".to_string(), options.database.as_str().to_string()),
        ("DB_HOST".to_string(), global.db_host_address.clone()),
        ("DB_PORT".to_string(), global.db_port.to_string()),
        ("DB_DATABASE".to_string(), grant.database.clone()),
        ("DB_USERNAME".to_string(), grant.user.clone()),
        ("DB_PASSWORD".to_string(), grant.password.clone()),
    ]
}

fn write_laravel_env(app_dir: &Path, settings: &[(String, String)]) -> Result<(), RicolError> {
    let env_path = app_dir.join(".env");
    let mut content = if env_path.is_file() {
        fs::read_to_string(&env_path)?
    } else {
        let example = app_dir.join(".env.example");
        if example.is_file() {
            fs::read_to_string(example)?
        } else {
            String::new()
        }
    };
    for (key, value) in settings {
        content = set_env_key(&content, key, value);
    }
    fs::write(env_path, content)?;
    Ok(())
}

pub fn bootstrap_laravel<R: ProcessRunner>(
    session: &Session<'_, R>,
    project_dir: &Path,
    identity: &ProjectIdentity,
    grant: &DatabaseGrant,
    options: &LaravelOptions,
) -> Result<(), RicolError> {
    options.validate()?;
    let tools = session.packages();
    let php = tools.require("php", "Install PHP (CLI) 8.2 or newer.")?;
    let npm = tools.require("npm", "Install Node.js and npm.")?;
    tools.require("composer", "Install Composer (https://getcomposer.org).")?;
    let installer = tools.ensure_laravel_installer()?;

    session.reporter.step("Creating the Laravel application");
    tools.run(&installer, &options.installer_args(), project_dir)?;

    let app_dir = project_dir.join(LARAVEL_DIR);
    if !app_dir.is_dir() {
        return Err(RicolError::external(
            format!("the laravel installer did not create {}", app_dir.display()),
            Some("re-run `laravel new` manually to see its output".to_string()),
        ));
    }
    for writable in ["storage", "bootstrap/cache"] {
        let path = app_dir.join(writable);
        if path.exists() {
            fsops::chmod_tree(&path, 0o775)?;
        }
    }

    session.reporter.step("Configuring laravel/.env");
    write_laravel_env(
        &app_dir,
        &laravel_env_settings(session.cfg, identity, grant, options),
    )?;

    session.reporter.step("Installing front-end dependencies and running migrations");
    tools.run(&npm, &["install".to_string()], &app_dir)?;
    tools.run(&npm, &["run".to_string(), "build".to_string()], &app_dir)?;
    tools.run(
        &php,
        &["artisan".to_string(), "migrate".to_string(), "--force".to_string()],
        &app_dir,
    )?;
    Ok(())
}
