use crate::error::RicolError;
use crate::process::{execute, ProcessRequest, ProcessRunner};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const WP_CLI_PHAR_URL: &str =
    "https://raw.githubusercontent.com/wp-cli/builds/gh-pages/phar/wp-cli.phar";
const WP_CLI_PHAR: &str = "wp-cli.phar";

#[cfg(windows)]
const WP_CLI_PHP_INI: &str = "memory_limit = 512M\nmax_execution_time = 300\npost_max_size = 64M\nupload_max_filesize = 64M\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    prefix: Vec<String>,
}

impl Invocation {
    pub fn direct(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn request<I, S>(&self, args: I) -> ProcessRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = self.prefix.clone();
        full.extend(args.into_iter().map(Into::into));
        ProcessRequest::new(&self.program, full)
    }
}

pub struct PackageTools<'a, R: ProcessRunner> {
    runner: &'a R,
    bin_dir: PathBuf,
}

fn download_file(url: &str, path: &Path) -> Result<(), RicolError> {
    let client = reqwest::blocking::Client::new();
    let response = client.get(url).header("User-Agent", "ricol-cli").send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(RicolError::external(
            format!("download failed: {url} (HTTP {status})"),
            Some("Check your network connection, or install wp-cli manually.".to_string()),
        ));
    }
    let bytes = response.bytes()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    Ok(())
}

impl<'a, R: ProcessRunner> PackageTools<'a, R> {
    pub fn new(runner: &'a R, bin_dir: &Path) -> Self {
        Self {
            runner,
            bin_dir: bin_dir.to_path_buf(),
        }
    }

    pub fn is_present(&self, program: &str) -> bool {
        self.runner.locate(program).is_some()
    }

    pub fn require(&self, program: &str, hint: &str) -> Result<Invocation, RicolError> {
        if self.is_present(program) {
            return Ok(Invocation::direct(program));
        }
        Err(RicolError::precondition(
            format!("`{program}` was not found on PATH"),
            hint,
        ))
    }

    pub fn ensure_wp_cli(&self) -> Result<Invocation, RicolError> {
        if self.is_present("wp") {
            return Ok(Invocation::direct("wp"));
        }
        let php = self.require("php", "Install PHP (CLI) so wp-cli can run.")?;
        let phar = self.bin_dir.join(WP_CLI_PHAR);
        if !phar.is_file() {
            info!(path = %phar.display(), "downloading wp-cli");
            download_file(WP_CLI_PHAR_URL, &phar)?;
        }
        self.install_wp_shim(&phar)?;
        Ok(Invocation {
            program: php.program,
            prefix: self.wp_prefix(&phar),
        })
    }

    #[cfg(unix)]
    fn install_wp_shim(&self, phar: &Path) -> Result<(), RicolError> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(phar, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    #[cfg(windows)]
    fn install_wp_shim(&self, phar: &Path) -> Result<(), RicolError> {
        let ini = self.bin_dir.join("php.ini");
        if !ini.is_file() {
            fs::write(&ini, WP_CLI_PHP_INI)?;
        }
        let bat = self.bin_dir.join("wp.bat");
        if !bat.is_file() {
            fs::write(
                &bat,
                format!(
                    "@ECHO OFF\r\nphp -c \"{}\" \"{}\" %*\r\n",
                    ini.display(),
                    phar.display()
                ),
            )?;
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn install_wp_shim(&self, _phar: &Path) -> Result<(), RicolError> {
        Ok(())
    }

    fn wp_prefix(&self, phar: &Path) -> Vec<String> {
        let mut prefix = Vec::new();
        if cfg!(windows) {
            prefix.push("-c".to_string());
            prefix.push(self.bin_dir.join("php.ini").to_string_lossy().to_string());
        }
        prefix.push(phar.to_string_lossy().to_string());
        prefix
    }

    pub fn ensure_laravel_installer(&self) -> Result<Invocation, RicolError> {
        if self.is_present("laravel") {
            return Ok(Invocation::direct("laravel"));
        }
        let composer = self.require(
            "composer",
            "Install Composer (https://getcomposer.org) and re-run.",
        )?;
        info!("installing laravel/installer with composer");
        execute(
            self.runner,
            &composer.request(["global", "require", "laravel/installer"]),
        )?;
        let output = execute(
            self.runner,
            &composer
                .request(["global", "config", "bin-dir", "--absolute"])
                .capture(),
        )?;
        let bin_dir = output
            .stdout_text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| {
                RicolError::external(
                    "composer did not report its global bin dir",
                    Some("Run `composer global config bin-dir --absolute` manually.".to_string()),
                )
            })?;
        let name = if cfg!(windows) { "laravel.bat" } else { "laravel" };
        let installer = bin_dir.join(name);
        debug!(path = %installer.display(), "resolved laravel installer");
        if !installer.is_file() {
            return Err(RicolError::precondition(
                format!("laravel installer not found at {}", installer.display()),
                format!("Add {} to your PATH and re-run.", bin_dir.display()),
            ));
        }
        Ok(Invocation::direct(installer.to_string_lossy().to_string()))
    }

    pub fn run(&self, tool: &Invocation, args: &[String], cwd: &Path) -> Result<(), RicolError> {
        execute(self.runner, &tool.request(args.iter().cloned()).cwd(cwd))?;
        Ok(())
    }

    pub fn run_with_stdin(
        &self,
        tool: &Invocation,
        args: &[String],
        cwd: &Path,
        input: &str,
    ) -> Result<(), RicolError> {
        execute(
            self.runner,
            &tool.request(args.iter().cloned()).cwd(cwd).stdin(input),
        )?;
        Ok(())
    }
}
