use crate::error::RicolError;
use crate::process::{execute, ProcessRequest, ProcessRunner};
use std::fs;
use std::path::Path;

pub struct CertIssuer<'a, R: ProcessRunner> {
    runner: &'a R,
}

impl<'a, R: ProcessRunner> CertIssuer<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    pub fn available(&self) -> bool {
        self.runner.locate("mkcert").is_some()
    }

    pub fn install_ca(&self) -> Result<(), RicolError> {
        execute(self.runner, &ProcessRequest::new("mkcert", ["-install"]))?;
        Ok(())
    }

    pub fn issue(&self, names: &[String], cert: &Path, key: &Path) -> Result<(), RicolError> {
        if let Some(parent) = cert.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut args = vec![
            "-cert-file".to_string(),
            cert.to_string_lossy().to_string(),
            "-key-file".to_string(),
            key.to_string_lossy().to_string(),
        ];
        args.extend(names.iter().cloned());
        execute(self.runner, &ProcessRequest::new("mkcert", args))?;
        Ok(())
    }
}
