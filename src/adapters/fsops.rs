use crate::error::{ProcessErrorDetails, RicolError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn fs_error(action: &str, path: &Path, err: io::Error) -> RicolError {
    RicolError::External {
        message: format!("failed to {action} {}: {err}", path.display()),
        details: ProcessErrorDetails {
            error_code: "filesystem_operation_failed".to_string(),
            hint: None,
            command: None,
            raw_stderr: None,
        },
    }
}

pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), RicolError> {
    if !src.is_dir() {
        return Err(fs_error(
            "copy",
            src,
            io::Error::new(io::ErrorKind::NotFound, "source directory does not exist"),
        ));
    }
    fs::create_dir_all(dst).map_err(|err| fs_error("create", dst, err))?;
    let entries = fs::read_dir(src).map_err(|err| fs_error("read", src, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| fs_error("read", src, err))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| fs_error("stat", &from, err))?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|err| fs_error("copy", &from, err))?;
        }
    }
    Ok(())
}

pub fn delete_tree(path: &Path) -> Result<(), RicolError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(fs_error("delete", path, err)),
    }
}

#[cfg(unix)]
pub fn chmod_tree(path: &Path, mode: u32) -> Result<(), RicolError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| fs_error("chmod", path, err))?;
    if path.is_dir() {
        let entries = fs::read_dir(path).map_err(|err| fs_error("read", path, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| fs_error("read", path, err))?;
            let child = entry.path();
            let is_link = entry
                .file_type()
                .map(|kind| kind.is_symlink())
                .unwrap_or(false);
            if !is_link {
                chmod_tree(&child, mode)?;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn chmod_tree(_path: &Path, _mode: u32) -> Result<(), RicolError> {
    Ok(())
}

pub fn list_subdirs(path: &Path) -> Result<Vec<PathBuf>, RicolError> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(fs_error("read", path, err)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| fs_error("read", path, err))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
