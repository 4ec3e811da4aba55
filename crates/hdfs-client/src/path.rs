//! Namespace path helpers.
//!
//! Namespace paths are `/`-separated strings independent of the local OS,
//! so these helpers work on `str` rather than `std::path`.

use crate::error::{ClientError, ClientResult};

/// Check that `path` is syntactically acceptable to the namenode.
pub fn validate(path: &str) -> ClientResult<()> {
    if path.is_empty() {
        return Err(ClientError::InvalidArgument("path must not be empty".into()));
    }
    if path.contains('\0') {
        return Err(ClientError::InvalidArgument(format!(
            "path contains a NUL byte: {:?}",
            path
        )));
    }
    if path.split('/').any(|c| c.contains(':')) {
        return Err(ClientError::InvalidArgument(format!(
            "path component contains ':': {:?}",
            path
        )));
    }
    Ok(())
}

/// Resolve `input` against the working directory `cwd`.
///
/// Absolute input is returned unchanged. Relative input is joined onto
/// `cwd` and normalized.
pub fn resolve(cwd: &str, input: &str) -> String {
    if is_absolute(input) {
        input.to_string()
    } else {
        normalize(&join(cwd, input))
    }
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Collapse repeated separators and `.`/`..` components of an absolute path.
/// `..` at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            c => components.push(c),
        }
    }
    format!("/{}", components.join("/"))
}

/// Join two paths, handling an absolute second path.
pub fn join(base: &str, relative: &str) -> String {
    if is_absolute(relative) {
        relative.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Parent directory of an absolute path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Last component of a path, or `""` for the root.
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
