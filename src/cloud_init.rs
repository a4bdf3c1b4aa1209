//! User-data resolution for new instances.
//!
//! User-data can be given inline (for example `#cloud-config`) or as a path to
//! a file whose content is read once when the group configuration is built.
//! The two sources are mutually exclusive.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Both `user_data` and `user_data_file` were set.
    #[error("mutually exclusive configuration provided: user_data, user_data_file")]
    BothProvided,
    /// The user-data file path is blank.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Reading the user-data file failed.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves user-data from either an inline value or a file.
///
/// Blank inline values count as absent. File content is returned unchanged.
///
/// # Errors
///
/// Returns [`UserDataError`] when both sources are given or the file cannot
/// be read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    let inline_payload = inline.filter(|payload| !payload.trim().is_empty());
    if inline_payload.is_some() && file.is_some() {
        return Err(UserDataError::BothProvided);
    }

    if let Some(payload) = inline_payload {
        return Ok(Some(payload.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };
    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    read_to_string_ambient(&expanded)
        .map(Some)
        .map_err(|message| UserDataError::FileRead {
            path: expanded.clone(),
            message,
        })
}

/// Expands a leading `~/` to the user's home directory.
///
/// Without `HOME` the path is returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
