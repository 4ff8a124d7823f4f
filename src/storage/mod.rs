pub mod snapshot;
pub mod state;

use crate::error::StateError;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Pretty JSON with a trailing newline, written to a sibling temp file and renamed into
/// place so readers never observe a half-written document.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StateError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut raw = serde_json::to_string_pretty(value)?;
    raw.push('\n');

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, raw).map_err(|source| StateError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })
}
