//! Atomic JSON file writes.

use serde::Serialize;
use std::path::Path;
use wacast_core::error::WacastError;

/// Serialize `value` and replace `path` with it atomically.
///
/// The temp file lives next to the target so the rename never crosses a
/// filesystem boundary.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), WacastError> {
    let dir = path
        .parent()
        .ok_or_else(|| WacastError::Persistence(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| WacastError::Persistence(format!("create {}: {e}", dir.display())))?;

    let json = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

    std::fs::write(&tmp, &json)
        .map_err(|e| WacastError::Persistence(format!("write {}: {e}", tmp.display())))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(WacastError::Persistence(format!(
            "rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        )));
    }
    Ok(())
}
