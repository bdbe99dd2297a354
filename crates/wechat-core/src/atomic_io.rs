use std::path::Path;

use anyhow::{bail, Context, Result};

/// Writes a cache entry through a staging file in the same directory, then
/// renames it into place. Readers see either the previous entry or the new
/// one, never a torn write.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("cache entry path is empty");
    }
    if path.is_dir() {
        bail!("'{}' is a directory, expected a cache entry", path.display());
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create cache directory {}", dir.display()))?;

    let entry_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("entry");
    // Process id in the staging name keeps concurrent writers from clobbering
    // each other's partial files.
    let staging_path = dir.join(format!("{entry_name}.{}.part", std::process::id()));
    std::fs::write(&staging_path, content)
        .with_context(|| format!("cannot stage cache entry at {}", staging_path.display()))?;
    std::fs::rename(&staging_path, path).with_context(|| {
        format!(
            "cannot move staged entry {} into {}",
            staging_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
