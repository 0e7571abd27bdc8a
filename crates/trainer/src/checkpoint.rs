use std::fs;
use std::path::{Path, PathBuf};

use tch::nn;

use crate::error::{Result, TrainError};

/// Hidden sibling of `path` with the same extension, so `VarStore::save` picks the same format.
fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let name = match path.extension() {
        Some(ext) => format!(".{}.tmp.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.tmp", stem),
    };
    path.with_file_name(name)
}

/// Writes every variable of `vs` to `path`, replacing any previous snapshot.
///
/// The snapshot is written next to the target first and renamed over it, so `path` always
/// holds either the old or the new complete snapshot. The parent directory must exist.
pub fn save<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<()> {
    let path = path.as_ref();
    let staging = staging_path(path);

    if let Err(e) = vs.save(&staging) {
        let _ = fs::remove_file(&staging);
        return Err(TrainError::Checkpoint {
            path: path.to_path_buf(),
            source: Box::new(e),
        });
    }

    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        TrainError::Checkpoint {
            path: path.to_path_buf(),
            source: Box::new(e),
        }
    })
}

/// Restores a snapshot written by [`save`] into `vs`.
///
/// Safetensors snapshots are checked name by name and shape by shape; names the store does
/// not know are an error.
pub fn load<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P) -> Result<()> {
    let path = path.as_ref();
    if path.extension().map_or(false, |ext| ext == "safetensors") {
        let unknown = seg_core::safetensors_util::load_safetensors(vs, path)?;
        if !unknown.is_empty() {
            return Err(TrainError::UnknownVariables(unknown));
        }
        return Ok(());
    }

    vs.load(path)?;
    Ok(())
}
