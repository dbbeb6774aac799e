//! Restart files, one per rank and step.
use eyre::{eyre, Context};
use log::info;
use std::path::{Path, PathBuf};

/// Path of the restart file of `rank` at `step` inside `dir`.
pub fn restart_file_path(dir: impl AsRef<Path>, step: usize, rank: usize) -> PathBuf {
    dir.as_ref().join(format!("restart_{:05}_p{}.bin", step, rank))
}

/// Writes the restart data of one rank, creating `dir` if necessary.
pub fn write_restart_file(dir: impl AsRef<Path>, step: usize, rank: usize, data: &[u8]) -> eyre::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("failed to create restart directory {}", dir.display()))?;
    let path = restart_file_path(dir, step, rank);
    std::fs::write(&path, data).wrap_err_with(|| format!("failed to write restart file {}", path.display()))?;
    info!("Wrote {} bytes of restart data to {}", data.len(), path.display());
    Ok(path)
}

/// Reads the restart data written by [`write_restart_file`] for the same step and rank.
pub fn read_restart_file(dir: impl AsRef<Path>, step: usize, rank: usize) -> eyre::Result<Vec<u8>> {
    let path = restart_file_path(dir, step, rank);
    if !path.exists() {
        return Err(eyre!("no restart file for step {} on rank {} ({})", step, rank, path.display()));
    }
    std::fs::read(&path).wrap_err_with(|| format!("failed to read restart file {}", path.display()))
}
