//! Periodic deletion of old upload and output files

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// Delete regular files older than `max_age` directly inside `dirs`.
///
/// Missing directories are skipped; per-file failures are logged and do not
/// stop the sweep. Returns the number of deleted files.
pub fn sweep(dirs: &[PathBuf], max_age: Duration) -> usize {
    let now = SystemTime::now();
    dirs.iter().map(|dir| sweep_dir(dir, now, max_age)).sum()
}

fn sweep_dir(dir: &Path, now: SystemTime, max_age: Duration) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Skipping cleanup of {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted old file: {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
        }
    }

    removed
}

/// Run [`sweep`] every `every` on the blocking pool, forever
pub fn spawn_sweeper(dirs: Vec<PathBuf>, max_age: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));

        loop {
            interval.tick().await;

            let dirs = dirs.clone();
            match tokio::task::spawn_blocking(move || sweep(&dirs, max_age)).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Retention sweep removed {} files", n),
                Err(e) => tracing::error!("Retention sweep failed: {}", e),
            }
        }
    })
}
