//! Nightly ZIP backups of every database file plus the JSON config.
//! Newest seven are kept; older archives are pruned by modification time.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

const MAX_BACKUPS: usize = 7;
const BACKUP_PREFIX: &str = "nexira_backup_";

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub size_kb: f64,
    pub created: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub filename: String,
    pub size_kb: f64,
    pub files: Vec<String>,
}

pub struct BackupManager {
    db_dir: PathBuf,
    config_path: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(base_dir: &Path, config_path: &Path) -> Result<Self> {
        let backup_dir = base_dir.join("data").join("backups");
        std::fs::create_dir_all(&backup_dir)?;
        Ok(Self {
            db_dir: base_dir.join("data").join("databases"),
            config_path: config_path.to_path_buf(),
            backup_dir,
        })
    }

    /// Create `nexira_backup_YYYYMMDD_HHMMSS.zip` with every `.db` file
    /// and the config at the archive root, then prune old archives.
    pub fn run_backup(&self) -> Result<BackupOutcome> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{BACKUP_PREFIX}{timestamp}.zip");
        let zip_path = self.backup_dir.join(&filename);

        let file = File::create(&zip_path).context("creating backup archive")?;
        let mut writer = ZipWriter::new(file);
        let options: FileOptions =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut files_added = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&self.db_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "db") {
                    let name = entry.file_name().to_string_lossy().to_string();
                    writer.start_file(&name, options)?;
                    let mut contents = Vec::new();
                    File::open(&path)?.read_to_end(&mut contents)?;
                    writer.write_all(&contents)?;
                    files_added.push(name);
                }
            }
        }

        if self.config_path.exists() {
            let name = self
                .config_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "config.json".to_string());
            writer.start_file(&name, options)?;
            let mut contents = Vec::new();
            File::open(&self.config_path)?.read_to_end(&mut contents)?;
            writer.write_all(&contents)?;
            files_added.push(name);
        }

        writer.finish()?;

        let size_kb = std::fs::metadata(&zip_path)?.len() as f64 / 1024.0;
        info!(filename, size_kb, files = files_added.len(), "backup created");

        let pruned = self.prune_old_backups()?;
        if pruned > 0 {
            info!(pruned, "old backups removed");
        }

        Ok(BackupOutcome {
            filename,
            size_kb: (size_kb * 10.0).round() / 10.0,
            files: files_added,
        })
    }

    fn prune_old_backups(&self) -> Result<usize> {
        let backups = self.list_backups()?;
        let mut pruned = 0;
        for backup in backups.iter().skip(MAX_BACKUPS) {
            let path = self.backup_dir.join(&backup.filename);
            if let Err(err) = std::fs::remove_file(&path) {
                warn!(?err, filename = %backup.filename, "backup prune failed");
            } else {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// All backups, newest first by modification time.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(".zip") {
                continue;
            }
            let metadata = entry.metadata()?;
            let modified: chrono::DateTime<Local> = metadata.modified()?.into();
            backups.push(BackupInfo {
                filename: name,
                size_kb: (metadata.len() as f64 / 1024.0 * 10.0).round() / 10.0,
                created: modified.format("%Y-%m-%dT%H:%M:%S").to_string(),
            });
        }
        backups.sort_by(|a, b| b.created.cmp(&a.created).then(b.filename.cmp(&a.filename)));
        Ok(backups)
    }

    /// Extract the `.db` files of a named backup over the live databases.
    pub fn restore_backup(&self, filename: &str) -> Result<Vec<String>> {
        if filename.contains('/') || filename.contains("..") {
            return Err(anyhow!("invalid backup filename"));
        }
        let zip_path = self.backup_dir.join(filename);
        if !zip_path.exists() {
            return Err(anyhow!("backup file not found"));
        }

        std::fs::create_dir_all(&self.db_dir)?;
        let mut archive = ZipArchive::new(File::open(&zip_path)?)?;
        let mut restored = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            if !name.ends_with(".db") {
                continue;
            }
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            std::fs::write(self.db_dir.join(&name), contents)?;
            restored.push(name);
        }
        info!(filename, restored = restored.len(), "backup restored");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, BackupManager) {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("data/databases");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join("evolution.db"), b"sqlite bytes").unwrap();
        let config_path = dir.path().join("config/default_config.json");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, b"{}").unwrap();

        let manager = BackupManager::new(dir.path(), &config_path).unwrap();
        (dir, manager)
    }

    #[test]
    fn backup_contains_db_and_config_at_root() {
        let (_dir, manager) = manager();
        let outcome = manager.run_backup().unwrap();
        assert!(outcome.filename.starts_with(BACKUP_PREFIX));
        assert!(outcome.files.contains(&"evolution.db".to_string()));
        assert!(outcome.files.contains(&"default_config.json".to_string()));

        let listed = manager.list_backups().unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn pruning_keeps_the_newest_seven() {
        let (_dir, manager) = manager();
        for i in 0..9 {
            // Distinct names even within one second.
            let filename = format!("{BACKUP_PREFIX}2026080{}_00000{i}.zip", i % 3);
            std::fs::write(manager.backup_dir.join(filename), b"zip").unwrap();
        }
        manager.run_backup().unwrap();
        assert!(manager.list_backups().unwrap().len() <= MAX_BACKUPS);
    }

    #[test]
    fn restore_round_trips_database_bytes() {
        let (dir, manager) = manager();
        let outcome = manager.run_backup().unwrap();

        // Clobber the live database, then restore.
        let db_path = dir.path().join("data/databases/evolution.db");
        std::fs::write(&db_path, b"corrupted").unwrap();
        let restored = manager.restore_backup(&outcome.filename).unwrap();

        assert_eq!(restored, vec!["evolution.db".to_string()]);
        assert_eq!(std::fs::read(&db_path).unwrap(), b"sqlite bytes");
    }

    #[test]
    fn restore_rejects_path_tricks() {
        let (_dir, manager) = manager();
        assert!(manager.restore_backup("../outside.zip").is_err());
        assert!(manager.restore_backup("missing.zip").is_err());
    }
}
