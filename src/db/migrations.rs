use std::{
    fs,
    path::{Path, PathBuf},
};

use log::error;

use crate::error::AgeingError;

/// One schema migration, read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub path: PathBuf,
    pub sql: String,
}

impl Migration {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Check that every migration file exists, then read them all, preserving
/// the order given.  If any file is missing nothing is read and the error
/// names all the missing files.
pub fn load_migrations<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Migration>, AgeingError> {
    let missing: Vec<PathBuf> = paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_file())
        .map(Path::to_path_buf)
        .collect();
    if !missing.is_empty() {
        let e = AgeingError::MissingMigrations(missing);
        error!("{}", e);
        return Err(e);
    }

    paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            fs::read_to_string(path)
                .map(|sql| Migration {
                    path: path.to_path_buf(),
                    sql,
                })
                .map_err(|e| AgeingError::io(path, e))
        })
        .collect()
}
