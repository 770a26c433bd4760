use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::{AreaCode, Scope, StagedPayload};
use crate::error::StatsError;

const FILE_PREFIX: &str = "LatestStats_";
const FILE_SUFFIX: &str = ".json";

/// File-backed staging area between the fetch and load phases.
///
/// Every call goes to disk; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: Utf8PathBuf,
}

impl StagingStore {
    /// Staging lives under `<data_folder>/stats`.
    pub fn new(data_folder: &Utf8Path) -> Self {
        Self {
            root: data_folder.join("stats"),
        }
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn scope_dir(&self, scope: Scope) -> Utf8PathBuf {
        self.root.join(scope.staging_dir_name())
    }

    pub fn path_for(&self, scope: Scope, area: &AreaCode) -> Utf8PathBuf {
        self.scope_dir(scope)
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", area.as_str()))
    }

    pub fn exists(&self, scope: Scope, area: &AreaCode) -> bool {
        self.path_for(scope, area).as_std_path().is_file()
    }

    /// Overwrites unconditionally. The body lands in a temp file first so a
    /// crash never leaves a truncated staged payload behind.
    pub fn write(&self, scope: Scope, area: &AreaCode, bytes: &[u8]) -> Result<(), StatsError> {
        let dir = self.scope_dir(scope);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| StatsError::Filesystem(format!("create {dir}: {err}")))?;
        let mut temp = Builder::new()
            .prefix(".staging")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| StatsError::Filesystem(err.to_string()))?;
        temp.write_all(bytes)
            .map_err(|err| StatsError::Filesystem(err.to_string()))?;
        let target = self.path_for(scope, area);
        temp.persist(target.as_std_path())
            .map_err(|err| StatsError::Filesystem(format!("persist {target}: {}", err.error)))?;
        Ok(())
    }

    /// Staged codes for a scope, lexical by filename.
    pub fn list_areas(&self, scope: Scope) -> Result<Vec<AreaCode>, StatsError> {
        Ok(self
            .staged_files(scope)?
            .into_iter()
            .map(|(area, _)| area)
            .collect())
    }

    pub fn list_entries(&self, scope: Scope) -> Result<Vec<StagedPayload>, StatsError> {
        let mut entries = Vec::new();
        for (area, path) in self.staged_files(scope)? {
            let bytes = fs::read(path.as_std_path())
                .map_err(|err| StatsError::Filesystem(format!("read {path}: {err}")))?;
            entries.push(StagedPayload { scope, area, bytes });
        }
        Ok(entries)
    }

    /// Removes every staged entry for the scope. No-op when nothing is staged.
    pub fn clear(&self, scope: Scope) -> Result<usize, StatsError> {
        let files = self.staged_files(scope)?;
        let count = files.len();
        for (_, path) in files {
            match fs::remove_file(path.as_std_path()) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StatsError::Filesystem(format!("remove {path}: {err}")));
                }
            }
        }
        Ok(count)
    }

    fn staged_files(&self, scope: Scope) -> Result<Vec<(AreaCode, Utf8PathBuf)>, StatsError> {
        let dir = self.scope_dir(scope);
        let read_dir = match fs::read_dir(dir.as_std_path()) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StatsError::Filesystem(format!("read {dir}: {err}"))),
        };

        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|err| StatsError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if !path.as_std_path().is_file() {
                continue;
            }
            let Some(area) = path.file_name().and_then(area_from_file_name) else {
                continue;
            };
            files.push((area, path));
        }
        files.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()));
        Ok(files)
    }
}

fn area_from_file_name(name: &str) -> Option<AreaCode> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}
