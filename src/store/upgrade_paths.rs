//! JSON-file upgrade-path store (upgrade_packages.json)
//!
//! Every write goes through `<path>.tmp` + rename, so a killed run never
//! leaves a truncated store behind. A missing file is an empty store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use upgrade_descriptor::Version;

use super::{io_err, StoreError, UpgradePackage, UpgradePathStore};

/// Schema version for upgrade_packages.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "upgrade-packager/upgrade_packages@1";

/// On-disk store document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePathFile {
    pub schema_version: u32,
    pub schema_id: String,
    pub updated_at: DateTime<Utc>,
    /// Id given to the next saved record
    pub next_id: u64,
    /// Every record ever saved, retracted ones included
    pub packages: Vec<UpgradePackage>,
}

impl Default for UpgradePathFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            updated_at: Utc::now(),
            next_id: 1,
            packages: Vec::new(),
        }
    }
}

impl UpgradePathFile {
    fn active(&self, from: &Version, to: &Version) -> Option<&UpgradePackage> {
        self.packages
            .iter()
            .find(|p| !p.is_deleted && p.is_pair(from, to))
    }
}

/// Upgrade-path store persisted as one JSON document.
#[derive(Debug, Clone)]
pub struct JsonUpgradePathStore {
    path: PathBuf,
}

impl JsonUpgradePathStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document; a missing file yields an empty store.
    pub fn load(&self) -> Result<UpgradePathFile, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UpgradePathFile::default()),
            Err(e) => return Err(io_err(&self.path, e)),
        };
        let file: UpgradePathFile =
            serde_json::from_str(&contents).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        if file.schema_version != SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema(file.schema_version));
        }
        Ok(file)
    }

    fn write(&self, file: &mut UpgradePathFile) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }
        file.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

impl UpgradePathStore for JsonUpgradePathStore {
    fn exists(&self, from: &Version, to: &Version) -> Result<bool, StoreError> {
        Ok(self.load()?.active(from, to).is_some())
    }

    fn save(&self, package: &UpgradePackage) -> Result<UpgradePackage, StoreError> {
        let mut file = self.load()?;
        if file.active(&package.from_version, &package.to_version).is_some() {
            return Err(StoreError::Duplicate {
                from: package.from_version.clone(),
                to: package.to_version.clone(),
            });
        }

        let mut saved = package.clone();
        saved.id = file.next_id;
        saved.is_deleted = false;
        file.next_id += 1;
        file.packages.push(saved.clone());
        self.write(&mut file)?;
        Ok(saved)
    }

    fn list(&self) -> Result<Vec<UpgradePackage>, StoreError> {
        Ok(self
            .load()?
            .packages
            .into_iter()
            .filter(|p| !p.is_deleted)
            .collect())
    }

    fn retract(&self, from: &Version, to: &Version) -> Result<bool, StoreError> {
        let mut file = self.load()?;
        let Some(record) = file
            .packages
            .iter_mut()
            .find(|p| !p.is_deleted && p.is_pair(from, to))
        else {
            return Ok(false);
        };
        record.is_deleted = true;
        self.write(&mut file)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn record(from: &str, to: &str) -> UpgradePackage {
        UpgradePackage::new(v(from), v(to), format!("http://updates.example.com/{from}-{to}.tar.gz"))
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonUpgradePathStore::new(dir.path().join("upgrade_packages.json"));

        assert!(!store.exists(&v("1"), &v("2")).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_assigns_ids_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db/upgrade_packages.json");
        let store = JsonUpgradePathStore::new(&path);

        let first = store.save(&record("1", "3")).unwrap();
        let second = store.save(&record("2", "3")).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(store.exists(&v("1"), &v("3")).unwrap());
        assert!(!store.exists(&v("3"), &v("1")).unwrap());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonUpgradePathStore::new(&path);
        let listed = reopened.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], first);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonUpgradePathStore::new(dir.path().join("upgrade_packages.json"));

        store.save(&record("1", "2")).unwrap();
        let err = store.save(&record("1", "2")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_retract_allows_regeneration() {
        let dir = TempDir::new().unwrap();
        let store = JsonUpgradePathStore::new(dir.path().join("upgrade_packages.json"));

        store.save(&record("1", "2")).unwrap();
        assert!(store.retract(&v("1"), &v("2")).unwrap());
        assert!(!store.retract(&v("1"), &v("2")).unwrap());
        assert!(!store.exists(&v("1"), &v("2")).unwrap());

        let again = store.save(&record("1", "2")).unwrap();
        assert_eq!(again.id, 2);
        assert_eq!(store.load().unwrap().packages.len(), 2);
        assert_eq!(store.list().unwrap(), vec![again]);
    }

    #[test]
    fn test_malformed_store_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade_packages.json");
        fs::write(&path, "{ broken").unwrap();

        let store = JsonUpgradePathStore::new(&path);
        assert!(matches!(
            store.exists(&v("1"), &v("2")),
            Err(StoreError::Json { .. })
        ));
    }

    #[test]
    fn test_unsupported_schema_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade_packages.json");
        let mut file = UpgradePathFile::default();
        file.schema_version = 99;
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let store = JsonUpgradePathStore::new(&path);
        assert!(matches!(store.list(), Err(StoreError::UnsupportedSchema(99))));
    }
}
