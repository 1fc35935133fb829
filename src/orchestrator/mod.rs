//! Upgrade path orchestration
//!
//! For a new release, builds one upgrade package from every older known
//! version and records it. Collaborators are passed in explicitly; looping
//! and scheduling belong to the caller.

mod state;

pub use state::{RunPhase, RunState, RunStateError};

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use upgrade_descriptor::Version;

use crate::config::PackagerConfig;
use crate::delta::compute_delta;
use crate::manifest::{get_or_build_manifest, ManifestCache, ManifestError, SideFileManifestCache};
use crate::package::{build_package, Assembler, DeferPolicy, PackageError};
use crate::release::{ingest_release, resolve_version_or_hint, ReleaseError};
use crate::store::{
    ArtifactSink, DirectoryArtifactSink, JsonUpgradePathStore, ReleaseDirVersionStore, StoreError,
    UpgradePackage, UpgradePathStore, VersionStore,
};

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    #[error("Run state error: {0}")]
    State(#[from] RunStateError),

    #[error("Deferred pattern error: {0}")]
    Pattern(#[from] globset::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that fail a single version pair
#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Run state error: {0}")]
    State(#[from] RunStateError),
}

/// A pair that could not be packaged
#[derive(Debug)]
pub struct PairFailure {
    pub from: Version,
    pub to: Version,
    pub error: PairError,
}

/// Outcome of packaging one new version
#[derive(Debug, Default)]
pub struct UpgradeReport {
    /// Records saved during this run
    pub created: Vec<UpgradePackage>,
    /// Older versions whose pair was already recorded
    pub skipped_existing: Vec<Version>,
    /// Known versions not older than the new one
    pub skipped_not_older: Vec<Version>,
    pub failed: Vec<PairFailure>,
}

impl UpgradeReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Result of [`Orchestrator::run_once`]
#[derive(Debug)]
pub struct RunSummary {
    pub state: RunState,
    pub version: Version,
    pub release_root: PathBuf,
    pub report: UpgradeReport,
    pub working_dir_cleared: bool,
}

/// Drives manifest, delta, package and record creation for version pairs.
pub struct Orchestrator {
    versions: Box<dyn VersionStore>,
    cache: Box<dyn ManifestCache>,
    store: Box<dyn UpgradePathStore>,
    sink: Box<dyn ArtifactSink>,
    assembler: Assembler,
    release_dir: PathBuf,
    work_root: PathBuf,
    version_metadata: String,
}

impl Orchestrator {
    pub fn new(
        config: &PackagerConfig,
        versions: Box<dyn VersionStore>,
        cache: Box<dyn ManifestCache>,
        store: Box<dyn UpgradePathStore>,
        sink: Box<dyn ArtifactSink>,
        assembler: Assembler,
    ) -> Self {
        Self {
            versions,
            cache,
            store,
            sink,
            assembler,
            release_dir: config.release_dir.clone(),
            work_root: config.working_dir.clone(),
            version_metadata: config.version_metadata.clone(),
        }
    }

    /// Wire the file-system collaborators described by `config`.
    pub fn from_config(config: &PackagerConfig) -> Result<Self, OrchestratorError> {
        let policy = DeferPolicy::from_patterns(&config.package.deferred_patterns)?;
        Ok(Self::new(
            config,
            Box::new(ReleaseDirVersionStore::new(&config.release_dir)),
            Box::new(SideFileManifestCache::new(config.manifest_dir())),
            Box::new(JsonUpgradePathStore::new(&config.store_path)),
            Box::new(DirectoryArtifactSink::new(
                &config.package_dir,
                config.base_url.clone(),
            )),
            Assembler::new(policy),
        ))
    }

    pub fn versions(&self) -> &dyn VersionStore {
        self.versions.as_ref()
    }

    pub fn store(&self) -> &dyn UpgradePathStore {
        self.store.as_ref()
    }

    /// Package every known version older than `new_version`.
    ///
    /// A store lookup failure aborts; any other failure is confined to its
    /// pair and reported.
    pub fn generate_upgrades(
        &self,
        new_version: &Version,
        new_root: &Path,
        known_versions: &[Version],
    ) -> Result<UpgradeReport, OrchestratorError> {
        let mut state = RunState::starting_at(RunPhase::VersionResolved);
        self.generate_with_state(&mut state, new_version, new_root, known_versions)
    }

    fn generate_with_state(
        &self,
        state: &mut RunState,
        new_version: &Version,
        new_root: &Path,
        known_versions: &[Version],
    ) -> Result<UpgradeReport, OrchestratorError> {
        let mut report = UpgradeReport::default();

        for from in known_versions {
            if from >= new_version {
                tracing::debug!(from = %from, to = %new_version, "skipping newer or equal version");
                report.skipped_not_older.push(from.clone());
                continue;
            }

            if self.store.exists(from, new_version)? {
                tracing::warn!(from = %from, to = %new_version, "upgrade already processed");
                report.skipped_existing.push(from.clone());
                continue;
            }

            match self.process_pair(state, from, new_version, new_root) {
                Ok(record) => {
                    tracing::info!(
                        from = %from,
                        to = %new_version,
                        url = %record.update_url,
                        "upgrade package recorded"
                    );
                    report.created.push(record);
                }
                Err(error) => {
                    tracing::error!(from = %from, to = %new_version, error = %error, "upgrade path failed");
                    report.failed.push(PairFailure {
                        from: from.clone(),
                        to: new_version.clone(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    fn process_pair(
        &self,
        state: &mut RunState,
        from: &Version,
        to: &Version,
        to_root: &Path,
    ) -> Result<UpgradePackage, PairError> {
        let from_root = self.versions.path_for(from);
        let from_manifest = get_or_build_manifest(self.cache.as_ref(), from, &from_root)?;
        let to_manifest = get_or_build_manifest(self.cache.as_ref(), to, to_root)?;
        state.transition(RunPhase::ManifestsReady)?;

        let delta = compute_delta(&from_manifest, &to_manifest);
        tracing::debug!(from = %from, to = %to, changes = delta.len(), "delta computed");
        state.transition(RunPhase::DeltaComputed)?;

        let built = build_package(&self.assembler, &delta, from, to, to_root, &self.work_root)?;
        state.transition(RunPhase::PackageAssembled)?;

        let locator = self.sink.accept(&built.archive_path, from, to)?;
        let record = self
            .store
            .save(&UpgradePackage::new(from.clone(), to.clone(), locator))?;
        state.transition(RunPhase::Persisted)?;
        Ok(record)
    }

    /// Remove the working directory and everything left in it.
    pub fn clear_working_dir(&self) -> Result<(), OrchestratorError> {
        clear_dir(&self.work_root)
    }

    /// One full cycle for a release tree handed over by the fetcher.
    ///
    /// Resolves the version, ingests the tree, packages every older version
    /// and clears the working directory when no pair failed.
    pub fn run_once(
        &self,
        release_tree: &Path,
        name_hint: Option<&str>,
    ) -> Result<RunSummary, OrchestratorError> {
        let mut state = RunState::new();
        state.transition(RunPhase::ReleaseFetched)?;
        tracing::info!(run_id = %state.run_id, tree = %release_tree.display(), "packaging release");

        let version = resolve_version_or_hint(release_tree, &self.version_metadata, name_hint)?;
        tracing::info!(version = %version, "version info found");

        let release_root = ingest_release(release_tree, &self.release_dir, &version)?;
        if let Err(e) = self.cache.invalidate(&version) {
            tracing::warn!(version = %version, error = %e, "failed to drop stale manifest");
        }
        state.transition(RunPhase::VersionResolved)?;

        let known = self.versions.list_known_versions()?;
        tracing::info!(versions = ?known.iter().map(Version::as_str).collect::<Vec<_>>(), "currently available versions");

        let report = self.generate_with_state(&mut state, &version, &release_root, &known)?;

        let working_dir_cleared = if report.has_failures() {
            tracing::warn!(
                failed = report.failed.len(),
                dir = %self.work_root.display(),
                "keeping working directory for inspection"
            );
            false
        } else {
            self.clear_working_dir()?;
            state.transition(RunPhase::WorkingDirCleared)?;
            true
        };
        state.transition(RunPhase::Idle)?;

        Ok(RunSummary {
            state,
            version,
            release_root,
            report,
            working_dir_cleared,
        })
    }
}

fn clear_dir(dir: &Path) -> Result<(), OrchestratorError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(OrchestratorError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackagerConfig;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn config_in(root: &Path) -> PackagerConfig {
        let overrides = serde_json::json!({
            "release_dir": root.join("releases"),
            "working_dir": root.join("work"),
            "package_dir": root.join("packages"),
            "store_path": root.join("upgrade_packages.json"),
        });
        PackagerConfig::load(None, Vec::<(String, String)>::new(), Some(overrides)).unwrap()
    }

    fn write_release(config: &PackagerConfig, version: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = config.release_dir.join(version);
        for (path, contents) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, contents).unwrap();
        }
        root
    }

    /// Store whose lookups always fail
    struct BrokenStore;

    impl UpgradePathStore for BrokenStore {
        fn exists(&self, _: &Version, _: &Version) -> Result<bool, StoreError> {
            Err(StoreError::UnsupportedSchema(0))
        }
        fn save(&self, _: &UpgradePackage) -> Result<UpgradePackage, StoreError> {
            unreachable!("save after failed lookup")
        }
        fn list(&self) -> Result<Vec<UpgradePackage>, StoreError> {
            Ok(Vec::new())
        }
        fn retract(&self, _: &Version, _: &Version) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Sink recording what it was handed
    struct RecordingSink {
        accepted: RefCell<Vec<(String, String)>>,
    }

    impl ArtifactSink for RecordingSink {
        fn accept(&self, archive: &Path, from: &Version, to: &Version) -> Result<String, StoreError> {
            assert!(archive.exists());
            self.accepted
                .borrow_mut()
                .push((from.to_string(), to.to_string()));
            Ok(format!("mem://{from}-{to}"))
        }
    }

    #[test]
    fn test_generate_skips_newer_and_equal() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_release(&config, "9", &[("a.txt", "old")]);
        let new_root = write_release(&config, "10", &[("a.txt", "new")]);
        write_release(&config, "11", &[("a.txt", "newer")]);

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        let known = orchestrator.versions().list_known_versions().unwrap();
        let report = orchestrator
            .generate_upgrades(&v("10"), &new_root, &known)
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].from_version, v("9"));
        assert_eq!(report.skipped_not_older, vec![v("10"), v("11")]);
        assert!(config.package_dir.join("9-10.tar.gz").exists());
    }

    #[test]
    fn test_store_lookup_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_release(&config, "1", &[("a.txt", "1")]);
        let new_root = write_release(&config, "2", &[("a.txt", "2")]);

        let orchestrator = Orchestrator::new(
            &config,
            Box::new(ReleaseDirVersionStore::new(&config.release_dir)),
            Box::new(SideFileManifestCache::new(config.manifest_dir())),
            Box::new(BrokenStore),
            Box::new(DirectoryArtifactSink::new(&config.package_dir, None)),
            Assembler::default(),
        );

        let result = orchestrator.generate_upgrades(&v("2"), &new_root, &[v("1")]);
        assert!(matches!(result, Err(OrchestratorError::Store(_))));
    }

    #[test]
    fn test_custom_sink_locator_is_recorded() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_release(&config, "1", &[("a.txt", "1")]);
        let new_root = write_release(&config, "2", &[("a.txt", "2")]);

        let orchestrator = Orchestrator::new(
            &config,
            Box::new(ReleaseDirVersionStore::new(&config.release_dir)),
            Box::new(SideFileManifestCache::new(config.manifest_dir())),
            Box::new(JsonUpgradePathStore::new(&config.store_path)),
            Box::new(RecordingSink {
                accepted: RefCell::new(Vec::new()),
            }),
            Assembler::default(),
        );

        let report = orchestrator
            .generate_upgrades(&v("2"), &new_root, &[v("1")])
            .unwrap();
        assert_eq!(report.created[0].update_url, "mem://1-2");
        assert!(orchestrator.store().exists(&v("1"), &v("2")).unwrap());
    }

    #[test]
    fn test_run_once_ingests_and_clears_working_dir() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_release(&config, "100", &[("a.txt", "v100")]);

        let incoming = dir.path().join("incoming");
        let metadata = incoming.join(&config.version_metadata);
        fs::create_dir_all(metadata.parent().unwrap()).unwrap();
        fs::write(&metadata, r#"{"Changelist": 200}"#).unwrap();
        fs::write(incoming.join("a.txt"), "v200").unwrap();

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        let summary = orchestrator.run_once(&incoming, None).unwrap();

        assert_eq!(summary.version, v("200"));
        assert_eq!(summary.release_root, config.release_dir.join("200"));
        assert_eq!(summary.state.phase, RunPhase::Idle);
        assert_eq!(summary.report.created.len(), 1);
        assert!(summary.working_dir_cleared);
        assert!(!config.working_dir.exists());
        assert!(!incoming.exists());
    }

    #[test]
    fn test_generate_leaves_no_package_dir_behind() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_release(&config, "1", &[("a.txt", "one")]);
        let new_root = write_release(&config, "2", &[("a.txt", "two")]);

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        let report = orchestrator
            .generate_upgrades(&v("2"), &new_root, &[v("1"), v("2")])
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert!(!config.working_dir.join("1-2-package").exists());
        assert!(config.package_dir.join("1-2.tar.gz").is_file());

        orchestrator.clear_working_dir().unwrap();
        assert!(!config.working_dir.exists());
        orchestrator.clear_working_dir().unwrap();
    }
}
