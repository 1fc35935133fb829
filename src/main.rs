//! Upgrade Packager CLI
//!
//! Entry point for the `upgrade-packager` command-line tool.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use upgrade_packager::config::DEFAULT_CONFIG_FILE;
use upgrade_packager::manifest::{build_manifest, get_or_build_manifest, SideFileManifestCache};
use upgrade_packager::package::changed_file_count;
use upgrade_packager::store::{JsonUpgradePathStore, ReleaseDirVersionStore};
use upgrade_packager::{
    apply_package, compute_delta, logging, DeltaOperation, Orchestrator, PackagerConfig,
    UpgradePathStore, Version, VersionStore,
};

#[derive(Parser)]
#[command(name = "upgrade-packager")]
#[command(about = "Incremental upgrade package generator", version)]
struct Cli {
    /// Path to config file (default: packager.toml when present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Override the release directory
    #[arg(long, global = true)]
    release_dir: Option<PathBuf>,

    /// Override the working directory
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    /// Override the package output directory
    #[arg(long, global = true)]
    package_dir: Option<PathBuf>,

    /// Override the upgrade record store file
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,

    /// Public URL prefix for finished packages
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an extracted release tree and package every older version
    Run {
        /// Extracted release directory
        release_tree: PathBuf,

        /// Download or archive name used when the build metadata lacks a version
        #[arg(long)]
        name_hint: Option<String>,
    },

    /// Generate packages for a version already in the release directory
    Generate {
        version: String,
    },

    /// Print the manifest of a directory tree
    Manifest {
        dir: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the delta between two ingested versions
    Diff {
        from: String,
        to: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Apply a package (directory or .tar.gz) to an installed tree
    Apply {
        package: PathBuf,
        target: PathBuf,
    },

    /// List known versions and recorded upgrade paths
    Versions {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Soft-delete an upgrade path so the next run regenerates it
    Retract {
        from: String,
        to: String,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match &cli.command {
        Commands::Run {
            release_tree,
            name_hint,
        } => run_cycle(&cli, release_tree, name_hint.as_deref()),
        Commands::Generate { version } => run_generate(&cli, version),
        Commands::Manifest { dir, json } => run_manifest(dir, *json),
        Commands::Diff { from, to, json } => run_diff(&cli, from, to, *json),
        Commands::Apply { package, target } => run_apply(package, target),
        Commands::Versions { json } => run_versions(&cli, *json),
        Commands::Retract { from, to } => run_retract(&cli, from, to),
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, err);
    process::exit(1);
}

fn load_config(cli: &Cli) -> PackagerConfig {
    let mut overrides = serde_json::Map::new();
    let paths = [
        ("release_dir", &cli.release_dir),
        ("working_dir", &cli.working_dir),
        ("package_dir", &cli.package_dir),
        ("store_path", &cli.store_path),
    ];
    for (key, value) in paths {
        if let Some(path) = value {
            overrides.insert(key.to_string(), path.to_string_lossy().into());
        }
    }
    if let Some(url) = &cli.base_url {
        overrides.insert("base_url".to_string(), url.clone().into());
    }
    let overrides = (!overrides.is_empty()).then(|| serde_json::Value::Object(overrides));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if cli.config.is_some() && !config_path.exists() {
        fail("Error loading config", format!("{} not found", config_path.display()));
    }

    let config = PackagerConfig::load(Some(&config_path), std::env::vars(), overrides)
        .unwrap_or_else(|e| fail("Error loading config", e));
    if let Err(e) = config.ensure_dirs() {
        fail("Error preparing directories", e);
    }
    config
}

fn parse_version(raw: &str) -> Version {
    Version::parse(raw).unwrap_or_else(|e| fail("Invalid version", e))
}

fn orchestrator_for(config: &PackagerConfig) -> Orchestrator {
    Orchestrator::from_config(config).unwrap_or_else(|e| fail("Error configuring packager", e))
}

fn run_cycle(cli: &Cli, release_tree: &Path, name_hint: Option<&str>) {
    let config = load_config(cli);
    let orchestrator = orchestrator_for(&config);

    let summary = orchestrator
        .run_once(release_tree, name_hint)
        .unwrap_or_else(|e| fail("Run failed", e));

    println!("Version: {}", summary.version);
    print_report(&summary.report);
    if !summary.working_dir_cleared {
        println!("Working directory kept: {}", config.working_dir.display());
    }
    if summary.report.has_failures() {
        process::exit(1);
    }
}

fn run_generate(cli: &Cli, version: &str) {
    let config = load_config(cli);
    let version = parse_version(version);
    let orchestrator = orchestrator_for(&config);

    let root = orchestrator.versions().path_for(&version);
    if !root.is_dir() {
        fail("Unknown version", format!("{} has no tree at {}", version, root.display()));
    }
    let known = orchestrator
        .versions()
        .list_known_versions()
        .unwrap_or_else(|e| fail("Error listing versions", e));

    let report = orchestrator
        .generate_upgrades(&version, &root, &known)
        .unwrap_or_else(|e| fail("Generate failed", e));
    print_report(&report);
    if report.has_failures() {
        println!("Working directory kept: {}", config.working_dir.display());
        process::exit(1);
    }
    if let Err(e) = orchestrator.clear_working_dir() {
        fail("Error clearing working directory", e);
    }
}

fn print_report(report: &upgrade_packager::UpgradeReport) {
    for record in &report.created {
        println!(
            "  created  {} -> {}  {}",
            record.from_version, record.to_version, record.update_url
        );
    }
    for from in &report.skipped_existing {
        println!("  exists   {}", from);
    }
    for failure in &report.failed {
        println!("  FAILED   {} -> {}  {}", failure.from, failure.to, failure.error);
    }
    println!(
        "{} created, {} already present, {} not older, {} failed",
        report.created.len(),
        report.skipped_existing.len(),
        report.skipped_not_older.len(),
        report.failed.len()
    );
}

fn run_manifest(dir: &Path, json_output: bool) {
    let manifest = build_manifest(dir).unwrap_or_else(|e| fail("Error building manifest", e));

    if json_output {
        match serde_json::to_string_pretty(&manifest) {
            Ok(json) => println!("{}", json),
            Err(e) => fail("Error serializing output", e),
        }
    } else {
        for (path, digest) in manifest.iter() {
            println!("{}  {}", digest, path);
        }
    }
}

fn run_diff(cli: &Cli, from: &str, to: &str, json_output: bool) {
    let config = load_config(cli);
    let from = parse_version(from);
    let to = parse_version(to);
    let versions = ReleaseDirVersionStore::new(&config.release_dir);
    let cache = SideFileManifestCache::new(config.manifest_dir());

    let from_manifest = get_or_build_manifest(&cache, &from, &versions.path_for(&from))
        .unwrap_or_else(|e| fail("Error building manifest", e));
    let to_manifest = get_or_build_manifest(&cache, &to, &versions.path_for(&to))
        .unwrap_or_else(|e| fail("Error building manifest", e));
    let delta = compute_delta(&from_manifest, &to_manifest);

    if json_output {
        let operations: BTreeMap<&str, DeltaOperation> = delta.iter().collect();
        let output = serde_json::json!({
            "from": from,
            "to": to,
            "fingerprint": delta.fingerprint(),
            "operations": operations,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => fail("Error serializing output", e),
        }
    } else {
        for (path, op) in delta.iter() {
            println!("{:<9} {}", op.as_str(), path);
        }
        println!();
        println!(
            "{} changed, {} removed, fingerprint {}",
            changed_file_count(&delta),
            delta.count(DeltaOperation::Removed),
            delta.fingerprint()
        );
    }
}

fn run_apply(package: &Path, target: &Path) {
    let summary = apply_package(package, target).unwrap_or_else(|e| fail("Apply failed", e));

    println!("Copied: {}", summary.copied);
    println!("Removed: {}", summary.removed);
    if !summary.deferred.is_empty() {
        println!("Fetch in full:");
        for path in &summary.deferred {
            println!("  {}", path);
        }
    }
}

fn run_versions(cli: &Cli, json_output: bool) {
    let config = load_config(cli);
    let versions = ReleaseDirVersionStore::new(&config.release_dir)
        .list_known_versions()
        .unwrap_or_else(|e| fail("Error listing versions", e));
    let records = JsonUpgradePathStore::new(&config.store_path)
        .list()
        .unwrap_or_else(|e| fail("Error reading upgrade records", e));

    if json_output {
        let output = serde_json::json!({
            "versions": versions,
            "upgrade_paths": records,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => fail("Error serializing output", e),
        }
        return;
    }

    println!("Versions:");
    for version in &versions {
        println!("  {}", version);
    }
    println!();
    println!("Upgrade paths:");
    if records.is_empty() {
        println!("  (none)");
    }
    for record in &records {
        println!(
            "  #{} {} -> {}  {}  {}",
            record.id,
            record.from_version,
            record.to_version,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.update_url
        );
    }
}

fn run_retract(cli: &Cli, from: &str, to: &str) {
    let config = load_config(cli);
    let from = parse_version(from);
    let to = parse_version(to);

    let store = JsonUpgradePathStore::new(&config.store_path);
    match store.retract(&from, &to) {
        Ok(true) => println!("Retracted {} -> {}", from, to),
        Ok(false) => fail("Nothing to retract", format!("{} -> {}", from, to)),
        Err(e) => fail("Error updating upgrade records", e),
    }
}
