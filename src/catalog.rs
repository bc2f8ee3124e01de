//! Profile catalog: directory loading, atomic reload, and optional
//! filesystem watching (spec §4.2, §4.3 — C2).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;
use crate::profile::{parse_profile_bytes, Profile};

/// Outcome of a `Load`/`Reload` pass (spec §4.3, returned by the
/// `reload_profiles` tool).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReloadReport {
    pub loaded: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// The immutable, point-in-time view of the catalog. Readers clone the
/// `Arc` and hold it for the lifetime of one request; a reload swaps the
/// pointer behind the lock rather than mutating in place.
#[derive(Debug, Default)]
struct Snapshot {
    profiles: HashMap<String, Arc<Profile>>,
    fallback: Option<String>,
}

/// Owns the current snapshot and the directory it was loaded from.
pub struct Catalog {
    dir: PathBuf,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serialises concurrent `reload` calls (spec §4.2: "only one may
    /// execute at a time, others wait for the in-flight one"). Held only
    /// for the duration of one scan-and-swap pass; readers never touch it.
    reload_gate: std::sync::Mutex<()>,
}

impl Catalog {
    /// Load the catalog for the first time. Unlike [`Catalog::reload`],
    /// a totally empty or unreadable directory is not itself an error —
    /// the server starts with zero profiles and logs a warning.
    pub fn load(dir: &Path) -> Result<Self> {
        let catalog = Self {
            dir: dir.to_path_buf(),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            reload_gate: std::sync::Mutex::new(()),
        };
        let report = catalog.reload()?;
        if report.loaded == 0 {
            warn!(dir = %dir.display(), "catalog loaded with zero profiles");
        }
        Ok(catalog)
    }

    /// Re-scan `dir` non-recursively for `*.md` files and atomically
    /// replace the current snapshot. A file that fails to parse is
    /// skipped (recorded in the report) without aborting the rest of the
    /// scan (spec §4.1). Concurrent callers queue on `reload_gate` and
    /// each runs its own pass once it acquires it — with an unchanged
    /// directory that produces an equivalent report to the call it waited
    /// behind, satisfying spec §4.2's serialisation requirement without a
    /// separate result-broadcast mechanism.
    pub fn reload(&self) -> Result<ReloadReport> {
        let _gate = self.reload_gate.lock().expect("reload gate poisoned");
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|ext| ext == "md").unwrap_or(false))
                .collect(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "profiles directory unreadable");
                Vec::new()
            }
        };
        entries.sort();

        let mut profiles: HashMap<String, Arc<Profile>> = HashMap::new();
        let mut fallback: Option<String> = None;
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for path in entries {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    errors.push(format!("{}: {}", path.display(), e));
                    continue;
                }
            };

            match parse_profile_bytes(&path, &bytes) {
                Ok(parsed) => {
                    warnings.extend(parsed.warnings);
                    let mut profile = parsed.profile;
                    profile.last_modified = std::fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .ok()
                        .map(chrono::DateTime::<chrono::Utc>::from);

                    if let Some(existing) = profiles.get(&profile.name) {
                        warnings.push(format!(
                            "{}: duplicate profile name '{}' also defined in {}; keeping the first one loaded",
                            path.display(),
                            profile.name,
                            existing.source_path.display()
                        ));
                        continue;
                    }

                    if profile.fallback {
                        if let Some(existing_name) = &fallback {
                            warnings.push(format!(
                                "{}: duplicate fallback=true ('{}' already claimed it); this one is not used as fallback",
                                path.display(),
                                existing_name
                            ));
                        } else {
                            fallback = Some(profile.name.clone());
                        }
                    }

                    profiles.insert(profile.name.clone(), Arc::new(profile));
                }
                Err(e) => {
                    errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        let loaded = profiles.len();
        let failed = errors.len();

        info!(loaded, failed, dir = %self.dir.display(), "catalog reload complete");

        let snapshot = Snapshot { profiles, fallback };
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().expect("catalog lock poisoned") = snapshot.clone();

        if let Err(e) = write_metadata_sidecar(&self.dir, &snapshot) {
            warn!(error = %e, "failed to write profiles_metadata.json sidecar");
        }

        Ok(ReloadReport {
            loaded,
            failed,
            warnings,
            errors,
        })
    }

    /// A handle to the directory backing this catalog.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, name: &str) -> Option<Arc<Profile>> {
        self.current().profiles.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Profile>> {
        self.current().profiles.values().cloned().collect()
    }

    pub fn fallback(&self) -> Option<Arc<Profile>> {
        let snapshot = self.current();
        snapshot
            .fallback
            .as_ref()
            .and_then(|name| snapshot.profiles.get(name).cloned())
    }

    pub fn len(&self) -> usize {
        self.current().profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("catalog lock poisoned").clone()
    }
}

#[derive(serde::Serialize)]
struct MetadataSidecarEntry {
    name: String,
    complexity: crate::profile::ComplexityTier,
    domains: Vec<String>,
    capabilities: Vec<String>,
    source_path: String,
    content_hash: String,
}

#[derive(serde::Serialize)]
struct MetadataSidecar {
    generated_at: chrono::DateTime<chrono::Utc>,
    total_profiles: usize,
    profiles: Vec<MetadataSidecarEntry>,
}

/// Write `profiles_metadata.json` at the catalog root after a successful
/// reload (spec §6.5, permitted but optional). Writes to a temporary
/// sibling and renames into place so a crash mid-write never leaves a
/// truncated file visible under the final name.
fn write_metadata_sidecar(dir: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    let mut profiles: Vec<MetadataSidecarEntry> = snapshot
        .profiles
        .values()
        .map(|p| MetadataSidecarEntry {
            name: p.name.clone(),
            complexity: p.complexity_tier,
            domains: p.domains.iter().cloned().collect(),
            capabilities: p.capabilities.iter().cloned().collect(),
            source_path: p.source_path.display().to_string(),
            content_hash: p.content_hash.clone(),
        })
        .collect();
    profiles.sort_by(|a, b| a.name.cmp(&b.name));

    let sidecar = MetadataSidecar {
        generated_at: chrono::Utc::now(),
        total_profiles: profiles.len(),
        profiles,
    };

    let final_path = dir.join("profiles_metadata.json");
    let tmp_path = dir.join("profiles_metadata.json.tmp");
    let body = serde_json::to_vec_pretty(&sidecar)?;
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Debounced background watcher that triggers `Catalog::reload` when
/// files under the catalog's directory change (spec §9 Open Question:
/// hot reload without an explicit RPC call).
pub struct ProfileWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ProfileWatcher {
    /// Spawn a watcher that calls `catalog.reload()` (logging the report,
    /// swallowing errors) whenever `dir` changes, debounced by
    /// `debounce`. Runs on a dedicated blocking thread fed by `notify`'s
    /// own watcher thread; reload itself happens on the tokio runtime via
    /// `handle`.
    pub fn spawn(
        catalog: Arc<Catalog>,
        handle: tokio::runtime::Handle,
        debounce: Duration,
    ) -> notify::Result<Self> {
        use notify::{Event, RecursiveMode, Watcher};

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })?;
        watcher.watch(catalog.dir(), RecursiveMode::NonRecursive)?;

        handle.spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                while rx.try_recv().is_ok() {}
                match catalog.reload() {
                    Ok(report) => {
                        info!(
                            loaded = report.loaded,
                            failed = report.failed,
                            "hot reload triggered by filesystem watcher"
                        );
                    }
                    Err(e) => warn!(error = %e, "hot reload failed"),
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}
