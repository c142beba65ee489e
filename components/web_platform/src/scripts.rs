//! Scripts the browser can evaluate in a page or worker.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::GlobalScope;

/// Entry point of a script: runs once against the global scope it is
/// evaluated in.
pub type WorkerScript = Arc<dyn Fn(&GlobalScope) + Send + Sync>;

#[derive(Clone)]
struct ScriptEntry {
    script: WorkerScript,
    version: u64,
}

/// Scripts served by every origin of the profile, keyed by URL path
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: RwLock<HashMap<String, ScriptEntry>>,
}

impl ScriptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `script` at `path`, replacing and versioning any previous one
    pub fn define<F>(&self, path: &str, script: F)
    where
        F: Fn(&GlobalScope) + Send + Sync + 'static,
    {
        let mut scripts = self.scripts.write();
        let version = scripts.get(path).map(|e| e.version + 1).unwrap_or(1);
        scripts.insert(
            path.to_string(),
            ScriptEntry {
                script: Arc::new(script),
                version,
            },
        );
    }

    /// Mark the script at `path` as changed without replacing it, so the
    /// next update check finds a new worker. Returns the new version.
    pub fn bump(&self, path: &str) -> Option<u64> {
        let mut scripts = self.scripts.write();
        let entry = scripts.get_mut(path)?;
        entry.version += 1;
        Some(entry.version)
    }

    /// Current version of the script at `path`
    pub fn version(&self, path: &str) -> Option<u64> {
        self.scripts.read().get(path).map(|e| e.version)
    }

    /// Look up the script served for `url`
    pub fn resolve(&self, url: &Url) -> Option<(WorkerScript, u64)> {
        self.scripts
            .read()
            .get(url.path())
            .map(|e| (Arc::clone(&e.script), e.version))
    }
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scripts = self.scripts.read();
        let mut paths: Vec<_> = scripts.keys().collect();
        paths.sort();
        f.debug_struct("ScriptRegistry").field("paths", &paths).finish()
    }
}
