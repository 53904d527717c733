// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Disk-backed content cache.
//!
//! [`ContentCache`] maps an absolute source path to an artifact path under the
//! cache root, mirroring the source tree (`/app/styles.scss` is stored at
//! `<root>/app/styles.scss`). Entries are not validated by content hash: they
//! stay valid until the dev watcher reports a change to the file they were
//! written for, or until [`ContentCache::invalidate`] removes them.
//!
//! A file changed while no watch is armed for it (before its first write) is
//! not noticed.
//!
//! # Watching
//!
//! In dev mode [`ContentCache::setup`] starts one debounced recursive watcher
//! over the source root. Each `write` registers the source file (or an
//! explicit target) as watched. The watcher then:
//!
//! - invalidates and reports [`WatchKind::Change`] when a watched file changes
//! - invalidates and reports [`WatchKind::Unlink`] when a watched file goes away
//! - reports [`WatchKind::Add`] / [`WatchKind::Unlink`] for other files
//!   appearing or disappearing, so the router can be rebuilt

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind as FsEventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::error::{KilnError, Result};
use crate::events::{Event, EventEmitter, WatchKind};
use crate::options::CacheOptions;
use crate::response::{Response, ResponseMeta};

const RESPONSE_SUFFIX: &str = ".response";

/// What a write should watch for invalidation (dev mode only).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Watch {
    /// Watch the source file itself.
    #[default]
    Source,
    /// Watch another file instead (e.g. an entry's real input).
    Path(PathBuf),
    /// Do not arm a watch.
    Off,
}

/// A cached artifact read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    /// Artifact path under the cache root.
    pub path: PathBuf,
    /// Artifact bytes.
    pub content: Vec<u8>,
    /// Response metadata stored by [`ContentCache::write_response`].
    pub meta: Option<ResponseMeta>,
}

/// Outcome of [`ContentCache::load`].
///
/// A miss is a normal result, not an error; only genuine I/O faults surface
/// as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Valid cached content.
    Hit(CachedEntry),
    /// No entry for this source.
    Miss,
}

impl CacheLookup {
    /// The entry, if this is a hit.
    pub fn hit(self) -> Option<CachedEntry> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss => None,
        }
    }
}

type FsDebouncer = Debouncer<RecommendedWatcher, RecommendedCache>;

struct Shared {
    root: PathBuf,
    events: Arc<EventEmitter>,
    /// watch target -> source path whose entry it guards
    watched: Mutex<HashMap<PathBuf, PathBuf>>,
}

/// Path-keyed artifact cache with watch-based invalidation.
pub struct ContentCache {
    shared: Arc<Shared>,
    base: PathBuf,
    preserve: bool,
    dev: bool,
    debounce: Duration,
    watcher: Mutex<Option<FsDebouncer>>,
    task: Mutex<Option<JoinHandle<()>>>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("root", &self.shared.root)
            .field("base", &self.base)
            .field("preserve", &self.preserve)
            .field("dev", &self.dev)
            .finish()
    }
}

impl ContentCache {
    /// Creates a cache for sources under `base`. Nothing touches disk until
    /// [`ContentCache::setup`].
    pub fn new(options: &CacheOptions, base: &Path, dev: bool, events: Arc<EventEmitter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                root: absolute(&options.root()),
                events,
                watched: Mutex::new(HashMap::new()),
            }),
            base: absolute(base),
            preserve: options.preserve(),
            dev,
            debounce: Duration::from_millis(100),
            watcher: Mutex::new(None),
            task: Mutex::new(None),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the watcher's debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Prepares the cache root and, in dev mode, starts the watcher.
    ///
    /// Unless `preserve` is set the root is wiped first, so no artifact of a
    /// previous process is ever served.
    pub async fn setup(&self) -> Result<()> {
        let root = &self.shared.root;
        if !self.preserve {
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => debug!(root = %root.display(), "cleared previous cache"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tokio::fs::create_dir_all(root).await?;

        if self.dev {
            self.start_watcher()?;
        }

        self.shared
            .events
            .emit(Event::CacheSetup { root: root.clone() })
            .await;
        Ok(())
    }

    /// Maps a source path to its artifact path under the cache root.
    ///
    /// Pure and deterministic: the absolute, lexically normalized source path
    /// has its root stripped and is joined onto the cache root.
    pub fn resolve(&self, original: &Path) -> PathBuf {
        self.shared.resolve(original)
    }

    /// Stores `content` for `original` and returns the artifact path.
    ///
    /// Replaces a response entry written for the same source.
    pub async fn write(&self, original: &Path, content: &[u8], watch: Watch) -> Result<PathBuf> {
        let cached = self.resolve(original);
        remove_if_exists(&envelope_path(&cached)).await?;
        self.store(original, cached, content, watch).await
    }

    /// Stores a response body together with its status and headers.
    ///
    /// Metadata and body share one file, written under a temporary name and
    /// renamed into place, so a reader sees the whole entry or none of it.
    pub async fn write_response(&self, original: &Path, response: &Response, watch: Watch) -> Result<PathBuf> {
        let cached = self.resolve(original);
        remove_if_exists(&cached).await?;

        let mut envelope = serde_json::to_vec(&response.meta())?;
        envelope.push(b'\n');
        envelope.extend_from_slice(&response.body);
        self.store(original, envelope_path(&cached), &envelope, watch).await
    }

    async fn store(&self, original: &Path, path: PathBuf, content: &[u8], watch: Watch) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        trace!(original = %original.display(), cached = %path.display(), bytes = content.len(), "cache write");

        if self.dev {
            match watch {
                Watch::Source => self.watch(original, original)?,
                Watch::Path(target) => self.watch(original, &target)?,
                Watch::Off => {}
            }
        }

        self.shared
            .events
            .emit(Event::CacheWrite {
                original: absolute(original),
                cached: path.clone(),
            })
            .await;
        Ok(path)
    }

    /// Arms a watch on `target` that invalidates the entry of `original`.
    ///
    /// Targets outside the source root get a watch of their own. A no-op
    /// unless the watcher is running.
    pub fn watch(&self, original: &Path, target: &Path) -> Result<()> {
        let mut guard = self.watcher.lock().map_err(|_| KilnError::Poisoned("cache watcher"))?;
        let Some(debouncer) = guard.as_mut() else {
            return Ok(());
        };

        let original = absolute(original);
        let target = std::fs::canonicalize(target).unwrap_or_else(|_| absolute(target));
        if !target.starts_with(&self.base) {
            debouncer.watch(&target, RecursiveMode::NonRecursive)?;
        }

        self.shared
            .watched
            .lock()
            .map_err(|_| KilnError::Poisoned("cache watch list"))?
            .insert(target, original);
        Ok(())
    }

    /// Removes the entry of `original` and reports it.
    ///
    /// Returns the removed artifact path, or `None` if nothing was cached.
    pub async fn invalidate(&self, original: &Path) -> Result<Option<PathBuf>> {
        self.shared.invalidate(original).await
    }

    /// Reads the entry of `original`.
    pub async fn load(&self, original: &Path) -> Result<CacheLookup> {
        let cached = self.resolve(original);

        let envelope = envelope_path(&cached);
        if let Some(bytes) = read_if_exists(&envelope).await? {
            let split = bytes
                .iter()
                .position(|b| *b == b'\n')
                .ok_or_else(|| KilnError::config(&envelope, "cached response has no header line"))?;
            let meta = serde_json::from_slice(&bytes[..split])?;
            return Ok(CacheLookup::Hit(CachedEntry {
                path: envelope,
                content: bytes[split + 1..].to_vec(),
                meta: Some(meta),
            }));
        }

        Ok(match read_if_exists(&cached).await? {
            Some(content) => CacheLookup::Hit(CachedEntry {
                path: cached,
                content,
                meta: None,
            }),
            None => CacheLookup::Miss,
        })
    }

    /// The entry of `original` as a response, if cached.
    ///
    /// Entries written without metadata are served as 200 with a content
    /// type inferred from the source path.
    pub async fn response(&self, original: &Path) -> Result<Option<Response>> {
        Ok(self.load(original).await?.hit().map(|entry| match entry.meta {
            Some(meta) => Response::from_meta(meta, entry.content),
            None => Response::file(original, entry.content),
        }))
    }

    /// Drops every entry and watch, leaving an empty cache root.
    pub async fn reset(&self) -> Result<()> {
        let root = &self.shared.root;
        match tokio::fs::remove_dir_all(root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(root).await?;

        self.shared
            .watched
            .lock()
            .map_err(|_| KilnError::Poisoned("cache watch list"))?
            .clear();
        debug!(root = %root.display(), "cache reset");
        Ok(())
    }

    /// Source paths that currently have an armed watch.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut originals: Vec<PathBuf> = self
            .shared
            .watched
            .lock()
            .map(|w| w.values().cloned().collect())
            .unwrap_or_default();
        originals.sort();
        originals.dedup();
        originals
    }

    /// Serializes transforms of one source file.
    ///
    /// Concurrent first-miss requests for the same file wait here; the first
    /// one transforms and writes, the others then find a cache hit.
    pub async fn lock_key(&self, original: &Path) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| KilnError::Poisoned("cache key locks"))?;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(absolute(original)).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Stops the watcher.
    pub fn shutdown(&self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if watcher.take().is_some() {
                debug!("cache watcher stopped");
            }
        }
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }

    fn start_watcher(&self) -> Result<()> {
        let mut guard = self.watcher.lock().map_err(|_| KilnError::Poisoned("cache watcher"))?;
        if guard.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<DebouncedEvent>>();
        let mut debouncer = new_debouncer(self.debounce, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                let _ = tx.send(events);
            }
            Err(errors) => {
                for e in errors {
                    error!("watch error: {}", e);
                }
            }
        })?;

        let base = std::fs::canonicalize(&self.base).unwrap_or_else(|_| self.base.clone());
        debouncer.watch(&base, RecursiveMode::Recursive)?;
        *guard = Some(debouncer);
        debug!(base = %base.display(), "cache watcher started");

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                shared.process(batch).await;
            }
        });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }
}

impl Drop for ContentCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsChange {
    Created,
    Modified,
    Removed,
}

impl Shared {
    fn resolve(&self, original: &Path) -> PathBuf {
        let relative: PathBuf = absolute(original)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    async fn invalidate(&self, original: &Path) -> Result<Option<PathBuf>> {
        let original = absolute(original);
        let cached = self.resolve(&original);

        let envelope = envelope_path(&cached);
        let mut removed = None;
        if remove_if_exists(&envelope).await? {
            removed = Some(envelope);
        }
        if remove_if_exists(&cached).await? {
            removed = Some(cached.clone());
        }

        self.watched
            .lock()
            .map_err(|_| KilnError::Poisoned("cache watch list"))?
            .retain(|_, o| *o != original);

        trace!(original = %original.display(), existed = removed.is_some(), "cache invalidate");
        self.events
            .emit(Event::CacheInvalidate {
                original,
                cached: cached.clone(),
            })
            .await;
        Ok(removed)
    }

    async fn process(&self, batch: Vec<DebouncedEvent>) {
        for event in batch {
            let changes: Vec<(FsChange, &PathBuf)> = match event.event.kind {
                FsEventKind::Create(_) => event.event.paths.iter().map(|p| (FsChange::Created, p)).collect(),
                FsEventKind::Remove(_) => event.event.paths.iter().map(|p| (FsChange::Removed, p)).collect(),
                FsEventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    event.event.paths.iter().map(|p| (FsChange::Removed, p)).collect()
                }
                FsEventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                    event.event.paths.iter().map(|p| (FsChange::Created, p)).collect()
                }
                FsEventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.event.paths.as_slice() {
                    [from, to] => vec![(FsChange::Removed, from), (FsChange::Created, to)],
                    paths => paths.iter().map(|p| (FsChange::Modified, p)).collect(),
                },
                FsEventKind::Modify(_) => event.event.paths.iter().map(|p| (FsChange::Modified, p)).collect(),
                _ => Vec::new(),
            };

            for (change, path) in changes {
                if path.starts_with(&self.root) || path.is_dir() {
                    continue;
                }
                if let Err(e) = self.on_change(change, path).await {
                    error!(path = %path.display(), "cache invalidation failed: {}", e);
                }
            }
        }
    }

    async fn on_change(&self, change: FsChange, path: &Path) -> Result<()> {
        let original = self
            .watched
            .lock()
            .map_err(|_| KilnError::Poisoned("cache watch list"))?
            .get(path)
            .cloned();

        let (kind, original, cached) = match (change, original) {
            (FsChange::Created | FsChange::Modified, Some(original)) => {
                let cached = self.invalidate(&original).await?;
                (WatchKind::Change, original, cached)
            }
            (FsChange::Removed, Some(original)) => {
                let cached = self.invalidate(&original).await?;
                (WatchKind::Unlink, original, cached)
            }
            (FsChange::Created, None) => (WatchKind::Add, path.to_path_buf(), None),
            (FsChange::Removed, None) => (WatchKind::Unlink, path.to_path_buf(), None),
            (FsChange::Modified, None) => return Ok(()),
        };

        debug!(kind = ?kind, file = %original.display(), "source changed");
        self.events
            .emit(Event::WatchChange { kind, original, cached })
            .await;
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// File holding a response entry: a JSON header line, then the body.
fn envelope_path(cached: &Path) -> PathBuf {
    with_suffix(cached, RESPONSE_SUFFIX)
}

fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Absolute, lexically normalized form of `path`.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    let joined = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Flow};
    use tempfile::tempdir;

    fn cache_in(dir: &Path, dev: bool) -> ContentCache {
        let options = CacheOptions {
            root: Some(dir.join(".cache")),
            preserve: Some(false),
        };
        ContentCache::new(&options, &dir.join("app"), dev, Arc::new(EventEmitter::new()))
    }

    #[test]
    fn test_resolve_mirrors_source_tree() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);

        let resolved = cache.resolve(Path::new("/srv/app/blog/post.md"));
        assert_eq!(resolved, cache.root().join("srv/app/blog/post.md"));

        let same = cache.resolve(Path::new("/srv/app/blog/../blog/./post.md"));
        assert_eq!(same, resolved);
        assert_ne!(cache.resolve(Path::new("/srv/app/blog/other.md")), resolved);
    }

    #[tokio::test]
    async fn test_setup_wipes_unless_preserved() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(".cache/stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let options = CacheOptions {
            root: Some(dir.path().join(".cache")),
            preserve: Some(true),
        };
        let preserved = ContentCache::new(&options, dir.path(), false, Arc::new(EventEmitter::new()));
        preserved.setup().await.unwrap();
        assert!(stale.exists());

        let cache = cache_in(dir.path(), false);
        cache.setup().await.unwrap();
        assert!(!stale.exists());
        assert!(cache.root().is_dir());
    }

    #[tokio::test]
    async fn test_write_load_invalidate() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);
        cache.setup().await.unwrap();

        let source = dir.path().join("app/styles.scss");
        assert_eq!(cache.load(&source).await.unwrap(), CacheLookup::Miss);

        let cached = cache.write(&source, b"body{}", Watch::Source).await.unwrap();
        assert_eq!(cached, cache.resolve(&source));

        let entry = cache.load(&source).await.unwrap().hit().unwrap();
        assert_eq!(entry.content, b"body{}");
        assert_eq!(entry.meta, None);

        assert_eq!(cache.invalidate(&source).await.unwrap(), Some(cached));
        assert_eq!(cache.load(&source).await.unwrap(), CacheLookup::Miss);
        assert_eq!(cache.invalidate(&source).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_reports_real_io_faults() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);
        cache.setup().await.unwrap();

        // A directory where the artifact should be is a fault, not a miss.
        let source = dir.path().join("app/broken.scss");
        std::fs::create_dir_all(cache.resolve(&source)).unwrap();
        assert!(cache.load(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_response_replays_metadata() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);
        cache.setup().await.unwrap();

        let source = dir.path().join("app/page.md");
        let response = Response::new(202, "<p>hi</p>").with_header("content-type", "text/html");
        cache.write_response(&source, &response, Watch::Off).await.unwrap();

        let replay = cache.response(&source).await.unwrap().unwrap();
        assert_eq!(replay.status, 202);
        assert_eq!(replay.content_type(), Some("text/html"));
        assert_eq!(replay.body, response.body);

        let plain = dir.path().join("app/plain.css");
        cache.write(&plain, b"a{}", Watch::Off).await.unwrap();
        let replay = cache.response(&plain).await.unwrap().unwrap();
        assert_eq!(replay.content_type(), Some("text/css"));

        cache.reset().await.unwrap();
        assert!(cache.response(&source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_response_entry_is_a_single_file() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);
        cache.setup().await.unwrap();

        let source = dir.path().join("app/styles.scss");
        let compiled = Response::ok("body{}").with_header("content-type", "text/css");
        let stored = cache.write_response(&source, &compiled, Watch::Off).await.unwrap();

        let parent = cache.resolve(&source).parent().unwrap().to_path_buf();
        let files: Vec<_> = std::fs::read_dir(&parent).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(files, vec![stored.clone()]);

        let replay = cache.response(&source).await.unwrap().unwrap();
        assert_eq!(replay.content_type(), Some("text/css"));
        assert_eq!(replay.body, b"body{}");

        // Gone means gone: no fallback to a raw body with a guessed type.
        std::fs::remove_file(&stored).unwrap();
        assert!(cache.response(&source).await.unwrap().is_none());

        // A plain write replaces a response entry, and the other way round.
        cache.write_response(&source, &compiled, Watch::Off).await.unwrap();
        cache.write(&source, b"raw", Watch::Off).await.unwrap();
        let entry = cache.load(&source).await.unwrap().hit().unwrap();
        assert_eq!(entry.meta, None);
        assert_eq!(entry.content, b"raw");

        cache.write_response(&source, &compiled, Watch::Off).await.unwrap();
        assert!(!cache.resolve(&source).exists());
        assert_eq!(cache.invalidate(&source).await.unwrap(), Some(stored));
        assert_eq!(cache.load(&source).await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let dir = tempdir().unwrap();
        let events = Arc::new(EventEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::CacheSetup, EventKind::CacheWrite, EventKind::CacheInvalidate] {
            let seen = seen.clone();
            events.on(kind, move |event| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(event.kind());
                    Flow::Continue
                }
            });
        }

        let options = CacheOptions {
            root: Some(dir.path().join(".cache")),
            preserve: None,
        };
        let cache = ContentCache::new(&options, dir.path(), false, events);
        cache.setup().await.unwrap();
        let source = dir.path().join("a.txt");
        cache.write(&source, b"a", Watch::Off).await.unwrap();
        cache.invalidate(&source).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::CacheSetup, EventKind::CacheWrite, EventKind::CacheInvalidate]
        );
    }

    #[tokio::test]
    async fn test_dev_write_arms_watch() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        let source = dir.path().join("app/styles.scss");
        std::fs::write(&source, "a").unwrap();

        let cache = cache_in(dir.path(), true);
        cache.setup().await.unwrap();
        cache.write(&source, b"compiled", Watch::Source).await.unwrap();
        assert_eq!(cache.watched(), vec![absolute(&source)]);

        cache.invalidate(&source).await.unwrap();
        assert!(cache.watched().is_empty());
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_lock_key_serializes_same_file() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(cache_in(dir.path(), false));
        let source = dir.path().join("app/a.scss");

        let guard = cache.lock_key(&source).await.unwrap();
        let other = {
            let cache = cache.clone();
            let source = source.clone();
            tokio::spawn(async move {
                let _g = cache.lock_key(&source).await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!other.is_finished());

        let _unrelated = cache.lock_key(&dir.path().join("app/b.scss")).await.unwrap();
        drop(guard);
        other.await.unwrap();
    }
}
