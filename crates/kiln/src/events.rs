// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Fire-and-forget lifecycle notifications.
//!
//! The [`EventEmitter`] is a typed publish/subscribe hub keyed by
//! [`EventKind`]. Listeners run in registration order and are awaited one at
//! a time; a listener returning [`Flow::Break`] stops the remaining listeners
//! for that emission. `once` listeners are dropped after their first call.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;

/// What a watched file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// A new file appeared under the source root.
    Add,
    /// A watched file's content changed.
    Change,
    /// A file was removed.
    Unlink,
}

/// A lifecycle event and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The pipeline finished `setup()`.
    Init,
    /// The pipeline rebuilt its router table and cache.
    Reload,
    /// The pipeline is shutting down.
    Shutdown,
    /// The content cache created its root directory.
    CacheSetup {
        /// Cache root.
        root: PathBuf,
    },
    /// An artifact was written to the cache.
    CacheWrite {
        /// Absolute source path.
        original: PathBuf,
        /// Where the artifact was stored.
        cached: PathBuf,
    },
    /// A cache entry was removed.
    CacheInvalidate {
        /// Absolute source path.
        original: PathBuf,
        /// The removed artifact path.
        cached: PathBuf,
    },
    /// The dev watcher observed a filesystem change.
    WatchChange {
        /// Kind of change.
        kind: WatchKind,
        /// Absolute source path.
        original: PathBuf,
        /// Cached artifact for this source, if it was cached and watched.
        cached: Option<PathBuf>,
    },
}

/// Event names, used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// See [`Event::Init`].
    Init,
    /// See [`Event::Reload`].
    Reload,
    /// See [`Event::Shutdown`].
    Shutdown,
    /// See [`Event::CacheSetup`].
    CacheSetup,
    /// See [`Event::CacheWrite`].
    CacheWrite,
    /// See [`Event::CacheInvalidate`].
    CacheInvalidate,
    /// See [`Event::WatchChange`].
    WatchChange,
}

impl EventKind {
    /// Every event kind, in a stable order.
    pub const ALL: [EventKind; 7] = [
        EventKind::Init,
        EventKind::Reload,
        EventKind::Shutdown,
        EventKind::CacheSetup,
        EventKind::CacheWrite,
        EventKind::CacheInvalidate,
        EventKind::WatchChange,
    ];

    /// Dotted event name, as shown in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Init => "lifecycle.init",
            EventKind::Reload => "lifecycle.reload",
            EventKind::Shutdown => "lifecycle.shutdown",
            EventKind::CacheSetup => "cache.setup",
            EventKind::CacheWrite => "cache.write",
            EventKind::CacheInvalidate => "cache.invalidate",
            EventKind::WatchChange => "cache.watch.change",
        }
    }
}

impl Event {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Init => EventKind::Init,
            Event::Reload => EventKind::Reload,
            Event::Shutdown => EventKind::Shutdown,
            Event::CacheSetup { .. } => EventKind::CacheSetup,
            Event::CacheWrite { .. } => EventKind::CacheWrite,
            Event::CacheInvalidate { .. } => EventKind::CacheInvalidate,
            Event::WatchChange { .. } => EventKind::WatchChange,
        }
    }
}

/// Returned by listeners to continue or stop the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Let the next listener run.
    #[default]
    Continue,
    /// Skip the remaining listeners for this emission.
    Break,
}

/// Identifies a registered listener, for [`EventEmitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn = Arc<dyn Fn(Event) -> BoxFuture<'static, Flow> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    once: bool,
    listener: ListenerFn,
}

/// Typed publish/subscribe hub for lifecycle events.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<BTreeMap<EventKind, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(EventKind, usize)> = EventKind::ALL
            .iter()
            .map(|k| (*k, self.listener_count(*k)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}

impl EventEmitter {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to every future `kind` event.
    pub fn on<F, Fut>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Flow> + Send + 'static,
    {
        self.insert(kind, false, listener)
    }

    /// Subscribes `listener` to the next `kind` event only.
    pub fn once<F, Fut>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Flow> + Send + 'static,
    {
        self.insert(kind, true, listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let Ok(mut map) = self.listeners.write() else {
            return false;
        };
        let Some(entries) = map.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        before != entries.len()
    }

    /// Removes every listener for `kind`, or for all kinds when `None`.
    pub fn remove_all(&self, kind: Option<EventKind>) {
        if let Ok(mut map) = self.listeners.write() {
            match kind {
                Some(kind) => {
                    map.remove(&kind);
                }
                None => map.clear(),
            }
        }
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .map(|map| map.get(&kind).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Kinds that currently have at least one listener.
    pub fn event_names(&self) -> Vec<EventKind> {
        self.listeners
            .read()
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, _)| *k)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delivers `event` to its listeners, awaiting each in turn.
    ///
    /// Listeners registered while an emission is running only see later
    /// emissions.
    pub async fn emit(&self, event: Event) {
        let kind = event.kind();
        let snapshot: Vec<Entry> = match self.listeners.read() {
            Ok(map) => map.get(&kind).cloned().unwrap_or_default(),
            Err(_) => return,
        };

        tracing::trace!(event = kind.as_str(), listeners = snapshot.len(), "emit");

        for entry in snapshot {
            if entry.once {
                self.off(kind, entry.id);
            }

            let flow = (entry.listener)(event.clone()).await;
            if flow == Flow::Break {
                break;
            }
        }
    }

    fn insert<F, Fut>(&self, kind: EventKind, once: bool, listener: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Flow> + Send + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: ListenerFn =
            Arc::new(move |event| -> BoxFuture<'static, Flow> { Box::pin(listener(event)) });

        if let Ok(mut map) = self.listeners.write() {
            map.entry(kind).or_default().push(Entry { id, once, listener });
        }

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn test_listeners_run_in_order() {
        let emitter = EventEmitter::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = log.clone();
            emitter.on(EventKind::Init, move |_| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(n);
                    Flow::Continue
                }
            });
        }

        emitter.emit(Event::Init).await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_break_stops_siblings() {
        let emitter = EventEmitter::new();
        let hits = counter();

        emitter.on(EventKind::Reload, |_| async { Flow::Break });
        let h = hits.clone();
        emitter.on(EventKind::Reload, move |_| {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Flow::Continue
            }
        });

        emitter.emit(Event::Reload).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_once_listener_fires_once() {
        let emitter = EventEmitter::new();
        let hits = counter();
        let h = hits.clone();
        emitter.once(EventKind::Init, move |_| {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Flow::Continue
            }
        });

        emitter.emit(Event::Init).await;
        emitter.emit(Event::Init).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(EventKind::Init), 0);
    }

    #[tokio::test]
    async fn test_off_and_remove_all() {
        let emitter = EventEmitter::new();
        let id = emitter.on(EventKind::Shutdown, |_| async { Flow::Continue });
        emitter.on(EventKind::Init, |_| async { Flow::Continue });

        assert_eq!(emitter.event_names(), vec![EventKind::Init, EventKind::Shutdown]);
        assert!(emitter.off(EventKind::Shutdown, id));
        assert!(!emitter.off(EventKind::Shutdown, id));

        emitter.remove_all(None);
        assert!(emitter.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_payload_reaches_listener() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let s = seen.clone();
        emitter.on(EventKind::CacheWrite, move |event| {
            let s = s.clone();
            async move {
                *s.lock().unwrap() = Some(event);
                Flow::Continue
            }
        });

        let event = Event::CacheWrite {
            original: "/app/a.scss".into(),
            cached: "/cache/app/a.scss".into(),
        };
        emitter.emit(event.clone()).await;
        assert_eq!(seen.lock().unwrap().clone(), Some(event));
    }
}
