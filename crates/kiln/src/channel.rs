// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Ordered, short-circuiting middleware channels.
//!
//! A [`MiddlewareChannel`] holds named handlers that share one payload type.
//! [`MiddlewareChannel::call`] runs them in registration order; the first
//! handler to return [`Outcome::Respond`] wins and the rest are skipped.
//! Handler errors are not caught here: they propagate to the caller, which
//! routes them into the `error` channel.
//!
//! [`Middlewares`] is the set of channels a [`crate::Pipeline`] runs at
//! request time.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures_util::future::BoxFuture;

use crate::error::{ChannelError, KilnError, Result};
use crate::request::Request;
use crate::response::Response;

/// Default maximum number of handlers per channel.
pub const DEFAULT_CHANNEL_LIMIT: usize = 100;

/// Result of one middleware handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// Let the next handler run.
    Continue,
    /// Stop the chain; this becomes the channel's result.
    Respond(R),
}

impl<R> Outcome<R> {
    /// Converts into an `Option`, `Respond` being `Some`.
    pub fn into_option(self) -> Option<R> {
        match self {
            Outcome::Continue => None,
            Outcome::Respond(r) => Some(r),
        }
    }
}

impl<R> From<Option<R>> for Outcome<R> {
    fn from(value: Option<R>) -> Self {
        value.map_or(Outcome::Continue, Outcome::Respond)
    }
}

type Handler<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<Outcome<R>>> + Send + Sync>;

struct Inner<P, R> {
    limit: usize,
    handlers: Vec<(String, Handler<P, R>)>,
}

/// A named, bounded, ordered handler chain for one hook.
pub struct MiddlewareChannel<P, R = Response> {
    inner: RwLock<Inner<P, R>>,
}

impl<P, R> std::fmt::Debug for MiddlewareChannel<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChannel")
            .field("keys", &self.keys())
            .field("limit", &self.limit())
            .finish()
    }
}

impl<P, R> Default for MiddlewareChannel<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, R> MiddlewareChannel<P, R> {
    /// Creates an empty channel with the default limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_CHANNEL_LIMIT)
    }

    /// Creates an empty channel holding at most `limit` handlers.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                limit,
                handlers: Vec::new(),
            }),
        }
    }

    /// Maximum number of handlers.
    pub fn limit(&self) -> usize {
        self.inner.read().map(|i| i.limit).unwrap_or(0)
    }

    /// Changes the maximum number of handlers. Existing handlers are kept.
    pub fn set_limit(&self, limit: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.limit = limit;
        }
    }

    /// Number of registered handlers.
    pub fn size(&self) -> usize {
        self.inner.read().map(|i| i.handlers.len()).unwrap_or(0)
    }

    /// `limit - size`, never negative.
    pub fn space(&self) -> usize {
        self.inner
            .read()
            .map(|i| i.limit.saturating_sub(i.handlers.len()))
            .unwrap_or(0)
    }

    /// Whether a handler named `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .map(|i| i.handlers.iter().any(|(n, _)| n == name))
            .unwrap_or(false)
    }

    /// Handler names in running order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|i| i.handlers.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes the handler named `name`, if any.
    pub fn remove(&self, name: &str) -> &Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.handlers.retain(|(n, _)| n != name);
        }
        self
    }

    /// Removes every handler.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.handlers.clear();
        }
    }

    /// Copies handlers from `child` whose names are not taken, while space remains.
    pub fn append(&self, child: &MiddlewareChannel<P, R>) {
        let borrowed: Vec<(String, Handler<P, R>)> = match child.inner.read() {
            Ok(c) => c.handlers.clone(),
            Err(_) => return,
        };

        if let Ok(mut inner) = self.inner.write() {
            for (name, handler) in borrowed {
                if inner.handlers.len() >= inner.limit {
                    break;
                }
                if inner.handlers.iter().any(|(n, _)| *n == name) {
                    continue;
                }
                inner.handlers.push((name, handler));
            }
        }
    }
}

impl<P, R> MiddlewareChannel<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Registers `handler` under `name`.
    ///
    /// Fails with [`ChannelError::AlreadyExists`] for a duplicate name and
    /// [`ChannelError::LimitExceeded`] when the channel is full.
    pub fn add<F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<&Self>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome<R>>> + Send + 'static,
    {
        let name = name.into();
        let mut inner = self
            .inner
            .write()
            .map_err(|_| KilnError::Poisoned("middleware channel"))?;

        if inner.handlers.iter().any(|(n, _)| *n == name) {
            return Err(ChannelError::AlreadyExists(name).into());
        }
        if inner.handlers.len() >= inner.limit {
            return Err(ChannelError::LimitExceeded.into());
        }

        let handler: Handler<P, R> =
            Arc::new(move |payload| -> BoxFuture<'static, Result<Outcome<R>>> { Box::pin(handler(payload)) });
        inner.handlers.push((name, handler));
        drop(inner);

        Ok(self)
    }

    /// Runs handlers in order until one responds.
    ///
    /// Returns `Ok(None)` when every handler continued (or none exist). The
    /// first handler error aborts the chain and is returned as is.
    pub async fn call(&self, payload: P) -> Result<Option<R>> {
        let snapshot: Vec<(String, Handler<P, R>)> = self
            .inner
            .read()
            .map_err(|_| KilnError::Poisoned("middleware channel"))?
            .handlers
            .clone();

        for (name, handler) in snapshot {
            let started = Instant::now();
            let outcome = handler(payload.clone()).await?;
            tracing::trace!(middleware = %name, elapsed = ?started.elapsed(), "middleware ran");

            if let Outcome::Respond(result) = outcome {
                return Ok(Some(result));
            }
        }

        Ok(None)
    }
}

/// Payload of the `request` and `notFound` hooks.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    /// The incoming request.
    pub request: Request,
}

/// Payload of the `response` and `end` hooks.
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    /// The incoming request.
    pub request: Request,
    /// The response produced so far.
    pub response: Response,
}

/// Payload of the `error` hook.
#[derive(Debug, Clone)]
pub struct ErrorPayload {
    /// The incoming request.
    pub request: Request,
    /// What went wrong.
    pub error: Arc<KilnError>,
}

/// Names of the request-time channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// Before routing.
    Request,
    /// No route matched.
    NotFound,
    /// After dispatch, before sending.
    Response,
    /// Dispatch or a handler failed.
    Error,
    /// Final observation point; may still replace the response.
    End,
}

/// The channels a pipeline runs for every request.
#[derive(Debug, Default)]
pub struct Middlewares {
    /// Runs before routing; a response here skips the whole pipeline.
    pub request: MiddlewareChannel<RequestPayload>,
    /// Runs when no route matches; default is an empty 404.
    pub not_found: MiddlewareChannel<RequestPayload>,
    /// Runs after dispatch; a response here replaces the dispatched one.
    pub response: MiddlewareChannel<ResponsePayload>,
    /// Runs when dispatch fails; a response here recovers the request.
    pub error: MiddlewareChannel<ErrorPayload>,
    /// Runs last; a response here overrides the outgoing response.
    pub end: MiddlewareChannel<ResponsePayload>,
}

impl Middlewares {
    /// Creates an empty set of channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler names registered on `channel`.
    pub fn keys(&self, channel: ChannelName) -> Vec<String> {
        match channel {
            ChannelName::Request => self.request.keys(),
            ChannelName::NotFound => self.not_found.keys(),
            ChannelName::Response => self.response.keys(),
            ChannelName::Error => self.error.keys(),
            ChannelName::End => self.end.keys(),
        }
    }

    /// Removes `name` from `channel`.
    pub fn remove(&self, channel: ChannelName, name: &str) {
        match channel {
            ChannelName::Request => {
                self.request.remove(name);
            }
            ChannelName::NotFound => {
                self.not_found.remove(name);
            }
            ChannelName::Response => {
                self.response.remove(name);
            }
            ChannelName::Error => {
                self.error.remove(name);
            }
            ChannelName::End => {
                self.end.remove(name);
            }
        }
    }
}
