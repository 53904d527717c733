// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-client request limiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::{ChannelName, Middlewares, Outcome, RequestPayload};
use crate::error::{KilnError, Result};
use crate::response::Response;

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    /// Requests a client may make before being refused.
    pub max_requests_per_second: u32,
    /// Quiet time after which a client's count is forgotten.
    pub cooldown: Duration,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            max_requests_per_second: 100,
            cooldown: Duration::from_millis(1000),
        }
    }
}

/// Refuses clients that send too many requests in a row with
/// `429 Too Many Requests`.
///
/// A client's counter is dropped once it stays quiet for `cooldown`.
/// Requests without a known client address are let through.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    options: RateLimitOptions,
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl RateLimit {
    /// Name the handler is registered under.
    pub const NAME: &'static str = "@builtin.rate-limit";

    /// Creates the middleware.
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            options,
            counts: Arc::default(),
        }
    }

    /// Registers the `request` hook.
    pub fn install(&self, middlewares: &Middlewares) -> Result<()> {
        let limiter = self.clone();
        middlewares.request.add(Self::NAME, move |payload: RequestPayload| {
            let limiter = limiter.clone();
            async move { limiter.check(payload.request.client.as_deref()) }
        })?;
        Ok(())
    }

    /// Removes the hook.
    pub fn uninstall(middlewares: &Middlewares) {
        middlewares.remove(ChannelName::Request, Self::NAME);
    }

    fn check(&self, client: Option<&str>) -> Result<Outcome<Response>> {
        let Some(client) = client else {
            tracing::warn!("{}: could not get client address", Self::NAME);
            return Ok(Outcome::Continue);
        };

        let current = {
            let mut counts = self.counts.lock().map_err(|_| KilnError::Poisoned("rate limit table"))?;
            let count = counts.entry(client.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let counts = self.counts.clone();
        let client = client.to_string();
        let cooldown = self.options.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Ok(mut counts) = counts.lock() {
                // A later request restarts the cooldown.
                if counts.get(&client).is_some_and(|c| *c <= current) {
                    counts.remove(&client);
                }
            }
        });

        if current >= self.options.max_requests_per_second {
            return Ok(Outcome::Respond(
                Response::empty(429).with_status_text("Too Many Requests"),
            ));
        }
        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn payload(client: Option<&str>) -> RequestPayload {
        let request = Request::get("/");
        RequestPayload {
            request: match client {
                Some(c) => request.with_client(c),
                None => request,
            },
        }
    }

    #[tokio::test]
    async fn test_refuses_after_limit() {
        let middlewares = Middlewares::new();
        RateLimit::new(RateLimitOptions {
            max_requests_per_second: 3,
            cooldown: Duration::from_secs(60),
        })
        .install(&middlewares)
        .unwrap();

        for _ in 0..2 {
            assert!(middlewares.request.call(payload(Some("10.0.0.1"))).await.unwrap().is_none());
        }
        let resp = middlewares.request.call(payload(Some("10.0.0.1"))).await.unwrap().unwrap();
        assert_eq!(resp.status, 429);

        // Other clients and unknown clients are unaffected.
        assert!(middlewares.request.call(payload(Some("10.0.0.2"))).await.unwrap().is_none());
        assert!(middlewares.request.call(payload(None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cooldown_forgets_client() {
        let limiter = RateLimit::new(RateLimitOptions {
            max_requests_per_second: 2,
            cooldown: Duration::from_millis(20),
        });

        assert_eq!(limiter.check(Some("a")).unwrap(), Outcome::Continue);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.check(Some("a")).unwrap(), Outcome::Continue);
    }

    #[test]
    fn test_uninstall() {
        let middlewares = Middlewares::new();
        RateLimit::default().install(&middlewares).unwrap();
        assert!(middlewares.request.has(RateLimit::NAME));
        RateLimit::uninstall(&middlewares);
        assert!(!middlewares.request.has(RateLimit::NAME));
    }
}
