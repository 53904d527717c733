// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Streaming HTML rewriting on the `response` channel.
//!
//! Rules pair a CSS selector with an action on each matching element. Only
//! responses whose content type starts with `text/html` are rewritten; every
//! other response passes through untouched.
//!
//! ```rust
//! use kiln::middlewares::HtmlRewriter;
//!
//! let rewriter = HtmlRewriter::new()
//!     .set_attribute("a[href^='http']", "rel", "noopener")
//!     .unwrap()
//!     .append("body", "<script src=\"/live.js\"></script>")
//!     .unwrap();
//! assert_eq!(rewriter.selectors(), vec!["a[href^='http']", "body"]);
//! ```

use std::fmt;
use std::sync::Arc;

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, rewrite_str, HandlerResult, RewriteStrSettings, Selector};
use tracing::{trace, warn};

use crate::channel::{ChannelName, Middlewares, Outcome, ResponsePayload};
use crate::error::{KilnError, Result};
use crate::response::Response;

type ElementAction = dyn Fn(&mut Element<'_, '_>) -> HandlerResult + Send + Sync;

#[derive(Clone)]
struct Rule {
    selector: String,
    action: Arc<ElementAction>,
}

/// The HTML rewriter middleware.
#[derive(Clone, Default)]
pub struct HtmlRewriter {
    rules: Vec<Rule>,
}

impl fmt::Debug for HtmlRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlRewriter")
            .field("selectors", &self.selectors())
            .finish()
    }
}

impl HtmlRewriter {
    /// Name the handler is registered under.
    pub const NAME: &'static str = "@builtin.html-rewriter";

    /// Creates a rewriter with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` on every element matching `selector`.
    ///
    /// Fails when the selector is not supported by the streaming parser.
    pub fn on<F>(mut self, selector: impl Into<String>, action: F) -> Result<Self>
    where
        F: Fn(&mut Element<'_, '_>) -> HandlerResult + Send + Sync + 'static,
    {
        let selector = selector.into();
        selector
            .parse::<Selector>()
            .map_err(|e| KilnError::Rewrite(format!("invalid selector '{}': {}", selector, e)))?;
        self.rules.push(Rule {
            selector,
            action: Arc::new(action),
        });
        Ok(self)
    }

    /// Sets an attribute on every element matching `selector`.
    pub fn set_attribute(
        self,
        selector: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let (name, value) = (name.into(), value.into());
        self.on(selector, move |el| {
            el.set_attribute(&name, &value)?;
            Ok(())
        })
    }

    /// Appends raw HTML inside every element matching `selector`.
    pub fn append(self, selector: impl Into<String>, html: impl Into<String>) -> Result<Self> {
        let html = html.into();
        self.on(selector, move |el| {
            el.append(&html, ContentType::Html);
            Ok(())
        })
    }

    /// Selectors of the registered rules, in order.
    pub fn selectors(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.selector.as_str()).collect()
    }

    /// Registers the response hook.
    pub fn install(&self, middlewares: &Middlewares) -> Result<()> {
        let rules = Arc::new(self.rules.clone());
        middlewares.response.add(Self::NAME, move |payload: ResponsePayload| {
            let rules = rules.clone();
            async move { rewrite(&rules, payload.response) }
        })?;
        Ok(())
    }

    /// Removes the hook.
    pub fn uninstall(middlewares: &Middlewares) {
        middlewares.remove(ChannelName::Response, Self::NAME);
    }
}

fn is_html(response: &Response) -> bool {
    response
        .content_type()
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
}

fn rewrite(rules: &[Rule], mut response: Response) -> Result<Outcome<Response>> {
    if rules.is_empty() || !is_html(&response) {
        return Ok(Outcome::Continue);
    }
    let Ok(html) = std::str::from_utf8(&response.body) else {
        warn!(status = response.status, "HTML response is not UTF-8, leaving it as is");
        return Ok(Outcome::Continue);
    };

    let handlers = rules
        .iter()
        .map(|rule| {
            let action = rule.action.clone();
            element!(rule.selector.as_str(), move |el| action(el))
        })
        .collect();
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| KilnError::Rewrite(e.to_string()))?;

    trace!(rules = rules.len(), before = html.len(), after = rewritten.len(), "rewrote HTML response");
    response.body = rewritten.into_bytes();
    response.headers.remove("content-length");
    Ok(Outcome::Respond(response))
}
