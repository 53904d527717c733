// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Filesystem-based routing.
//!
//! Every file under the routes root becomes one route; its path relative to
//! the root becomes the URL:
//!
//! - `styles.scss` -> `/styles`
//! - `index.html` -> `/`, `blog/index.html` -> `/blog`
//! - `blog/[slug].ts` -> `/blog/{slug}`
//! - `docs/[...rest].ts` -> `/docs/{*rest}`
//!
//! Dot-prefixed files and directories are skipped. [`Router::match_url`] is a
//! pure lookup against the table built by the last [`Router::discover`] or
//! [`Router::reload`]; it never touches disk.

use glob::glob;
use matchit::Router as MatchitRouter;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// A URL matcher bound to a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// The URL pattern in matchit format (e.g., "/blog/{slug}").
    pub matcher: String,

    /// Absolute path of the source file.
    pub file_path: PathBuf,
}

impl Route {
    /// Lower-cased extension of the source file, with its leading dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.file_path)
    }

    /// Returns true if the matcher has dynamic segments.
    pub fn is_dynamic(&self) -> bool {
        self.matcher.contains('{')
    }
}

/// Result of matching a URL to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route.
    pub route: Route,

    /// URL parameters extracted from the path.
    pub params: Vec<(String, String)>,
}

impl RouteMatch {
    /// Get a parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Segment type in a route path.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentType {
    /// Static segment (e.g., "blog").
    Static(String),

    /// Dynamic parameter (e.g., "[slug]" -> "{slug}").
    Dynamic(String),

    /// Catch-all/rest parameter (e.g., "[...rest]" -> "{*rest}").
    CatchAll(String),
}

impl SegmentType {
    /// Parse a filesystem segment into a SegmentType.
    pub fn parse(segment: &str) -> Self {
        if segment.starts_with("[...") && segment.ends_with(']') {
            SegmentType::CatchAll(segment[4..segment.len() - 1].to_string())
        } else if segment.starts_with('[') && segment.ends_with(']') && segment.len() > 2 {
            SegmentType::Dynamic(segment[1..segment.len() - 1].to_string())
        } else {
            SegmentType::Static(segment.to_string())
        }
    }

    /// Convert to matchit pattern segment.
    pub fn to_pattern(&self) -> String {
        match self {
            SegmentType::Static(s) => s.clone(),
            SegmentType::Dynamic(name) => format!("{{{}}}", name),
            SegmentType::CatchAll(name) => format!("{{*{}}}", name),
        }
    }
}

/// Error types for routing operations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Route discovery failed during filesystem scanning.
    #[error("Route discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Lower-cased extension of `path`, with its leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Normalizes an extension to the `.lowercase` form.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// The file-based router.
pub struct Router {
    /// matchit router for fast URL matching.
    matcher: MatchitRouter<usize>,

    /// All discovered routes (indexed by matcher).
    routes: Vec<Route>,

    /// Routes directory (absolute).
    root: PathBuf,

    /// Extensions that produce routes; empty means every file.
    extensions: BTreeSet<String>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("root", &self.root)
            .field("routes", &self.routes)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl Router {
    /// Discovers routes under `root` and builds the matcher table.
    ///
    /// Only files whose extension is in `extensions` become routes; pass an
    /// empty iterator to route every file.
    pub fn discover<I, S>(root: &Path, extensions: I) -> RoutingResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = std::fs::canonicalize(root)?;
        let extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();

        let mut router = Self {
            matcher: MatchitRouter::new(),
            routes: Vec::new(),
            root,
            extensions,
        };
        router.reload()?;
        Ok(router)
    }

    /// Rescans the root directory and rebuilds the matcher table.
    pub fn reload(&mut self) -> RoutingResult<()> {
        let mut routes = Vec::new();

        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/**/*", root);
        for path in glob(&pattern)
            .map_err(|e| RoutingError::DiscoveryFailed(e.to_string()))?
            .flatten()
        {
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if Self::is_hidden(relative) {
                continue;
            }
            if !self.extensions.is_empty() {
                match extension_of(&path) {
                    Some(ext) if self.extensions.contains(&ext) => {}
                    _ => continue,
                }
            }

            let matcher = Self::path_to_pattern(relative);
            routes.push(Route {
                matcher,
                file_path: path,
            });
        }

        // Static patterns first so matchit conflicts resolve predictably.
        routes.sort_by(|a, b| match (a.is_dynamic(), b.is_dynamic()) {
            (false, true) => std::cmp::Ordering::Less,
            (true, false) => std::cmp::Ordering::Greater,
            _ => a
                .matcher
                .cmp(&b.matcher)
                .then_with(|| a.file_path.cmp(&b.file_path)),
        });

        let mut matcher = MatchitRouter::new();
        let mut kept = Vec::with_capacity(routes.len());
        for route in routes {
            if let Err(e) = matcher.insert(route.matcher.clone(), kept.len()) {
                tracing::warn!(
                    matcher = %route.matcher,
                    file = %route.file_path.display(),
                    "could not register route: {}",
                    e
                );
                continue;
            }
            kept.push(route);
        }

        tracing::debug!(root = %self.root.display(), routes = kept.len(), "routes discovered");

        self.matcher = matcher;
        self.routes = kept;
        Ok(())
    }

    /// Match a URL path to a route.
    pub fn match_url(&self, path: &str) -> Option<RouteMatch> {
        let normalized_path = if path.is_empty() || path == "/" {
            "/"
        } else {
            path.trim_end_matches('/')
        };

        match self.matcher.at(normalized_path) {
            Ok(matched) => {
                let route = self.routes[*matched.value].clone();
                let params = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                Some(RouteMatch { route, params })
            }
            Err(_) => None,
        }
    }

    /// All routes, static ones first.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// The routes directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extensions this router accepts; empty means all.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// The route whose source file is `file`, if any.
    pub fn route_for_file(&self, file: &Path) -> Option<&Route> {
        self.routes.iter().find(|r| r.file_path == file)
    }

    fn is_hidden(relative: &Path) -> bool {
        relative.components().any(|c| match c {
            Component::Normal(s) => s.to_str().map(|s| s.starts_with('.')).unwrap_or(true),
            _ => false,
        })
    }

    /// Convert a relative file path to a matchit URL pattern.
    fn path_to_pattern(relative: &Path) -> String {
        let mut segments: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .filter_map(|c| c.as_os_str().to_str())
            .map(|s| SegmentType::parse(s).to_pattern())
            .collect();

        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem != "index" {
            segments.push(SegmentType::parse(stem).to_pattern());
        }

        if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", segments.join("/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_test_routes(dir: &Path) {
        fs::write(dir.join("index.html"), "<h1>Home</h1>").unwrap();
        fs::write(dir.join("styles.scss"), "body { margin: 0 }").unwrap();
        fs::write(dir.join(".hidden.html"), "secret").unwrap();

        fs::create_dir_all(dir.join("blog")).unwrap();
        fs::write(dir.join("blog/index.html"), "<h1>Blog</h1>").unwrap();
        fs::write(dir.join("blog/[slug].ts"), "export default {}").unwrap();

        fs::create_dir_all(dir.join("docs")).unwrap();
        fs::write(dir.join("docs/[...rest].ts"), "export default {}").unwrap();

        fs::create_dir_all(dir.join(".cache")).unwrap();
        fs::write(dir.join(".cache/skip.html"), "skip").unwrap();
    }

    #[test]
    fn test_route_discovery() {
        let dir = tempdir().unwrap();
        setup_test_routes(dir.path());

        let router = Router::discover(dir.path(), Vec::<String>::new()).unwrap();
        let patterns: Vec<&str> = router.routes().iter().map(|r| r.matcher.as_str()).collect();

        assert_eq!(patterns.len(), 5, "{:?}", patterns);
        assert!(patterns.contains(&"/"));
        assert!(patterns.contains(&"/styles"));
        assert!(patterns.contains(&"/blog"));
        assert!(patterns.contains(&"/blog/{slug}"));
        assert!(patterns.contains(&"/docs/{*rest}"));
    }

    #[test]
    fn test_extension_filter() {
        let dir = tempdir().unwrap();
        setup_test_routes(dir.path());

        let router = Router::discover(dir.path(), [".SCSS"]).unwrap();
        assert_eq!(router.routes().len(), 1);
        assert_eq!(router.routes()[0].matcher, "/styles");
        assert_eq!(router.routes()[0].extension().as_deref(), Some(".scss"));
    }

    #[test]
    fn test_url_matching() {
        let dir = tempdir().unwrap();
        setup_test_routes(dir.path());

        let router = Router::discover(dir.path(), Vec::<String>::new()).unwrap();

        let root = router.match_url("/").expect("should match root");
        assert!(root.route.file_path.ends_with("index.html"));

        let blog = router.match_url("/blog/").expect("trailing slash");
        assert!(blog.route.file_path.ends_with("blog/index.html"));

        let post = router.match_url("/blog/hello-world").expect("dynamic");
        assert_eq!(post.route.matcher, "/blog/{slug}");
        assert_eq!(post.param("slug"), Some("hello-world"));

        let docs = router.match_url("/docs/a/b/c").expect("catch-all");
        assert_eq!(docs.param("rest"), Some("a/b/c"));

        assert!(router.match_url("/missing").is_none());
        assert!(router.match_url("/.hidden").is_none());
    }

    #[test]
    fn test_reload_picks_up_new_files() {
        let dir = tempdir().unwrap();
        setup_test_routes(dir.path());

        let mut router = Router::discover(dir.path(), Vec::<String>::new()).unwrap();
        assert!(router.match_url("/about").is_none());

        fs::write(dir.path().join("about.html"), "<h1>About</h1>").unwrap();
        assert!(router.match_url("/about").is_none(), "match must not touch disk");

        router.reload().unwrap();
        assert!(router.match_url("/about").is_some());

        fs::remove_file(dir.path().join("about.html")).unwrap();
        router.reload().unwrap();
        assert!(router.match_url("/about").is_none());
    }

    #[test]
    fn test_root_with_glob_metacharacters() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("site [draft]*?");
        fs::create_dir_all(&root).unwrap();
        setup_test_routes(&root);

        let router = Router::discover(&root, Vec::<String>::new()).unwrap();
        assert!(router.match_url("/").is_some());
        assert!(router.match_url("/blog").is_some());
        assert!(router.match_url("/styles").is_some());
    }

    #[test]
    fn test_conflicting_files_keep_first() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("styles.css"), "a{}").unwrap();
        fs::write(dir.path().join("styles.scss"), "a{}").unwrap();

        let router = Router::discover(dir.path(), Vec::<String>::new()).unwrap();
        assert_eq!(router.routes().len(), 1);
        assert!(router.match_url("/styles").unwrap().route.file_path.ends_with("styles.css"));
    }

    #[test]
    fn test_path_to_pattern() {
        assert_eq!(Router::path_to_pattern(Path::new("index.html")), "/");
        assert_eq!(Router::path_to_pattern(Path::new("about.html")), "/about");
        assert_eq!(Router::path_to_pattern(Path::new("blog/[slug].ts")), "/blog/{slug}");
        assert_eq!(Router::path_to_pattern(Path::new("[id]/index.ts")), "/{id}");
        assert_eq!(Router::path_to_pattern(Path::new("docs/[...rest].ts")), "/docs/{*rest}");
    }

    #[test]
    fn test_segment_parse() {
        assert_eq!(SegmentType::parse("blog"), SegmentType::Static("blog".to_string()));
        assert_eq!(SegmentType::parse("[slug]"), SegmentType::Dynamic("slug".to_string()));
        assert_eq!(SegmentType::parse("[...rest]"), SegmentType::CatchAll("rest".to_string()));
        assert_eq!(SegmentType::parse("[]"), SegmentType::Static("[]".to_string()));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("SCSS"), ".scss");
        assert_eq!(normalize_extension(".Ts"), ".ts");
    }
}
