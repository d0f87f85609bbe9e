//! URI-addressed, read-only resources.
//!
//! Resources bypass tool parameter validation: the URI is matched against an
//! ordered list of patterns and the first provider that matches fetches the
//! data. Exact URIs are always tried before templates, and templates before
//! prefixes, so `table://` never falls through to `table://{schema}/{table}`.

use crate::error::ToolError;
use crate::protocol::{ResourceDefinition, ResourceTemplate};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const JSON_MIME: &str = "application/json";

/// A URI pattern a provider is registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriPattern {
    /// Matches one URI exactly (query string ignored).
    Exact(String),
    /// `scheme://{a}/{b}`. A trailing `{name*}` also captures `/`.
    Template(String),
    /// Any URI starting with the prefix.
    Prefix(String),
}

impl UriPattern {
    fn rank(&self) -> u8 {
        match self {
            UriPattern::Exact(_) => 0,
            UriPattern::Template(_) => 1,
            UriPattern::Prefix(_) => 2,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UriPattern::Exact(s) | UriPattern::Template(s) | UriPattern::Prefix(s) => s,
        }
    }

    /// Try to match `uri`, capturing template variables.
    pub fn matches(&self, uri: &str) -> Option<UriMatch> {
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p, parse_query(q)),
            None => (uri, Vec::new()),
        };
        let vars = match self {
            UriPattern::Exact(s) => (path == s).then(HashMap::new)?,
            UriPattern::Prefix(p) => path.starts_with(p.as_str()).then(HashMap::new)?,
            UriPattern::Template(t) => match_template(t, path)?,
        };
        Some(UriMatch {
            uri: uri.to_string(),
            vars,
            query,
        })
    }
}

/// Percent-decoded `key=value` pairs. Pairs that do not decode are dropped.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = urlencoding::decode(k).ok()?;
            let v = urlencoding::decode(v).ok()?;
            Some((k.into_owned(), v.into_owned()))
        })
        .collect()
}

enum Piece<'a> {
    Literal(&'a str),
    Var { name: &'a str, greedy: bool },
}

fn parse_template(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }
        let Some(close) = rest[open..].find('}') else {
            pieces.push(Piece::Literal(&rest[open..]));
            return pieces;
        };
        let raw = &rest[open + 1..open + close];
        let (name, greedy) = match raw.strip_suffix('*') {
            Some(name) => (name, true),
            None => (raw, false),
        };
        pieces.push(Piece::Var { name, greedy });
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    pieces
}

fn match_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let pieces = parse_template(template);
    let mut vars = HashMap::new();
    let mut rest = uri;

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(lit) => rest = rest.strip_prefix(lit)?,
            Piece::Var { name, greedy } => {
                let value = match pieces.get(i + 1) {
                    Some(Piece::Literal(next)) => {
                        let end = rest.find(next)?;
                        &rest[..end]
                    }
                    // Two adjacent variables are ambiguous; not supported.
                    Some(Piece::Var { .. }) => return None,
                    None => rest,
                };
                if value.is_empty() || (!greedy && value.contains('/')) {
                    return None;
                }
                let decoded = urlencoding::decode(value).ok()?;
                vars.insert(name.to_string(), decoded.into_owned());
                rest = &rest[value.len()..];
            }
        }
    }

    rest.is_empty().then_some(vars)
}

/// Result of a successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriMatch {
    pub uri: String,
    vars: HashMap<String, String>,
    query: Vec<(String, String)>,
}

impl UriMatch {
    /// Captured template variable, percent-decoded.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Value of a `?key=value` query parameter, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// Captured variable, or a `ValidationError` naming it.
    pub fn require(&self, name: &str) -> Result<&str, ToolError> {
        self.var(name).ok_or_else(|| {
            crate::error::ValidationError::field(name, "is missing from the resource URI").into()
        })
    }
}

/// Fetches data for a matched resource URI.
#[async_trait]
pub trait ResourceProvider<C>: Send + Sync {
    async fn read(&self, ctx: &C, uri: &UriMatch) -> Result<Value, ToolError>;
}

/// How a resource is advertised.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub pattern: UriPattern,
    pub name: &'static str,
    pub description: &'static str,
    /// Matched but not advertised (aliases).
    pub hidden: bool,
}

impl ResourceSpec {
    pub fn exact(uri: &str, name: &'static str, description: &'static str) -> Self {
        Self {
            pattern: UriPattern::Exact(uri.to_string()),
            name,
            description,
            hidden: false,
        }
    }

    pub fn template(template: &str, name: &'static str, description: &'static str) -> Self {
        Self {
            pattern: UriPattern::Template(template.to_string()),
            name,
            description,
            hidden: false,
        }
    }

    pub fn prefix(prefix: &str, name: &'static str, description: &'static str) -> Self {
        Self {
            pattern: UriPattern::Prefix(prefix.to_string()),
            name,
            description,
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

struct ResourceEntry<C> {
    spec: ResourceSpec,
    provider: Arc<dyn ResourceProvider<C>>,
}

/// Ordered (pattern, provider) pairs.
pub struct ResourceRouter<C> {
    entries: Vec<ResourceEntry<C>>,
}

impl<C> Default for ResourceRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ResourceRouter<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, spec: ResourceSpec, provider: Arc<dyn ResourceProvider<C>>) {
        self.entries.push(ResourceEntry { spec, provider });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the provider for `uri`: exact, then template, then prefix.
    fn resolve(&self, uri: &str) -> Option<(&ResourceEntry<C>, UriMatch)> {
        (0..=2).find_map(|rank| {
            self.entries
                .iter()
                .filter(|e| e.spec.pattern.rank() == rank)
                .find_map(|e| e.spec.pattern.matches(uri).map(|m| (e, m)))
        })
    }

    /// Name of the pattern `uri` resolves to, if any.
    pub fn route(&self, uri: &str) -> Option<&str> {
        self.resolve(uri).map(|(e, _)| e.spec.pattern.as_str())
    }

    pub async fn read(&self, ctx: &C, uri: &str) -> Result<Value, ToolError> {
        let Some((entry, matched)) = self.resolve(uri) else {
            tracing::debug!(%uri, "no resource matches");
            return Err(ToolError::UnknownResource {
                uri: uri.to_string(),
            });
        };
        tracing::debug!(%uri, pattern = entry.spec.pattern.as_str(), "reading resource");
        entry.provider.read(ctx, &matched).await
    }

    /// Concrete resources for `resources/list`.
    pub fn definitions(&self) -> Vec<ResourceDefinition> {
        self.entries
            .iter()
            .filter(|e| !e.spec.hidden)
            .filter_map(|e| match &e.spec.pattern {
                UriPattern::Exact(uri) => Some(ResourceDefinition {
                    uri: uri.clone(),
                    name: e.spec.name.to_string(),
                    description: Some(e.spec.description.to_string()),
                    mime_type: JSON_MIME.to_string(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Parameterised resources for `resources/templates/list`.
    pub fn templates(&self) -> Vec<ResourceTemplate> {
        self.entries
            .iter()
            .filter(|e| !e.spec.hidden)
            .filter_map(|e| match &e.spec.pattern {
                UriPattern::Template(t) => Some(ResourceTemplate {
                    uri_template: t.clone(),
                    name: e.spec.name.to_string(),
                    description: Some(e.spec.description.to_string()),
                    mime_type: JSON_MIME.to_string(),
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl ResourceProvider<()> for Named {
        async fn read(&self, _ctx: &(), uri: &UriMatch) -> Result<Value, ToolError> {
            Ok(json!({
                "provider": self.0,
                "schema": uri.var("schema"),
                "table": uri.var("table"),
            }))
        }
    }

    fn router() -> ResourceRouter<()> {
        let mut r = ResourceRouter::new();
        // Registered template-first on purpose: exact must still win.
        r.register(
            ResourceSpec::template("table://{schema}/{table}", "Table", "one table"),
            Arc::new(Named("table")),
        );
        r.register(
            ResourceSpec::exact("table://", "Tables", "all tables"),
            Arc::new(Named("list")),
        );
        r.register(
            ResourceSpec::exact("table://*", "Tables", "all tables").hidden(),
            Arc::new(Named("list")),
        );
        r
    }

    #[test]
    fn test_template_captures() {
        let m = UriPattern::Template("table://{schema}/{table}".into())
            .matches("table://public/users")
            .unwrap();
        assert_eq!(m.var("schema"), Some("public"));
        assert_eq!(m.var("table"), Some("users"));
    }

    #[test]
    fn test_template_rejects_extra_segments() {
        let t = UriPattern::Template("table://{schema}/{table}".into());
        assert!(t.matches("table://public/users/extra").is_none());
        assert!(t.matches("table://public/").is_none());
        assert!(t.matches("table://").is_none());
    }

    #[test]
    fn test_greedy_tail_and_query() {
        let m = UriPattern::Template("file://{owner}/{repo}/{path*}".into())
            .matches("file://octo/hello/src/lib/mod.rs?ref=dev")
            .unwrap();
        assert_eq!(m.var("owner"), Some("octo"));
        assert_eq!(m.var("path"), Some("src/lib/mod.rs"));
        assert_eq!(m.query_param("ref"), Some("dev"));
    }

    #[test]
    fn test_captures_and_query_are_decoded() {
        let m = UriPattern::Template("file://{owner}/{repo}/{path*}".into())
            .matches("file://octo/hello/docs/my%20file.rs?ref=feature%2Fx")
            .unwrap();
        assert_eq!(m.var("path"), Some("docs/my file.rs"));
        assert_eq!(m.query_param("ref"), Some("feature/x"));

        // An escaped slash is still one segment for a non-greedy variable.
        let m = UriPattern::Template("table://{schema}/{table}".into())
            .matches("table://public/odd%2Fname")
            .unwrap();
        assert_eq!(m.var("table"), Some("odd/name"));

        let bad = UriPattern::Template("table://{schema}/{table}".into());
        assert!(bad.matches("table://public/%FF").is_none());
    }

    #[test]
    fn test_exact_before_template() {
        let r = router();
        assert_eq!(r.route("table://"), Some("table://"));
        assert_eq!(r.route("table://*"), Some("table://*"));
        assert_eq!(r.route("table://public/users"), Some("table://{schema}/{table}"));
        assert_eq!(r.route("repo://a/b"), None);
    }

    #[tokio::test]
    async fn test_read_unknown_resource() {
        let err = router().read(&(), "nope://x").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnknownResource);
    }

    #[tokio::test]
    async fn test_read_dispatches_to_provider() {
        let out = router().read(&(), "table://public/users").await.unwrap();
        assert_eq!(out["provider"], json!("table"));
        assert_eq!(out["table"], json!("users"));
    }

    #[test]
    fn test_listing_skips_hidden() {
        let r = router();
        let defs = r.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].uri, "table://");
        assert_eq!(r.templates().len(), 1);
    }
}
