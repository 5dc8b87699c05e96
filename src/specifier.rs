//! Package specifier parsing
//!
//! Turns a request path of the form `[@scope/]name[@tag][/subpath]` plus
//! its raw query string into a [`PackageSpecifier`].

use crate::error::{PackdError, PackdResult};
use std::collections::BTreeMap;
use std::fmt;

/// Tag used when the request names no version
pub const DEFAULT_TAG: &str = "latest";

/// A single query parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryValue {
    /// Key present without a value (`?dev`)
    Flag,
    /// Key with an explicit value (`?target=es2020`)
    Value(String),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("true"),
            Self::Value(v) => f.write_str(v),
        }
    }
}

/// Bundle options carried in the query string, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    /// Parse a raw query string (without the leading `?`).
    ///
    /// Pairs are split on `&`, then on `=`; only the first two pieces count,
    /// so `b=x=y` is `b=x`. A key with no value, or an empty value, becomes
    /// [`QueryValue::Flag`]. An empty key is kept. Later duplicates win.
    pub fn parse(raw: &str) -> Self {
        let mut params = BTreeMap::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let mut pieces = pair.split('=');
            let key = pieces.next().unwrap_or_default();
            let value = match pieces.next() {
                Some(v) if !v.is_empty() => QueryValue::Value(v.to_string()),
                _ => QueryValue::Flag,
            };
            params.insert(key.to_string(), value);
        }
        Self(params)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: QueryValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical serialization: `?k=v&...` with keys sorted, or `""` when empty.
    ///
    /// Used for both cache keys and redirect URLs; the two must agree.
    pub fn canonical(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let joined = self
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{}", joined)
    }
}

/// A parsed bundle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpecifier {
    pub scope: Option<String>,
    pub name: String,
    pub tag: String,
    pub subpath: Option<String>,
    pub query: Query,
}

impl PackageSpecifier {
    /// Parse a request path and optional raw query string
    pub fn parse(path: &str, query: Option<&str>) -> PackdResult<Self> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| PackdError::parse(path, "path must start with '/'"))?;

        let (scope, rest) = match rest.strip_prefix('@') {
            Some(scoped) => {
                let (scope, rest) = scoped
                    .split_once('/')
                    .ok_or_else(|| PackdError::parse(path, "scoped package without a name"))?;
                if scope.is_empty() {
                    return Err(PackdError::parse(path, "empty scope"));
                }
                (Some(scope.to_string()), rest)
            }
            None => (None, rest),
        };

        let name_end = rest.find(['@', '/']).unwrap_or(rest.len());
        let name = &rest[..name_end];
        if name.is_empty() {
            return Err(PackdError::parse(path, "empty package name"));
        }
        let rest = &rest[name_end..];

        let (tag, rest) = match rest.strip_prefix('@') {
            Some(tagged) => {
                let tag_end = tagged.find('/').unwrap_or(tagged.len());
                let tag = &tagged[..tag_end];
                if tag.is_empty() {
                    return Err(PackdError::parse(path, "empty tag after '@'"));
                }
                (tag.to_string(), &tagged[tag_end..])
            }
            None => (DEFAULT_TAG.to_string(), rest),
        };

        // Whatever remains is either empty or starts with '/'
        let subpath = match rest.strip_prefix('/') {
            Some("") => return Err(PackdError::parse(path, "empty subpath after '/'")),
            Some(subpath) => Some(subpath.to_string()),
            None => None,
        };

        Ok(Self {
            scope,
            name: name.to_string(),
            tag,
            subpath,
            query: query.map(Query::parse).unwrap_or_default(),
        })
    }

    /// Registry name: `@scope/name` or `name`
    pub fn qualified_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }
}

/// Canonical URL for a concrete version of a package
pub fn canonical_url(package: &str, version: &str, subpath: Option<&str>, query: &Query) -> String {
    let mut url = format!("/{}@{}", package, version);
    if let Some(subpath) = subpath {
        url.push('/');
        url.push_str(subpath);
    }
    url.push_str(&query.canonical());
    url
}
