//! Version resolution
//!
//! Maps a requested tag onto a concrete published version and decides
//! whether the request must be redirected to that version's canonical URL.

use crate::error::{PackdError, PackdResult};
use crate::registry::{PackageMetadata, RegistryClient};
use crate::specifier::PackageSpecifier;
use semver::{Version, VersionReq};
use tracing::debug;

/// Outcome of resolving a specifier against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Package name as the registry reports it
    pub package: String,
    /// Concrete semantic version
    pub version: String,
    /// False when the requested tag differs from `version`; the caller
    /// must redirect instead of building
    pub is_canonical_request: bool,
}

/// Resolves specifiers using a registry client
pub struct VersionResolver<'a> {
    registry: &'a dyn RegistryClient,
}

impl<'a> VersionResolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, spec: &PackageSpecifier) -> PackdResult<ResolvedVersion> {
        let qualified = spec.qualified_name();
        let metadata = self.registry.fetch_metadata(&qualified).await?;

        let version = find_version(&metadata, &spec.tag)
            .filter(|v| Version::parse(v).is_ok())
            .ok_or_else(|| PackdError::InvalidTag {
                package: qualified.clone(),
                tag: spec.tag.clone(),
            })?;

        debug!("Resolved {}@{} to {}", qualified, spec.tag, version);

        Ok(ResolvedVersion {
            package: metadata.name,
            is_canonical_request: version == spec.tag,
            version,
        })
    }
}

/// Find the version a tag refers to.
///
/// Lookup order: dist-tag, exact published version, then the highest
/// published version satisfying the tag read as a range. Pre-releases only
/// match ranges that name a pre-release.
pub fn find_version(metadata: &PackageMetadata, tag: &str) -> Option<String> {
    if let Some(version) = metadata.dist_tags.get(tag) {
        return Some(version.clone());
    }

    if metadata.versions.contains_key(tag) {
        return Some(tag.to_string());
    }

    let reqs = parse_range(tag)?;
    metadata
        .versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| reqs.iter().any(|req| req.matches(v)))
        .max()
        .map(|v| v.to_string())
}

/// Parse an npm-style range into its `||` alternatives.
///
/// Within an alternative, comparators may be joined by commas or spaces
/// (`>=1.2.7 <1.3.0`), and `a - b` is an inclusive hyphen range. A bare
/// version with no operator (`1.2`, `1`) means "any patch/minor of it" as
/// npm reads it, which is `=` in `semver` terms.
fn parse_range(range: &str) -> Option<Vec<VersionReq>> {
    range
        .split("||")
        .map(|alternative| VersionReq::parse(&normalize_comparators(alternative.trim())).ok())
        .collect()
}

/// Rewrite one npm comparator set into `semver`'s comma-joined syntax
fn normalize_comparators(set: &str) -> String {
    if let Some((low, high)) = set.split_once(" - ") {
        return format!(">={}, <={}", low.trim(), high.trim());
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in set.split([' ', ',']).filter(|t| !t.is_empty()) {
        // `>= 1.2.7` writes the operator apart from its version
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }
        let comparator = format!("{}{}", std::mem::take(&mut pending_op), token);
        if comparator.starts_with(|c: char| c.is_ascii_digit()) {
            comparators.push(format!("={}", comparator));
        } else {
            comparators.push(comparator);
        }
    }
    comparators.join(", ")
}
