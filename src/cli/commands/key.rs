//! Key command - show the cache key a request maps to

use crate::cache::{derive_key, key::canonical_request};
use crate::cli::args::KeyArgs;
use crate::error::{PackdError, PackdResult};
use crate::specifier::PackageSpecifier;
use console::style;
use semver::Version;

/// Execute the key command
///
/// Works offline, so the tag must already be a concrete version.
pub fn execute(args: KeyArgs) -> PackdResult<()> {
    let (path, query) = match args.specifier.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (args.specifier.as_str(), None),
    };
    let spec = PackageSpecifier::parse(path, query)?;
    let package = spec.qualified_name();

    if Version::parse(&spec.tag).is_err() {
        return Err(PackdError::InvalidTag {
            package,
            tag: spec.tag,
        });
    }

    let subpath = spec.subpath.as_deref();
    let key = derive_key(&package, &spec.tag, subpath, &spec.query);

    println!(
        "{:<10} {}",
        style("request").dim(),
        canonical_request(&package, &spec.tag, subpath, &spec.query)
    );
    println!("{:<10} {}", style("key").dim(), key);
    println!("{:<10} {}", style("bundle").dim(), key.bundle_name());

    Ok(())
}
