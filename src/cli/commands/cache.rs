//! Cache command - manage the bundle cache

use crate::cache::FsCacheStore;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{CacheBackend, Config, ConfigManager};
use crate::error::PackdResult;
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PackdResult<()> {
    let store = FsCacheStore::new(ConfigManager::cache_dir(config));

    if config.cache.backend == CacheBackend::Memory {
        println!(
            "{} cache.backend is \"memory\"; showing the fs cache location anyway",
            style("!").yellow()
        );
    }

    match args.action {
        CacheAction::Path => {
            println!("{}", store.root().display());
            Ok(())
        }
        CacheAction::Clear { yes } => clear_cache(&store, yes).await,
    }
}

async fn clear_cache(store: &FsCacheStore, skip_confirm: bool) -> PackdResult<()> {
    if !store.exists().await? {
        println!("No cached bundles to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!(
            "Remove all cached bundles in {}? [y/N] ",
            store.root().display()
        );
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    store.clear().await?;
    println!("{} cleared {}", style("✓").green(), store.root().display());

    Ok(())
}
