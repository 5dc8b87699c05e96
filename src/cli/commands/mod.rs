//! CLI command implementations

pub mod cache;
pub mod config;
pub mod key;
pub mod serve;

pub use cache::execute as cache;
pub use config::execute as config;
pub use key::execute as key;
pub use serve::execute as serve;
