//! Serve command - run the bundle service

use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::{PackdError, PackdResult};
use crate::server::{self, AppState};
use tokio::net::TcpListener;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> PackdResult<()> {
    let state = AppState::from_config(config)?;

    let bind = args.bind.as_deref().unwrap_or(&config.server.bind);
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| PackdError::io(format!("binding {}", bind), e))?;

    server::serve(listener, state).await
}
