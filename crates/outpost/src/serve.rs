// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outpost serve` command implementation.

use outpost_config::OutpostConfig;
use outpost_core::OutpostError;
use outpost_server::{AppState, start_server};
use tracing::{info, warn};

use crate::cycles::Runtime;
use crate::shutdown;

pub async fn run_serve(config: OutpostConfig) -> Result<(), OutpostError> {
    let runtime = Runtime::open(&config).await?;
    let gateway = Runtime::gateway(&config)?;

    if config.server.bearer_token.is_none() {
        warn!("server.bearer_token is not set; every /v1 trigger request will be rejected");
    }
    info!(
        service = %config.service.name,
        gateway = gateway.name(),
        database = %config.storage.database_path,
        "starting trigger server"
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(runtime.db.clone(), runtime.bus.clone(), gateway, config);
    let cancel = shutdown::install_signal_handler();
    let served = start_server(&host, port, state, cancel).await;

    runtime.shutdown().await?;
    served
}
