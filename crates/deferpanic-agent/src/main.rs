// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use deferclient::{install_panic_hook, DeferPanicClient};
use deferstats::{InstrumentedService, RequestInterceptor, StatsFlusher};

mod config;
mod demo;
mod server;

const AGENT_HOST: [u8; 4] = [0, 0, 0, 0];

#[tokio::main]
pub async fn main() {
    let now = Instant::now();
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config::log_level());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    install_panic_hook();

    let config = match config::AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on deferpanic agent startup: {e}");
            return;
        }
    };

    let client = match DeferPanicClient::new(config.client.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating deferpanic client: {e}");
            return;
        }
    };
    if config.client.no_post {
        info!("no_post is set, nothing will be sent to the collector");
    }

    let interceptor = RequestInterceptor::new(client, &config.stats);
    let flusher = StatsFlusher::for_interceptor(&interceptor, config.stats.flush_interval());
    let flusher_handle = tokio::spawn(async move {
        flusher.start().await;
    });

    let service = InstrumentedService::new(interceptor, demo::handle);

    let addr = SocketAddr::from((AGENT_HOST, config.port));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            return;
        }
    };
    info!("deferpanic agent listening on {addr}");
    debug!(
        "Time taken to start the deferpanic agent: {} ms",
        now.elapsed().as_millis()
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => cancel.cancel(),
                Err(e) => error!("Unable to listen for the shutdown signal: {e}"),
            }
        }
    });

    if let Err(e) = server::serve_tcp(listener, service, flusher_handle, cancel).await {
        error!("deferpanic agent stopped: {e}");
    }
}
