use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{extract::FromRef, Router};
use tracing::{error, info};

use crate::{
    client_ip::ProxyHeaders,
    clock::{DynClock, SystemClock},
    cors,
    directory::JsonDirectory,
    email::{
        clients::{ConsoleMailer, DynEmailClient, SendgridMailer},
        templates,
    },
    passwords::PasswordPolicy,
    rate_limit::SlidingWindowLimiter,
    reaper,
    recovery::{self, RecoveryLimiters, RecoveryOptions, RecoveryService},
    tokens::TokenStore,
};

pub struct Options {
    pub bind_address: SocketAddr,
    pub cleanup_interval: Duration,
    pub cors_origin: Option<String>,
    pub directory_file: PathBuf,

    pub email_from_address: String,
    pub email_from_name: String,
    pub email_rate_limit: usize,
    pub email_rate_window: chrono::Duration,
    pub ip_rate_limit: usize,
    pub ip_rate_window: chrono::Duration,
    pub limiter_max_keys: usize,

    pub password_policy: PasswordPolicy,
    pub reset_url: String,
    pub sendgrid_key: Option<String>,
    pub token_capacity: usize,
    pub token_ttl: chrono::Duration,
    pub trust_proxy_headers: bool,
}

#[derive(Clone)]
pub struct AppState {
    proxy_headers: ProxyHeaders,
    recovery: RecoveryService,
}

impl AppState {
    pub fn new(recovery: RecoveryService, proxy_headers: ProxyHeaders) -> Self {
        Self {
            proxy_headers,
            recovery,
        }
    }
}

impl FromRef<AppState> for ProxyHeaders {
    fn from_ref(state: &AppState) -> Self {
        state.proxy_headers
    }
}

impl FromRef<AppState> for RecoveryService {
    fn from_ref(state: &AppState) -> Self {
        state.recovery.clone()
    }
}

pub async fn serve(opts: Options) -> anyhow::Result<()> {
    let clock: DynClock = Arc::new(SystemClock);

    let directory = Arc::new(JsonDirectory::load(&opts.directory_file).await?);

    let email_client: DynEmailClient = match opts.sendgrid_key {
        Some(key) => Arc::new(SendgridMailer::new(
            key,
            opts.email_from_address,
            opts.email_from_name,
        )),
        None => Arc::new(ConsoleMailer {
            from: opts.email_from_address,
        }),
    };

    let ip_limiter = Arc::new(
        SlidingWindowLimiter::new("ip", clock.clone(), opts.ip_rate_limit, opts.ip_rate_window)
            .with_max_keys(opts.limiter_max_keys),
    );
    let email_limiter = Arc::new(
        SlidingWindowLimiter::new(
            "email",
            clock.clone(),
            opts.email_rate_limit,
            opts.email_rate_window,
        )
        .with_max_keys(opts.limiter_max_keys),
    );

    let token_store = Arc::new(TokenStore::with_capacity(
        clock.clone(),
        opts.token_capacity,
    ));

    let reapers = vec![
        token_store.start_cleanup(opts.cleanup_interval),
        reaper::spawn(ip_limiter.clone(), opts.cleanup_interval),
        reaper::spawn(email_limiter.clone(), opts.cleanup_interval),
    ];

    let recovery_service = RecoveryService::new(
        clock,
        directory,
        email_client,
        RecoveryLimiters {
            ip: ip_limiter,
            identifier: email_limiter,
        },
        templates::load()?,
        token_store,
        RecoveryOptions {
            reset_url: opts.reset_url,
            token_ttl: opts.token_ttl,
            password_policy: opts.password_policy,
        },
    );

    let state = AppState::new(recovery_service, opts.trust_proxy_headers.into());

    let app = Router::new()
        .merge(recovery::http::routes())
        .layer(cors::layer(opts.cors_origin.as_deref())?)
        .with_state(state);

    info!(address = %opts.bind_address, "Starting server.");

    axum::Server::bind(&opts.bind_address)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, stopping cleanup tasks.");

    for handle in reapers {
        if let Err(error) = handle.stop().await {
            error!(?error, "Cleanup task failed.");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(?error, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }

    info!("Received shutdown signal.");
}
