//! HTTP server assembly: middleware stack, shared state, route registration,
//! binding and graceful shutdown.

use std::time::Duration;

use actix_web::{App, HttpServer, middleware::Compress, web};
use anyhow::Result;
use tracing::warn;

use crate::api::middleware::{RateLimitGuard, RequestIdMiddleware, SecurityHeaders, SessionGate};
use crate::api::services::{
    AppStartTime, analytics_routes, cron_routes, health_routes, redirect_api_routes,
    redirect_routes, workspace_routes,
};
use crate::config::StaticConfig;
use crate::runtime::lifetime;

/// Runs the HTTP server until it exits or a shutdown signal lands.
///
/// Logging must be initialized before calling this.
pub async fn run_server(config: StaticConfig) -> Result<()> {
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    let startup = lifetime::startup::prepare_server_startup(&config)
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let storage = startup.storage.clone();
    let classifier = startup.classifier.clone();
    let resolver = startup.resolver.clone();
    let usage = startup.usage.clone();
    let dispatcher = startup.dispatcher.clone();
    let reconciler = startup.reconciler.clone();
    let analytics = startup.analytics.clone();
    let sessions = startup.sessions.clone();
    let limiter = startup.limiter.clone();
    let buffer = startup.buffer.clone();
    let cron_gate = startup.cron_gate.clone();

    let cpu_count = config.server.cpu_count.min(32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let bind_host = config.server.host.clone();
    let bind_port = config.server.port;
    #[cfg(unix)]
    let unix_socket = config.server.unix_socket.clone();

    let reconciler_for_shutdown = startup.reconciler.clone();
    let shutdown_batch_size = config.reconciler.max_batch_size;

    let server_config = config;

    // Middleware executes in reverse registration order: request id first,
    // then security headers, then the rate limiter, so a 429 still carries
    // both the header set and the request id.
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_config.clone()))
            .app_data(web::Data::new(storage.clone()))
            .app_data(web::Data::new(classifier.clone()))
            .app_data(web::Data::new(resolver.clone()))
            .app_data(web::Data::new(usage.clone()))
            .app_data(web::Data::new(dispatcher.clone()))
            .app_data(web::Data::new(reconciler.clone()))
            .app_data(web::Data::new(analytics.clone()))
            .app_data(web::Data::new(sessions.clone()))
            .app_data(web::Data::new(buffer.clone()))
            .app_data(web::Data::new(cron_gate.clone()))
            .app_data(web::Data::new(app_start_time.clone()))
            .app_data(web::PayloadConfig::new(1024 * 1024))
            .wrap(Compress::default())
            .wrap(RateLimitGuard::new(
                limiter.clone(),
                classifier.clone(),
                &server_config,
            ))
            .wrap(SecurityHeaders)
            .wrap(RequestIdMiddleware)
            .service(
                web::scope("/api")
                    .wrap(SessionGate::new(sessions.clone()))
                    .service(redirect_api_routes())
                    .service(analytics_routes())
                    .service(cron_routes())
                    .service(workspace_routes()),
            )
            .service(health_routes())
            .service(redirect_routes())
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .client_disconnect_timeout(Duration::from_millis(1000))
    .workers(cpu_count);

    // Bind to Unix socket or TCP address
    let server = {
        #[cfg(unix)]
        {
            if let Some(ref socket_path) = unix_socket {
                warn!("Starting server on Unix socket: {}", socket_path);
                if std::path::Path::new(socket_path).exists() {
                    std::fs::remove_file(socket_path)?;
                }
                Some(server.bind_uds(socket_path)?)
            } else {
                let bind_address = format!("{}:{}", bind_host, bind_port);
                warn!("Starting server at http://{}", bind_address);
                Some(server.bind(bind_address)?)
            }
        }

        #[cfg(not(unix))]
        {
            let bind_address = format!("{}:{}", bind_host, bind_port);
            warn!("Starting server at http://{}", bind_address);
            Some(server.bind(bind_address)?)
        }
    }
    .expect("Server binding failed")
    .run();

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(reconciler_for_shutdown, shutdown_batch_size) => {
            warn!("Graceful shutdown: all tasks completed");
        }
    }

    Ok(())
}
