//! `agentgw serve` — the long-running daemon.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agentgw_config::AppConfig;
use agentgw_gateway::GatewayState;
use agentgw_scheduler::CronScheduler;
use agentgw_webhooks::WebhookDispatcher;

use super::CliError;

pub async fn run(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    no_scheduler: bool,
    probe: bool,
) -> Result<(), CliError> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let api_key = config.api_key.clone();
    let gateway_host = config.gateway.host.clone();
    let gateway_port = config.gateway.port;
    let scheduler_enabled = config.scheduler.enabled && !no_scheduler;
    let scheduler_path = config.scheduler.config_path.clone();
    let webhooks_path = config.webhooks.config_path.clone();
    let webhook_retries = config.webhooks.max_retries;
    let webhook_timeout = config.webhooks.timeout_secs;
    let log_dir = config.storage.log_dir.clone();

    let service = super::build_service(config).await?;

    if probe {
        match service.provider().health_check().await {
            Ok(true) => info!("Provider probe succeeded"),
            Ok(false) => {
                return Err(CliError::ProviderUnreachable(
                    "provider health check failed".into(),
                ))
            }
            Err(e) => return Err(CliError::ProviderUnreachable(e.to_string())),
        }
    }

    let shutdown = CancellationToken::new();

    // Webhook dispatcher
    let mut dispatcher = WebhookDispatcher::new(webhook_retries, webhook_timeout);
    dispatcher.load_from_file(Path::new(&webhooks_path));
    if dispatcher.subscription_count() > 0 {
        let bus = service.events();
        Arc::new(dispatcher).spawn(&bus, shutdown.clone());
    }

    // Scheduler
    let scheduler = if scheduler_enabled {
        let mut scheduler = CronScheduler::new(service.clone(), &log_dir);
        scheduler.load_from_file(Path::new(&scheduler_path));
        let scheduler = Arc::new(scheduler);
        if scheduler.job_count() > 0 {
            scheduler.clone().spawn(shutdown.clone());
        }
        Some(scheduler)
    } else {
        None
    };

    let state = Arc::new(GatewayState {
        service,
        scheduler,
        api_key,
    });

    let result = tokio::select! {
        served = agentgw_gateway::serve(state, &gateway_host, gateway_port) => {
            served.map_err(|e| CliError::Config(format!("gateway failed to start: {e}")))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    shutdown.cancel();
    result
}
