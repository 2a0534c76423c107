//! `agentgw status` — show service status.

use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(config: AppConfig) -> Result<(), CliError> {
    let service = super::build_service(config).await?;
    let status = service.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status).unwrap_or_else(|_| status.to_string())
    );
    Ok(())
}
