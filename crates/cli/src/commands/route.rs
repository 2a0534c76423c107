//! `agentgw route` — planner-based skill selection.

use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(config: AppConfig, message: String) -> Result<(), CliError> {
    let service = super::build_service(config).await?;
    let result = service.route(&message).await?;

    match result.skill {
        Some(skill) => {
            println!("{skill}");
            eprintln!("({})", result.reasoning);
        }
        None => {
            eprintln!("No matching skill: {}", result.reasoning);
        }
    }
    Ok(())
}
