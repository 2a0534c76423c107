//! `agentgw skills` — list loaded skills.

use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(config: AppConfig) -> Result<(), CliError> {
    let service = super::build_service(config).await?;

    for skill in service.skills() {
        let tools = if skill.tools.is_empty() {
            String::new()
        } else {
            format!(" [tools: {}]", skill.tools.join(", "))
        };
        println!("{:<24} {}{}", skill.name, skill.description.trim(), tools);
    }
    Ok(())
}
