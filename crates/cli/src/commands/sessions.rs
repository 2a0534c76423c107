//! `agentgw sessions` — list recent sessions.

use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(config: AppConfig, skill: Option<String>, limit: usize) -> Result<(), CliError> {
    let service = super::build_service(config).await?;
    let sessions = service.sessions(skill.as_deref(), limit).await?;

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {:<20} last used {}",
            session.id,
            session.skill_name,
            session.last_used_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
