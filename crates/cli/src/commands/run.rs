//! `agentgw run` — one-shot skill execution.

use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(
    config: AppConfig,
    skill: String,
    message: String,
    session: Option<String>,
) -> Result<(), CliError> {
    let service = super::build_service(config).await?;
    let (session_id, result) = service.run(&skill, &message, session).await?;

    println!("{result}");
    eprintln!("(session: {session_id})");
    Ok(())
}
