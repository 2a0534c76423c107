//! `agentgw chat` — interactive streaming chat with one skill.

use std::io::Write;
use tokio_util::sync::CancellationToken;

use agentgw_agent::AgentStreamEvent;
use agentgw_config::AppConfig;

use super::CliError;

pub async fn run(
    config: AppConfig,
    skill: String,
    session: Option<String>,
) -> Result<(), CliError> {
    let service = super::build_service(config).await?;
    let mut session_id = session;

    println!("Chatting with '{skill}'. Empty line or Ctrl-D to exit.");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        let (sid, mut rx) = service
            .chat(&skill, message, session_id.clone(), CancellationToken::new())
            .await?;
        session_id = Some(sid);

        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::Chunk { content } => {
                    print!("{content}");
                    std::io::stdout().flush().ok();
                }
                AgentStreamEvent::ToolCall { name, .. } => {
                    eprintln!("\n[tool: {name}]");
                }
                AgentStreamEvent::Done { .. } => println!(),
                AgentStreamEvent::Error { message } => {
                    return Err(CliError::Runtime(message));
                }
                _ => {}
            }
        }
    }

    Ok(())
}
