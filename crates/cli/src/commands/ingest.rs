//! `agentgw ingest` — add content to the knowledge base.

use agentgw_config::AppConfig;

use super::CliError;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: AppConfig,
    file: Option<String>,
    text: Option<String>,
    source: Option<String>,
    skills: Option<String>,
    tags: Option<String>,
    collection: String,
) -> Result<(), CliError> {
    let (content, default_source) = match (file, text) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| CliError::Runtime(format!("cannot read {path}: {e}")))?;
            (content, path)
        }
        (None, Some(text)) => (text, "manual".to_string()),
        (None, None) => {
            return Err(CliError::Runtime("provide --file or --text".into()));
        }
    };

    let service = super::build_service(config).await?;
    let chunks = service
        .ingest(
            &source.unwrap_or(default_source),
            &content,
            super::split_csv(skills),
            super::split_csv(tags),
            &collection,
        )
        .await?;

    println!("Ingested {chunks} chunk(s)");
    Ok(())
}
