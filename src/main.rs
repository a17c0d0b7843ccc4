use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wellbeing_chat::app::{self, AppState};
use wellbeing_chat::background::spawn_session_reaper;
use wellbeing_chat::config::{ConfigError, Env, GeminiConfig, ServerConfig};
use wellbeing_chat::llm::GeminiClient;
use wellbeing_chat::middleware::Pipeline;
use wellbeing_chat::{Request, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = Env::load()?;
    let server_config = ServerConfig::from_env(&env)?;

    let app: Pipeline = match GeminiConfig::from_env(&env) {
        Ok(gemini) => {
            info!(model = %gemini.model, "gemini client configured");
            let client = GeminiClient::from_config(&gemini)?;
            let state = AppState::new(Arc::new(client));
            spawn_session_reaper(state.sessions.clone(), server_config.session_idle);
            app::chat_app(state)
        }
        Err(err @ ConfigError::MissingApiKey) => {
            // The page still comes up so the operator sees the reason.
            error!(error = %err, "startup guard tripped; serving configuration error only");
            eprintln!("{err}");
            app::fatal_app(err.to_string())
        }
        Err(err) => return Err(err.into()),
    };

    let app = Arc::new(app);
    let server = Server::bind(&server_config.bind_addr).await?;
    server
        .run_until(
            move |req: Request| {
                let app = Arc::clone(&app);
                async move { app.handle(req).await }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await?;

    info!("server stopped");
    Ok(())
}
