use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, MessengerConfig, WhatsAppMessenger};
use intake_core::{
    env_lookup, CoreConfig, FileRecordStore, IntakeService, ModelConfig, OpenAiChatClient,
};

/// Main entry point for the intake service
///
/// Resolves configuration once, then serves the webhook REST API.
///
/// # Environment Variables
/// - `INTAKE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `OPENAI_API_KEY`: chat model credentials (required)
/// - `FB_VERIFY_TOKEN`, `FB_ACCESS_TOKEN`, `FB_PHONE_NUMBER_ID`: WhatsApp settings (required)
/// - `INTAKE_*`: locale, template, output and storage settings
///
/// # Errors
/// Returns an error if configuration is missing or invalid, the address cannot be bound, or
/// the server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = env_lookup("INTAKE_REST_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());

    let config = match CoreConfig::from_lookup(&env_lookup) {
        Ok(config) => config,
        Err(e) => anyhow::bail!("invalid intake configuration: {e}"),
    };
    let model_config = match ModelConfig::from_lookup(&env_lookup) {
        Ok(model_config) => model_config,
        Err(e) => anyhow::bail!("invalid model configuration: {e}"),
    };
    let messenger_config = match MessengerConfig::from_lookup(&env_lookup) {
        Ok(messenger_config) => messenger_config,
        Err(e) => anyhow::bail!("invalid messenger configuration: {e}"),
    };

    if !config.template_path().is_file() {
        anyhow::bail!(
            "Form template does not exist: {} (generate one with `intake template`)",
            config.template_path().display()
        );
    }

    tracing::info!(
        locale = %config.locale(),
        template = %config.template_path().display(),
        "++ Starting intake REST on {}",
        rest_addr
    );

    let store = FileRecordStore::new(config.data_dir());
    let model = OpenAiChatClient::new(&model_config)?;
    let messenger = WhatsAppMessenger::new(&messenger_config)?;
    let intake = Arc::new(IntakeService::new(config, model, store));

    let app = api_rest::router(AppState::new(
        intake,
        Arc::new(messenger),
        messenger_config.verify_token.as_str(),
    ));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
