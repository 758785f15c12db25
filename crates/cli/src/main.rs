use clap::{Parser, Subcommand};
use intake_core::{
    env_lookup, fill_form, generate_template, read_form_values, validate_output, CoreConfig,
    FileRecordStore, IntakeService, LanguageModel, Locale, MemoryRecordStore, ModelConfig,
    OpenAiChatClient, RecordId, RecordStore,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLI_USER: &str = "cli_user";

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "MedBot patient intake CLI")]
struct Cli {
    /// Language of prompts, messages and forms (overrides INTAKE_LOCALE)
    #[arg(long, global = true)]
    locale: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the intake assistant
    Chat {
        /// Conversation identifier
        #[arg(long, default_value = CLI_USER)]
        user: String,
        /// Keep records and conversation references in memory only
        #[arg(long)]
        no_store: bool,
    },
    /// Validate a JSON record and fill the form template with it
    Fill {
        /// JSON record keyed with the locale's field names
        record: PathBuf,
        /// Template to fill (defaults to INTAKE_TEMPLATE_PATH)
        #[arg(long)]
        template: Option<PathBuf>,
        /// Output PDF (defaults to a new file under INTAKE_OUTPUT_DIR)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate the blank form template
    Template {
        /// Output PDF (defaults to INTAKE_TEMPLATE_PATH)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List every named field of a form and its value
    Inspect {
        /// Filled or blank form
        form: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("intake=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let locale_override = cli.locale.clone();
    let lookup = move |name: &str| match name {
        "INTAKE_LOCALE" => locale_override.clone().or_else(|| env_lookup(name)),
        _ => env_lookup(name),
    };

    match cli.command {
        Some(Commands::Chat { user, no_store }) => {
            let config = CoreConfig::from_lookup(&lookup)?;
            let model_config = match ModelConfig::from_lookup(&lookup) {
                Ok(model_config) => model_config,
                Err(e) => anyhow::bail!("{e}"),
            };
            let model = OpenAiChatClient::new(&model_config)?;
            let stdin = io::stdin();
            let stdout = io::stdout();

            if no_store {
                let service = IntakeService::new(config, model, MemoryRecordStore::new());
                chat_loop(&service, &user, stdin.lock(), stdout.lock()).await?;
            } else {
                let store = FileRecordStore::new(config.data_dir());
                let service = IntakeService::new(config, model, store);
                chat_loop(&service, &user, stdin.lock(), stdout.lock()).await?;
            }
        }
        Some(Commands::Fill {
            record,
            template,
            output,
        }) => {
            let config = CoreConfig::from_lookup(&lookup)?;
            let locale = config.locale();
            let contents = std::fs::read_to_string(&record)?;
            let history = match validate_output(&contents, locale) {
                Ok(history) => history,
                Err(e) => anyhow::bail!("{}: {e}", record.display()),
            };
            let template = template.unwrap_or_else(|| config.template_path().to_path_buf());
            let output = output.unwrap_or_else(|| {
                config
                    .output_dir()
                    .join(format!("intake_{}_{}.pdf", locale.code(), RecordId::new()))
            });
            let written = fill_form(&history, locale, &template, &output)?;
            println!("PDF form generated at: {}", written.display());
        }
        Some(Commands::Template { output }) => {
            let config = CoreConfig::from_lookup(&lookup)?;
            let output = output.unwrap_or_else(|| config.template_path().to_path_buf());
            let written = generate_template(config.locale(), &output)?;
            println!("Template written to: {}", written.display());
        }
        Some(Commands::Inspect { form }) => {
            let values = read_form_values(&form)?;
            if values.is_empty() {
                println!("No form fields found.");
            }
            for (name, value) in values {
                println!("{name}: {value}");
            }
        }
        None => {
            println!("Use 'intake --help' for commands");
        }
    }

    Ok(())
}

/// Reads one message per line until `exit`, `quit` or end of input.
///
/// Turn failures are reported and the loop goes on; the conversation is kept.
async fn chat_loop<M, S>(
    service: &IntakeService<M, S>,
    user: &str,
    input: impl BufRead,
    mut out: impl Write,
) -> io::Result<()>
where
    M: LanguageModel,
    S: RecordStore,
{
    writeln!(out, "Welcome to the MedBot CLI. Type 'exit' to quit.")?;
    let locale: Locale = service.locale();
    let mut lines = input.lines();

    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let text = line.trim();
        if matches!(text.to_lowercase().as_str(), "exit" | "quit") {
            writeln!(out, "Goodbye!")?;
            break;
        }

        match service.handle_message(user, text).await {
            Ok(reply) => {
                let message = reply.message();
                if let Err(e) = service
                    .store()
                    .store_conversation_reference(user, text, &message)
                {
                    tracing::error!(error = %e, "failed to store CLI conversation");
                }
                writeln!(out, "\nMedBot: {message}")?;
            }
            Err(e) => {
                tracing::error!(locale = %locale, error = %e, "intake turn failed");
                writeln!(out, "\nError: {e}")?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::{ChatTurn, ModelError, SessionLimits};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
    }

    impl LanguageModel for ScriptedModel {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatTurn],
            _input: &str,
        ) -> Result<String, ModelError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ModelError::EmptyResponse)
        }
    }

    fn service(
        temp: &TempDir,
        replies: &[&str],
    ) -> IntakeService<ScriptedModel, MemoryRecordStore> {
        let config = CoreConfig::new(
            Locale::En,
            temp.path().join("template.pdf"),
            temp.path().join("forms"),
            temp.path().join("records"),
            SessionLimits {
                ttl: Duration::from_secs(60),
                capacity: 10,
            },
        )
        .unwrap();
        let model = ScriptedModel {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_owned()).collect()),
        };
        IntakeService::new(config, model, MemoryRecordStore::new())
    }

    async fn run(service: &IntakeService<ScriptedModel, MemoryRecordStore>, input: &str) -> String {
        let mut out = Vec::new();
        chat_loop(service, CLI_USER, Cursor::new(input.to_owned()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn chat_prints_replies_until_exit() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, &["What is your name?", "Thanks, Jane."]);

        let output = run(&service, "hello\nJane Doe\nEXIT\nignored\n").await;

        assert!(output.starts_with("Welcome to the MedBot CLI. Type 'exit' to quit.\n"));
        assert!(output.contains("\nMedBot: What is your name?\n"));
        assert!(output.contains("\nMedBot: Thanks, Jane.\n"));
        assert!(output.ends_with("Goodbye!\n"));

        let references = service.store().conversations();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].sender, CLI_USER);
        assert_eq!(references[1].message, "Jane Doe");
    }

    #[tokio::test]
    async fn chat_reports_turn_failures_and_continues() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, &[]);

        let output = run(&service, "hello\n").await;

        assert!(output.contains("\nError: language model error: model returned no choices\n"));
        assert!(!output.contains("MedBot:"));
        assert!(service.store().conversations().is_empty());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["intake", "--locale", "es", "chat", "--no-store"]).unwrap();
        assert_eq!(cli.locale.as_deref(), Some("es"));
        assert!(matches!(
            cli.command,
            Some(Commands::Chat { ref user, no_store: true }) if user == CLI_USER
        ));

        let cli = Cli::try_parse_from(["intake", "fill", "record.json", "--output", "out.pdf"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Fill { template: None, output: Some(_), .. })
        ));
    }
}
