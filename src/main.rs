//! Terminal host: converts a document, then chats about it on stdin/stdout.

use clap::{Parser, Subcommand, ValueEnum};
use doc_chat_lib::analysis::form_recognizer::{FormRecognizer, FormRecognizerConfig};
use doc_chat_lib::analysis::local::LocalAnalyzer;
use doc_chat_lib::analysis::AnalysisService;
use doc_chat_lib::db::Database;
use doc_chat_lib::llm::azure::{AzureChatClient, AzureConfig};
use doc_chat_lib::session::{ChatSession, SessionView};
use doc_chat_lib::settings::ChatSettings;
use doc_chat_lib::store::{ArtifactStore, FsStore};
use doc_chat_lib::DocChat;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum StoreKind {
    Fs,
    Sqlite,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum AnalyzerKind {
    Local,
    Remote,
}

#[derive(Parser, Debug)]
#[command(name = "doc-chat", about = "Ask questions about a document")]
struct Cli {
    /// Settings and artifact database
    #[arg(long, env = "DOC_CHAT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat about a document
    Chat {
        /// Document path, relative to --root
        document: String,
        /// Directory documents are resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, value_enum, default_value_t = StoreKind::Fs)]
        store: StoreKind,
        #[arg(long, value_enum, default_value_t = AnalyzerKind::Local)]
        analyzer: AnalyzerKind,
    },
    /// Inspect or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doc-chat")
        .join("doc-chat.db")
}

fn render(view: &SessionView) {
    match view {
        SessionView::Hidden | SessionView::Chat => {}
        SessionView::Progress => println!("Converting document to text..."),
        SessionView::Error(reason) => println!("Error: {}", reason),
    }
}

async fn run_chat(session: ChatSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = session.on_state_change(|state| {
        let view = SessionView::from(state);
        if view == SessionView::Progress {
            render(&view);
        }
    });

    let started = tokio::select! {
        started = session.start() => Some(started),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(started) = started else {
        session.close();
        return Ok(());
    };
    started?;

    let view = session.view();
    if view != SessionView::Chat {
        render(&view);
        session.close();
        return Ok(());
    }

    for message in session.display() {
        println!("ai> {}", message.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        match session.submit(line).await {
            Ok(reply) => println!("ai> {}", reply),
            Err(e) => println!("error> {}", e),
        }
    }

    session.close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_chat=info,doc_chat_lib=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);
    tracing::info!(path = %db_path.display(), "Opening database");
    let db = Arc::new(Database::new(&db_path)?);

    match cli.command {
        Command::Settings { action } => {
            let mut settings = ChatSettings::load(&db)?;
            match action {
                SettingsAction::Show => {
                    for (key, value) in settings.masked() {
                        println!("{} = {}", key, value);
                    }
                }
                SettingsAction::Set { key, value } => {
                    settings.set(&key, value)?;
                    settings.save(&db)?;
                    println!("Updated {}", key);
                }
            }
            Ok(())
        }
        Command::Chat {
            document,
            root,
            store,
            analyzer,
        } => {
            let settings = ChatSettings::load(&db)?;
            let fs = Arc::new(FsStore::new(root));
            let artifacts: Arc<dyn ArtifactStore> = match store {
                StoreKind::Fs => fs.clone(),
                StoreKind::Sqlite => db.clone(),
            };
            let analyzer: Arc<dyn AnalysisService> = match analyzer {
                AnalyzerKind::Local => Arc::new(LocalAnalyzer),
                AnalyzerKind::Remote => Arc::new(FormRecognizer::new(FormRecognizerConfig::new(
                    settings.forms_endpoint.clone(),
                    settings.forms_key.clone(),
                ))),
            };
            let client = Arc::new(AzureChatClient::new(AzureConfig {
                api_key: settings.azure_openai_key.clone(),
                endpoint: settings.azure_openai_endpoint.clone(),
            }));

            let app = DocChat::new(settings, artifacts, fs, analyzer, client);
            run_chat(app.open_session(document)).await
        }
    }
}
