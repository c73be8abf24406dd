//! Letterdesk CLI - warranty letters on Google Drive.
//!
//! This tool signs in to Google, keeps letter drafts locally, and pushes
//! them to Google Docs as documents tagged with the account that created them.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use letterdesk_common::{DocumentId, DraftId, Error};
use letterdesk_storage::gdrive::{
    code_from_redirect, sign_out, AuthConfig, AuthManager, CredentialStore, DocumentService,
    DriveGateway, FileSessionStore, GoogleApiClient, IdentitySource, MemoryDocumentService,
    TokenGuard,
};
use letterdesk_storage::{DataPaths, DraftStore, GatewayConfig};

#[derive(Parser)]
#[command(name = "letterdesk")]
#[command(about = "Letterdesk - Warranty letters on Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use an in-memory document service instead of Google.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a Google account.
    Login {
        /// Authorization code from the consent redirect (skips the prompt).
        #[arg(short, long, conflicts_with = "token")]
        code: Option<String>,

        /// Use an existing access token instead of the consent flow.
        #[arg(long)]
        token: Option<String>,

        /// Print the consent URL without opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Sign out and forget the stored token.
    Logout,

    /// Show the signed-in account.
    Whoami,

    /// Google Docs operations.
    #[command(subcommand)]
    Docs(DocsCommand),

    /// Local draft operations.
    #[command(subcommand)]
    Drafts(DraftsCommand),

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum DocsCommand {
    /// Create a document.
    Create {
        #[arg(short, long, default_value = "")]
        title: String,

        #[command(flatten)]
        body: BodyArgs,
    },

    /// Print a document's text.
    Read {
        /// Document id or URL.
        id: String,
    },

    /// Replace a document's text.
    Update {
        /// Document id or URL.
        id: String,

        /// New title.
        #[arg(short, long)]
        title: Option<String>,

        #[command(flatten)]
        body: BodyArgs,
    },

    /// Delete a document.
    Delete {
        /// Document id or URL.
        id: String,
    },

    /// List documents created by this account.
    List {
        /// Print JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DraftsCommand {
    /// List drafts, newest first.
    List {
        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a draft.
    Show { id: String },

    /// Create or replace a draft.
    Save {
        /// Existing draft id.
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long, default_value = "")]
        title: String,

        #[command(flatten)]
        body: BodyArgs,
    },

    /// Delete a draft.
    Remove { id: String },

    /// Push a draft to Google Docs.
    Push { id: String },

    /// Forget the Google Doc a draft was pushed to.
    Unlink { id: String },
}

#[derive(clap::Args)]
struct BodyArgs {
    /// Letter body.
    #[arg(short, long, conflicts_with = "file")]
    content: Option<String>,

    /// Read the letter body from a file ("-" for stdin).
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl BodyArgs {
    fn read(self) -> Result<String> {
        match (self.content, self.file) {
            (Some(content), _) => Ok(content),
            (None, Some(path)) if path.as_os_str() == "-" => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                Ok(buf)
            }
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
            (None, None) => anyhow::bail!("Provide the letter body with --content or --file"),
        }
    }
}

/// Wiring shared by the commands.
struct App {
    session: Arc<FileSessionStore>,
    drafts: DraftStore,
    config: GatewayConfig,
    dry_run: bool,
}

impl App {
    fn from_env(dry_run: bool) -> Result<Self> {
        let paths = DataPaths::from_env()?;
        debug!("Using data directory {}", paths.root().display());

        Ok(Self {
            session: Arc::new(FileSessionStore::new(paths.session_file())),
            drafts: DraftStore::new(paths.drafts_file()),
            config: GatewayConfig::from_env(),
            dry_run,
        })
    }

    fn gateway(&self) -> Result<DriveGateway> {
        let service: Arc<dyn DocumentService> = if self.dry_run {
            info!("Dry run: documents are kept in memory only");
            Arc::new(MemoryDocumentService::new())
        } else {
            Arc::new(GoogleApiClient::new(self.config.api.clone())?)
        };

        Ok(DriveGateway::new(service, TokenGuard::from_session(self.session.clone()))
            .with_marker_key(self.config.marker_key.clone()))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "letterdesk", &mut std::io::stdout());
        return Ok(());
    }

    let app = App::from_env(cli.dry_run)?;

    match cli.command {
        Commands::Login {
            code,
            token,
            no_browser,
        } => cmd_login(&app, code, token, no_browser).await,

        Commands::Logout => cmd_logout(&app),

        Commands::Whoami => cmd_whoami(&app),

        Commands::Docs(command) => cmd_docs(&app, command).await,

        Commands::Drafts(command) => cmd_drafts(&app, command).await,

        Commands::Completions { .. } => Ok(()),
    }
}

/// Print an error with its cause chain and any remediation hint.
fn report(error: &anyhow::Error) {
    eprintln!("Error: {:#}", error);

    if let Some(hint) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .and_then(Error::remediation)
    {
        eprintln!("\n{}", hint);
    }
}

async fn cmd_login(
    app: &App,
    code: Option<String>,
    token: Option<String>,
    no_browser: bool,
) -> Result<()> {
    let auth = AuthManager::new(AuthConfig::from_env()?)?;

    let identity = match (code, token) {
        (_, Some(token)) => auth.sign_in_with_token(app.session.as_ref(), &token).await?,
        (Some(code), None) => auth.sign_in_with_code(app.session.as_ref(), code.trim()).await?,
        (None, None) => {
            let (url, state) = auth.authorization_url();

            println!("Open this URL to grant access:\n\n  {}\n", url);
            if !no_browser {
                if let Err(e) = open::that(&url) {
                    debug!("Could not open browser: {}", e);
                }
            }

            print!("Paste the redirect URL (or the code): ");
            std::io::stdout().flush()?;
            let mut input = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut input)
                .context("Failed to read authorization code")?;

            let code = code_from_redirect(&input, &state)?;
            auth.sign_in_with_code(app.session.as_ref(), &code).await?
        }
    };

    println!("Signed in as {}", identity.email);
    Ok(())
}

fn cmd_logout(app: &App) -> Result<()> {
    sign_out(app.session.as_ref())?;
    println!("Signed out.");
    Ok(())
}

fn cmd_whoami(app: &App) -> Result<()> {
    let Some(identity) = app.session.current_identity()? else {
        println!("Not signed in.");
        return Ok(());
    };

    println!("Account: {}", identity.email);
    println!("  ID: {}", identity.account_id);

    if let Some(credential) = app.session.load_credential()? {
        println!("  Token obtained: {} ({:?})", credential.issued_at, credential.issued_via);
        if let Some(expires_at) = credential.expires_at {
            println!("  Token expires: {}", expires_at);
        }
    }

    match TokenGuard::from_session(app.session.clone()).ensure_valid() {
        Ok(_) => println!("  Status: ready"),
        Err(e) => println!("  Status: {}", e),
    }
    Ok(())
}

async fn cmd_docs(app: &App, command: DocsCommand) -> Result<()> {
    let gateway = app.gateway()?;

    match command {
        DocsCommand::Create { title, body } => {
            let content = body.read()?;
            let doc = gateway.create(&title, &content).await?;

            println!("Document created: {}", doc.title);
            println!("  ID: {}", doc.document_id);
            if let Some(link) = doc.web_view_link {
                println!("  Link: {}", link);
            }
        }

        DocsCommand::Read { id } => {
            let id = DocumentId::new(id)?;
            let doc = gateway.read_content(&id).await?;

            println!("# {}\n", doc.title);
            println!("{}", doc.content);
        }

        DocsCommand::Update { id, title, body } => {
            let id = DocumentId::new(id)?;
            let content = body.read()?;
            gateway.update(&id, &content, title.as_deref()).await?;

            println!("Document updated: {}", id);
        }

        DocsCommand::Delete { id } => {
            let id = DocumentId::new(id)?;
            gateway.delete(&id).await?;

            println!("Document deleted: {}", id);
        }

        DocsCommand::List { json } => {
            let docs = gateway.list().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else if docs.is_empty() {
                println!("No documents.");
            } else {
                for doc in docs {
                    let modified = doc
                        .modified_time
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("  {}  {}  {}", modified, doc.id, doc.name);
                }
            }
        }
    }

    Ok(())
}

async fn cmd_drafts(app: &App, command: DraftsCommand) -> Result<()> {
    match command {
        DraftsCommand::List { json } => {
            let drafts = app.drafts.list().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&drafts)?);
            } else if drafts.is_empty() {
                println!("No drafts.");
            } else {
                for draft in drafts {
                    let pushed = if draft.drive_file_id.is_some() { "*" } else { " " };
                    println!(
                        "{} {}  {}  {}",
                        pushed,
                        draft.last_modified.format("%Y-%m-%d %H:%M"),
                        draft.id,
                        draft.title
                    );
                }
            }
        }

        DraftsCommand::Show { id } => {
            let draft = app.drafts.get(&DraftId::new(id)?).await?;

            println!("# {}\n", draft.title);
            println!("{}", draft.content);
            if let Some(doc) = draft.drive_file_id {
                println!("\n(Google Doc: {})", doc);
            }
        }

        DraftsCommand::Save { id, title, body } => {
            let id = id.map(DraftId::new).transpose()?;
            let content = body.read()?;
            let draft = app.drafts.save(id.as_ref(), &title, &content).await?;

            println!("Draft saved: {} ({})", draft.title, draft.id);
        }

        DraftsCommand::Remove { id } => {
            let id = DraftId::new(id)?;
            app.drafts.remove(&id).await?;

            println!("Draft removed: {}", id);
        }

        DraftsCommand::Push { id } => {
            let id = DraftId::new(id)?;
            let gateway = app.gateway()?;

            match push_draft(&app.drafts, &gateway, &id, !app.dry_run).await? {
                Pushed::Updated(doc_id) => {
                    println!("Draft pushed to existing document {}", doc_id);
                }
                Pushed::Created { document_id, link } => {
                    println!("Draft pushed to new document {}", document_id);
                    if let Some(link) = link {
                        println!("  Link: {}", link);
                    }
                    if app.dry_run {
                        println!("  (dry run: draft left unlinked)");
                    }
                }
            }
        }

        DraftsCommand::Unlink { id } => {
            let draft = app.drafts.unlink_drive_file(&DraftId::new(id)?).await?;
            println!("Draft unlinked: {} ({})", draft.title, draft.id);
        }
    }

    Ok(())
}

/// Where a pushed draft ended up.
#[derive(Debug)]
enum Pushed {
    Updated(DocumentId),
    Created {
        document_id: DocumentId,
        link: Option<String>,
    },
}

/// Update the draft's linked document, or create one and (when `link` is
/// set) record it on the draft.
async fn push_draft(drafts: &DraftStore, gateway: &DriveGateway, id: &DraftId, link: bool) -> Result<Pushed> {
    let draft = drafts.get(id).await?;

    if let Some(doc_id) = draft.drive_file_id {
        gateway
            .update(&doc_id, &draft.content, Some(&draft.title))
            .await
            .with_context(|| {
                format!(
                    "Failed to update Google Doc {} (run `letterdesk drafts unlink {}` to push as a new document)",
                    doc_id, id
                )
            })?;
        return Ok(Pushed::Updated(doc_id));
    }

    let doc = gateway
        .create(&draft.title, &draft.content)
        .await
        .context("Failed to create Google Doc")?;
    if link {
        drafts.link_drive_file(id, &doc.document_id).await?;
    }

    Ok(Pushed::Created {
        document_id: doc.document_id,
        link: doc.web_view_link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use letterdesk_storage::gdrive::{Identity, MemorySession};
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_docs_update() {
        let cli = Cli::try_parse_from([
            "letterdesk", "docs", "update", "abc", "--title", "New", "--content", "Body",
        ])
        .unwrap();

        match cli.command {
            Commands::Docs(DocsCommand::Update { id, title, body }) => {
                assert_eq!(id, "abc");
                assert_eq!(title.as_deref(), Some("New"));
                assert_eq!(body.read().unwrap(), "Body");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_login_code_conflicts_with_token() {
        let result = Cli::try_parse_from(["letterdesk", "login", "--code", "c", "--token", "t"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_body_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("letter.txt");
        std::fs::write(&path, "Dear Sir").unwrap();

        let body = BodyArgs {
            content: None,
            file: Some(path),
        };
        assert_eq!(body.read().unwrap(), "Dear Sir");
    }

    fn memory_gateway() -> (Arc<MemoryDocumentService>, DriveGateway) {
        let service = Arc::new(MemoryDocumentService::new());
        let session = Arc::new(MemorySession::signed_in(Identity::new("a@x.com", "uid-a"), "tok"));
        let gateway = DriveGateway::new(service.clone(), TokenGuard::from_session(session));
        (service, gateway)
    }

    #[tokio::test]
    async fn test_unlinked_push_leaves_draft_file_alone() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path().join("drafts.json"));
        let (service, gateway) = memory_gateway();
        let draft = drafts.save(None, "Claim", "Dear Sir").await.unwrap();

        let first = push_draft(&drafts, &gateway, &draft.id, false).await.unwrap();
        assert!(matches!(first, Pushed::Created { .. }));
        assert!(drafts.get(&draft.id).await.unwrap().drive_file_id.is_none());

        // A second push creates again instead of updating an unknown id.
        let second = push_draft(&drafts, &gateway, &draft.id, false).await.unwrap();
        assert!(matches!(second, Pushed::Created { .. }));
        assert_eq!(service.file_count(), 2);
    }

    #[tokio::test]
    async fn test_linked_push_updates_on_second_run() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path().join("drafts.json"));
        let (service, gateway) = memory_gateway();
        let draft = drafts.save(None, "Claim", "v1").await.unwrap();

        let document_id = match push_draft(&drafts, &gateway, &draft.id, true).await.unwrap() {
            Pushed::Created { document_id, .. } => document_id,
            other => panic!("expected Created, got {other:?}"),
        };
        assert_eq!(drafts.get(&draft.id).await.unwrap().drive_file_id, Some(document_id.clone()));

        drafts.save(Some(&draft.id), "Claim", "v2").await.unwrap();
        let pushed = push_draft(&drafts, &gateway, &draft.id, true).await.unwrap();
        assert!(matches!(pushed, Pushed::Updated(ref id) if *id == document_id));
        assert_eq!(service.document_text(&document_id).as_deref(), Some("v2"));
        assert_eq!(service.file_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_link_is_recovered_by_unlink() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path().join("drafts.json"));
        let (_service, gateway) = memory_gateway();
        let draft = drafts.save(None, "Claim", "text").await.unwrap();
        drafts
            .link_drive_file(&draft.id, &DocumentId::new("gone").unwrap())
            .await
            .unwrap();

        let err = push_draft(&drafts, &gateway, &draft.id, true).await.unwrap_err();
        assert!(err.to_string().contains("drafts unlink"));

        drafts.unlink_drive_file(&draft.id).await.unwrap();
        let pushed = push_draft(&drafts, &gateway, &draft.id, true).await.unwrap();
        assert!(matches!(pushed, Pushed::Created { .. }));
    }

    #[test]
    fn test_parse_drafts_unlink() {
        let cli = Cli::try_parse_from(["letterdesk", "drafts", "unlink", "d1"]).unwrap();
        assert!(matches!(cli.command, Commands::Drafts(DraftsCommand::Unlink { id }) if id == "d1"));
    }

    #[test]
    fn test_body_required() {
        let body = BodyArgs {
            content: None,
            file: None,
        };
        assert!(body.read().is_err());
    }
}
