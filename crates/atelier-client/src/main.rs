use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use atelier_client::commands::files::{self, UploadProgress, UploadRequest};
use atelier_client::commands::messaging::{self, AttachmentUpload};
use atelier_client::commands::{profile, wallet};
use atelier_client::config::ClientConfig;
use atelier_client::state::{lock, AppState, SharedState};
use atelier_client::tree::{self, ExpansionState};
use atelier_client::{init_tracing, ClientError};
use atelier_shared::format::{format_cents, parse_amount};
use atelier_shared::types::{ConversationId, FileId, UserId};

#[derive(Parser)]
#[command(author, version, about = "Atelier workspace: files, messages and wallet")]
struct Cli {
    /// Sign in as this email before running the command
    #[arg(long = "as", global = true, value_name = "EMAIL")]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage user profiles
    #[command(subcommand)]
    User(UserCommand),
    /// Browse and manage files and folders
    #[command(subcommand)]
    Files(FilesCommand),
    /// Conversations and messages
    #[command(subcommand)]
    Chat(ChatCommand),
    /// Balance, deposits and gems
    #[command(subcommand)]
    Wallet(WalletCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a profile
    Register { email: String, display_name: String },
    /// Set the signed-in user's avatar from an image file
    Avatar {
        path: PathBuf,
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Subcommand)]
enum FilesCommand {
    /// List a folder (the root by default)
    Ls {
        #[arg(long)]
        folder: Option<FileId>,
    },
    /// Print the whole folder tree
    Tree,
    /// Create a folder
    Mkdir {
        name: String,
        #[arg(long)]
        parent: Option<FileId>,
    },
    /// Upload a local file
    Upload {
        path: PathBuf,
        #[arg(long)]
        folder: Option<FileId>,
        #[arg(long)]
        mime: Option<String>,
    },
    /// Save a file's contents to a local path
    Download { id: FileId, out: PathBuf },
    /// Delete a file or a folder with everything in it
    Rm { id: FileId },
    /// Move an item into a folder (the root when --to is omitted)
    Mv {
        id: FileId,
        #[arg(long)]
        to: Option<FileId>,
    },
    Rename { id: FileId, name: String },
    /// Toggle the star on an item
    Star { id: FileId },
    Starred,
    Search { query: String },
}

#[derive(Subcommand)]
enum ChatCommand {
    /// List conversations
    Ls,
    /// Show a conversation's messages and mark them read
    Open { id: ConversationId },
    Send(SendArgs),
    /// Start a conversation with the given users
    New {
        #[arg(required = true, value_name = "EMAIL")]
        with: Vec<String>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Toggle the pin on a conversation
    Pin { id: ConversationId },
}

#[derive(Args)]
struct SendArgs {
    id: ConversationId,
    #[arg(default_value = "")]
    message: String,
    /// Files to attach
    #[arg(long = "attach", value_name = "PATH")]
    attachments: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum WalletCommand {
    Show,
    /// Add funds, e.g. `50` or `12.50`
    Deposit {
        #[arg(value_parser = parse_amount)]
        amount: i64,
    },
    Withdraw {
        #[arg(value_parser = parse_amount)]
        amount: i64,
    },
    /// Buy gems
    Gems {
        count: i64,
        #[arg(long, value_parser = parse_amount, default_value = "1.00")]
        price: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = ClientConfig::from_env();
    let state = AppState::open(config)
        .await
        .context("failed to open local storage")?
        .into_shared();

    if let Some(email) = &cli.as_user {
        let guard = lock(&state)?;
        if let Err(e) = guard.session.sign_in(&guard.database, email) {
            return Ok(report(e));
        }
    }

    let outcome = match cli.command {
        Command::User(cmd) => run_user(&state, cmd).await,
        Command::Files(cmd) => run_files(&state, cmd).await,
        Command::Chat(cmd) => run_chat(&state, cmd).await,
        Command::Wallet(cmd) => run_wallet(&state, cmd),
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    })
}

fn report(err: ClientError) -> ExitCode {
    tracing::error!(error = ?err, "command failed");
    eprintln!("{}", err.user_message());
    ExitCode::FAILURE
}

async fn run_user(state: &SharedState, cmd: UserCommand) -> Result<(), ClientError> {
    match cmd {
        UserCommand::Register {
            email,
            display_name,
        } => {
            let profile = profile::register(state, &email, &display_name)?;
            println!("{}  {} <{}>", profile.id, profile.display_name, profile.email);
        }
        UserCommand::Avatar { path, mime } => {
            let data = tokio::fs::read(&path).await.map_err(atelier_store::StoreError::from)?;
            let name = file_name(&path);
            let profile = profile::upload_avatar(state, &name, data, mime.as_deref()).await?;
            println!("{}", profile.avatar_url.unwrap_or_default());
        }
    }
    Ok(())
}

async fn run_files(state: &SharedState, cmd: FilesCommand) -> Result<(), ClientError> {
    match cmd {
        FilesCommand::Ls { folder } => {
            if let Some(folder) = folder {
                let crumbs: Vec<String> = files::folder_path(state, folder)?
                    .into_iter()
                    .map(|(_, name)| name)
                    .collect();
                println!("/{}", crumbs.join("/"));
            }
            print_items(&files::fetch_files(state, folder)?);
        }
        FilesCommand::Tree => {
            let forest = files::fetch_tree(state)?;
            let mut expansion = ExpansionState::new();
            expansion.expand_all(&flatten(&forest));
            for (depth, item) in tree::visible_rows(&forest, &expansion) {
                println!("{}{}  {}", "  ".repeat(depth), item.name, item.id);
            }
        }
        FilesCommand::Mkdir { name, parent } => {
            let folder = files::create_folder(state, &name, parent)?;
            println!("{}", folder.id);
        }
        FilesCommand::Upload { path, folder, mime } => {
            let data = tokio::fs::read(&path).await.map_err(atelier_store::StoreError::from)?;
            let name = file_name(&path);

            let (progress, mut rx) = UploadProgress::channel();
            let printer = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let pct = *rx.borrow_and_update();
                    eprint!("\ruploading... {pct:>3}%");
                }
            });

            let result = files::upload_file(
                state,
                UploadRequest {
                    name,
                    data,
                    folder_id: folder,
                    mime_type: mime,
                },
                Some(progress),
            )
            .await;
            let _ = printer.await;
            eprintln!();

            let item = result?;
            println!("{}  {}  {}", item.id, item.name, item.size);
        }
        FilesCommand::Download { id, out } => {
            let data = files::download_file(state, id).await?;
            tokio::fs::write(&out, &data)
                .await
                .map_err(atelier_store::StoreError::from)?;
            println!("wrote {} bytes to {}", data.len(), out.display());
        }
        FilesCommand::Rm { id } => {
            let removed = files::delete_item(state, id).await?;
            println!("removed {removed} item(s)");
        }
        FilesCommand::Mv { id, to } => {
            let item = files::move_item(state, id, to)?;
            println!("moved {}", item.name);
        }
        FilesCommand::Rename { id, name } => {
            let item = files::rename_item(state, id, &name)?;
            println!("renamed to {}", item.name);
        }
        FilesCommand::Star { id } => {
            let starred = files::toggle_star(state, id)?;
            println!("{}", if starred { "starred" } else { "unstarred" });
        }
        FilesCommand::Starred => print_items(&files::list_starred(state)?),
        FilesCommand::Search { query } => print_items(&files::search_files(state, &query)?),
    }
    Ok(())
}

async fn run_chat(state: &SharedState, cmd: ChatCommand) -> Result<(), ClientError> {
    match cmd {
        ChatCommand::Ls => {
            for conv in messaging::list_conversations(state)? {
                let who: Vec<&str> = conv
                    .participants
                    .iter()
                    .map(|p| p.display_name.as_str())
                    .collect();
                let label = conv.title.clone().unwrap_or_else(|| who.join(", "));
                let pin = if conv.is_pinned { "*" } else { " " };
                let preview = conv
                    .last_message
                    .map(|m| m.content)
                    .unwrap_or_default();
                println!("{pin} {}  {label} ({} unread)  {preview}", conv.id, conv.unread_count);
            }
        }
        ChatCommand::Open { id } => {
            for msg in messaging::open_conversation(state, id)? {
                println!(
                    "[{}] {}: {}",
                    msg.created_at.format("%Y-%m-%d %H:%M"),
                    msg.sender_name,
                    msg.content
                );
                for file in msg.attachments {
                    println!("    + {} ({})  {}", file.file_name, file.size, file.url);
                }
            }
        }
        ChatCommand::Send(args) => {
            let mut attachments = Vec::with_capacity(args.attachments.len());
            for path in &args.attachments {
                let data = tokio::fs::read(path).await.map_err(atelier_store::StoreError::from)?;
                attachments.push(AttachmentUpload {
                    name: file_name(path),
                    data,
                    mime_type: None,
                });
            }
            let msg = messaging::send_message(state, args.id, &args.message, attachments).await?;
            println!("{}", msg.id);
        }
        ChatCommand::New { with, title } => {
            let ids = resolve_users(state, &with)?;
            let result = messaging::create_conversation(state, &ids, title.as_deref())?;
            if result.is_existing {
                println!("{} (existing)", result.conversation_id);
            } else {
                println!("{}", result.conversation_id);
            }
        }
        ChatCommand::Pin { id } => {
            let pinned = messaging::toggle_pin(state, id)?;
            println!("{}", if pinned { "pinned" } else { "unpinned" });
        }
    }
    Ok(())
}

fn run_wallet(state: &SharedState, cmd: WalletCommand) -> Result<(), ClientError> {
    let result = match cmd {
        WalletCommand::Show => {
            let view = wallet::fetch_wallet(state)?;
            println!("balance {}  gems {}", format_cents(view.balance), view.gems);
            for tx in view.transactions {
                println!(
                    "  {}  {:<12} {:>10}  {}",
                    tx.created_at.format("%Y-%m-%d"),
                    tx.kind,
                    format_cents(tx.amount_cents),
                    tx.description
                );
            }
            return Ok(());
        }
        WalletCommand::Deposit { amount } => wallet::add_funds(state, amount)?,
        WalletCommand::Withdraw { amount } => wallet::withdraw_funds(state, amount)?,
        WalletCommand::Gems { count, price } => wallet::purchase_gems(state, count, price)?,
    };
    println!("balance {}  gems {}", format_cents(result.balance), result.gems);
    Ok(())
}

fn resolve_users(state: &SharedState, emails: &[String]) -> Result<Vec<UserId>, ClientError> {
    let guard = lock(state)?;
    emails
        .iter()
        .map(|email| {
            let email = profile::normalize_email(email)?;
            guard
                .database
                .get_profile_by_email(&email)?
                .map(|p| p.id)
                .ok_or(ClientError::NotFound("profile"))
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_items(items: &[files::FileItem]) {
    for item in items {
        let star = if item.starred { "*" } else { " " };
        println!("{star} {}  {:<10} {:>9}  {}", item.id, item.kind, item.size, item.name);
    }
}

fn flatten(forest: &[files::FileItem]) -> Vec<&files::FileItem> {
    let mut out = Vec::new();
    let mut stack: Vec<&files::FileItem> = forest.iter().collect();
    while let Some(item) = stack.pop() {
        out.push(item);
        if let Some(children) = &item.children {
            stack.extend(children.iter());
        }
    }
    out
}
