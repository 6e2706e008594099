use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mdbrowse::auth::hash_password;
use mdbrowse::config::ServerConfig;
use mdbrowse::server::{AppState, create_router};
use mdbrowse::store::{SqliteStore, Store};
use mdbrowse::types::{Role, User};

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[derive(Parser)]
#[command(name = "mdbrowse")]
#[command(about = "A versioned markdown document server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "3001")]
        port: u16,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin account)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn run_init(data_dir: String, non_interactive: bool) -> anyhow::Result<()> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let db_path = data_path.join("mdbrowse.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let password_file = data_path.join(".admin_password");

    if store.count_admins()? > 0 {
        bail!(
            "Server already initialized. Admin credentials were written to: {}",
            password_file.display()
        );
    }

    let (username, password) = if non_interactive {
        ("admin".to_string(), generate_password())
    } else {
        prompt_admin_credentials()?
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        password_hash: hash_password(&password)?,
        role: Role::Admin,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    fs::write(&password_file, format!("{username}:{password}\n"))?;

    #[cfg(unix)]
    set_restrictive_permissions(&password_file);

    println!();
    println!("========================================");
    println!("Admin account created (save this, it won't be shown again):");
    println!();
    println!("  username: {username}");
    println!("  password: {password}");
    println!();
    println!("Credentials also written to: {}", password_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn prompt_admin_credentials() -> anyhow::Result<(String, String)> {
    let username = inquire::Text::new("Admin username:")
        .with_default("admin")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Username cannot be empty".into())
            } else if input.contains(char::is_whitespace) {
                Err("Username cannot contain whitespace".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let password = inquire::Password::new("Admin password (blank to generate):")
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;

    let password = if password.trim().is_empty() {
        generate_password()
    } else {
        password
    };

    Ok((username, password))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mdbrowse=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                run_init(data_dir, non_interactive)?;
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
            };

            let store = SqliteStore::new(config.db_path())?;
            store.initialize()?;
            if store.count_admins()? == 0 {
                bail!(
                    "Server not initialized. Run 'mdbrowse admin init' first to create the database and admin account."
                );
            }

            let state = Arc::new(AppState::new(Arc::new(store)));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
