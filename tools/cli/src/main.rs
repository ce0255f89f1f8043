//! `bw` - command line client for a remote password vault.
//!
//! Every invocation resolves the data directory, wires the services, runs
//! the startup sequence and then dispatches one command.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use bwcli_app::{Collaborators, SessionOrchestrator};
use bwcli_common::{Error, Platform, ProcessPlatform, SESSION_ENV_VAR};
use bwcli_services::{AuthStatus, EnvironmentUrls, PasswordGenerationOptions};

/// Set to `true` to log at debug level without `--verbose`.
const DEBUG_ENV_VAR: &str = "BITWARDENCLI_DEBUG";

#[derive(Parser)]
#[command(name = "bw")]
#[command(about = "Bitwarden command line vault client")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a user account.
    Login {
        /// Account email. Prompted for when omitted.
        email: Option<String>,

        /// Read the master password from this environment variable.
        #[arg(long)]
        passwordenv: Option<String>,

        /// Print only the session key.
        #[arg(long)]
        raw: bool,
    },

    /// Unlock the vault and return a new session key.
    Unlock {
        #[arg(long)]
        passwordenv: Option<String>,

        #[arg(long)]
        raw: bool,
    },

    /// Lock the vault and destroy the active session key.
    Lock,

    /// Log out of the current user account.
    Logout,

    /// Pull the latest vault data from the server.
    Sync {
        /// Sync even if the vault was synced recently.
        #[arg(short, long)]
        force: bool,

        /// Print the time of the last sync instead of syncing.
        #[arg(long)]
        last: bool,
    },

    /// Show login and lock state as JSON.
    Status,

    /// Configure CLI settings.
    Config {
        #[command(subcommand)]
        setting: ConfigSetting,
    },

    /// Generate a password.
    Generate {
        #[arg(long)]
        length: Option<usize>,

        /// Include uppercase characters.
        #[arg(short, long)]
        uppercase: bool,

        /// Include lowercase characters.
        #[arg(short, long)]
        lowercase: bool,

        /// Include numbers.
        #[arg(short, long)]
        number: bool,

        /// Include special characters.
        #[arg(short, long)]
        special: bool,
    },
}

#[derive(Subcommand)]
enum ConfigSetting {
    /// Show or set the server URL. `default` restores the cloud server.
    Server { url: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let platform = Arc::new(ProcessPlatform::new(env!("CARGO_PKG_VERSION")));

    let debug_env = platform.env_var(DEBUG_ENV_VAR).as_deref() == Some("true");
    let level = if cli.verbose || debug_env {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let collaborators = Collaborators::for_process(platform)?;
    let app = SessionOrchestrator::build(collaborators);
    app.init().await.context("Failed to initialize")?;

    match cli.command {
        Commands::Login {
            email,
            passwordenv,
            raw,
        } => cmd_login(&app, email, passwordenv.as_deref(), raw).await,
        Commands::Unlock { passwordenv, raw } => {
            cmd_unlock(&app, passwordenv.as_deref(), raw).await
        }
        Commands::Lock => cmd_lock(&app).await,
        Commands::Logout => cmd_logout(&app).await,
        Commands::Sync { force, last } => cmd_sync(&app, force, last).await,
        Commands::Status => cmd_status(&app).await,
        Commands::Config {
            setting: ConfigSetting::Server { url },
        } => cmd_config_server(&app, url).await,
        Commands::Generate {
            length,
            uppercase,
            lowercase,
            number,
            special,
        } => {
            let sets = (uppercase, lowercase, number, special);
            cmd_generate(&app, length, sets).await
        }
    }
}

/// Master password from `env_var` if given, else from the terminal.
fn read_password(env_var: Option<&str>) -> Result<Zeroizing<String>> {
    if let Some(var) = env_var {
        let value = std::env::var(var).with_context(|| format!("{} is not set", var))?;
        return Ok(Zeroizing::new(value));
    }
    let password =
        rpassword::prompt_password("Master password: ").context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn print_session(app: &SessionOrchestrator, headline: &str, session: &str, raw: bool) {
    if raw {
        println!("{}", session);
        return;
    }
    let i18n = &app.services().i18n;
    println!("{}", headline);
    println!();
    println!("{}", i18n.t("sessionKeyHint"));
    println!("$ export {}=\"{}\"", SESSION_ENV_VAR, session);
}

async fn cmd_login(
    app: &SessionOrchestrator,
    email: Option<String>,
    passwordenv: Option<&str>,
    raw: bool,
) -> Result<()> {
    let s = app.services();
    if s.user.is_authenticated().await? {
        let current = s.user.get_email().await?.unwrap_or_default();
        bail!(s.i18n.t_with("alreadyLoggedIn", &current));
    }

    let email = match email {
        Some(email) => email,
        None => read_line("Email address: ")?,
    };
    let password = read_password(passwordenv)?;

    let session = s
        .auth
        .log_in(&email, &password)
        .await
        .context("Login failed")?;
    print_session(app, &s.i18n.t("loggedIn"), &session, raw);
    Ok(())
}

async fn cmd_unlock(app: &SessionOrchestrator, passwordenv: Option<&str>, raw: bool) -> Result<()> {
    let s = app.services();
    if s.auth.status().await? == AuthStatus::Unauthenticated {
        bail!(s.i18n.t("notLoggedIn"));
    }

    let password = read_password(passwordenv)?;
    let session = s.auth.unlock(&password).await.context("Unlock failed")?;
    print_session(app, &s.i18n.t("unlocked"), &session, raw);
    Ok(())
}

async fn cmd_lock(app: &SessionOrchestrator) -> Result<()> {
    let s = app.services();
    s.auth.lock().await?;
    println!("{}", s.i18n.t("locked"));
    Ok(())
}

async fn cmd_logout(app: &SessionOrchestrator) -> Result<()> {
    let s = app.services();
    if !s.user.is_authenticated().await? {
        bail!(s.i18n.t("notLoggedIn"));
    }
    app.logout().await?;
    println!("{}", s.i18n.t("loggedOut"));
    Ok(())
}

async fn cmd_sync(app: &SessionOrchestrator, force: bool, last: bool) -> Result<()> {
    let s = app.services();
    if last {
        if let Some(at) = s.sync.get_last_sync().await? {
            println!("{}", at.to_rfc3339());
        }
        return Ok(());
    }

    match s.sync.full_sync(force).await {
        Ok(synced) => {
            debug!(synced, "Sync finished");
            println!("{}", s.i18n.t("syncComplete"));
            Ok(())
        }
        Err(Error::SessionExpired) => bail!("Session expired, you have been logged out"),
        Err(e) => Err(e).context("Sync failed"),
    }
}

async fn cmd_status(app: &SessionOrchestrator) -> Result<()> {
    let s = app.services();
    let status = s.auth.status().await?;
    let status_json = serde_json::json!({
        "serverUrl": s.environment.urls().await.base,
        "lastSync": s.sync.get_last_sync().await?.map(|t| t.to_rfc3339()),
        "userEmail": s.user.get_email().await?,
        "userId": s.user.get_user_id().await?.map(|id| id.to_string()),
        "status": status.to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&status_json)?);
    Ok(())
}

async fn cmd_config_server(app: &SessionOrchestrator, url: Option<String>) -> Result<()> {
    let s = app.services();
    let Some(url) = url else {
        println!("{}", s.environment.web_vault_url().await);
        return Ok(());
    };

    if s.user.is_authenticated().await? {
        bail!(s.i18n.t("logoutRequired"));
    }

    let urls = if url == "default" || url == "bitwarden.com" {
        EnvironmentUrls::default()
    } else {
        EnvironmentUrls::self_hosted(url)
    };
    s.environment
        .set_urls(urls)
        .await
        .context("Invalid server URL")?;
    println!("{}", s.i18n.t("serverSaved"));
    Ok(())
}

async fn cmd_generate(
    app: &SessionOrchestrator,
    length: Option<usize>,
    (uppercase, lowercase, number, special): (bool, bool, bool, bool),
) -> Result<()> {
    let generator = &app.services().password_generation;
    let saved = generator.get_options().await?;

    // Explicit character set flags replace the saved selection.
    let mut options = if uppercase || lowercase || number || special {
        PasswordGenerationOptions {
            uppercase,
            lowercase,
            number,
            special,
            ..saved
        }
    } else {
        saved
    };
    if let Some(length) = length {
        options.length = length;
    }
    generator.enforce_policies(&mut options).await?;

    let password = Zeroizing::new(generator.generate(&options).await?);
    println!("{}", password.as_str());
    Ok(())
}
