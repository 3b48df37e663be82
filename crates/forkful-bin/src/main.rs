//! Forkful CLI - log in to the delivery API and manage the stored session.

mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Forkful CLI - authenticate against the delivery API.
#[derive(Parser)]
#[command(name = "forkful")]
#[command(about = "Forkful CLI for authentication and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "FORKFUL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Login with email and password, or resume an MFA challenge with --otp
    Login(LoginArgs),

    /// Login by running the password grant inside a browser script
    LoginBrowser(BrowserLoginArgs),

    /// Refresh the access token
    Refresh {
        /// OAuth client id (defaults to the one used at login)
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Check authentication status
    Status,

    /// Logout and clear session
    Logout,

    /// Resolve the OAuth client secret
    Secret {
        /// Ignore config, environment, and cache and fetch anew
        #[arg(long)]
        refetch: bool,

        /// OAuth client id
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Import cookies for the API host
    Cookies {
        #[command(subcommand)]
        command: CookieCommands,
    },

    /// Import an externally obtained session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show configuration (secrets masked)
    Show,
    /// Set configuration values
    Set(ConfigSetArgs),
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,
    /// Target country ISO code
    #[arg(long)]
    pub country: Option<String>,
    /// Device id sent with every grant
    #[arg(long)]
    pub device_id: Option<String>,
    /// Explicit client secret (empty string clears it)
    #[arg(long)]
    pub client_secret: Option<String>,
    /// OAuth client id
    #[arg(long)]
    pub client_id: Option<String>,
    /// User agent override (empty string clears it)
    #[arg(long)]
    pub user_agent: Option<String>,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: Option<String>,
    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
    /// OAuth client id
    #[arg(long)]
    pub client_id: Option<String>,
    /// One-time passcode for a pending MFA challenge
    #[arg(long)]
    pub otp: Option<String>,
    /// OTP delivery method (defaults to the challenge's channel)
    #[arg(long)]
    pub otp_method: Option<String>,
    /// Prompt for the OTP right away instead of exiting on a challenge
    #[arg(long)]
    pub wait_for_otp: bool,
}

#[derive(Args)]
pub struct BrowserLoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,
    /// Browser automation script
    #[arg(long)]
    pub script: PathBuf,
    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
    /// OAuth client id
    #[arg(long)]
    pub client_id: Option<String>,
    /// One-time passcode for a pending MFA challenge
    #[arg(long)]
    pub otp: Option<String>,
    /// OTP delivery method
    #[arg(long)]
    pub otp_method: Option<String>,
    /// Interpreter for the script
    #[arg(long, default_value = session_importer::DEFAULT_PROGRAM)]
    pub program: String,
    /// Script timeout in seconds
    #[arg(long, default_value = "120")]
    pub timeout_secs: u64,
}

#[derive(Subcommand)]
enum CookieCommands {
    /// Store a cookie header copied from a browser
    Import {
        /// Raw Cookie header value
        #[arg(long)]
        header: String,
        /// User agent of the browser the cookies came from
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Read cookies from a local Chrome profile via a script
    Chrome {
        /// Cookie extraction script
        #[arg(long)]
        script: PathBuf,
        /// Site to read cookies for (defaults to the API base URL)
        #[arg(long)]
        url: Option<String>,
        /// Browser profile name
        #[arg(long)]
        profile: Option<String>,
        /// Interpreter for the script
        #[arg(long, default_value = session_importer::DEFAULT_PROGRAM)]
        program: String,
        /// Script timeout in seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
        /// npm used to install the script's dependencies
        #[arg(long, default_value = session_importer::DEFAULT_NPM)]
        npm: String,
        /// Skip installing the script's npm dependencies
        #[arg(long)]
        no_install: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Import cookies and/or a bearer token as the current session
    Import {
        /// Raw Cookie header value
        #[arg(long)]
        cookie_header: Option<String>,
        /// Access token, with or without a "Bearer " prefix
        #[arg(long)]
        bearer: Option<String>,
        /// User agent of the browser the session came from
        #[arg(long)]
        user_agent: Option<String>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let mut ctx = commands::Context::load(cli.config.as_deref(), format)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            trigger.cancel();
        }
    });

    let result = match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_show(&ctx),
            ConfigCommands::Set(args) => commands::config_set(&mut ctx, args),
        },
        Commands::Login(args) => commands::login(&mut ctx, args, &cancel).await,
        Commands::LoginBrowser(args) => commands::login_browser(&mut ctx, args, &cancel).await,
        Commands::Refresh { client_id } => {
            commands::refresh(&mut ctx, client_id.as_deref(), &cancel).await
        }
        Commands::Status => commands::status(&ctx),
        Commands::Logout => commands::logout(&mut ctx),
        Commands::Secret { refetch, client_id } => {
            commands::secret(&mut ctx, refetch, client_id.as_deref(), &cancel).await
        }
        Commands::Cookies { command } => match command {
            CookieCommands::Import { header, user_agent } => {
                commands::cookies_import(&mut ctx, &header, user_agent.as_deref())
            }
            CookieCommands::Chrome {
                script,
                url,
                profile,
                program,
                timeout_secs,
                npm,
                no_install,
            } => {
                commands::cookies_chrome(
                    &mut ctx,
                    commands::ScriptArgs {
                        script,
                        program,
                        timeout_secs,
                        project: (!no_install)
                            .then(|| session_importer::NpmProject::chrome_cookies().with_npm(npm)),
                    },
                    url.as_deref(),
                    profile.as_deref(),
                    &cancel,
                )
                .await
            }
        },
        Commands::Session { command } => match command {
            SessionCommands::Import {
                cookie_header,
                bearer,
                user_agent,
            } => commands::session_import(
                &mut ctx,
                cookie_header.as_deref(),
                bearer.as_deref(),
                user_agent.as_deref(),
            ),
        },
    };

    // Flush even after a failure: a consumed MFA challenge must stay cleared
    let flushed = ctx.flush();
    result.and(flushed)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    forkful_config_and_utils::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
