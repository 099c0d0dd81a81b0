use clap::{Parser, Subcommand};
use reqwest::Url;
use std::net::SocketAddr;
use std::path::PathBuf;

use kachi_push::adapters::{HttpError, HttpPushServer};
use kachi_push::config::ClientConfig;
use kachi_push::permission::NotificationPermission;
use kachi_push::profile::{PermissionPrompt, Permissions, ProfileError, ProfilePlatform};
use kachi_push::push::keys::KeyError;
use kachi_push::push::{ApplicationServerKey, PushError, SubscriptionManager};
use kachi_push::settings::{ControllerError, SettingsController, SettingsView};
use kachi_push::types::push::{Category, PushType};

const DEFAULT_SERVER_URL: &str = "https://kachiclash.com/";
const DEFAULT_PROFILE: &str = "kachi-profile.toml";

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Listen(ClientConfig),
    Exit(i32),
}

pub(crate) async fn run() -> RunOutcome {
    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    match cli.command {
        Command::Listen => RunOutcome::Listen(config),
        command => match execute(command, &config).await {
            Ok(()) => RunOutcome::Exit(0),
            Err(err) => {
                eprintln!("error: {err}");
                RunOutcome::Exit(1)
            }
        },
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "kachi-push",
    version,
    about = "Push notification client for Kachi Clash"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[arg(long, env = "KACHI_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,
    #[arg(long, env = "KACHI_PROFILE", default_value = DEFAULT_PROFILE)]
    profile: PathBuf,
    #[arg(long, env = "KACHI_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "KACHI_SESSION_COOKIE")]
    session_cookie: Option<String>,
    /// Public base of this host's push receiver; defaults to the listen address.
    #[arg(long, env = "KACHI_PUSH_ENDPOINT")]
    push_endpoint: Option<String>,
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
    /// Answer the notification permission prompt with "allow".
    #[arg(long)]
    assume_yes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the reconciled notification permission.
    Permission,
    /// Refresh and print the subscription state.
    Status,
    /// Subscribe to the given notification categories.
    Subscribe {
        #[arg(required = true)]
        categories: Vec<String>,
    },
    Unsubscribe,
    /// Ask the server for a test notification.
    Test,
    /// Ask the server to send a push, e.g. '{"EntriesOpen":"202501"}'.
    Trigger { push_type: String },
    Grant,
    Deny,
    /// Forget any permission decision.
    Reset,
    /// Run the worker host that receives pushes for this profile.
    Listen,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Push(#[from] PushError),
    #[error(transparent)]
    Settings(#[from] ControllerError),
    #[error("the server page has no vapid-public-key meta tag; pass --vapid-public-key")]
    MissingKey,
    #[error("invalid push type: {0}")]
    InvalidPushType(#[from] serde_json::Error),
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig, String> {
    let server_url = Url::parse(cli.server.trim())
        .map_err(|err| format!("invalid server url '{}': {err}", cli.server))?;
    if !matches!(server_url.scheme(), "http" | "https") {
        return Err(format!("server url must be http or https: {server_url}"));
    }

    let vapid_public_key = cli
        .vapid_public_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string);
    let session_cookie = cli
        .session_cookie
        .as_deref()
        .map(str::trim)
        .filter(|cookie| !cookie.is_empty())
        .map(str::to_string);

    let push_endpoint = match cli.push_endpoint.as_deref().map(str::trim) {
        Some("") => return Err("push endpoint cannot be empty".to_string()),
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("http://{}/push", cli.listen),
    };

    Ok(ClientConfig {
        server_url,
        profile_path: cli.profile.clone(),
        vapid_public_key,
        session_cookie,
        push_endpoint,
        listen_addr: cli.listen,
        prompt: if cli.assume_yes {
            PermissionPrompt::Grant
        } else {
            PermissionPrompt::Ask
        },
    })
}

fn parse_push_type(raw: &str) -> Result<PushType, CliError> {
    Ok(serde_json::from_str(raw.trim())?)
}

fn load_profile(config: &ClientConfig) -> Result<ProfilePlatform, ProfileError> {
    ProfilePlatform::load(&config.profile_path, &config.push_endpoint, config.prompt)
}

async fn resolve_application_key(
    config: &ClientConfig,
    server: &HttpPushServer,
) -> Result<ApplicationServerKey, CliError> {
    match config.vapid_public_key.as_deref() {
        Some(raw) => Ok(ApplicationServerKey::parse(raw)?),
        None => server
            .fetch_application_key()
            .await?
            .ok_or(CliError::MissingKey),
    }
}

async fn execute(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let profile = load_profile(config)?;
    let decision = match command {
        Command::Grant => Some(Permissions::decided(NotificationPermission::Granted)),
        Command::Deny => Some(Permissions::decided(NotificationPermission::Denied)),
        Command::Reset => Some(Permissions::default()),
        _ => None,
    };
    if let Some(permissions) = decision {
        profile.set_permissions(permissions)?;
        println!("notification permission: {:?}", permissions.notification);
        return Ok(());
    }

    let server = HttpPushServer::new(config.server_url.clone(), config.session_cookie.clone())?;
    let key = resolve_application_key(config, &server).await?;
    let manager = SubscriptionManager::new(profile, server, key);

    match command {
        Command::Permission => {
            println!("{}", manager.permission_state().await);
        }
        Command::Trigger { push_type } => {
            let push_type = parse_push_type(&push_type)?;
            let stats = manager.trigger(&push_type).await?;
            println!("{stats}");
        }
        command => {
            let settings = SettingsController::new(manager);
            let outcome = run_settings(&settings, command).await;
            print_view(&settings.view());
            outcome?;
        }
    }
    Ok(())
}

async fn run_settings(
    settings: &SettingsController<ProfilePlatform, HttpPushServer>,
    command: Command,
) -> Result<(), ControllerError> {
    match command {
        Command::Status => {
            settings.refresh().await?;
        }
        Command::Subscribe { categories } => {
            let categories: Vec<Category> = categories.iter().map(Category::new).collect();
            settings.save(&categories).await?;
        }
        Command::Unsubscribe => {
            settings.save(&[]).await?;
        }
        Command::Test => {
            settings.refresh().await?;
            settings.send_test().await?;
        }
        _ => {}
    }
    Ok(())
}

fn print_view(view: &SettingsView) {
    if let Some(permission) = view.permission {
        println!("permission: {permission}");
    }
    match &view.subscription {
        Some(state) => {
            let opt_in: Vec<&str> = state.opt_in.iter().map(Category::as_str).collect();
            println!("subscribed: {}", opt_in.join(", "));
        }
        None => println!("subscribed: no"),
    }
    if let Some(message) = &view.message {
        if message.is_error {
            eprintln!("{}", message.text);
        } else {
            println!("{}", message.text);
        }
    }
}
