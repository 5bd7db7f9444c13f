//! kubelogin-pop: Kubernetes exec credential plugin with PoP token support
//!
//! Prints a client-go `ExecCredential` on stdout; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kubelogin_pop::exec::{requested_api_version, ExecCredential, EXEC_INFO_ENV};
use kubelogin_pop::{get_token, KeySource, Options};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubelogin-pop")]
#[command(about = "Kubernetes credential plugin for Entra ID with PoP token support")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a token and print it as an ExecCredential
    GetToken(GetTokenArgs),
}

#[derive(Args, Debug)]
struct GetTokenArgs {
    /// YAML file with default options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Login method
    #[arg(short = 'l', long = "login")]
    login_method: Option<String>,

    /// Service principal client ID
    #[arg(long)]
    client_id: Option<String>,

    /// Service principal client secret
    #[arg(long)]
    client_secret: Option<String>,

    /// PEM file with the client certificate and private key
    #[arg(long)]
    client_certificate: Option<String>,

    #[arg(long)]
    client_certificate_password: Option<String>,

    /// Entra ID tenant
    #[arg(short = 't', long)]
    tenant_id: Option<String>,

    /// Application ID of the cluster's API server
    #[arg(long)]
    server_id: Option<String>,

    /// Cloud name, e.g. AzurePublicCloud or AzureChinaCloud
    #[arg(short = 'e', long)]
    environment: Option<String>,

    /// Identity provider base URL, ending with /
    #[arg(long)]
    authority_host: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Request a PoP token instead of a bearer token
    #[arg(long)]
    pop_enabled: bool,

    /// PoP claims, e.g. u=<ARM ID of the cluster>
    #[arg(long)]
    pop_claims: Option<String>,

    /// Where the PoP signing key comes from
    #[arg(long, value_enum)]
    pop_key_source: Option<KeySource>,

    /// Read credentials from ARM_* variables
    #[arg(long = "use-azurerm-env-vars")]
    use_azurerm_terraform_env: bool,

    /// Ignore credentials from the environment
    #[arg(long)]
    disable_environment_override: bool,

    /// Use the conventional token endpoint instead of OpenID discovery
    #[arg(long)]
    disable_instance_discovery: bool,

    /// Directory for the authentication record
    #[arg(long = "token-cache-dir")]
    auth_record_cache_dir: Option<PathBuf>,
}

impl GetTokenArgs {
    fn into_options(self) -> anyhow::Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => Options::new(),
        };

        let overrides = [
            (self.login_method, &mut options.login_method),
            (self.client_id, &mut options.client_id),
            (self.client_secret, &mut options.client_secret),
            (self.client_certificate, &mut options.client_cert),
            (
                self.client_certificate_password,
                &mut options.client_cert_password,
            ),
            (self.tenant_id, &mut options.tenant_id),
            (self.server_id, &mut options.server_id),
            (self.environment, &mut options.environment),
            (self.authority_host, &mut options.authority_host),
            (self.pop_claims, &mut options.pop_token_claims),
        ];
        for (flag, field) in overrides {
            if let Some(value) = flag {
                *field = value;
            }
        }

        if let Some(secs) = self.timeout {
            options.timeout = Duration::from_secs(secs);
        }
        if let Some(source) = self.pop_key_source {
            options.pop_key_source = source;
        }
        if let Some(dir) = self.auth_record_cache_dir {
            options.auth_record_cache_dir = dir;
        }
        options.is_pop_token_enabled |= self.pop_enabled;
        options.use_azurerm_terraform_env |= self.use_azurerm_terraform_env;
        options.disable_environment_override |= self.disable_environment_override;
        options.disable_instance_discovery |= self.disable_instance_discovery;

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the credential, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GetToken(args) => run_get_token(args).await,
    }
}

async fn run_get_token(args: GetTokenArgs) -> anyhow::Result<()> {
    let mut options = args.into_options()?;
    options.update_from_env();
    options.validate()?;
    debug!(login = %options.login_method, pop = options.is_pop_token_enabled, "Options validated");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling token request");
            on_interrupt.cancel();
        }
    });

    let acquired = get_token(&options, &cancel).await?;

    let exec_info = std::env::var(EXEC_INFO_ENV).ok();
    let credential = ExecCredential::new(
        requested_api_version(exec_info.as_deref()),
        acquired.token,
        acquired.expires_on,
    );

    println!("{}", serde_json::to_string_pretty(&credential)?);
    Ok(())
}
