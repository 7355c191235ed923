//! gpgkms: OpenPGP keys protected by Cloud KMS envelope encryption
//!
//! Commands:
//!   generate      - new keypair; passphrase enveloped under the KEK; both stored in Secret Manager
//!   decrypt       - fetch key + passphrase, unveil, decrypt a file to disk or a bucket
//!   config show   - display the merged configuration

mod cli;
mod resolve;

use anyhow::Context;
use clap::Parser;
use gpgkms_core::config::GpgKmsConfig;
use gpgkms_core::{ErrorKind, GpgKmsError, OutputTarget};
use gpgkms_crypto::{GpgAgentCache, GpgDecryptor, GpgKeyPairProvider};
use gpgkms_secrets::{find_access_token, AccessToken, CloudKms, SecretManager};
use gpgkms_storage::{build_gcs_operator, sink_for, BucketConfig};
use gpgkms_workflow::{
    DecryptState, DecryptWorkflow, GenerateState, GenerateWorkflow, WorkflowError,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Commands, ConfigAction, DecryptArgs, GenerateArgs, LogFormat};

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Setup(#[from] GpgKmsError),

    #[error("generate {0}")]
    Generate(#[from] WorkflowError<GenerateState>),

    #[error("decrypt {0}")]
    Decrypt(#[from] WorkflowError<DecryptState>),
}

impl CommandError {
    fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Setup(e) => e.kind(),
            CommandError::Generate(e) => e.kind(),
            CommandError::Decrypt(e) => e.kind(),
        }
    }

    fn last_state(&self) -> Option<String> {
        match self {
            CommandError::Setup(_) => None,
            CommandError::Generate(e) => Some(e.last_state.to_string()),
            CommandError::Decrypt(e) => Some(e.last_state.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match GpgKmsConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            init_logging(cli.log.as_deref().unwrap_or("info"), LogFormat::Text);
            tracing::error!(kind = %e.kind(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
    init_logging(&level, format);

    if !cli.config.exists() {
        tracing::warn!(
            "config file not found: {} (using defaults and flags)",
            cli.config.display()
        );
    }

    match run(cli.command, &config, &cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.last_state() {
                Some(state) => tracing::error!(kind = %e.kind(), state = %state, "{e}"),
                None => tracing::error!(kind = %e.kind(), "{e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

async fn run(
    command: Commands,
    config: &GpgKmsConfig,
    config_path: &Path,
) -> Result<(), CommandError> {
    match command {
        Commands::Generate(args) => cmd_generate(&args, config).await,
        Commands::Decrypt(args) => cmd_decrypt(&args, config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(config, config_path)
            .map_err(|e| CommandError::Setup(GpgKmsError::Other(e))),
    }
}

async fn access_token(config: &GpgKmsConfig) -> Result<AccessToken, GpgKmsError> {
    let token = find_access_token(&config.gcp).await?;
    tracing::debug!(source = %token.source, "using Google access token");
    Ok(token)
}

// ── `gpgkms generate` ─────────────────────────────────────────────────────────

async fn cmd_generate(args: &GenerateArgs, config: &GpgKmsConfig) -> Result<(), CommandError> {
    let req = resolve::generate_request(args, config)?;
    let token = access_token(config).await?;

    let mut workflow = GenerateWorkflow::new(
        Arc::new(GpgKeyPairProvider::new(config.gpg.clone(), config.keygen.clone())),
        Arc::new(CloudKms::new(&config.gcp, clone_secret(&token.token))?),
        Arc::new(SecretManager::new(&config.gcp, token.token)?),
    );
    let report = workflow.run(&req).await?;

    tracing::info!(
        fingerprint = %report.fingerprint,
        private_key = %req.private_key_secret,
        private_key_version = %report.private_key_version,
        passphrase = %req.passphrase_secret,
        passphrase_version = %report.passphrase_version,
        public_key = %report.public_key_path.display(),
        "keypair generated and protected"
    );
    println!("{}", report.public_key_path.display());
    Ok(())
}

// ── `gpgkms decrypt` ──────────────────────────────────────────────────────────

async fn cmd_decrypt(args: &DecryptArgs, config: &GpgKmsConfig) -> Result<(), CommandError> {
    let (req, output) = resolve::decrypt_request(args, config)?;
    let token = access_token(config).await?;

    let bucket_token =
        matches!(output, OutputTarget::Bucket(_)).then(|| clone_secret(&token.token));
    let sink = sink_for(&output, &config.output.bucket_prefix, |bucket| {
        build_gcs_operator(&BucketConfig {
            bucket: bucket.to_string(),
            token: bucket_token,
        })
    })?;

    let decryptor = GpgDecryptor::new(
        config.gpg.clone(),
        Arc::new(GpgAgentCache::from_config(&config.gpg)),
    );
    let mut workflow = DecryptWorkflow::new(
        Arc::new(SecretManager::new(&config.gcp, clone_secret(&token.token))?),
        Arc::new(CloudKms::new(&config.gcp, token.token)?),
        Arc::new(decryptor),
        sink,
    );
    let report = workflow.run(&req).await?;

    tracing::info!(
        input = %req.ciphertext.display(),
        output = %report.location,
        bytes = report.bytes,
        "file decrypted"
    );
    Ok(())
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

// ── `gpgkms config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &GpgKmsConfig, config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
