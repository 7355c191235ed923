use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gpgkms",
    version,
    about = "OpenPGP keys protected by Cloud KMS envelope encryption",
    long_about = "gpgkms: generate an OpenPGP keypair whose private key is protected by a \
                  random passphrase enveloped under a Cloud KMS key, store both in Secret \
                  Manager, and later decrypt files with it"
)]
pub struct Cli {
    /// Path to gpgkms.toml configuration file
    #[arg(long, short = 'c', env = "GPGKMS_CONFIG", default_value = "gpgkms.toml", global = true)]
    pub config: PathBuf,

    /// Log level (overrides [logging].level; RUST_LOG wins over both)
    #[arg(long, env = "GPGKMS_LOG", global = true)]
    pub log: Option<String>,

    /// Log format (overrides [logging].format)
    #[arg(long, env = "GPGKMS_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a keypair, envelope its passphrase and store both in Secret Manager
    Generate(GenerateArgs),

    /// Decrypt a file with a stored private key
    Decrypt(DecryptArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

/// KEK and project selection shared by both workflows
#[derive(Args, Debug, Clone, Default)]
pub struct KekArgs {
    /// GCP project that owns the KEK and the secrets
    #[arg(long)]
    pub project_id: Option<String>,

    /// Cloud KMS keyring name of the KEK
    #[arg(long, alias = "kms-kring")]
    pub kms_keyring: Option<String>,

    /// Cloud KMS key name of the KEK
    #[arg(long)]
    pub kms_key: Option<String>,

    /// Cloud KMS location of the keyring (default: [gcp].location, then global)
    #[arg(long)]
    pub kms_location: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Email assigned to the key's user ID
    #[arg(long, alias = "email-id")]
    pub email: Option<String>,

    /// Secret ID for the protected private key
    #[arg(long)]
    pub privkey_sid: Option<String>,

    /// Secret ID for the enveloped passphrase
    #[arg(long)]
    pub pass_sid: Option<String>,

    /// Where to write the armored public key (default: [output].public_key_path)
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    #[command(flatten)]
    pub kek: KekArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DecryptArgs {
    /// Encrypted file on disk
    #[arg(long, alias = "input-path")]
    pub input: Option<PathBuf>,

    /// Write the plaintext to this file
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Upload the plaintext to this Cloud Storage bucket instead
    #[arg(long)]
    pub bucket: Option<String>,

    /// Secret ID of the protected private key
    #[arg(long)]
    pub privkey_sid: Option<String>,

    /// Secret ID of the enveloped passphrase
    #[arg(long)]
    pub pass_sid: Option<String>,

    /// Version of both secrets: a positive integer or "latest"
    #[arg(long, default_value = "latest")]
    pub secret_version: String,

    #[command(flatten)]
    pub kek: KekArgs,
}
