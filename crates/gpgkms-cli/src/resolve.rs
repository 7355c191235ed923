//! Merge command-line flags with gpgkms.toml into validated workflow requests.
//!
//! Everything here runs before any key, network or file work, so a missing or
//! conflicting input fails fast with a configuration error.

use gpgkms_core::config::GpgKmsConfig;
use gpgkms_core::{GpgKmsError, GpgKmsResult, KekRef, OutputTarget, SecretId, VersionRef};
use gpgkms_workflow::{DecryptRequest, GenerateRequest};

use crate::cli::{DecryptArgs, GenerateArgs, KekArgs};

fn required(value: Option<String>, flag: &str) -> GpgKmsResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(GpgKmsError::Config(format!("missing required --{flag}"))),
    }
}

fn or_config(flag: Option<String>, config: &Option<String>) -> Option<String> {
    flag.or_else(|| config.clone())
}

pub fn project(args: &KekArgs, config: &GpgKmsConfig) -> GpgKmsResult<String> {
    required(
        or_config(args.project_id.clone(), &config.gcp.project_id),
        "project-id (or [gcp].project_id)",
    )
}

pub fn kek(args: &KekArgs, config: &GpgKmsConfig) -> GpgKmsResult<KekRef> {
    let project = project(args, config)?;
    let keyring = required(
        or_config(args.kms_keyring.clone(), &config.gcp.kms_keyring),
        "kms-keyring (or [gcp].kms_keyring)",
    )?;
    let key = required(
        or_config(args.kms_key.clone(), &config.gcp.kms_key),
        "kms-key (or [gcp].kms_key)",
    )?;
    let location = args
        .kms_location
        .clone()
        .unwrap_or_else(|| config.gcp.location.clone());
    Ok(KekRef::new(project, keyring, key).with_location(location))
}

pub fn generate_request(
    args: &GenerateArgs,
    config: &GpgKmsConfig,
) -> GpgKmsResult<GenerateRequest> {
    let identity = required(args.email.clone(), "email")?;
    let kek = kek(&args.kek, config)?;
    let scope = kek.project.clone();
    let req = GenerateRequest {
        identity,
        private_key_secret: SecretId::new(
            &scope,
            required(args.privkey_sid.clone(), "privkey-sid")?,
        ),
        passphrase_secret: SecretId::new(&scope, required(args.pass_sid.clone(), "pass-sid")?),
        public_key_path: args
            .public_key
            .clone()
            .unwrap_or_else(|| config.output.public_key_path.clone()),
        kek,
    };
    req.validate()?;
    Ok(req)
}

pub fn decrypt_request(
    args: &DecryptArgs,
    config: &GpgKmsConfig,
) -> GpgKmsResult<(DecryptRequest, OutputTarget)> {
    let output = OutputTarget::select(args.output_path.clone(), args.bucket.clone())?;
    let ciphertext = args
        .input
        .clone()
        .ok_or_else(|| GpgKmsError::Config("missing required --input".into()))?;
    let kek = kek(&args.kek, config)?;
    let scope = kek.project.clone();
    let version: VersionRef = args.secret_version.parse()?;

    let req = DecryptRequest {
        private_key_secret: SecretId::new(
            &scope,
            required(args.privkey_sid.clone(), "privkey-sid")?,
        ),
        passphrase_secret: SecretId::new(&scope, required(args.pass_sid.clone(), "pass-sid")?),
        version,
        ciphertext,
        kek,
    };
    req.validate()?;
    Ok((req, output))
}
