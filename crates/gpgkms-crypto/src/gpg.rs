//! Thin driver for the `gpg` binary, always bound to an isolated keyring.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::keyring::IsolatedKeyring;

/// Captured result of one gpg invocation.
pub struct GpgOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl GpgOutput {
    /// Last non-empty stderr line, which is where gpg puts the actual reason.
    pub fn reason(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .unwrap_or("gpg exited without a diagnostic")
            .to_string()
    }
}

pub struct Gpg<'a> {
    program: &'a Path,
    home: &'a Path,
}

impl<'a> Gpg<'a> {
    pub fn new(program: &'a Path, keyring: &'a IsolatedKeyring) -> Self {
        Self {
            program,
            home: keyring.path(),
        }
    }

    /// Run gpg in batch mode against the keyring, optionally feeding stdin.
    pub async fn run<I, S>(&self, args: I, stdin: Option<&[u8]>) -> std::io::Result<GpgOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(self.program)
            .env("GNUPGHOME", self.home)
            .arg("--homedir")
            .arg(self.home)
            .args(["--batch", "--no-tty", "--quiet"])
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // gpg may exit before reading its input; the exit status decides
            if let Err(e) = pipe.write_all(input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
            // dropping the pipe signals EOF
        }

        let output = child.wait_with_output().await?;
        Ok(GpgOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Fingerprints of the primary keys in `--with-colons` listing output.
pub fn primary_fingerprints(colons: &str) -> Vec<String> {
    let mut fingerprints = Vec::new();
    let mut expect_primary = false;
    for line in colons.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("sec") | Some("pub") => expect_primary = true,
            Some("fpr") if expect_primary => {
                if let Some(fpr) = fields.get(9).filter(|f| !f.is_empty()) {
                    fingerprints.push(fpr.to_string());
                }
                expect_primary = false;
            }
            _ => {}
        }
    }
    fingerprints
}

/// Check that a gpg export produced an ASCII-armored block of the given type.
pub fn is_armored(data: &str, block: &str) -> bool {
    data.trim_start()
        .starts_with(&format!("-----BEGIN PGP {block} BLOCK-----"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
sec:u:255:22:AAAABBBBCCCCDDDD:1700000000:1763072000::u:::scESC:::+::ed25519:::0:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF01234567:
grp:::::::::1111111111111111111111111111111111111111:
uid:u::::1700000000::HASH::output-file-key <user@example.com>::::::::::0:
ssb:u:255:18:EEEEFFFF00001111:1700000000:1763072000:::::e:::+::cv25519::
fpr:::::::::89ABCDEF0123456789ABCDEF0123456789ABCDEF:
grp:::::::::2222222222222222222222222222222222222222:
";

    #[test]
    fn test_primary_fingerprints_skips_subkeys() {
        let fprs = primary_fingerprints(LISTING);
        assert_eq!(fprs, vec!["0123456789ABCDEF0123456789ABCDEF01234567"]);
    }

    #[test]
    fn test_primary_fingerprints_empty_listing() {
        assert!(primary_fingerprints("").is_empty());
        assert!(primary_fingerprints("tru::1:1700000000:0:3:1:5\n").is_empty());
    }

    #[test]
    fn test_is_armored() {
        let public = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmDMEZ...\n";
        assert!(is_armored(public, "PUBLIC KEY"));
        assert!(!is_armored(public, "PRIVATE KEY"));
        assert!(!is_armored("", "PUBLIC KEY"));
    }

    #[test]
    fn test_reason_uses_last_line() {
        let out = GpgOutput {
            success: false,
            stdout: Vec::new(),
            stderr: "gpg: encrypted with cv25519 key\ngpg: decryption failed: Bad passphrase\n\n"
                .into(),
        };
        assert_eq!(out.reason(), "gpg: decryption failed: Bad passphrase");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_reading_stdin_is_not_an_io_error() {
        let keyring = IsolatedKeyring::create("/nonexistent/gpgconf").unwrap();
        // larger than a pipe buffer, so the write outlives the child
        let input = vec![b'x'; 1 << 20];

        let out = Gpg::new(Path::new("false"), &keyring)
            .run(["--decrypt"], Some(&input))
            .await
            .unwrap();
        assert!(!out.success);

        let out = Gpg::new(Path::new("true"), &keyring)
            .run(["--decrypt"], Some(&input))
            .await
            .unwrap();
        assert!(out.success);
    }
}
