//! Destinations for recovered plaintext and exported public keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpgkms_core::{GpgKmsError, GpgKmsResult, OutputTarget};
use opendal::Operator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Object file name suffix after the timestamp.
pub const OBJECT_SUFFIX: &str = "outputfile.txt";

#[async_trait]
pub trait PlaintextSink: Send + Sync {
    /// Persist `data`; returns a human-readable location for logs.
    async fn write(&self, data: &[u8]) -> GpgKmsResult<String>;
}

/// Writes to a local file, readable by the owner only on Unix.
pub struct DiskSink {
    path: PathBuf,
}

impl DiskSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PlaintextSink for DiskSink {
    async fn write(&self, data: &[u8]) -> GpgKmsResult<String> {
        write_file(&self.path, data, 0o600).await?;
        let location = self.path.display().to_string();
        tracing::info!(path = %location, bytes = data.len(), "plaintext written to file");
        Ok(location)
    }
}

/// Uploads to `{prefix}/{UTC timestamp}-outputfile.txt` in a bucket.
pub struct BucketSink {
    op: Operator,
    bucket: String,
    prefix: String,
}

impl BucketSink {
    pub fn new(op: Operator, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            op,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl PlaintextSink for BucketSink {
    async fn write(&self, data: &[u8]) -> GpgKmsResult<String> {
        let name = object_name(&self.prefix, Utc::now());
        self.op
            .write(&name, data.to_vec())
            .await
            .map_err(|e| map_opendal(&name, e))?;
        let location = format!("gs://{}/{name}", self.bucket);
        tracing::info!(object = %location, bytes = data.len(), "plaintext uploaded to bucket");
        Ok(location)
    }
}

/// `output_files/2024-05-01T12:00:00Z-outputfile.txt`
pub fn object_name(prefix: &str, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y-%m-%dT%H:%M:%SZ");
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{stamp}-{OBJECT_SUFFIX}")
    } else {
        format!("{prefix}/{stamp}-{OBJECT_SUFFIX}")
    }
}

/// Build the sink for a validated output target. `bucket_op` constructs the
/// operator lazily so file targets never touch object storage.
pub fn sink_for(
    target: &OutputTarget,
    prefix: &str,
    bucket_op: impl FnOnce(&str) -> GpgKmsResult<Operator>,
) -> GpgKmsResult<Arc<dyn PlaintextSink>> {
    Ok(match target {
        OutputTarget::File(path) => Arc::new(DiskSink::new(path.clone())),
        OutputTarget::Bucket(bucket) => {
            Arc::new(BucketSink::new(bucket_op(bucket)?, bucket.clone(), prefix))
        }
    })
}

/// Write the ASCII-armored public key.
pub async fn write_public_key(path: &Path, armored: &str) -> GpgKmsResult<()> {
    write_file(path, armored.as_bytes(), 0o644).await?;
    tracing::info!(path = %path.display(), "public key exported");
    Ok(())
}

async fn write_file(path: &Path, data: &[u8], mode: u32) -> GpgKmsResult<()> {
    use tokio::io::AsyncWriteExt;

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = opts
        .open(path)
        .await
        .map_err(|e| GpgKmsError::io(path.display(), e))?;

    // an existing file keeps its old mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| GpgKmsError::io(path.display(), e))?;
    }

    file.write_all(data)
        .await
        .map_err(|e| GpgKmsError::io(path.display(), e))?;
    file.flush()
        .await
        .map_err(|e| GpgKmsError::io(path.display(), e))?;
    Ok(())
}

fn map_opendal(path: &str, e: opendal::Error) -> GpgKmsError {
    use opendal::ErrorKind as K;
    let msg = format!("{path}: {e}");
    match e.kind() {
        K::PermissionDenied => GpgKmsError::PermissionDenied(msg),
        K::NotFound => GpgKmsError::NotFound(msg),
        K::RateLimited => GpgKmsError::Unavailable(msg),
        K::ConfigInvalid => GpgKmsError::Config(msg),
        _ if e.is_temporary() => GpgKmsError::Unavailable(msg),
        _ => GpgKmsError::Other(anyhow::anyhow!(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gpgkms_core::ErrorKind;

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish()
    }

    #[test]
    fn test_object_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 4).unwrap();
        assert_eq!(
            object_name("output_files", now),
            "output_files/2024-05-01T12:03:04Z-outputfile.txt"
        );
        assert_eq!(
            object_name("/nested/dir/", now),
            "nested/dir/2024-05-01T12:03:04Z-outputfile.txt"
        );
        assert_eq!(object_name("", now), "2024-05-01T12:03:04Z-outputfile.txt");
    }

    #[tokio::test]
    async fn test_bucket_sink_uploads_under_prefix() {
        let op = memory_operator();
        let sink = BucketSink::new(op.clone(), "my-bucket", "output_files");

        let location = sink.write(b"This is a secret message").await.unwrap();
        assert!(location.starts_with("gs://my-bucket/output_files/"));
        assert!(location.ends_with("Z-outputfile.txt"));

        let key = location.trim_start_matches("gs://my-bucket/");
        let stored = op.read(key).await.unwrap().to_vec();
        assert_eq!(stored, b"This is a secret message");
    }

    #[tokio::test]
    async fn test_disk_sink_writes_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, b"stale content that is longer").unwrap();

        DiskSink::new(&path).write(b"fresh").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[tokio::test]
    async fn test_disk_sink_missing_dir_is_io_error() {
        let err = DiskSink::new("/nonexistent/dir/out.txt")
            .write(b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_write_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public_key.asc");
        let armored = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nabc\n-----END PGP PUBLIC KEY BLOCK-----\n";
        write_public_key(&path, armored).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), armored);
    }

    #[test]
    fn test_sink_for_file_never_builds_operator() {
        let target = OutputTarget::File("/tmp/out.txt".into());
        let sink = sink_for(&target, "output_files", |_| {
            panic!("operator must not be built for a file target")
        });
        assert!(sink.is_ok());
    }

    #[test]
    fn test_sink_for_bucket_propagates_operator_error() {
        let target = OutputTarget::Bucket("b".into());
        let err = sink_for(&target, "output_files", |_| {
            Err(GpgKmsError::Config("no credentials".into()))
        })
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_opendal_error_mapping() {
        let e = opendal::Error::new(opendal::ErrorKind::PermissionDenied, "nope");
        assert_eq!(map_opendal("k", e).kind(), ErrorKind::Permission);
        let e = opendal::Error::new(opendal::ErrorKind::RateLimited, "slow down");
        assert_eq!(map_opendal("k", e).kind(), ErrorKind::Unavailable);
    }
}
