//! gpgkms-storage: where recovered plaintext and public keys are written

pub mod operator;
pub mod sink;

pub use operator::{build_gcs_operator, BucketConfig};
pub use sink::{object_name, sink_for, write_public_key, BucketSink, DiskSink, PlaintextSink};
