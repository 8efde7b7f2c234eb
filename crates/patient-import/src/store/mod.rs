//! Object storage for import jobs.
//!
//! [`ObjectClient`] is the transport seam with three implementations:
//! [`AwsS3Client`] for S3 and S3-compatible endpoints, [`LocalDirClient`] for
//! development runs against a directory, and [`InMemoryClient`] for tests and
//! dry local runs. [`PatientRecordStore`] and [`ImportFileStore`] address job
//! objects through [`ImportKeyspace`].

mod client;
mod keyspace;
mod local;
mod memory;
mod records;

pub use client::{AwsS3Client, ListObjectsResult, ObjectClient, ObjectClientError};
pub use keyspace::{DEFAULT_PREFIX, ImportKeyspace, row_number_from_record_key};
pub use local::LocalDirClient;
pub use memory::InMemoryClient;
pub use records::{ImportFileStore, PatientRecordStore};
