//! # Infrastructure Adapters
//!
//! Implementations of the parameter store and archive store interfaces.

pub mod filesystem_archive_store;
pub mod memory_archive_store;
pub mod memory_parameter_store;

#[cfg(feature = "aws")]
pub mod s3_archive_store;
#[cfg(feature = "aws")]
pub mod ssm_parameter_store;

pub use filesystem_archive_store::FilesystemArchiveStore;
pub use memory_archive_store::InMemoryArchiveStore;
pub use memory_parameter_store::InMemoryParameterStore;

#[cfg(feature = "aws")]
pub use s3_archive_store::S3ArchiveStore;
#[cfg(feature = "aws")]
pub use ssm_parameter_store::SsmParameterStore;
