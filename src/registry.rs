//! npm registry metadata.
//!
//! [`RegistryClient`] fetches package documents and decodes them into
//! [`Package`] values with normalized, sorted versions.

mod client;
mod types;

pub use client::{ABBREVIATED_METADATA, FULL_METADATA, RegistryClient};
pub use types::{Dependency, Dist, Package, PackageVersion};
