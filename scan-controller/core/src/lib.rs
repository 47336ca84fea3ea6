//! Scan controller core types.
//!
//! Holds the tenant registry shared between the resource monitors and the
//! scan dispatcher, the [`ScanApi`] seam through which all calls to a scan
//! backend are made, and the small pieces of configuration (admission mode,
//! namespace filtering) that both the debounced dispatch path and the
//! admission path interpret the same way.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod mode;
pub mod namespaces;
pub mod scan;
mod store;

pub use self::{
    mode::{AdmissionMode, ConfigurationError},
    scan::{NewScanApi, ScanApi, ScanResult, Score},
    store::{ClientConfiguration, ScanApiStore, SharedStore, TenantId},
};
