//! Scan controller resource monitoring.
//!
//! Watches workload resources and turns their churn into a bounded stream of
//! scan requests:
//!
//! ```text
//! [ watch(R) ] -> [ ResourceMonitor<R> ] -> [ Debouncer ] -> [ Dispatcher ] -> [ tenant scan APIs ]
//!                         ^                                        ^
//!                         +------------ [ ScanApiStore ] ----------+
//!                                              ^
//!                                      [ TenantIndex(Secret) ]
//! ```
//!
//! A monitor does nothing while no tenant is registered. Otherwise every
//! create or update of a watched resource registers its key with the
//! debouncer, which fires once the key has been quiet for the configured
//! window (or once the maximum delay has elapsed under sustained churn). The
//! dispatcher then reads the tenants that are registered *at that moment* and
//! asks each of their scan backends to schedule a scan of the resource.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod debounce;
mod dispatch;
mod metrics;
mod monitor;
pub mod tenants;

pub use self::{
    debounce::{Debounce, Debouncer, Dispatch},
    dispatch::Dispatcher,
    metrics::{DebounceMetrics, DispatchMetrics},
    monitor::{ResourceMonitor, SharedMonitor},
    tenants::TenantIndex,
};
