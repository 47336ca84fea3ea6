#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use scan_controller_core as core;
pub use scan_controller_k8s_api as k8s;
pub use scan_controller_k8s_monitor as monitor;
pub use scan_controller_scan_api as scan_api;

mod admission;
mod args;
mod lease;
mod monitors;

pub use self::{
    admission::{Admission, VALIDATE_PATH},
    args::Args,
    monitors::{MonitoredKind, MonitoredKinds},
};
