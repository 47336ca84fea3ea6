//! Decides whether workload creates and updates are admitted.
//!
//! Every admission review is turned into a [`Verdict`]. Objects that are
//! owned by an already-scanned parent, objects in filtered namespaces, and
//! updates that only touch server-side apply bookkeeping get the mode's
//! default verdict without a scan. Everything else is sent to the scan
//! backend and admitted (or, when enforcing, denied) based on the worst
//! score it reports.
//!
//! No error escapes the engine: decode failures, backend failures and
//! timeouts are logged and folded into the default verdict.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod decode;
mod engine;
mod filter;
pub mod labels;
mod metrics;
pub mod review;
mod verdict;

pub use self::{
    decode::{decode, DecodeError, Decoded},
    engine::{AdmissionEngine, Config},
    filter::FilterError,
    metrics::AdmissionMetrics,
    review::{AdmissionResponse, AdmissionReview, Review, ReviewError},
    verdict::Verdict,
};
