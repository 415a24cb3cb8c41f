// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Timestamps and durations stay within range
    clippy::cast_possible_wrap,       // Queue counts never reach i64::MAX
    clippy::cast_precision_loss,      // Jitter factors only
    clippy::cast_sign_loss,           // Values are known non-negative
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. TrackerError in tracker module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Parameter keys in docs
)]

pub mod app;
pub mod buffer;
pub mod builder;
pub mod dispatch;
pub mod domain;
pub mod reliability;
pub mod sender;
pub mod tracker;

pub use dispatch::{BasicEvent, EventCategory, PendingEvent};
pub use domain::{Hit, HitStatus, OfflineMode, ParamInput, ParamOption, TrackerError};
pub use tracker::{Tracker, TrackerBuilder, TrackerDelegate};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
