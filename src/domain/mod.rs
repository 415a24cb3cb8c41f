//! Domain layer for hit-tracker.
//!
//! Canonical types shared by every stage of the pipeline:
//! - `Param`: one key/value cell of the parameter buffer, lazily evaluated
//! - `Hit`: a serialized, ready-to-send unit of telemetry
//! - `TrackerError`: top-level error type

pub mod error;
pub mod hit;
pub mod param;

pub use error::TrackerError;
pub use hit::{Hit, HitStatus, OfflineMode, format_timestamp};
pub use param::{Param, ParamError, ParamInput, ParamKind, ParamOption, ParamValue, Thunk};
