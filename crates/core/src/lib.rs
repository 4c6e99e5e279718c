//! Face detection and tracking core.
//!
//! A heavyweight face detector runs periodically on a background worker;
//! a lightweight correspondence tracker carries face identities between
//! detections. Sessions live behind opaque handles issued by
//! [`runtime::registry::TrackerRegistry`].

pub mod detection;
pub mod runtime;
pub mod shared;
pub mod tracking;
