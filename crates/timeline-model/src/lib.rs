//! Cadence Timeline Model
//!
//! Defines the data contracts shared by the timing engine and the assembly
//! pipeline:
//! - **Scenes:** Positioned spans of the output timeline and continuity reports
//! - **Clips:** The [`MediaClip`] handle and its edit-list implementation [`ClipPlan`]
//! - **Jobs:** Assembly requests, progress notifications, and outcomes
//!
//! All times are seconds as `f64`. Clip operations never mutate their input;
//! each returns a new handle.

pub mod clip;
pub mod job;
pub mod scene;

pub use clip::*;
pub use job::*;
pub use scene::*;
