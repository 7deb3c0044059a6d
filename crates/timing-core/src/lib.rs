//! Cadence Timing Core
//!
//! Pure computation over scene timelines and clip durations. The audio track
//! is the master clock; everything here exists to make the video side match it.
//!
//! - **Scene timing:** split a total duration into scene durations that sum exactly
//! - **Gap validation:** find gaps and overlaps between adjacent scenes and repair them
//! - **Audio sync:** force clip durations onto their targets by trim, extend, or retime
//!
//! Nothing in this crate performs I/O or mutates its inputs.

pub mod audio_sync;
pub mod gap_validator;
pub mod scene_timing;

pub use audio_sync::*;
pub use gap_validator::*;
pub use scene_timing::*;
