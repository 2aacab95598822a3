//! Time subsystem.
//!
//! Provides frame-time measurement against a frame budget without coupling to
//! the runtime. Intended usage:
//! - one `FrameTimer` per renderer
//! - bracket each frame's CPU work with `begin()` / `end()`

mod frame_timer;

pub use frame_timer::{FrameTime, FrameTimer, DEFAULT_FRAME_BUDGET, FRAME_HISTORY};
