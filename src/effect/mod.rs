//! Fullscreen passes
//!
//! Shared vertex data for passes that shade every texel of a target.

mod fullscreen;

pub use fullscreen::FullscreenTriangle;
