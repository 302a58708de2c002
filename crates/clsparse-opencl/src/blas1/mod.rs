//! Dense level-1 routines on device vectors.

pub mod scale;

pub use scale::{dscale, scale, sscale};
