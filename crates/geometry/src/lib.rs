//! Vidcap geometry.
//!
//! Pure computations with no side effects:
//! - [`orientation`]: sensor mounting + display rotation to the rotation
//!   hint embedded in recorded output.
//! - [`transform`]: the affine transform that fits a fixed-aspect capture
//!   buffer onto an arbitrarily sized preview view.

pub mod orientation;
pub mod transform;

pub use orientation::*;
pub use transform::*;
