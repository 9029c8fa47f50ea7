pub mod devices;
pub mod orientation;
pub mod simulate;
pub mod transform;
