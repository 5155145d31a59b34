//! Frame scheduling
//!
//! Turns the render actions of a frame into the minimal ordered list of
//! passes: shadow updates, merged forward passes, scene captures and
//! post-processing.

pub mod action;
pub mod pass;
pub mod scheduler;

pub use action::*;
pub use pass::*;
pub use scheduler::*;
