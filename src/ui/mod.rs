//! Terminal user interface.
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling and the category chooser keys
//! - `render` - Layout and overlay rendering
//! - `grid` - Category rows of item slots
//! - `status` - Header and status bar widgets

mod grid;
mod input;
mod loop_runner;
mod render;
mod status;

pub use loop_runner::{run, Action};
