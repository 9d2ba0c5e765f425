//! Ember demo viewer.
//!
//! Renders an animated gradient with a compute shader into an offscreen
//! image and blits it to the swapchain. Small on purpose: it exercises the
//! whole resource lifecycle (global and per-frame deletion queues, growable
//! descriptor allocation, frame scheduling) without any scene content.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer
//! ```
//!
//! The compute shader is loaded from `shaders/gradient.comp.spv` next to the
//! crate; compile it with `glslangValidator -V shaders/gradient.comp -o
//! shaders/gradient.comp.spv`.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use ember_app::{run_app, AppConfig};

use crate::app::GradientApp;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<GradientApp>(AppConfig::new("Ember - Gradient Demo").with_size(WIDTH, HEIGHT))
}
