// Gingami - bouncing circles drawn off-screen on a render thread and blitted
// onto a fixed-size window.
//
// Modules:
// - `config`: startup settings and their environment overrides
// - `surface`: backbuffer, visible surface, rendering hints
// - `render_loop`: the tick loop, its thread and shutdown signal
// - `physics`: ball seeding and bouncing
// - `draw`: the window plus software drawing and the sample scene
// - `fps`: frame-time sample set
// - `gamma`: linear-light mixing for anti-aliased edges

pub mod config;
pub mod draw;
pub mod error;
pub mod fps;
pub mod gamma;
pub mod physics;
pub mod render_loop;
pub mod surface;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use render_loop::{DrawContext, LoopReport, LoopState, RenderLoop, RenderThread, ShutdownSignal};
pub use surface::SurfaceManager;
