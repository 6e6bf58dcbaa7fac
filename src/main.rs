// What you SEE:
// • An 800x600 window full of pale circles bouncing around a sky-blue background.
// • "FPS: n" in the top-left corner (frames the render thread finished in the last second).
// • Close the window or press ESC to quit.
//
// The balls are drawn on a background thread into an off-screen buffer; this
// thread only copies the finished surface to the window.

use gingami::draw::{paint_scene, Drawer};
use gingami::types::FrameBuffer;
use gingami::{Config, Error, RenderLoop, RenderThread, ShutdownSignal, SurfaceManager};

fn main() -> Result<(), Error> {
    env_logger::init();

    let config = Config::from_env()?;
    log::info!(
        "Gingami starting: {}x{}, antialiasing {}, fps overlay {}",
        config.width,
        config.height,
        config.antialiasing,
        config.show_fps
    );

    /* --- Window + surfaces ---
       The window must live on this thread; the render thread gets the backbuffer. */
    let mut drawer = Drawer::new(&config.title, config.width, config.height)?;
    let targets = SurfaceManager::initialize(config.width, config.height, config.antialiasing)?;
    let surface = targets.surface();

    /* --- Render thread ---
       Started once the window exists, like a form's load event. */
    let mut render_loop = RenderLoop::new(&config, targets, ShutdownSignal::new())?;
    render_loop.on_paint(paint_scene);
    let render = RenderThread::spawn(render_loop, config.render_stack_size)?;

    /* --- Window loop ---
       Copy out whatever the render thread blitted last and show it. */
    let mut screen = FrameBuffer::new(config.width, config.height);
    while drawer.is_open() && !drawer.esc_pressed() && !render.is_finished() {
        if let Err(e) = surface.copy_into(&mut screen) {
            log::error!("{e}");
            break;
        }
        if let Err(e) = drawer.present(&screen) {
            log::error!("{e}");
            break;
        }
    }

    /* --- Shutdown ---
       Raise the shutdown signal, then wait a bounded time for the render
       thread to release its buffers. */
    match render.stop(config.shutdown_timeout) {
        Some(report) => log::info!(
            "Render thread finished: {} ticks, {} failed",
            report.ticks,
            report.failed_ticks
        ),
        None => log::warn!("Exiting without a clean render-thread shutdown"),
    }
    Ok(())
}
