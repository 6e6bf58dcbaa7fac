// The render loop and the thread it runs on.
// Each tick moves the balls, hands the backbuffer to the paint callback, then
// blits the backbuffer onto the visible surface. A failing tick is logged and
// the loop carries on; only the shutdown signal stops it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::config::Config;
use crate::error::Error;
use crate::fps::FrameCounter;
use crate::gamma::GammaLut;
use crate::physics;
use crate::surface::{Backbuffer, Surface, SurfaceManager};
use crate::types::Ball;

/// Lifecycle of a render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Initializing = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LoopState::Initializing,
            1 => LoopState::Running,
            2 => LoopState::ShuttingDown,
            _ => LoopState::Terminated,
        }
    }
}

/// Read-only view of a loop's current state, usable from any thread.
#[derive(Clone)]
pub struct LoopStateHandle(Arc<AtomicU8>);

impl LoopStateHandle {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Set by the window when it closes; polled by the loop once per tick.
#[derive(Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the paint callback gets each tick: the backbuffer to draw on plus the
/// state it should draw.
pub struct DrawContext<'a> {
    pub canvas: &'a mut Backbuffer,
    pub lut: &'a GammaLut,
    pub balls: &'a [Ball],
    /// Frames in the last second, when the FPS overlay is on.
    pub fps: Option<usize>,
    /// Zero-based index of the current tick.
    pub tick: u64,
}

pub type DrawCallback = Box<dyn FnMut(&mut DrawContext<'_>) -> anyhow::Result<()> + Send>;

/// Tick counts from a finished loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopReport {
    pub ticks: u64,
    pub failed_ticks: u64,
}

pub struct RenderLoop {
    config: Config,
    backbuffer: Backbuffer,
    surface: Surface,
    lut: GammaLut,
    balls: Vec<Ball>,
    frames: Option<FrameCounter>,
    on_paint: Option<DrawCallback>,
    shutdown: ShutdownSignal,
    state: LoopStateHandle,
    report: LoopReport,
}

impl RenderLoop {
    /// Pair a validated config with surfaces of exactly the configured size.
    pub fn new(config: &Config, targets: SurfaceManager, shutdown: ShutdownSignal) -> Result<Self, Error> {
        config.validate()?;
        let SurfaceManager { backbuffer, surface } = targets;
        if (backbuffer.width(), backbuffer.height()) != (config.width, config.height) {
            return Err(Error::Config(format!(
                "surfaces are {}x{} but config asks for {}x{}",
                backbuffer.width(),
                backbuffer.height(),
                config.width,
                config.height
            )));
        }
        Ok(Self {
            config: config.clone(),
            backbuffer,
            surface,
            lut: GammaLut::new(),
            balls: Vec::new(),
            frames: config.show_fps.then(FrameCounter::default),
            on_paint: None,
            shutdown,
            state: LoopStateHandle(Arc::new(AtomicU8::new(LoopState::Initializing as u8))),
            report: LoopReport::default(),
        })
    }

    /// Register the paint callback. There is one slot; registering again replaces it.
    pub fn on_paint<F>(&mut self, callback: F)
    where
        F: FnMut(&mut DrawContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_paint = Some(Box::new(callback));
    }

    pub fn state_handle(&self) -> LoopStateHandle {
        self.state.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Seed the balls, tick until shutdown is requested, then release the surfaces.
    pub fn run(mut self) -> LoopReport {
        self.state.set(LoopState::Initializing);
        self.seed();

        self.state.set(LoopState::Running);
        log::info!("Render loop running with {} balls", self.balls.len());
        let period = self.config.tick_period();
        let mut last_trace = Instant::now();
        install_panic_hook();

        while !self.shutdown.is_requested() {
            let started = Instant::now();
            let tick = self.report.ticks;

            // A failing tick must never end the loop: catch errors and panics alike.
            match guard_tick(|| self.tick(started)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.report.failed_ticks += 1;
                    log::error!("Tick {tick} failed: {e}");
                }
                Err(p) => {
                    self.report.failed_ticks += 1;
                    log::error!("Tick {tick} panicked at {}: {}", p.location, p.message);
                }
            }
            self.report.ticks += 1;

            if started.duration_since(last_trace) >= Duration::from_secs(1) {
                if let Some(frames) = &self.frames {
                    log::trace!("FPS: {}", frames.fps());
                }
                last_trace = started;
            }

            if let Some(period) = period {
                let spent = started.elapsed();
                if spent < period {
                    thread::sleep(period - spent);
                }
            }
        }

        self.state.set(LoopState::ShuttingDown);
        log::info!(
            "Render loop stopping after {} ticks ({} failed)",
            self.report.ticks,
            self.report.failed_ticks
        );
        self.release()
    }

    fn seed(&mut self) {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        log::debug!("Seeding balls with {seed}");
        let mut rng = Pcg32::seed_from_u64(seed);
        self.balls = physics::seed_balls(
            &mut rng,
            self.config.ball_count,
            self.backbuffer.width() as i32,
            self.backbuffer.height() as i32,
            self.config.ball_size.clone(),
            self.config.ball_speed.clone(),
        );
    }

    /// Physics, frame sample, paint, blit.
    fn tick(&mut self, now: Instant) -> Result<(), Error> {
        let (w, h) = (self.backbuffer.width() as i32, self.backbuffer.height() as i32);
        physics::step_all(&mut self.balls, w, h);

        if let Some(frames) = &mut self.frames {
            frames.record(now);
        }
        let fps = self.frames.as_ref().map(FrameCounter::fps);

        if let Some(paint) = self.on_paint.as_mut() {
            let mut ctx = DrawContext {
                canvas: &mut self.backbuffer,
                lut: &self.lut,
                balls: &self.balls,
                fps,
                tick: self.report.ticks,
            };
            paint(&mut ctx)?;
        }

        self.surface.blit(&self.backbuffer)
    }

    /// Visible surface first, then the backbuffer's context, then its pixels.
    fn release(self) -> LoopReport {
        let RenderLoop { surface, backbuffer, on_paint, state, report, .. } = self;
        drop(surface);
        log::debug!("Released visible surface");
        drop(on_paint);
        drop(backbuffer);
        log::debug!("Released backbuffer");
        state.set(LoopState::Terminated);
        report
    }
}

thread_local! {
    // Set while a tick runs under `guard_tick`; the hook stays quiet then.
    static IN_TICK: Cell<bool> = const { Cell::new(false) };
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Route panics from guarded ticks into `log` instead of stderr.
/// Panics anywhere else still reach the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_TICK.with(Cell::get) {
                let location = info.location().map(|l| l.to_string());
                PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
            } else {
                previous(info);
            }
        }));
    });
}

/// A panic caught at the tick boundary.
#[derive(Debug)]
struct TickPanic {
    message: String,
    location: String,
}

fn guard_tick<T>(f: impl FnOnce() -> T) -> Result<T, TickPanic> {
    IN_TICK.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    IN_TICK.with(|flag| flag.set(false));

    outcome.map_err(|payload| TickPanic {
        message: panic_message(&*payload).to_owned(),
        location: PANIC_LOCATION
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| String::from("<unknown>")),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// A render loop running on its own thread.
pub struct RenderThread {
    handle: JoinHandle<()>,
    done: Receiver<LoopReport>,
    shutdown: ShutdownSignal,
    state: LoopStateHandle,
}

impl RenderThread {
    /// Start `render_loop` on a thread named `render` with `stack_size`.
    /// If the preferred thread settings are refused, warn and try a plain thread.
    pub fn spawn(render_loop: RenderLoop, stack_size: usize) -> Result<Self, Error> {
        let shutdown = render_loop.shutdown_signal();
        let state = render_loop.state_handle();
        let (tx, done) = mpsc::channel();

        // The loop sits in a slot so a refused spawn doesn't take it down with the closure.
        let slot = Arc::new(Mutex::new(Some(render_loop)));
        let body = |slot: Arc<Mutex<Option<RenderLoop>>>, tx: mpsc::Sender<LoopReport>| {
            move || {
                let taken = slot.lock().ok().and_then(|mut s| s.take());
                if let Some(render_loop) = taken {
                    // The receiver may be gone if the window stopped waiting.
                    let _ = tx.send(render_loop.run());
                }
            }
        };

        let preferred = thread::Builder::new()
            .name("render".into())
            .stack_size(stack_size)
            .spawn(body(slot.clone(), tx.clone()));

        let handle = match preferred {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Can't start render thread with preferred settings ({e}); trying defaults");
                thread::Builder::new()
                    .spawn(body(slot, tx))
                    .map_err(|e| Error::Thread(format!("spawn render thread: {e}")))?
            }
        };

        Ok(Self { handle, done, shutdown, state })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the loop to stop and wait up to `timeout` for it to clean up.
    /// Returns `None` if it didn't finish in time; the thread is then left detached.
    pub fn stop(self, timeout: Duration) -> Option<LoopReport> {
        self.shutdown.request();
        match self.done.recv_timeout(timeout) {
            Ok(report) => {
                if self.handle.join().is_err() {
                    log::error!("Render thread panicked after reporting");
                }
                Some(report)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Render thread did not stop within {timeout:?} (state {:?}); detaching",
                    self.state.get()
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Render thread exited without a report");
                let _ = self.handle.join();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{paint_scene, DEEP_SKY_BLUE};
    use crate::types::FrameBuffer;
    use std::sync::atomic::AtomicU64;

    fn small_config() -> Config {
        Config {
            width: 160,
            height: 120,
            ball_count: 12,
            ball_size: 10..40,
            seed: Some(2024),
            ..Config::default()
        }
    }

    fn make_loop(config: &Config) -> (RenderLoop, Surface, ShutdownSignal) {
        let targets = SurfaceManager::initialize(config.width, config.height, config.antialiasing).unwrap();
        let surface = targets.surface();
        let shutdown = ShutdownSignal::new();
        (RenderLoop::new(config, targets, shutdown.clone()).unwrap(), surface, shutdown)
    }

    #[test]
    fn test_runs_until_shutdown() {
        let config = small_config();
        let (mut render_loop, surface, shutdown) = make_loop(&config);
        let state = render_loop.state_handle();

        render_loop.on_paint(move |ctx| {
            paint_scene(ctx)?;
            if ctx.tick == 9 {
                shutdown.request();
            }
            Ok(())
        });

        let report = render_loop.run();
        assert_eq!(report, LoopReport { ticks: 10, failed_ticks: 0 });
        assert_eq!(state.get(), LoopState::Terminated);

        // The painted scene made it onto the surface.
        let mut out = FrameBuffer::new(0, 0);
        surface.copy_into(&mut out).unwrap();
        let [r, g, b, _] = DEEP_SKY_BLUE.0;
        let sky = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        assert!(out.pixels.iter().any(|&p| p == sky));
        assert!(out.pixels.iter().any(|&p| p != sky));
    }

    #[test]
    fn test_shutdown_before_start_runs_no_ticks() {
        let config = small_config();
        let (mut render_loop, _surface, shutdown) = make_loop(&config);
        let calls = Arc::new(AtomicU64::new(0));
        let seen = calls.clone();
        render_loop.on_paint(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        shutdown.request();
        let report = render_loop.run();
        assert_eq!(report.ticks, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_surfaces_smaller_than_config() {
        // Default config wants 800x600 with balls up to 99px.
        let targets = SurfaceManager::initialize(50, 50, true).unwrap();
        let err = RenderLoop::new(&Config::default(), targets, ShutdownSignal::new()).err();
        assert!(matches!(err, Some(Error::Config(_))), "{err:?}");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = Config { max_fps: Some(0), ..small_config() };
        let targets = SurfaceManager::initialize(config.width, config.height, true).unwrap();
        let err = RenderLoop::new(&config, targets, ShutdownSignal::new()).err();
        assert!(matches!(err, Some(Error::Config(_))), "{err:?}");
    }

    #[test]
    fn test_guarded_panic_keeps_message_and_location() {
        install_panic_hook();
        let caught = guard_tick(|| -> u32 { panic!("paint exploded") }).unwrap_err();
        assert_eq!(caught.message, "paint exploded");
        assert!(caught.location.contains("render_loop.rs"), "{}", caught.location);

        // Nothing left over for the next tick, and the flag is cleared.
        assert_eq!(guard_tick(|| 7).unwrap(), 7);
        assert!(!IN_TICK.with(Cell::get));
        assert!(PANIC_LOCATION.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn test_failed_tick_does_not_stop_loop() {
        let config = small_config();
        let (mut render_loop, _surface, shutdown) = make_loop(&config);
        let after_failure = Arc::new(AtomicU64::new(0));
        let counter = after_failure.clone();

        render_loop.on_paint(move |ctx| {
            if ctx.tick == 3 {
                anyhow::bail!("paint failed on purpose");
            }
            if ctx.tick > 3 {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            if ctx.tick == 5 {
                shutdown.request();
            }
            Ok(())
        });

        let report = render_loop.run();
        assert_eq!(report, LoopReport { ticks: 6, failed_ticks: 1 });
        assert_eq!(after_failure.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_tick_does_not_stop_loop() {
        let config = small_config();
        let (mut render_loop, _surface, shutdown) = make_loop(&config);

        render_loop.on_paint(move |ctx| {
            if ctx.tick == 1 {
                panic!("boom");
            }
            if ctx.tick == 4 {
                shutdown.request();
            }
            Ok(())
        });

        let report = render_loop.run();
        assert_eq!(report, LoopReport { ticks: 5, failed_ticks: 1 });
    }

    #[test]
    fn test_balls_in_bounds_every_tick() {
        let config = Config { ball_count: 50, ..small_config() };
        let (mut render_loop, _surface, shutdown) = make_loop(&config);
        let (w, h) = (config.width as i32, config.height as i32);

        render_loop.on_paint(move |ctx| {
            assert_eq!(ctx.balls.len(), 50);
            for ball in ctx.balls {
                anyhow::ensure!(ball.in_bounds(w, h), "out of bounds: {ball:?}");
            }
            if ctx.tick == 499 {
                shutdown.request();
            }
            Ok(())
        });

        let report = render_loop.run();
        assert_eq!(report, LoopReport { ticks: 500, failed_ticks: 0 });
    }

    #[test]
    fn test_second_registration_replaces_first() {
        let config = small_config();
        let (mut render_loop, _surface, shutdown) = make_loop(&config);
        let first = Arc::new(AtomicU64::new(0));
        let second = Arc::new(AtomicU64::new(0));

        let f = first.clone();
        render_loop.on_paint(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let s = second.clone();
        render_loop.on_paint(move |ctx| {
            s.fetch_add(1, Ordering::SeqCst);
            if ctx.tick == 2 {
                shutdown.request();
            }
            Ok(())
        });

        render_loop.run();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fps_only_when_enabled() {
        for show_fps in [true, false] {
            let config = Config { show_fps, ..small_config() };
            let (mut render_loop, _surface, shutdown) = make_loop(&config);
            let readings = Arc::new(Mutex::new(Vec::new()));
            let sink = readings.clone();

            render_loop.on_paint(move |ctx| {
                sink.lock().unwrap().push(ctx.fps);
                if ctx.tick == 2 {
                    shutdown.request();
                }
                Ok(())
            });
            render_loop.run();

            let readings = readings.lock().unwrap();
            if show_fps {
                // ticks finish well within a second of each other
                assert_eq!(*readings, vec![Some(1), Some(2), Some(3)]);
            } else {
                assert!(readings.iter().all(Option::is_none));
            }
        }
    }

    #[test]
    fn test_ticks_without_callback_still_blit() {
        let config = small_config();
        let (render_loop, surface, _) = make_loop(&config);
        let thread = RenderThread::spawn(render_loop, 1024 * 1024).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let report = thread.stop(Duration::from_secs(5)).expect("render thread should stop");
        assert!(report.ticks > 0);
        assert_eq!(report.failed_ticks, 0);

        // nothing painted: the transparent-black backbuffer was blitted as black
        let mut out = FrameBuffer::new(0, 0);
        surface.copy_into(&mut out).unwrap();
        assert!(out.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_render_thread_stops_and_reports() {
        let config = Config { max_fps: Some(200), ..small_config() };
        let (mut render_loop, _surface, _) = make_loop(&config);
        render_loop.on_paint(paint_scene);

        let thread = RenderThread::spawn(render_loop, config.render_stack_size).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!thread.is_finished());

        let report = thread.stop(Duration::from_secs(5)).expect("render thread should stop");
        assert!(report.ticks > 0);
        assert_eq!(report.failed_ticks, 0);
    }
}
