//! Thread-safe wrapper around [`Engine`] and the background ticker that
//! drives its timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::layer::LayerInfo;
use crate::recipe::Recipe;

/// Default ticker period.
pub const TICK: Duration = Duration::from_millis(10);

/// Serializes `play`/`stop`/volume calls from any number of threads.
#[derive(Clone, Debug)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self { inner: Arc::new(Mutex::new(engine)) }
    }

    /// Direct access for anything not forwarded below.
    pub fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock()
    }

    pub fn ensure_context(&self) -> Result<(), EngineError> {
        self.inner.lock().ensure_context()
    }

    pub fn play(&self, recipe: &Recipe) -> Result<(), EngineError> {
        self.inner.lock().play(recipe)
    }

    pub fn stop(&self) {
        self.inner.lock().stop();
    }

    pub fn set_master_volume(&self, v: f32) {
        self.inner.lock().set_master_volume(v);
    }

    pub fn set_layer_gain(&self, index: usize, g: f32) -> bool {
        self.inner.lock().set_layer_gain(index, g)
    }

    pub fn layers(&self) -> Vec<LayerInfo> {
        self.inner.lock().layers()
    }

    /// Poll the engine every `period` on a background thread until the
    /// returned [`Ticker`] is stopped or dropped.
    pub fn spawn_ticker(&self, period: Duration) -> std::io::Result<Ticker> {
        let engine = self.inner.clone();
        let quit = Arc::new(AtomicBool::new(false));
        let flag = quit.clone();
        let thread = std::thread::Builder::new().name("soundscapes-ticker".into()).spawn(move || {
            while !flag.load(Ordering::Acquire) {
                engine.lock().poll();
                std::thread::park_timeout(period);
            }
        })?;
        Ok(Ticker { quit, thread: Some(thread) })
    }
}

/// Handle to the ticker thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct Ticker {
    quit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            t.thread().unpark();
            if t.join().is_err() {
                tracing::warn!("ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}
