//! Real-time output on a CPAL device.
//!
//! `cpal::Stream` is not `Send` on every host, so a dedicated thread opens
//! the device, builds the stream, reports back, and then parks until the
//! output is detached. Device and format negotiation happen in `prepare()`;
//! only plain data crosses threads.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfig};

use crate::error::EngineError;
use crate::graph::Renderer;
use crate::output::{Output, StreamSpec};

/// Interleaved samples rendered per inner chunk of a device callback.
const CALLBACK_FRAMES: usize = 1024;

/// Names of every output device on the default host.
pub fn list_output_devices() -> Result<Vec<String>, EngineError> {
    let host = cpal::default_host();
    let devices = host.output_devices().map_err(|e| EngineError::unavailable(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device, String> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices().map_err(|e| e.to_string())? {
            if d.name().map_or(false, |n| n == name) {
                return Ok(d);
            }
        }
        return Err(format!("requested device not found: {name}"));
    }
    host.default_output_device().ok_or_else(|| "no default output device".to_owned())
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<SupportedStreamConfig, String> {
    if req_sr.is_none() && req_ch.is_none() {
        return device.default_output_config().map_err(|e| e.to_string());
    }

    // closest range: sample-rate distance dominates, then channel distance
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs().map_err(|e| e.to_string())? {
        let ch = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = req_ch.map_or(0, |c| u64::from(ch.abs_diff(c)));
        let sr_pen = match req_sr {
            Some(sr) if (sr_min..=sr_max).contains(&sr) => 0,
            Some(sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            None => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or_else(|| "no supported output configs".to_owned())?;
    let pick = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick))
}

#[derive(Clone, Debug)]
struct Negotiated {
    device: Option<String>,
    config: StreamConfig,
    format: SampleFormat,
}

struct StreamThread {
    stop: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Plays through a CPAL output device.
pub struct CpalOutput {
    device: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    negotiated: Option<Negotiated>,
    worker: Option<StreamThread>,
}

impl core::fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CpalOutput")
            .field("device", &self.device)
            .field("negotiated", &self.negotiated)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalOutput {
    /// Default device, default format.
    pub fn new() -> Self {
        Self { device: None, sample_rate: None, channels: None, negotiated: None, worker: None }
    }

    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    pub fn with_sample_rate(mut self, sr: u32) -> Self {
        self.sample_rate = Some(sr);
        self
    }

    pub fn with_channels(mut self, ch: u16) -> Self {
        self.channels = Some(ch);
        self
    }

    fn stop_worker(&mut self) {
        if let Some(w) = self.worker.take() {
            let _ = w.stop.send(());
            if w.join.join().is_err() {
                tracing::warn!("audio stream thread panicked");
            }
        }
    }
}

impl Output for CpalOutput {
    fn prepare(&mut self) -> Result<StreamSpec, EngineError> {
        let device = pick_device(self.device.as_deref()).map_err(EngineError::unavailable)?;
        let supported =
            choose_config(&device, self.sample_rate, self.channels).map_err(EngineError::unavailable)?;
        let format = supported.sample_format();
        let mut config = supported.config();
        if let Some(sr) = self.sample_rate {
            config.sample_rate = cpal::SampleRate(sr);
        }
        if let Some(ch) = self.channels {
            config.channels = ch;
        }

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?format,
            "output device negotiated"
        );

        let spec = StreamSpec { sample_rate: config.sample_rate.0, channels: config.channels };
        self.negotiated = Some(Negotiated { device: self.device.clone(), config, format });
        Ok(spec)
    }

    fn attach(&mut self, renderer: Renderer) -> Result<(), EngineError> {
        let plan = self
            .negotiated
            .clone()
            .ok_or_else(|| EngineError::unavailable("output attached before prepare"))?;
        self.stop_worker();

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("soundscapes-audio".into())
            .spawn(move || match open_stream(&plan, renderer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // parked until detach (or the sender is dropped)
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| EngineError::unavailable(e.to_string()))?;

        let outcome = ready_rx
            .recv()
            .map_err(|_| EngineError::unavailable("audio thread exited before the stream opened"))
            .and_then(|r| r.map_err(EngineError::unavailable));
        match outcome {
            Ok(()) => {
                self.worker = Some(StreamThread { stop: stop_tx, join });
                Ok(())
            }
            Err(e) => {
                let _ = join.join();
                Err(e)
            }
        }
    }

    fn detach(&mut self) {
        self.stop_worker();
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn open_stream(plan: &Negotiated, renderer: Renderer) -> Result<cpal::Stream, String> {
    let device = pick_device(plan.device.as_deref())?;
    let err_fn = |e: cpal::StreamError| tracing::error!(error = %e, "audio stream error");
    let stream = match plan.format {
        SampleFormat::F32 => build_stream::<f32>(&device, &plan.config, renderer, err_fn)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &plan.config, renderer, err_fn)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &plan.config, renderer, err_fn)?,
        other => return Err(format!("unsupported device sample format: {other:?}")),
    };
    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &StreamConfig,
    mut renderer: Renderer,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = usize::from(cfg.channels.max(1));
    let mut scratch = vec![0.0_f32; CALLBACK_FRAMES * channels];

    device
        .build_output_stream(
            cfg,
            move |output: &mut [T], _| {
                for chunk in output.chunks_mut(scratch.len()) {
                    let buf = &mut scratch[..chunk.len()];
                    renderer.render(buf, channels);
                    for (o, s) in chunk.iter_mut().zip(buf.iter()) {
                        *o = T::from_sample(*s);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| e.to_string())
}
