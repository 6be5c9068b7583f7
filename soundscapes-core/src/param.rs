//! Automation timeline for a single scalar parameter.
//!
//! A `Param` holds a small, time-sorted queue of [`ParamEvent`]s and is
//! evaluated once per sample at an absolute context time (seconds since the
//! render clock started). The control path schedules events ahead of time;
//! the render path only ever calls [`Param::tick`].
//!
//! Segment rules:
//! - `SetValue` jumps at its time.
//! - Ramps start where the previous event ended, or where the queue last went
//!   idle, and finish exactly on their end value.
//! - `ExponentialRamp` needs both endpoints strictly positive (or both
//!   negative); otherwise it holds the start value and jumps at the end.
//! - `SetTarget` decays towards its target with time constant `tau` until the
//!   next event's time.
//!
//! Capacity is a const generic so the queue lives inline; no heap.

use crate::dsp::{exp, ln};
use core::fmt::Debug;

/// One scheduled change. Times are absolute context seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamEvent {
    SetValue { value: f32, at: f64 },
    LinearRamp { value: f32, end: f64 },
    ExponentialRamp { value: f32, end: f64 },
    SetTarget { target: f32, start: f64, tau: f32 },
}

impl ParamEvent {
    /// The time this event is anchored to (used for ordering).
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { at, .. } => at,
            ParamEvent::LinearRamp { end, .. } | ParamEvent::ExponentialRamp { end, .. } => end,
            ParamEvent::SetTarget { start, .. } => start,
        }
    }

    #[inline]
    fn is_finite(&self) -> bool {
        let t = self.time().is_finite();
        match *self {
            ParamEvent::SetValue { value, .. }
            | ParamEvent::LinearRamp { value, .. }
            | ParamEvent::ExponentialRamp { value, .. } => t && value.is_finite(),
            ParamEvent::SetTarget { target, tau, .. } => t && target.is_finite() && tau.is_finite(),
        }
    }
}

/// Returned when an event cannot be queued.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScheduleError {
    /// The queue already holds `N` events.
    Full(ParamEvent),
    /// Value or time was NaN/infinite.
    NotFinite(ParamEvent),
}

/// Sample-accurate automated parameter with room for `N` pending events.
#[derive(Copy, Clone, Debug)]
pub struct Param<const N: usize> {
    value: f32,
    events: [Option<ParamEvent>; N],
    len: usize,
    // where the current segment started
    seg_time: f64,
    seg_value: f32,
}

impl<const N: usize> Param<N> {
    #[inline]
    pub fn new(value: f32) -> Self {
        Self {
            value,
            events: [None; N],
            len: 0,
            seg_time: 0.0,
            seg_value: value,
        }
    }

    /// Current (last evaluated) value.
    #[inline] pub fn value(&self) -> f32 { self.value }

    /// Number of queued events.
    #[inline] pub fn pending(&self) -> usize { self.len }

    #[inline] pub fn is_idle(&self) -> bool { self.len == 0 }

    /// Queue `event`, keeping the queue sorted by time. Events sharing a time
    /// keep their insertion order.
    pub fn schedule(&mut self, event: ParamEvent) -> Result<(), ScheduleError> {
        if !event.is_finite() {
            return Err(ScheduleError::NotFinite(event));
        }
        if self.len == N {
            return Err(ScheduleError::Full(event));
        }
        let t = event.time();
        let mut i = self.len;
        while i > 0 && self.events[i - 1].map_or(false, |e| e.time() > t) {
            self.events[i] = self.events[i - 1];
            i -= 1;
        }
        self.events[i] = Some(event);
        self.len += 1;
        Ok(())
    }

    /// Drop every event anchored at or after `from`. The parameter holds
    /// whatever value it had reached.
    pub fn cancel(&mut self, from: f64) {
        let mut kept = 0;
        for i in 0..self.len {
            if let Some(e) = self.events[i] {
                if e.time() < from {
                    self.events[kept] = Some(e);
                    kept += 1;
                }
            }
        }
        for slot in &mut self.events[kept..self.len] {
            *slot = None;
        }
        self.len = kept;
    }

    /// Drop all events and jump to `value`.
    #[inline]
    pub fn set_immediate(&mut self, value: f32, now: f64) {
        self.cancel(f64::NEG_INFINITY);
        self.value = value;
        self.seg_time = now;
        self.seg_value = value;
    }

    #[inline]
    fn pop_front(&mut self, at: f64, value: f32) {
        for i in 1..self.len {
            self.events[i - 1] = self.events[i];
        }
        self.len -= 1;
        self.events[self.len] = None;
        self.value = value;
        self.seg_time = at;
        self.seg_value = value;
    }

    /// Evaluate at context time `now` (seconds) and return the value.
    /// `now` must be non-decreasing between calls.
    pub fn tick(&mut self, now: f64) -> f32 {
        loop {
            let head = if self.len > 0 { self.events[0] } else { None };
            let Some(head) = head else {
                self.seg_time = now;
                self.seg_value = self.value;
                return self.value;
            };

            match head {
                ParamEvent::SetValue { value, at } => {
                    if now >= at {
                        self.pop_front(at, value);
                        continue;
                    }
                    return self.value;
                }
                ParamEvent::LinearRamp { value, end } => {
                    if now >= end {
                        self.pop_front(end, value);
                        continue;
                    }
                    let frac = self.fraction(now, end);
                    self.value = self.seg_value + (value - self.seg_value) * frac;
                    return self.value;
                }
                ParamEvent::ExponentialRamp { value, end } => {
                    if now >= end {
                        self.pop_front(end, value);
                        continue;
                    }
                    let v0 = self.seg_value;
                    self.value = if v0 * value > 0.0 {
                        let frac = self.fraction(now, end);
                        v0 * exp(frac * ln(value / v0))
                    } else {
                        v0
                    };
                    return self.value;
                }
                ParamEvent::SetTarget { target, start, tau } => {
                    if now < start {
                        return self.value;
                    }
                    let origin_t = start.max(self.seg_time);
                    let next = if self.len > 1 { self.events[1].map(|e| e.time()) } else { None };
                    match next {
                        Some(nt) if now >= nt => {
                            let v = self.approach(target, tau, nt - origin_t);
                            self.pop_front(nt, v);
                        }
                        _ => {
                            self.value = self.approach(target, tau, now - origin_t);
                            return self.value;
                        }
                    }
                }
            }
        }
    }

    #[inline]
    fn fraction(&self, now: f64, end: f64) -> f32 {
        let span = end - self.seg_time;
        if span <= 0.0 {
            return 1.0;
        }
        (((now - self.seg_time) / span) as f32).clamp(0.0, 1.0)
    }

    #[inline]
    fn approach(&self, target: f32, tau: f32, elapsed: f64) -> f32 {
        if tau <= 0.0 {
            return target;
        }
        let k = exp(-((elapsed.max(0.0) as f32) / tau));
        target + (self.seg_value - target) * k
    }
}

// ------------------------------------ Tests --------------------------------------
