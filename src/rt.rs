//! Real-time callback path shared between the device and backend drivers.

use std::cell::UnsafeCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use atomic_float::AtomicF32;
use crossbeam_channel::Sender;

use crate::buffer::{self, OutputBuffer, SampleBuf};
use crate::config::{ConfigFlags, DataCallback, DeviceParams, SampleFormat, UserData};
use crate::stats::{DeviceEvent, DeviceStats};

/// Remainder of a period the driver has not consumed yet. `pos` at the end
/// of the buffer means empty.
struct Carry {
    buf: SampleBuf,
    pos: usize,
}

/// Glue between a driver's raw output buffer and the application callback.
///
/// A driver fires this once per hardware cycle from its real-time thread.
/// The trampoline pre-silences, chunks to fixed period sizes, guards the
/// application callback against panics, and applies the volume and clip
/// post-passes.
///
/// Interior mutability mirrors the single-audio-thread contract: `fire` is
/// only ever called from the one thread the driver owns, never reentrantly,
/// and `deactivate()` joins that thread before control-plane code touches
/// the device again.
pub struct CallbackTrampoline {
    callback: UnsafeCell<DataCallback>,
    carry: UnsafeCell<Carry>,
    user_data: Option<UserData>,
    params: DeviceParams,
    pre_silence: bool,
    clip: bool,
    fixed_size: bool,
    volume: Arc<AtomicF32>,
    stats: Arc<DeviceStats>,
    events: Sender<DeviceEvent>,
}

// SAFETY: the UnsafeCell fields are only touched inside `fire`, which the
// driver contract restricts to its single real-time thread. The control
// thread constructs the trampoline, hands it over, and only reads the
// Sync fields afterwards.
unsafe impl Send for CallbackTrampoline {}
unsafe impl Sync for CallbackTrampoline {}

impl CallbackTrampoline {
    pub(crate) fn new(
        callback: DataCallback,
        user_data: Option<UserData>,
        params: DeviceParams,
        flags: ConfigFlags,
        volume: Arc<AtomicF32>,
        stats: Arc<DeviceStats>,
        events: Sender<DeviceEvent>,
    ) -> Self {
        let period_bytes = params.period_bytes();
        Self {
            callback: UnsafeCell::new(callback),
            carry: UnsafeCell::new(Carry {
                buf: SampleBuf::zeroed(period_bytes),
                pos: period_bytes,
            }),
            user_data,
            params,
            pre_silence: !flags.no_pre_silenced_output_buffer,
            clip: !flags.no_clip && params.format == SampleFormat::Float32,
            fixed_size: !flags.no_fixed_sized_callback,
            volume,
            stats,
            events,
        }
    }

    /// Negotiated stream parameters the driver must honor.
    pub fn params(&self) -> DeviceParams {
        self.params
    }

    /// Produce `data.len() / frame_bytes` frames of interleaved output.
    ///
    /// Called from the driver's real-time thread only. `data` must hold
    /// whole frames in the negotiated format.
    pub fn fire(&self, data: &mut [u8]) {
        let frame_bytes = self.params.frame_bytes();
        debug_assert_eq!(data.len() % frame_bytes, 0);
        if data.is_empty() {
            return;
        }
        self.stats.record_fire((data.len() / frame_bytes) as u64);

        if self.fixed_size {
            self.fire_fixed(data);
        } else {
            self.run_callback(data);
        }

        let volume = self.volume.load(std::sync::atomic::Ordering::Relaxed);
        if volume < 1.0 {
            buffer::apply_volume(data, self.params.format, volume.max(0.0));
        }
        if self.clip {
            buffer::clip_float32(data);
        }
    }

    /// Record a missed deadline. Safe to call from the real-time thread.
    pub fn note_underrun(&self) {
        self.stats.record_underrun();
        // Dropped when the queue is full; the counter still advances.
        let _ = self.events.try_send(DeviceEvent::Underrun);
    }

    /// Deliver exactly period-sized buffers to the callback, carrying any
    /// remainder over to the next fire.
    fn fire_fixed(&self, mut data: &mut [u8]) {
        // SAFETY: single real-time thread, see the impl-level contract.
        let carry = unsafe { &mut *self.carry.get() };
        let period_bytes = self.params.period_bytes();

        while !data.is_empty() {
            if carry.pos == period_bytes {
                self.run_callback(&mut carry.buf.as_mut_bytes()[..period_bytes]);
                carry.pos = 0;
            }
            let take = (period_bytes - carry.pos).min(data.len());
            let (head, rest) = core::mem::take(&mut data).split_at_mut(take);
            head.copy_from_slice(&carry.buf.as_mut_bytes()[carry.pos..carry.pos + take]);
            carry.pos += take;
            data = rest;
        }
    }

    fn run_callback(&self, chunk: &mut [u8]) {
        if self.pre_silence {
            buffer::silence_bytes(chunk, self.params.format);
        }
        // SAFETY: single real-time thread, see the impl-level contract.
        let callback = unsafe { &mut *self.callback.get() };
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut out = OutputBuffer::new(&mut *chunk, self.params.format, self.params.channels);
            callback(&mut out, self.user_data.as_ref());
        }));
        if result.is_err() {
            // Panic in the callback - emit silence, report off-thread.
            buffer::silence_bytes(chunk, self.params.format);
            let _ = self.events.try_send(DeviceEvent::CallbackPanicked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceProfile;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn params(period: u32) -> DeviceParams {
        DeviceParams {
            format: SampleFormat::Float32,
            channels: 2,
            sample_rate: 48_000,
            period_size_in_frames: period,
            performance_profile: PerformanceProfile::LowLatency,
        }
    }

    fn trampoline(
        callback: DataCallback,
        params: DeviceParams,
        flags: ConfigFlags,
    ) -> (CallbackTrampoline, Arc<DeviceStats>, crossbeam_channel::Receiver<DeviceEvent>) {
        let stats = Arc::new(DeviceStats::new());
        let (tx, rx) = crossbeam_channel::bounded(8);
        let tramp = CallbackTrampoline::new(
            callback,
            None,
            params,
            flags,
            Arc::new(AtomicF32::new(1.0)),
            stats.clone(),
            tx,
        );
        (tramp, stats, rx)
    }

    #[test]
    fn test_fixed_size_chunks_and_carries() {
        let invocations = Arc::new(AtomicU64::new(0));
        let seen = invocations.clone();
        let callback: DataCallback = Box::new(move |out, _| {
            assert_eq!(out.frame_count(), 64);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let (tramp, stats, _rx) = trampoline(callback, params(64), ConfigFlags::default());

        // 160 frames = 2.5 periods: three callbacks, 32 frames carried.
        let mut buf = SampleBuf::zeroed(160 * 8);
        tramp.fire(buf.as_mut_bytes());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        // The carried 32 frames satisfy the next 32-frame fire entirely.
        let mut small = SampleBuf::zeroed(32 * 8);
        tramp.fire(small.as_mut_bytes());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        assert_eq!(stats.snapshot().frames_rendered, 192);
        assert_eq!(stats.snapshot().callbacks, 2);
    }

    #[test]
    fn test_variable_size_passes_through() {
        let invocations = Arc::new(AtomicU64::new(0));
        let seen = invocations.clone();
        let callback: DataCallback = Box::new(move |out, _| {
            assert_eq!(out.frame_count(), 160);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let flags = ConfigFlags {
            no_fixed_sized_callback: true,
            ..Default::default()
        };
        let (tramp, _stats, _rx) = trampoline(callback, params(64), flags);

        let mut buf = SampleBuf::zeroed(160 * 8);
        tramp.fire(buf.as_mut_bytes());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pre_silence_default() {
        let callback: DataCallback = Box::new(|out, _| {
            assert!(out.bytes().iter().all(|&b| b == 0));
        });
        let (tramp, _stats, _rx) = trampoline(callback, params(8), ConfigFlags::default());

        let mut buf = SampleBuf::zeroed(8 * 8);
        buf.as_mut_bytes().fill(0xAB);
        tramp.fire(buf.as_mut_bytes());
    }

    #[test]
    fn test_panic_yields_silence_and_event() {
        let callback: DataCallback = Box::new(|_out, _| panic!("misbehaving app"));
        let flags = ConfigFlags {
            no_fixed_sized_callback: true,
            ..Default::default()
        };
        let (tramp, _stats, rx) = trampoline(callback, params(8), flags);

        let mut buf = SampleBuf::zeroed(8 * 8);
        buf.as_mut_bytes().fill(0xAB);
        tramp.fire(buf.as_mut_bytes());

        assert!(buf.as_mut_bytes().iter().all(|&b| b == 0));
        assert_eq!(rx.try_recv(), Ok(DeviceEvent::CallbackPanicked));
    }

    #[test]
    fn test_volume_and_clip_post_pass() {
        let callback: DataCallback = Box::new(|out, _| {
            for sample in out.as_f32_mut().unwrap() {
                *sample = 3.0;
            }
        });
        let stats = Arc::new(DeviceStats::new());
        let (tx, _rx) = crossbeam_channel::bounded(8);
        let volume = Arc::new(AtomicF32::new(1.0));
        let tramp = CallbackTrampoline::new(
            callback,
            None,
            params(4),
            ConfigFlags {
                no_fixed_sized_callback: true,
                ..Default::default()
            },
            volume.clone(),
            stats,
            tx,
        );

        // Full volume: 3.0 clipped to 1.0.
        let mut buf = SampleBuf::zeroed(4 * 8);
        tramp.fire(buf.as_mut_bytes());
        let first = f32::from_ne_bytes(buf.as_mut_bytes()[0..4].try_into().unwrap());
        assert_eq!(first, 1.0);

        // Half volume: 1.5 still clipped to 1.0; quarter volume passes 0.75.
        volume.store(0.25, std::sync::atomic::Ordering::Relaxed);
        tramp.fire(buf.as_mut_bytes());
        let first = f32::from_ne_bytes(buf.as_mut_bytes()[0..4].try_into().unwrap());
        assert_eq!(first, 0.75);
    }

    #[test]
    fn test_underrun_reporting() {
        let callback: DataCallback = Box::new(|_out, _| {});
        let (tramp, stats, rx) = trampoline(callback, params(8), ConfigFlags::default());

        tramp.note_underrun();
        assert_eq!(stats.snapshot().underruns, 1);
        assert_eq!(rx.try_recv(), Ok(DeviceEvent::Underrun));
    }
}
