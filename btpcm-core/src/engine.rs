use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use btpcm_protocol::{Direction, HwCompat};
use btpcm_transport::{Command, ControlChannel, ControlError, EventDescriptor, FifoChannel, NullSink};
use btpcm_util::thread as bthread;

use crate::clock::RateClock;
use crate::delay::DelayEstimator;
use crate::geometry::PcmGeometry;
use crate::hwcompat::{period_deadline, SilenceCaptureGate};
use crate::idle::IdleGate;
use crate::pause::PauseCoordinator;
use crate::ring::{wrap_diff, RingBuffer, RingStorage};

/// How often the transfer thread re-checks readiness/cancellation while
/// waiting for the FIFO, instead of blocking in `read`/`write` forever.
const FIFO_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("control channel error: {0}")]
    Control(#[from] ControlError),
}

struct Shared {
    geometry: PcmGeometry,
    direction: Direction,
    ring: RingBuffer,
    storage: RingStorage,
    pause: PauseCoordinator,
    idle_gate: IdleGate,
    delay: DelayEstimator,
    control: Mutex<ControlChannel>,
    fifo: Box<dyn FifoChannel>,
    event: EventDescriptor,
    hwcompat: HwCompat,
    silence_gate: SilenceCaptureGate,
    null_sink: Option<NullSink>,
    remote_running: AtomicBool,
    connected: AtomicBool,
    cancel: AtomicBool,
}

enum Failure {
    Disconnected,
    Cancelled,
}

/// Owns the ring buffer, the FIFO pair and the transfer thread that moves
/// frames between them (spec §4.1).
pub struct TransferEngine {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TransferEngine {
    pub fn new(
        geometry: PcmGeometry,
        direction: Direction,
        control: ControlChannel,
        fifo: Box<dyn FifoChannel>,
        event: EventDescriptor,
        hwcompat: HwCompat,
        null_sink: Option<NullSink>,
        client_delay_dms: i64,
        extra_delay_frames: i64,
    ) -> Self {
        let frame_bytes = geometry.frame_bytes();

        if direction == Direction::Capture && hwcompat == HwCompat::Silence {
            fifo.try_grow_capacity(geometry.period_size as usize * 2 * frame_bytes);
        }

        let delay = DelayEstimator::new(direction, geometry.rate, client_delay_dms, extra_delay_frames);
        delay.set_codec_delay_samples(fifo.codec_delay_samples());

        let shared = Arc::new(Shared {
            ring: RingBuffer::new(geometry.buffer_size, geometry.boundary, direction),
            storage: RingStorage::new(geometry.buffer_size, frame_bytes),
            pause: PauseCoordinator::new(),
            idle_gate: IdleGate::new(),
            delay,
            control: Mutex::new(control),
            fifo,
            event,
            hwcompat,
            silence_gate: SilenceCaptureGate::new(),
            null_sink,
            remote_running: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            cancel: AtomicBool::new(false),
            geometry,
            direction,
        });

        TransferEngine {
            shared,
            handle: Mutex::new(None),
        }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.shared.ring
    }

    pub fn delay(&self) -> &DelayEstimator {
        &self.shared.delay
    }

    pub fn event(&self) -> &EventDescriptor {
        &self.shared.event
    }

    pub fn pause_coordinator(&self) -> &PauseCoordinator {
        &self.shared.pause
    }

    pub fn geometry(&self) -> &PcmGeometry {
        &self.shared.geometry
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().unwrap().is_some()
    }

    pub fn set_remote_running(&self, running: bool) {
        self.shared.remote_running.store(running, Ordering::Release);
    }

    pub fn is_device_busy(&self) -> bool {
        let running = self.shared.remote_running.load(Ordering::Acquire);
        crate::hwcompat::is_device_busy(self.shared.hwcompat, running)
    }

    /// Called by the application thread after it advances `appl_ptr` from
    /// a position that left the engine idle - wakes the transfer thread
    /// out of its idle park without going through the pause handshake.
    pub fn wake_idle(&self) {
        self.shared.idle_gate.wake();
    }

    /// `prepare()`: zero both ring pointers.
    pub fn reset(&self) {
        self.shared.ring.reset();
    }

    /// `start()` (spec §4.1): if already running, just wake the transfer
    /// thread; otherwise send Resume and spawn it.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut handle = self.handle.lock().unwrap();

        if handle.is_some() {
            self.shared.pause.request_resume();
            self.shared.idle_gate.wake();
            return Ok(());
        }

        self.shared
            .control
            .lock()
            .unwrap()
            .send_and_wait(Command::Resume, btpcm_transport::control::PAUSE_RESUME_TIMEOUT)?;

        self.shared.cancel.store(false, Ordering::Release);
        let shared = self.shared.clone();
        *handle = Some(thread::spawn(move || run(shared)));
        Ok(())
    }

    /// `stop()`: cancel and join the transfer thread, reset `hw_ptr` to 0,
    /// send Drop, and (playback only) signal the event descriptor once so
    /// a blocked poller observes the state change.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut handle = self.handle.lock().unwrap();

        self.shared.cancel.store(true, Ordering::Release);
        self.shared.idle_gate.wake();
        self.shared.pause.request_resume();

        if let Some(join) = handle.take() {
            let _ = join.join();
        }

        self.shared.ring.publish_hw_ptr(0);

        let _ = self.send_control(Command::Drop);

        if self.shared.direction == Direction::Playback {
            let _ = self.shared.event.signal_ready();
        }

        Ok(())
    }

    /// Fire-and-forget control-channel send (`stop()`'s Drop, and any
    /// caller that doesn't need to wait for `"OK"`).
    pub fn send_control(&self, cmd: Command) -> Result<(), EngineError> {
        self.shared
            .control
            .lock()
            .unwrap()
            .send(cmd)
            .map_err(EngineError::Control)
    }

    pub fn send_control_and_wait(&self, cmd: Command, timeout: Duration) -> Result<(), EngineError> {
        self.shared
            .control
            .lock()
            .unwrap()
            .send_and_wait(cmd, timeout)
            .map_err(EngineError::Control)
    }

    /// `pointer()`. `legacy_mod_buffer` selects the legacy compatibility
    /// variant that reports `hw_ptr mod buffer_size` instead of the raw
    /// (mod-boundary) value. Per the intended (newer) contract (spec §9),
    /// this never returns a special disconnect value - callers check
    /// `is_connected()` separately.
    pub fn pointer(&self, legacy_mod_buffer: bool) -> i64 {
        let hw_ptr = self.shared.ring.hw_ptr();

        if legacy_mod_buffer && hw_ptr >= 0 {
            hw_ptr.rem_euclid(self.shared.ring.buffer_size())
        } else {
            hw_ptr
        }
    }
}

fn run(shared: Arc<Shared>) {
    let thread_name = match shared.direction {
        Direction::Playback => "btpcm/playback",
        Direction::Capture => "btpcm/capture",
    };
    bthread::set_name(thread_name);
    bthread::set_realtime_priority();

    let mut clock = RateClock::new(shared.geometry.rate);
    let mut local_hw_ptr = shared.ring.hw_ptr();

    loop {
        if shared.cancel.load(Ordering::Acquire) {
            break;
        }

        // Step 1: pause/idle park.
        if shared.pause.is_pending() {
            shared.pause.ack_pending_and_park(&shared.cancel);
            if shared.pause.is_disconnected() || shared.cancel.load(Ordering::Acquire) {
                break;
            }
            clock.reanchor();
            local_hw_ptr = shared.ring.hw_ptr();
            continue;
        }

        if shared.ring.is_idle() {
            shared.idle_gate.park_until_woken(&shared.cancel);
            if shared.cancel.load(Ordering::Acquire) {
                break;
            }
            clock.reanchor();
            local_hw_ptr = shared.ring.hw_ptr();
            continue;
        }

        // Step 2: compute availability.
        let avail = shared.ring.available();
        if avail == 0 {
            shared.ring.mark_idle();
            let fifo_frames = queued_frames(&shared);
            shared.delay.update_snapshot(fifo_frames, 0);
            let _ = shared.event.signal_ready();
            continue;
        }

        // Step 3: choose the chunk size, folding at the buffer boundary.
        let offset = local_hw_ptr.rem_euclid(shared.ring.buffer_size());
        let frames = avail
            .min(shared.geometry.period_size)
            .min(shared.ring.buffer_size() - offset);

        match transfer_chunk(&shared, offset, frames, &mut local_hw_ptr, avail) {
            Ok(()) => {}
            Err(Failure::Cancelled) => break,
            Err(Failure::Disconnected) => {
                shared.connected.store(false, Ordering::Release);
                let _ = shared.event.signal_disconnect();
                shared.pause.mark_disconnected();
                shared.idle_gate.wake();

                // Cancellation-disabled in spirit: park here (instead of
                // unwinding) until stop() observes the disconnect and
                // joins us, so the disconnect publication above is never
                // racing a half-torn-down ring buffer.
                while !shared.cancel.load(Ordering::Acquire) {
                    thread::sleep(FIFO_POLL_INTERVAL);
                }
                break;
            }
        }

        // Step 9: pace the rate clock for playback.
        if shared.direction == Direction::Playback {
            clock.pace(frames as u64);
        }
    }
}

/// Steps 4-8 of the per-iteration algorithm for one sub-chunk.
fn transfer_chunk(
    shared: &Shared,
    offset: i64,
    frames: i64,
    local_hw_ptr: &mut i64,
    avail_before: i64,
) -> Result<(), Failure> {
    let frame_bytes = shared.geometry.frame_bytes();
    let mut buf = vec![0u8; frames as usize * frame_bytes];

    let new_hw_ptr = (*local_hw_ptr + frames).rem_euclid(shared.ring.boundary());

    match shared.direction {
        Direction::Playback => {
            shared.storage.read_at(offset, frames, &mut buf);

            if shared.hwcompat == HwCompat::Silence && !shared.remote_running.load(Ordering::Acquire) {
                if let Some(sink) = &shared.null_sink {
                    let _ = sink.discard(&buf);
                }
            } else {
                if !wait_fifo_ready(shared)? {
                    return Err(Failure::Cancelled);
                }
                shared.fifo.write_all(&buf).map_err(|_| Failure::Disconnected)?;
            }
        }
        Direction::Capture => {
            let prebuffering = shared.hwcompat == HwCompat::Silence
                && !silence_gate_allows_real_read(shared, frames);

            if prebuffering {
                shared.storage.write_silence(offset, frames);
                shared.silence_gate.set_active(true);
            } else if shared.hwcompat == HwCompat::Silence {
                // Pre-buffered: still bound the wait to one period so a
                // real gap in the remote stream gets silence instead of
                // stalling the capture thread (spec §4.4).
                let deadline = period_deadline(frames, shared.geometry.rate);
                if wait_fifo_ready_deadline(shared, deadline)? {
                    shared.silence_gate.set_active(false);
                    shared.fifo.read_exact(&mut buf).map_err(|_| Failure::Disconnected)?;
                    shared.storage.write_at(offset, frames, &buf);
                } else {
                    shared.storage.write_silence(offset, frames);
                    shared.silence_gate.set_active(true);
                }
            } else {
                shared.silence_gate.set_active(false);
                if !wait_fifo_ready(shared)? {
                    return Err(Failure::Cancelled);
                }
                shared.fifo.read_exact(&mut buf).map_err(|_| Failure::Disconnected)?;
                shared.storage.write_at(offset, frames, &buf);
            }
        }
    }

    *local_hw_ptr = new_hw_ptr;

    let fifo_frames = queued_frames(shared);
    let appl = shared.ring.appl_ptr();
    let buffer_frames = match shared.direction {
        Direction::Playback => wrap_diff(appl, new_hw_ptr, shared.ring.boundary()),
        Direction::Capture => wrap_diff(new_hw_ptr, appl, shared.ring.boundary()),
    };
    shared.delay.update_snapshot(fifo_frames, buffer_frames);

    shared.ring.publish_hw_ptr(new_hw_ptr);

    if frames + shared.ring.buffer_size() - avail_before >= shared.geometry.avail_min {
        let _ = shared.event.signal_ready();
    }

    Ok(())
}

fn queued_frames(shared: &Shared) -> i64 {
    let frame_bytes = shared.geometry.frame_bytes().max(1) as i64;
    shared.fifo.queued_bytes().unwrap_or(0) / frame_bytes
}

fn silence_gate_allows_real_read(shared: &Shared, period_frames: i64) -> bool {
    let fifo_capacity_frames = i64::MAX / 2; // OS-bounded, not modeled precisely here
    let queued = queued_frames(shared);
    shared
        .silence_gate
        .ready_for_real_reads(queued, period_frames, fifo_capacity_frames)
}

/// Like `wait_fifo_ready`, but gives up once `deadline` has elapsed and
/// returns `Ok(false)` instead of continuing to wait - used by silence
/// hwcompat capture to insert a silent period rather than block past it
/// (spec §4.4).
fn wait_fifo_ready_deadline(shared: &Shared, deadline: Duration) -> Result<bool, Failure> {
    let start = Instant::now();
    loop {
        if shared.cancel.load(Ordering::Acquire) {
            return Err(Failure::Cancelled);
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Ok(false);
        }
        let remaining = (deadline - elapsed).min(FIFO_POLL_INTERVAL);
        match shared.fifo.poll_ready(remaining) {
            Ok(true) => return Ok(true),
            Ok(false) => continue,
            Err(_) => return Err(Failure::Disconnected),
        }
    }
}

/// Poll the FIFO for readiness, checking the cancellation flag between
/// polls so `stop()` is observed promptly even with no data flowing.
/// Returns `Ok(false)` if cancelled while waiting.
fn wait_fifo_ready(shared: &Shared) -> Result<bool, Failure> {
    loop {
        if shared.cancel.load(Ordering::Acquire) {
            return Ok(false);
        }
        match shared.fifo.poll_ready(FIFO_POLL_INTERVAL) {
            Ok(true) => return Ok(true),
            Ok(false) => continue,
            Err(_) => return Err(Failure::Disconnected),
        }
    }
}
