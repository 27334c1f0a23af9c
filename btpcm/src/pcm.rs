use std::sync::Mutex;
use std::time::Duration;

use btpcm_core::{drain_playback, DelayOutcome, DrainOutcome, PcmGeometry, PollDispatch, RevEvents, TransferEngine};
use btpcm_protocol::config::PcmConfig;
use btpcm_protocol::{Direction, PcmState};
use btpcm_transport::control::PAUSE_RESUME_TIMEOUT;
use btpcm_transport::{Command, ControlChannel, EventDescriptor, FifoChannel, NullSink, PropertyService, Transport};

use crate::error::PcmError;

/// The object an application gets back from `Pcm::open` (spec §3
/// lifecycle: open -> hw/sw params -> prepare -> start -> ... -> stop ->
/// close). Hardware-parameter negotiation itself is treated as an
/// external collaborator (spec §1); callers hand us the negotiated
/// geometry directly via `hw_params`.
pub struct Pcm {
    config: PcmConfig,
    direction: Direction,
    state: Mutex<PcmState>,
    engine: Option<TransferEngine>,
}

impl Pcm {
    /// `open()`: takes ownership of the transport descriptors handed to
    /// us by the external Bluetooth audio service (spec §3, §6).
    pub fn open(config: PcmConfig, direction: Direction) -> Self {
        Pcm {
            config,
            direction,
            state: Mutex::new(PcmState::Open),
            engine: None,
        }
    }

    pub fn config(&self) -> &PcmConfig {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> PcmState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: PcmState) {
        *self.state.lock().unwrap() = state;
    }

    /// `hw_params()`/`sw_params()` collapsed into one step: the engine is
    /// built once the negotiated geometry and transport are known.
    pub fn hw_params(
        &mut self,
        geometry: PcmGeometry,
        transport: Transport,
        client_delay_dms: i64,
        extra_delay_frames: i64,
    ) -> Result<(), PcmError> {
        if self.state() != PcmState::Open {
            return Err(PcmError::BadState);
        }

        let Transport { fifo, control, event, null_sink } = transport;

        let engine = TransferEngine::new(
            geometry,
            self.direction,
            control,
            Box::new(fifo),
            event,
            self.config.hwcompat,
            null_sink,
            client_delay_dms + self.config.delay_ms,
            extra_delay_frames,
        );

        self.engine = Some(engine);
        self.set_state(PcmState::Setup);
        Ok(())
    }

    /// Variant of `hw_params` for the SCO profile, where the FIFO carries
    /// eSCO-framed wire bytes rather than raw PCM (spec §4.7).
    pub fn hw_params_with_channel(
        &mut self,
        geometry: PcmGeometry,
        fifo: Box<dyn FifoChannel>,
        control: ControlChannel,
        event: EventDescriptor,
        null_sink: Option<NullSink>,
        client_delay_dms: i64,
        extra_delay_frames: i64,
    ) -> Result<(), PcmError> {
        if self.state() != PcmState::Open {
            return Err(PcmError::BadState);
        }

        let engine = TransferEngine::new(
            geometry,
            self.direction,
            control,
            fifo,
            event,
            self.config.hwcompat,
            null_sink,
            client_delay_dms + self.config.delay_ms,
            extra_delay_frames,
        );

        self.engine = Some(engine);
        self.set_state(PcmState::Setup);
        Ok(())
    }

    fn engine(&self) -> Result<&TransferEngine, PcmError> {
        self.engine.as_ref().ok_or(PcmError::BadState)
    }

    /// `prepare()`: zero both ring pointers.
    pub fn prepare(&self) -> Result<(), PcmError> {
        self.engine()?.reset();
        self.set_state(PcmState::Prepared);
        Ok(())
    }

    /// `start()`.
    pub fn start(&self) -> Result<(), PcmError> {
        let state = self.state();
        if state != PcmState::Prepared && state != PcmState::Paused {
            return Err(PcmError::BadState);
        }
        self.engine()?.start().map_err(PcmError::from_engine)?;
        self.set_state(PcmState::Running);
        Ok(())
    }

    /// `stop()`: per spec §7, the hard-failure floor lands back in
    /// `Setup`, same as a successful drain.
    pub fn stop(&self) -> Result<(), PcmError> {
        self.engine()?.stop().map_err(PcmError::from_engine)?;
        self.set_state(PcmState::Setup);
        Ok(())
    }

    /// `pause(enable)` (spec §4.3). The control-channel verb only goes out
    /// once the in-process handshake with the transfer thread has
    /// completed, so the server never hears "paused"/"resumed" ahead of
    /// the thread actually being parked or released.
    pub fn pause(&self, enable: bool) -> Result<(), PcmError> {
        let engine = self.engine()?;

        if enable {
            engine.pause_coordinator().request_pause();
            engine.pause_coordinator().wait_until_paused();
            if engine.pause_coordinator().is_disconnected() {
                return Err(PcmError::TransportGone);
            }
            engine
                .send_control_and_wait(Command::Pause, PAUSE_RESUME_TIMEOUT)
                .map_err(PcmError::from_engine)?;
            engine.delay().capture_paused_delay(self.state());
            let _ = engine.event().signal_ready();
            self.set_state(PcmState::Paused);
        } else {
            engine
                .send_control_and_wait(Command::Resume, PAUSE_RESUME_TIMEOUT)
                .map_err(PcmError::from_engine)?;
            engine.pause_coordinator().request_resume();
            engine.delay().clear_paused_delay();
            let _ = engine.event().signal_ready();
            self.set_state(PcmState::Running);
        }

        Ok(())
    }

    /// `drain()`. Capture drain is a no-op success (spec §4.3); playback
    /// drain runs the blocking/nonblocking protocol in `btpcm_core::drain`.
    pub fn drain(&self, nonblock: bool) -> Result<(), PcmError> {
        match self.direction {
            Direction::Capture => {
                self.set_state(PcmState::Setup);
                Ok(())
            }
            Direction::Playback => {
                self.set_state(PcmState::Draining);
                match drain_playback(self.engine()?, nonblock) {
                    Ok(DrainOutcome::Done) => {
                        self.set_state(PcmState::Setup);
                        Ok(())
                    }
                    Ok(DrainOutcome::Again) => Err(PcmError::ProtocolTimeout),
                    Err(err) => {
                        self.set_state(PcmState::Setup);
                        Err(PcmError::Drain(err))
                    }
                }
            }
        }
    }

    /// `pointer()`.
    pub fn pointer(&self, legacy_mod_buffer: bool) -> Result<i64, PcmError> {
        Ok(self.engine()?.pointer(legacy_mod_buffer))
    }

    /// `delay()` (spec §4.6). If the property service hasn't been
    /// dispatched in over a second, run one synchronous catch-up dispatch
    /// first so the reported delay reflects any pending codec/property
    /// update rather than a stale one.
    pub fn delay(&self) -> Result<DelayOutcome, PcmError> {
        let engine = self.engine()?;
        if engine.delay().dispatch_is_stale() {
            let _ = engine.event().dispatch(Some(Duration::ZERO));
            engine.delay().note_dispatch();
        }
        Ok(engine.delay().delay(self.state()))
    }

    /// `poll_revents()` (spec §4.5): the caller has already blocked on the
    /// event descriptor via its own poll loop, so this dispatches the
    /// pending wakeup (applying any property update it carries), reads it
    /// exactly once, and re-arms if the state is still actionable.
    pub fn poll_revents(&self) -> Result<RevEvents, PcmError> {
        Ok(self.engine()?.dispatch_blocking(self.state()))
    }

    /// `close()`: release the engine (and with it, the transport
    /// descriptors) and return to `Open`.
    pub fn close(&mut self) {
        self.engine = None;
        self.set_state(PcmState::Open);
    }
}
