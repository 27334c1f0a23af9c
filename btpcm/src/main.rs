use std::os::unix::io::IntoRawFd;
use std::os::unix::net::UnixDatagram;
use std::process::ExitCode;

use structopt::StructOpt;

use btpcm::config::{self, PcmOpt};
use btpcm_core::PcmGeometry;
use btpcm_protocol::{Direction, SampleFormat, SampleRate};
use btpcm_transport::{ControlChannel, EventDescriptor, Fifo, Transport};

#[derive(StructOpt)]
struct Opt {
    #[structopt(flatten)]
    pcm: PcmOpt,

    #[structopt(long, default_value = "capture")]
    /// "capture" or "playback" - which direction to exercise
    direction: String,
}

fn main() -> Result<(), ExitCode> {
    if let Some(file_config) = config::read() {
        config::load_into_env(&file_config);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let direction = match opt.direction.as_str() {
        "capture" => Direction::Capture,
        "playback" => Direction::Playback,
        other => {
            eprintln!("error: unknown direction {other:?} (expected capture or playback)");
            return Err(ExitCode::FAILURE);
        }
    };

    let config = opt.pcm.into_config().map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::FAILURE
    })?;

    log::info!(
        "opening {} {:?} stream to {} via {}",
        config.profile, direction, config.device, config.service
    );

    // Loopback fds for a standalone smoke run - a real deployment is
    // handed these descriptors by the external Bluetooth audio service.
    let mut fds = [0 as std::os::unix::io::RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        eprintln!("error: creating loopback fifo: {}", std::io::Error::last_os_error());
        return Err(ExitCode::FAILURE);
    }
    let [data_rx, data_tx] = fds;
    let fifo_fd = match direction {
        Direction::Capture => data_rx,
        Direction::Playback => data_tx,
    };

    let (control_local, _control_peer) = UnixDatagram::pair().map_err(|err| {
        eprintln!("error: creating loopback control socket: {err}");
        ExitCode::FAILURE
    })?;

    let fifo = Fifo::from_raw_fd(fifo_fd, direction);
    let control = ControlChannel::from_raw_fd(control_local.into_raw_fd());
    let event = EventDescriptor::new().map_err(|err| {
        eprintln!("error: creating event descriptor: {err}");
        ExitCode::FAILURE
    })?;

    let geometry = PcmGeometry {
        rate: SampleRate(44_100),
        channels: 2,
        format: SampleFormat::S16LE,
        period_size: 1024,
        buffer_size: 4096,
        avail_min: 1024,
        boundary: i64::MAX - (i64::MAX % 4096),
    };

    let mut pcm = btpcm::Pcm::open(config, direction);
    pcm.hw_params(geometry, Transport::new(fifo, control, event), 0, 0)
        .map_err(|err| {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        })?;

    pcm.prepare().map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::FAILURE
    })?;

    log::info!("prepared; state = {:?}", pcm.state());

    Ok(())
}
