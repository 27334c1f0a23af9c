use std::env;
use std::path::Path;

use serde::Deserialize;
use structopt::StructOpt;

use btpcm_protocol::config::{BluetoothAddress, CodecSpec, ConfigError, PcmConfig, Profile, Volume};
use btpcm_protocol::HwCompat;

/// CLI surface for the test harness binary (spec §4.9, §6): the six PCM
/// creation options, the same way `bark::socket::SocketOpt` flattens onto
/// `bark`'s top-level `Opt`.
#[derive(StructOpt, Debug, Clone)]
pub struct PcmOpt {
    #[structopt(long, env = "BTPCM_SERVICE")]
    /// Name of the external Bluetooth audio service to connect to
    pub service: String,

    #[structopt(long, env = "BTPCM_DEVICE")]
    /// Bluetooth device address, xx:xx:xx:xx:xx:xx
    pub device: String,

    #[structopt(long, env = "BTPCM_PROFILE", default_value = "a2dp")]
    /// "a2dp" or "sco"
    pub profile: String,

    #[structopt(long, env = "BTPCM_CODEC", default_value = "sbc")]
    /// Codec name, optionally followed by :hex-config
    pub codec: String,

    #[structopt(long, env = "BTPCM_VOLUME")]
    /// Volume 0-100, optionally suffixed with + or - to force unmute/mute
    pub volume: Option<String>,

    #[structopt(long, env = "BTPCM_SOFTVOL")]
    pub softvol: bool,

    #[structopt(long, env = "BTPCM_DELAY_MS", default_value = "0")]
    pub delay_ms: i64,

    #[structopt(long, env = "BTPCM_HWCOMPAT", default_value = "none")]
    /// "none", "busy" or "silence"
    pub hwcompat: String,
}

impl PcmOpt {
    pub fn into_config(self) -> Result<PcmConfig, ConfigError> {
        let device: BluetoothAddress = self.device.parse()?;
        let profile: Profile = self.profile.parse()?;
        let codec: CodecSpec = self.codec.parse()?;
        let volume: Option<Volume> = self.volume.map(|v| v.parse()).transpose()?;
        let hwcompat: HwCompat = self.hwcompat.parse().map_err(|_| ConfigError::UnknownHwCompat(self.hwcompat))?;

        Ok(PcmConfig {
            service: self.service,
            device,
            profile,
            codec,
            volume,
            softvol: self.softvol,
            delay_ms: self.delay_ms,
            hwcompat,
        })
    }
}

/// On-disk override file, layered under CLI/env the way `bark::config`
/// layers `bark.toml` (spec §4.9).
#[derive(Deserialize, Default)]
pub struct FileConfig {
    pub service: Option<String>,
    pub device: Option<String>,
    pub profile: Option<String>,
    pub codec: Option<String>,
    pub volume: Option<String>,
    pub softvol: Option<bool>,
    pub delay_ms: Option<i64>,
    pub hwcompat: Option<String>,
}

fn set_env(name: &str, value: impl ToString) {
    if env::var_os(name).is_none() {
        env::set_var(name, value.to_string());
    }
}

fn set_env_option(name: &str, value: Option<impl ToString>) {
    if let Some(value) = value {
        set_env(name, value);
    }
}

/// Only fills in env vars that are still unset, so CLI args (parsed
/// afterwards) always win over the file (spec §4.9 precedence order).
pub fn load_into_env(config: &FileConfig) {
    set_env_option("BTPCM_SERVICE", config.service.clone());
    set_env_option("BTPCM_DEVICE", config.device.clone());
    set_env_option("BTPCM_PROFILE", config.profile.clone());
    set_env_option("BTPCM_CODEC", config.codec.clone());
    set_env_option("BTPCM_VOLUME", config.volume.clone());
    set_env_option("BTPCM_SOFTVOL", config.softvol);
    set_env_option("BTPCM_DELAY_MS", config.delay_ms);
    set_env_option("BTPCM_HWCOMPAT", config.hwcompat.clone());
}

fn load_file(path: &Path) -> Option<FileConfig> {
    log::debug!("looking for config in {}", path.display());

    let contents = std::fs::read_to_string(path).ok()?;

    match toml::from_str(&contents) {
        Ok(config) => {
            log::info!("reading config from {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::error!("error reading config: {e}");
            std::process::exit(1);
        }
    }
}

pub fn read() -> Option<FileConfig> {
    if let Some(config) = load_file(Path::new("btpcm.toml")) {
        return Some(config);
    }

    let dirs = xdg::BaseDirectories::new().ok()?;
    if let Some(config) = dirs.find_config_file("btpcm.toml") {
        return load_file(&config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_cli_options() {
        let opt = PcmOpt::from_iter(&[
            "btpcm-harness",
            "--service", "org.bluez",
            "--device", "00:11:22:33:44:55",
            "--profile", "a2dp",
            "--codec", "sbc",
        ]);

        let config = opt.into_config().unwrap();
        assert_eq!(config.service, "org.bluez");
        assert_eq!(config.profile, Profile::A2dp);
        assert_eq!(config.hwcompat, HwCompat::None);
    }

    #[test]
    fn rejects_bad_device_address() {
        let opt = PcmOpt::from_iter(&[
            "btpcm-harness",
            "--service", "org.bluez",
            "--device", "not-an-address",
        ]);

        assert!(opt.into_config().is_err());
    }
}
