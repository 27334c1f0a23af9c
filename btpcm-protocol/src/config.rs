use std::fmt;
use std::str::FromStr;

use crate::state::HwCompat;

/// PCM creation options, as passed in by the application (spec §6).
#[derive(Debug, Clone)]
pub struct PcmConfig {
    pub service: String,
    pub device: BluetoothAddress,
    pub profile: Profile,
    pub codec: CodecSpec,
    pub volume: Option<Volume>,
    pub softvol: bool,
    /// Signed milliseconds to add to the delay estimate.
    pub delay_ms: i64,
    pub hwcompat: HwCompat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bluetooth address: {0:?}")]
    InvalidAddress(String),
    #[error("unknown profile: {0:?} (expected a2dp or sco)")]
    UnknownProfile(String),
    #[error("invalid codec spec: {0:?}")]
    InvalidCodec(String),
    #[error("invalid volume: {0:?}")]
    InvalidVolume(String),
    #[error("unknown hwcompat mode: {0:?} (expected none, busy or silence)")]
    UnknownHwCompat(String),
}

/// A Bluetooth device address, `xx:xx:xx:xx:xx:xx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BluetoothAddress(pub [u8; 6]);

impl FromStr for BluetoothAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| ConfigError::InvalidAddress(s.to_string()))?;

            if part.len() != 2 {
                return Err(ConfigError::InvalidAddress(s.to_string()));
            }

            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(ConfigError::InvalidAddress(s.to_string()));
        }

        Ok(BluetoothAddress(octets))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Which Bluetooth audio profile the FIFO carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Profile {
    A2dp,
    Sco,
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a2dp" => Ok(Profile::A2dp),
            "sco" => Ok(Profile::Sco),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::A2dp => write!(f, "a2dp"),
            Profile::Sco => write!(f, "sco"),
        }
    }
}

/// A codec name, optionally followed by `:hex-config` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSpec {
    pub name: String,
    pub config: Option<Vec<u8>>,
}

impl FromStr for CodecSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, hex)) => {
                let config = decode_hex(hex).ok_or_else(|| ConfigError::InvalidCodec(s.to_string()))?;
                Ok(CodecSpec { name: name.to_string(), config: Some(config) })
            }
            None => Ok(CodecSpec { name: s.to_string(), config: None }),
        }
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// A volume level 0-100, with an optional trailing `+`/`-` to force
/// unmute/mute (spec §6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Volume {
    pub level: u8,
    pub mute: Option<bool>,
}

impl FromStr for Volume {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, mute) = match s.as_bytes().last() {
            Some(b'+') => (&s[..s.len() - 1], Some(false)),
            Some(b'-') => (&s[..s.len() - 1], Some(true)),
            _ => (s, None),
        };

        let level: u8 = digits.parse().map_err(|_| ConfigError::InvalidVolume(s.to_string()))?;

        if level > 100 {
            return Err(ConfigError::InvalidVolume(s.to_string()));
        }

        Ok(Volume { level, mute })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_address() {
        let addr: BluetoothAddress = "00:11:22:aa:BB:cc".parse().unwrap();
        assert_eq!(addr.0, [0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]);
        assert_eq!(addr.to_string(), "00:11:22:AA:BB:CC");
    }

    #[test]
    fn reject_bad_address() {
        assert!("00:11:22:aa:bb".parse::<BluetoothAddress>().is_err());
        assert!("not-an-address".parse::<BluetoothAddress>().is_err());
        assert!("00:11:22:aa:bb:cc:dd".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn parse_profile() {
        assert_eq!("a2dp".parse::<Profile>().unwrap(), Profile::A2dp);
        assert_eq!("sco".parse::<Profile>().unwrap(), Profile::Sco);
        assert!("rfcomm".parse::<Profile>().is_err());
    }

    #[test]
    fn parse_codec_with_config() {
        let codec: CodecSpec = "aac:0102ff".parse().unwrap();
        assert_eq!(codec.name, "aac");
        assert_eq!(codec.config, Some(vec![0x01, 0x02, 0xff]));
    }

    #[test]
    fn parse_codec_without_config() {
        let codec: CodecSpec = "sbc".parse().unwrap();
        assert_eq!(codec.name, "sbc");
        assert_eq!(codec.config, None);
    }

    #[test]
    fn parse_volume() {
        assert_eq!("75".parse::<Volume>().unwrap(), Volume { level: 75, mute: None });
        assert_eq!("75+".parse::<Volume>().unwrap(), Volume { level: 75, mute: Some(false) });
        assert_eq!("0-".parse::<Volume>().unwrap(), Volume { level: 0, mute: Some(true) });
        assert!("101".parse::<Volume>().is_err());
        assert!("abc".parse::<Volume>().is_err());
    }
}
