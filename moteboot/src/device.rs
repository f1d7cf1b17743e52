//! Discovery and classification of the USB serial bridges motes sit behind.

use crate::{
    error::{Error, Result},
    port::PortInfo,
};

#[cfg(feature = "native")]
use {
    crate::port::{NativePortEnumerator, PortEnumerator},
    log::{debug, info, trace},
};

/// USB-to-UART bridges found on mote boards and programming adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// FTDI FT232/FT2232 (Jennic evaluation kits, Pacemate boards).
    Ftdi,
    /// Silicon Labs CP210x.
    Cp210x,
    /// WCH CH340/CH341.
    Ch340,
    /// Prolific PL2303.
    Prolific,
    /// Anything else.
    Unknown,
}

const KNOWN_BRIDGES: &[(u16, &[u16], DeviceKind)] = &[
    (0x0403, &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015], DeviceKind::Ftdi),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], DeviceKind::Cp210x),
    (0x1A86, &[0x7523, 0x5523], DeviceKind::Ch340),
    (0x067B, &[0x2303, 0x23A3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_BRIDGES
            .iter()
            .find(|(known_vid, pids, _)| vid == *known_vid && pids.contains(&pid))
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ftdi => "FTDI",
            Self::Cp210x => "CP210x",
            Self::Ch340 => "CH340/CH341",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the bridge is one motes are commonly attached through.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A serial port together with its bridge classification.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Enumerated port information.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub info: PortInfo,
    /// Classified bridge.
    pub device: DeviceKind,
}

impl DetectedPort {
    /// Classify an enumerated port.
    pub fn classify(info: PortInfo) -> Self {
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };
        Self { info, device }
    }

    /// Port name or path.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Preference for mote programming, lower is better: FTDI, then other
    /// known bridges, then unknown ports.
    pub fn rank(&self) -> u8 {
        match self.device {
            DeviceKind::Ftdi => 0,
            DeviceKind::Unknown => 2,
            _ => 1,
        }
    }
}

/// Enumerate and classify all serial ports.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|info| {
                let port = DetectedPort::classify(info);
                trace!("Found port {} ({})", port.name(), port.device.name());
                port
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Enumerate and classify all serial ports. Always empty without native
/// serial support.
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the most likely mote port out of `ports`.
///
/// Lowest [`DetectedPort::rank`] wins; ties keep enumeration order.
pub fn select_port(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    ports
        .into_iter()
        .enumerate()
        .min_by_key(|(index, port)| (port.rank(), *index))
        .map(|(_, port)| port)
        .ok_or(Error::DeviceNotFound)
}

/// Auto-detect a single mote port.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = select_port(detect_ports())?;
    info!("Auto-detected {} port: {}", port.device.name(), port.name());
    Ok(port)
}

/// Format detected ports for display, one line each.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product = port
                .info
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{device}{product}", port.info.name)
        })
        .collect()
}
