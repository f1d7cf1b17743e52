//! [`Port`] over a host serial device, backed by the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType},
    std::{
        io::{self, Read, Write},
        thread,
        time::{Duration, Instant},
    },
};

/// Poll interval of [`NativePort::wait_data_available`].
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An opened serial device. Dropping it, or [`Port::close`], releases the
/// device node.
pub struct NativePort {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    baud_rate: u32,
}

impl NativePort {
    /// Open `config.port_name` as 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!("Opening {} at {} baud", config.port_name, config.baud_rate);
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            baud_rate: config.baud_rate,
        })
    }

    fn device(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        let name = &self.name;
        self.port.as_mut().ok_or_else(|| {
            Error::Serial(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                format!("{name} is closed"),
            ))
        })
    }

    fn device_io(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn bytes_available(&mut self) -> Result<usize> {
        let count = self.device()?.bytes_to_read()?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    fn wait_data_available(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.bytes_available()? == 0 {
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "no data on {} within {} ms",
                    self.name,
                    timeout.as_millis()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.device()?.set_baud_rate(baud_rate)?;
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.device()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("DTR {}", if level { "high" } else { "low" });
        self.device()?.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("RTS {}", if level { "high" } else { "low" });
        self.device()?.write_request_to_send(level)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device_io()?.read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device_io()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.device_io()?.flush()
    }
}

/// Lists the host's serial devices.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(port_info)
            .collect())
    }
}

fn port_info(port: SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name: port.port_name,
            vid: Some(usb.vid),
            pid: Some(usb.pid),
            manufacturer: usb.manufacturer,
            product: usb.product,
            serial_number: usb.serial_number,
        },
        _ => PortInfo::named(port.port_name),
    }
}
