//! Host side of the bridge's CDC ACM port.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serialport::{DataBits, Parity, SerialPort, SerialPortType, StopBits};

/// USB identity of the bridge
pub const BRIDGE_VID: u16 = 0x16C0;
pub const BRIDGE_PID: u16 = 0x05E1;

/// Find every enumerated bridge by USB VID/PID.
pub fn find_bridge_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let bridges = ports
        .into_iter()
        .filter(|info| {
            matches!(
                &info.port_type,
                SerialPortType::UsbPort(usb) if usb.vid == BRIDGE_VID && usb.pid == BRIDGE_PID
            )
        })
        .map(|info| info.port_name)
        .collect();
    Ok(bridges)
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg != "auto" {
        return Ok(port_arg.to_string());
    }
    match find_bridge_ports()?.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!(
            "No bridge found ({:04x}:{:04x}) - ensure the device is connected",
            BRIDGE_VID,
            BRIDGE_PID
        ),
    }
}

/// Open CDC ACM port of the bridge.
pub struct BridgePort {
    port: Box<dyn SerialPort>,
}

impl BridgePort {
    /// Open the port; the baud rate becomes the first SET_LINE_CODING.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| format!("opening {}", port_name))?;
        Ok(Self { port })
    }

    /// Send a new line coding to the bridge.
    pub fn set_line_coding(
        &mut self,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        self.port.set_data_bits(data_bits)?;
        self.port.set_parity(parity)?;
        self.port.set_stop_bits(stop_bits)?;
        // The bridge applies the coding on its next poll
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    /// Plain 8N1 at `baud_rate`.
    pub fn set_baud(&mut self, baud_rate: u32) -> Result<()> {
        self.set_line_coding(baud_rate, DataBits::Eight, Parity::None, StopBits::One)
    }

    /// Drive DTR through SET_CONTROL_LINE_STATE.
    pub fn set_dtr(&mut self, asserted: bool) -> Result<()> {
        self.port.write_data_terminal_ready(asserted)?;
        Ok(())
    }

    /// Discard everything pending on both directions.
    pub fn drain(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write `data` and collect the looped-back bytes.
    ///
    /// Reading runs on its own thread: once the bridge's buffers fill, its
    /// flow control stalls the host write until the echo is drained.
    pub fn round_trip(&mut self, data: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let mut reader = self.port.try_clone()?;
        let expected = data.len();

        let collector = thread::spawn(move || -> Result<Vec<u8>> {
            let mut echoed = Vec::with_capacity(expected);
            let mut buf = [0u8; 256];
            let start = Instant::now();
            while echoed.len() < expected && start.elapsed() < timeout {
                match reader.read(&mut buf) {
                    Ok(n) => echoed.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(echoed)
        });

        let write_result = self.write_until(data, Instant::now() + timeout);

        let echoed = collector
            .join()
            .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
        write_result?;
        Ok(echoed)
    }

    /// Write all of `data`, riding out write timeouts while the bridge NAKs.
    fn write_until(&mut self, mut data: &[u8], deadline: Instant) -> Result<()> {
        while !data.is_empty() {
            if Instant::now() > deadline {
                anyhow::bail!("bridge stopped accepting data, {} bytes unsent", data.len());
            }
            match self.port.write(data) {
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e).context("writing to bridge"),
            }
        }
        self.port.flush()?;
        Ok(())
    }
}
