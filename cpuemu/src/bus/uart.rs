use std::io::Write;

use tracing::{trace, warn};

use super::MmioDevice;

pub const DEVICE_BASE: u32 = 0xa000_0000;
pub const UART_TX: u32 = DEVICE_BASE + 0x3f8;

/// Console port: the low byte of every write to `UART_TX` goes to the sink, other
/// addresses in the window are ignored.
pub struct Uart<W: Write> {
  sink: W,
}

impl Uart<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self { sink: std::io::stdout() }
  }
}

impl<W: Write> Uart<W> {
  pub fn new(sink: W) -> Self {
    Self { sink }
  }

  pub fn sink(&self) -> &W {
    &self.sink
  }

  pub fn into_sink(self) -> W {
    self.sink
  }
}

impl<W: Write> MmioDevice for Uart<W> {
  fn write(&mut self, addr: u32, data: u32) {
    if addr != UART_TX {
      trace!("uart: ignore write addr={addr:#x} data={data:#x}");
      return;
    }
    let byte = data as u8;
    if let Err(e) = self.sink.write_all(&[byte]).and_then(|_| self.sink.flush()) {
      warn!("uart: fail to emit {byte:#04x}: {e}");
    }
  }
}
