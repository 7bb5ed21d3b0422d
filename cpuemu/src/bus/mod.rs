mod handshake;
mod mem;
pub mod uart;

pub use handshake::*;
pub use mem::*;

use tracing::trace;

/// Memory-mapped device behind the bus. Only the write side is decoded.
pub trait MmioDevice {
  /// addr: full byte address of the beat, data: unshifted write data
  fn write(&mut self, addr: u32, data: u32);
}

/// Signals driven by the design (AXI master) and sampled by the memory model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiMaster {
  pub araddr: u32,
  pub arlen: u8,
  pub arsize: u8,
  pub arburst: u8,
  pub arvalid: bool,
  pub rready: bool,

  pub awaddr: u32,
  pub awlen: u8,
  pub awsize: u8,
  pub awburst: u8,
  pub awvalid: bool,
  pub wdata: u32,
  pub wstrb: u8,
  pub wlast: bool,
  pub wvalid: bool,
  pub bready: bool,
}

/// Signals driven by the memory model back into the design. They hold their value
/// between cycles unless a state explicitly changes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiSlave {
  pub arready: bool,
  pub rvalid: bool,
  pub rdata: u32,
  pub rlast: bool,

  pub awready: bool,
  pub wready: bool,
  pub bvalid: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxiReadState {
  #[default]
  Idle,
  Ar,
  R,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxiWriteState {
  #[default]
  Idle,
  Aw,
  W,
  B,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AxiReadConfig {
  pub araddr: u32,
  pub arlen: u8,
  /// bytes per beat, already decoded from `1 << arsize`
  pub arsize: u32,
  pub arburst: u8,
  pub state: AxiReadState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AxiWriteConfig {
  pub awaddr: u32,
  pub awlen: u8,
  /// bytes per beat, already decoded from `1 << awsize`
  pub awsize: u32,
  pub awburst: u8,
  pub wstrb: u8,
  pub state: AxiWriteState,
}

/// Word addresses whose top bits select the device window `0xa000_0000..0xb000_0000`.
fn is_device_word(word_addr: u32) -> bool {
  word_addr >> 26 == 0xa
}

/// Bus-visible memory plus the AXI slave timing model for one read and one write
/// channel. Each channel serves one transaction at a time.
pub struct AxiMemory {
  memory: WordMemory,
  device: Box<dyn MmioDevice>,
  ready: Box<dyn ReadySource>,

  read_config: AxiReadConfig,
  write_config: AxiWriteConfig,
  slave: AxiSlave,
}

impl AxiMemory {
  pub fn new(memory: WordMemory, device: Box<dyn MmioDevice>, ready: Box<dyn ReadySource>) -> Self {
    Self {
      memory,
      device,
      ready,
      read_config: AxiReadConfig::default(),
      write_config: AxiWriteConfig::default(),
      slave: AxiSlave::default(),
    }
  }

  pub fn slave(&self) -> &AxiSlave {
    &self.slave
  }

  pub fn read_state(&self) -> AxiReadState {
    self.read_config.state
  }

  pub fn write_state(&self) -> AxiWriteState {
    self.write_config.state
  }

  pub fn memory(&self) -> &WordMemory {
    &self.memory
  }

  /// Peek at the bus-visible memory without touching channel state.
  pub fn debug_read(&self, addr: u32) -> u32 {
    self.memory.read(addr)
  }

  /// One cycle of both channels, write first.
  pub fn service(&mut self, master: &AxiMaster) -> AxiSlave {
    self.service_write(master);
    self.service_read(master);
    self.slave
  }

  pub fn service_read(&mut self, master: &AxiMaster) {
    let cfg = &mut self.read_config;
    match cfg.state {
      AxiReadState::Idle => {
        self.slave.rvalid = false;
        self.slave.rlast = false;
        if master.arvalid {
          cfg.araddr = master.araddr;
          cfg.arlen = master.arlen;
          cfg.arsize = 1u32.checked_shl(u32::from(master.arsize)).unwrap_or(0);
          cfg.arburst = master.arburst;
          cfg.state = AxiReadState::Ar;
          trace!(
            "axi_read  request (araddr={:#x}, arlen={}, arsize={}B, arburst={})",
            cfg.araddr,
            cfg.arlen,
            cfg.arsize,
            cfg.arburst
          );
        }
      }
      AxiReadState::Ar => {
        let ready = self.ready.next_ready();
        self.slave.arready = ready;
        if ready && master.arvalid {
          cfg.state = AxiReadState::R;
        }
      }
      AxiReadState::R => {
        let valid = self.ready.next_ready();
        self.slave.arready = false;
        self.slave.rvalid = valid;
        if valid {
          let word = self.memory.read(cfg.araddr);
          self.slave.rdata = word;
          trace!(
            "axi_read  beat (addr={:#x}, remain={}, data={})",
            cfg.araddr,
            cfg.arlen,
            hex::encode(word.to_le_bytes())
          );
          if cfg.arlen != 0 {
            if master.rready {
              cfg.arlen -= 1;
              cfg.araddr = cfg.araddr.wrapping_add(cfg.arsize);
            }
          } else {
            self.slave.rlast = true;
            if master.rready {
              cfg.state = AxiReadState::Idle;
            }
          }
        }
      }
    }
  }

  pub fn service_write(&mut self, master: &AxiMaster) {
    let cfg = &mut self.write_config;
    match cfg.state {
      AxiWriteState::Idle => {
        self.slave.bvalid = false;
        if master.awvalid {
          cfg.awaddr = master.awaddr;
          cfg.awlen = master.awlen;
          cfg.awsize = 1u32.checked_shl(u32::from(master.awsize)).unwrap_or(0);
          cfg.awburst = master.awburst;
          cfg.wstrb = master.wstrb;
          cfg.state = AxiWriteState::Aw;
          trace!(
            "axi_write request (awaddr={:#x}, awlen={}, awsize={}B, awburst={}, wstrb={:#06b})",
            cfg.awaddr,
            cfg.awlen,
            cfg.awsize,
            cfg.awburst,
            cfg.wstrb
          );
        }
      }
      AxiWriteState::Aw => {
        let ready = self.ready.next_ready();
        self.slave.awready = ready;
        if ready && master.awvalid {
          cfg.state = AxiWriteState::W;
        }
      }
      AxiWriteState::W => {
        let ready = self.ready.next_ready();
        self.slave.awready = false;
        self.slave.wready = ready;
        if ready && master.wvalid {
          let word_addr = cfg.awaddr >> 2;
          if is_device_word(word_addr) {
            self.device.write(cfg.awaddr, master.wdata);
          } else {
            let offset = cfg.awaddr & 0x3;
            self.memory.merge_word(word_addr, master.wdata << (offset << 3), cfg.wstrb << offset);
          }
          trace!(
            "axi_write beat (addr={:#x}, data={}, last={})",
            cfg.awaddr,
            hex::encode(master.wdata.to_le_bytes()),
            master.wlast
          );
          if master.wlast {
            cfg.state = AxiWriteState::B;
          }
          cfg.awaddr = cfg.awaddr.wrapping_add(cfg.awsize);
        }
      }
      AxiWriteState::B => {
        let valid = self.ready.next_ready();
        self.slave.wready = false;
        self.slave.bvalid = valid;
        if valid && master.bready {
          cfg.state = AxiWriteState::Idle;
        }
      }
    }
  }
}
