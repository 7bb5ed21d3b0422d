use std::collections::HashMap;

const BYTE_MASKS: [u32; 4] = [0x0000_00ff, 0x0000_ff00, 0x00ff_0000, 0xff00_0000];

/// Read/write view of a word-addressed memory, as seen by whoever owns it.
///
/// `addr` is always a byte address. Reads return the containing word shifted right by
/// the byte offset, writes shift both data and strobe left by it. Bytes that would spill
/// into the next word are dropped.
pub trait MemoryPort {
  fn read(&self, addr: u32) -> u32;
  fn write(&mut self, addr: u32, data: u32, wstrb: u8);
}

/// Sparse `word address -> word` store. Unset words read as `default`.
#[derive(Debug, Clone, Default)]
pub struct WordMemory {
  words: HashMap<u32, u32>,
  default: u32,
}

impl WordMemory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_default(default: u32) -> Self {
    Self { words: HashMap::new(), default }
  }

  pub fn word(&self, word_addr: u32) -> u32 {
    self.words.get(&word_addr).copied().unwrap_or(self.default)
  }

  pub fn set_word(&mut self, word_addr: u32, word: u32) {
    self.words.insert(word_addr, word);
  }

  /// Merge `data` into the word at `word_addr`, one byte lane per strobe bit.
  pub fn merge_word(&mut self, word_addr: u32, data: u32, wstrb: u8) {
    let mut word = self.word(word_addr);
    for (lane, mask) in BYTE_MASKS.iter().enumerate() {
      if wstrb & (1 << lane) != 0 {
        word = (word & !mask) | (data & mask);
      }
    }
    self.set_word(word_addr, word);
  }

  /// Copy little-endian words starting at byte address `base`. A trailing partial word is
  /// ignored; the number of words stored is returned.
  pub fn load_words(&mut self, base: u32, bytes: &[u8]) -> usize {
    let mut word_addr = base >> 2;
    let mut count = 0;
    for chunk in bytes.chunks_exact(4) {
      self.set_word(word_addr, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
      word_addr = word_addr.wrapping_add(1);
      count += 1;
    }
    count
  }

  /// Byte-granular load used for ELF segments, which need not be word aligned.
  pub fn load_bytes(&mut self, vaddr: u32, bytes: &[u8]) {
    for (i, byte) in bytes.iter().enumerate() {
      let addr = vaddr.wrapping_add(i as u32);
      let offset = addr & 0x3;
      self.merge_word(addr >> 2, (*byte as u32) << (offset << 3), 1 << offset);
    }
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }
}

impl MemoryPort for WordMemory {
  fn read(&self, addr: u32) -> u32 {
    self.word(addr >> 2) >> ((addr & 0x3) << 3)
  }

  fn write(&mut self, addr: u32, data: u32, wstrb: u8) {
    let offset = addr & 0x3;
    let wstrb = wstrb << offset;
    self.merge_word(addr >> 2, data << (offset << 3), wstrb);
  }
}
