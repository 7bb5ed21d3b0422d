use std::{fs, path::Path};

use anyhow::Context;
use elf::{
  abi::{EM_RISCV, ET_EXEC, PT_LOAD},
  endian::LittleEndian,
  ElfBytes,
};
use tracing::{debug, info, warn};

use crate::{
  bus::WordMemory,
  ref_module::{encode::HALT, Simulator},
};

pub const BASE_ADDR: u32 = 0x8000_0000;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Program contents before they are split into the bus and oracle memories.
#[derive(Debug, Clone)]
pub struct ProgramImage {
  pub name: String,
  pub entry: u32,
  memory: WordMemory,
}

impl ProgramImage {
  /// Image used when no program is given: a single halt word.
  pub fn halt_only(base: u32) -> Self {
    Self::from_words("halt", base, &[HALT])
  }

  pub fn from_words(name: &str, base: u32, words: &[u32]) -> Self {
    let mut memory = WordMemory::new();
    for (i, word) in words.iter().enumerate() {
      memory.set_word((base >> 2).wrapping_add(i as u32), *word);
    }
    Self { name: name.to_string(), entry: base, memory }
  }

  /// Load `path` as an ELF executable or a flat binary placed at `base`. `None` gives
  /// the halt-only image.
  pub fn load(path: Option<&Path>, base: u32) -> anyhow::Result<Self> {
    let Some(path) = path else {
      info!("no image given, running a single halt at {base:#010x}");
      return Ok(Self::halt_only(base));
    };
    let bytes = fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "image".into());

    let mut image = if bytes.starts_with(ELF_MAGIC) {
      Self::from_elf(&bytes).with_context(|| format!("loading ELF {}", path.display()))?
    } else {
      Self::from_flat(&bytes, base)
    };
    image.name = name;
    info!("loaded {} ({} words, entry {:#010x})", image.name, image.memory.len(), image.entry);
    Ok(image)
  }

  fn from_flat(bytes: &[u8], base: u32) -> Self {
    let mut memory = WordMemory::new();
    let words = memory.load_words(base, bytes);
    let tail = bytes.len() % 4;
    if tail != 0 {
      warn!("image size {} is not word aligned, dropping the last {tail} bytes", bytes.len());
    }
    debug!("flat image: {words} words at {base:#010x}");
    Self { name: String::new(), entry: base, memory }
  }

  fn from_elf(bytes: &[u8]) -> anyhow::Result<Self> {
    let elf = ElfBytes::<LittleEndian>::minimal_parse(bytes).context("parsing ELF header")?;

    if elf.ehdr.e_machine != EM_RISCV {
      anyhow::bail!("ELF is not in RISC-V");
    }
    if elf.ehdr.e_type != ET_EXEC {
      anyhow::bail!("ELF is not an executable");
    }
    let entry = u32::try_from(elf.ehdr.e_entry).context("ELF entry does not fit in 32 bits")?;
    debug!("ELF entry: {entry:#x}");

    let segments = elf.segments().context("ELF has no program header")?;
    let mut memory = WordMemory::new();
    for phdr in segments.iter().filter(|phdr| phdr.p_type == PT_LOAD) {
      let vaddr = u32::try_from(phdr.p_vaddr).context("segment vaddr does not fit in 32 bits")?;
      let data = elf.segment_data(&phdr).context("reading segment data")?;
      if u64::from(vaddr) + data.len() as u64 > 1 << 32 {
        anyhow::bail!("segment at {vaddr:#x} runs past the 32-bit address space");
      }
      debug!("load segment {:#x}..{:#x} to {vaddr:#x}", phdr.p_offset, phdr.p_offset + phdr.p_filesz);
      memory.load_bytes(vaddr, data);
    }
    Ok(Self { name: String::new(), entry, memory })
  }

  /// A fresh, independent copy of the program memory.
  pub fn to_memory(&self) -> WordMemory {
    self.memory.clone()
  }
}

impl Simulator<WordMemory> {
  /// Oracle with a private copy of `image`, starting at its entry point.
  pub fn load(image: &ProgramImage) -> Self {
    Self::new(image.to_memory(), image.entry)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;
  use crate::bus::MemoryPort;

  fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("cpuemu-{}-{name}", std::process::id()));
    fs::File::create(&path).and_then(|mut f| f.write_all(bytes)).unwrap();
    path
  }

  #[test]
  fn no_path_is_single_halt() {
    let image = ProgramImage::load(None, BASE_ADDR).unwrap();
    let mem = image.to_memory();
    assert_eq!(mem.read(BASE_ADDR), HALT);
    assert_eq!(mem.len(), 1);
    assert_eq!(image.entry, BASE_ADDR);
  }

  #[test]
  fn flat_image_drops_partial_word() {
    let path = temp_file("flat.bin", &[0x13, 0x05, 0x50, 0x00, 0x00, 0x00, 0x00, 0x80, 0xaa, 0xbb]);
    let image = ProgramImage::load(Some(&path), BASE_ADDR).unwrap();
    fs::remove_file(&path).unwrap();
    let mem = image.to_memory();
    assert_eq!(mem.read(BASE_ADDR), 0x0050_0513);
    assert_eq!(mem.read(BASE_ADDR + 4), HALT);
    assert_eq!(mem.len(), 2);
    assert!(image.name.starts_with("cpuemu-"));
  }

  #[test]
  fn copies_are_independent() {
    let image = ProgramImage::from_words("t", BASE_ADDR, &[1, 2]);
    let mut bus = image.to_memory();
    bus.write(BASE_ADDR, 0xdead, 0xf);
    let sim = Simulator::load(&image);
    assert_eq!(sim.memory().read(BASE_ADDR), 1);
    assert_eq!(sim.pc(), BASE_ADDR);
  }

  #[test]
  fn missing_file_is_an_error() {
    let err = ProgramImage::load(Some(Path::new("/nonexistent/prog.bin")), BASE_ADDR).unwrap_err();
    assert!(format!("{err:#}").contains("reading image"));
  }

  fn elf32(machine: u16, entry: u32, vaddr: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x7f, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    out.extend_from_slice(&ET_EXEC.to_le_bytes());
    out.extend_from_slice(&machine.to_le_bytes());
    for word in [1u32, entry, 52, 0, 0] {
      out.extend_from_slice(&word.to_le_bytes());
    }
    for half in [52u16, 32, 1, 40, 0, 0] {
      out.extend_from_slice(&half.to_le_bytes());
    }
    let len = payload.len() as u32;
    for word in [PT_LOAD, 84, vaddr, vaddr, len, len, 5, 4] {
      out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(payload);
    out
  }

  #[test]
  fn elf_segments_and_entry() {
    let payload = [0x13, 0x05, 0x50, 0x00, 0x00, 0x00, 0x00, 0x80];
    let path = temp_file("prog.elf", &elf32(EM_RISCV, BASE_ADDR + 4, BASE_ADDR, &payload));
    let image = ProgramImage::load(Some(&path), BASE_ADDR).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(image.entry, BASE_ADDR + 4);
    let mem = image.to_memory();
    assert_eq!(mem.read(BASE_ADDR), 0x0050_0513);
    assert_eq!(mem.read(BASE_ADDR + 4), HALT);
  }

  #[test]
  fn non_riscv_elf_is_rejected() {
    let path = temp_file("x86.elf", &elf32(3, BASE_ADDR, BASE_ADDR, &[0; 4]));
    let err = ProgramImage::load(Some(&path), BASE_ADDR).unwrap_err();
    fs::remove_file(&path).unwrap();
    assert!(format!("{err:#}").contains("not in RISC-V"));
  }

  #[test]
  fn truncated_elf_is_rejected() {
    let path = temp_file("bad.elf", b"\x7fELF\x01\x01\x01");
    let result = ProgramImage::load(Some(&path), BASE_ADDR);
    fs::remove_file(&path).unwrap();
    assert!(result.is_err());
  }
}
