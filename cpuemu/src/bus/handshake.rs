use rand::{rngs::StdRng, Rng, SeedableRng};

pub const RAND_SEQ_LEN: usize = 1024;

/// Decides, one draw at a time, whether the slave asserts ready/valid this cycle.
pub trait ReadySource {
  fn next_ready(&mut self) -> bool;
}

/// A fixed table of small integers consumed round-robin. A draw is "asserted" when the
/// value is nonzero, so a table filled from `0..4` stalls a quarter of the time.
#[derive(Debug, Clone)]
pub struct RandomSequence {
  seq: Vec<u8>,
  index: usize,
}

impl RandomSequence {
  pub fn seeded(seed: u64) -> Self {
    let mut rng = StdRng::seed_from_u64(seed);
    let seq = (0..RAND_SEQ_LEN).map(|_| rng.gen_range(0..4u8)).collect();
    Self { seq, index: 0 }
  }

  /// Replay an explicit table. An empty table always asserts.
  pub fn from_values(seq: Vec<u8>) -> Self {
    Self { seq, index: 0 }
  }

  pub fn next_rand(&mut self) -> u8 {
    if self.seq.is_empty() {
      return 1;
    }
    let value = self.seq[self.index];
    self.index = (self.index + 1) % self.seq.len();
    value
  }
}

impl ReadySource for RandomSequence {
  fn next_ready(&mut self) -> bool {
    self.next_rand() != 0
  }
}

/// Never stalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

impl ReadySource for AlwaysReady {
  fn next_ready(&mut self) -> bool {
    true
  }
}
