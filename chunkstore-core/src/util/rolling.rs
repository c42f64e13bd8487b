//! Cyclic-polynomial rolling hash.
//!
//! `H(b0..bn) = rotl(T[b0], n-1) ^ rotl(T[b1], n-2) ^ ... ^ T[bn-1]`, so a
//! window can slide one byte in O(1).

const POLY: u64 = 0xC96C_5795_D787_0F42;

const fn make_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut k = 0;
        while k < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
            k += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u64; 256] = make_table();

/// Hash of a whole buffer, as stored in chunk headers.
pub fn hash_of(data: &[u8]) -> u64 {
    data.iter()
        .fold(0u64, |h, &b| h.rotate_left(1) ^ TABLE[b as usize])
}

pub struct RollingHash {
    window: usize,
    hash: u64,
}

impl RollingHash {
    /// Start a window over `data[..window]`. `data` must hold at least `window` bytes.
    pub fn new(data: &[u8], window: usize) -> Self {
        Self {
            window,
            hash: hash_of(&data[..window]),
        }
    }

    pub fn value(&self) -> u64 {
        self.hash
    }

    /// Drop `out` from the front of the window and append `inp`.
    pub fn roll(&mut self, out: u8, inp: u8) {
        let shift = (self.window % 64) as u32;
        self.hash = self.hash.rotate_left(1)
            ^ TABLE[out as usize].rotate_left(shift)
            ^ TABLE[inp as usize];
    }
}
