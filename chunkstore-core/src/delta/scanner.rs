//! Sliding-window search for source blocks inside destination data.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::util::rolling::{self, RollingHash};

/// Fixed-size blocks of the source data, keyed by rolling hash.
pub struct SourceIndex<'a> {
    window: usize,
    source: &'a [u8],
    blocks: HashMap<u64, Vec<u32>>,
}

impl<'a> SourceIndex<'a> {
    pub fn build(source: &'a [u8], window: usize) -> Self {
        let hashes: Vec<(u64, u32)> = source
            .par_chunks_exact(window)
            .enumerate()
            .map(|(i, b)| (rolling::hash_of(b), i as u32))
            .collect();
        let mut blocks: HashMap<u64, Vec<u32>> = HashMap::with_capacity(hashes.len());
        for (h, i) in hashes {
            blocks.entry(h).or_default().push(i);
        }
        Self {
            window,
            source,
            blocks,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn block_count(&self) -> usize {
        self.source.len() / self.window
    }

    /// Source offset of a block whose bytes equal `window_bytes`.
    fn find(&self, hash: u64, window_bytes: &[u8]) -> Option<usize> {
        self.blocks
            .get(&hash)?
            .iter()
            .map(|&b| b as usize * self.window)
            .find(|&off| &self.source[off..off + self.window] == window_bytes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Offset in the destination data.
    pub dest: usize,
    /// Offset in the source data.
    pub source: usize,
    pub len: usize,
}

/// Yields non-overlapping matches in destination order. A window that
/// matches nothing slides by one byte; a match is extended byte by byte and
/// the scan resumes after it.
pub struct Scanner<'a, 's> {
    dest: &'a [u8],
    index: &'a SourceIndex<'s>,
    pos: usize,
    hash: Option<RollingHash>,
}

impl<'a, 's> Scanner<'a, 's> {
    pub fn new(dest: &'a [u8], index: &'a SourceIndex<'s>) -> Self {
        Self {
            dest,
            index,
            pos: 0,
            hash: None,
        }
    }
}

impl Iterator for Scanner<'_, '_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        let w = self.index.window;
        let dest = self.dest;
        if w == 0 {
            return None;
        }
        loop {
            if self.pos + w > dest.len() {
                return None;
            }
            let window = &dest[self.pos..self.pos + w];
            let h = match &self.hash {
                Some(h) => h.value(),
                None => {
                    let rh = RollingHash::new(window, w);
                    let v = rh.value();
                    self.hash = Some(rh);
                    v
                }
            };

            if let Some(src) = self.index.find(h, window) {
                let source = self.index.source;
                let mut len = w;
                while self.pos + len < dest.len()
                    && src + len < source.len()
                    && dest[self.pos + len] == source[src + len]
                {
                    len += 1;
                }
                let m = Match {
                    dest: self.pos,
                    source: src,
                    len,
                };
                self.pos += len;
                self.hash = None;
                return Some(m);
            }

            if self.pos + w < dest.len() {
                let (out, inp) = (dest[self.pos], dest[self.pos + w]);
                if let Some(h) = self.hash.as_mut() {
                    h.roll(out, inp);
                }
            }
            self.pos += 1;
        }
    }
}
