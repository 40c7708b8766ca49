//! SpookyHash V2 - A 128-bit non-cryptographic hash function by Bob Jenkins.
//!
//! Safe, table-driven implementation of SpookyV2. Messages shorter than
//! 192 bytes take the short path; longer ones are mixed in 96-byte blocks.
//! [`SpookyHash`] also implements [`core::hash::Hasher`], so it can drive
//! any `Hash` impl that needs a hash stable across runs and processes.
//!
//! # Example
//! ```
//! use spooky_hash::SpookyHash;
//!
//! // One-shot hashing
//! let (h1, h2) = SpookyHash::hash128(b"hello world", 0, 0);
//!
//! // Incremental hashing
//! let mut hasher = SpookyHash::new(0, 0);
//! hasher.update(b"hello ");
//! hasher.update(b"world");
//! assert_eq!(hasher.finalize(), (h1, h2));
//! ```

#![cfg_attr(not(test), no_std)]

/// SpookyHash V2 constants
const SC_CONST: u64 = 0xdeadbeefdeadbeef;
const SC_NUM_VARS: usize = 12;
const SC_BLOCK_SIZE: usize = SC_NUM_VARS * 8; // 96 bytes
const SC_BUF_SIZE: usize = 2 * SC_BLOCK_SIZE; // 192 bytes

/// Rotation per lane in `mix`.
const MIX_ROT: [u32; SC_NUM_VARS] = [11, 32, 43, 31, 17, 28, 39, 57, 55, 54, 22, 46];

/// Rotation per step in `end_partial`.
const END_ROT: [u32; SC_NUM_VARS] = [44, 15, 34, 21, 38, 33, 10, 13, 38, 53, 42, 54];

/// Rotation per step in `short_mix`.
const SHORT_MIX_ROT: [u32; 12] = [50, 52, 30, 41, 54, 48, 38, 37, 62, 34, 5, 36];

/// Rotation per step in `short_end`.
const SHORT_END_ROT: [u32; 11] = [15, 52, 26, 51, 28, 9, 47, 54, 32, 25, 63];

type Block = [u64; SC_NUM_VARS];

/// Mix one 96-byte block into the long-message state.
#[inline(always)]
fn mix(data: &Block, s: &mut Block) {
    for i in 0..SC_NUM_VARS {
        let next = (i + 1) % SC_NUM_VARS;
        let far = (i + 2) % SC_NUM_VARS;
        let back2 = (i + 10) % SC_NUM_VARS;
        let back1 = (i + 11) % SC_NUM_VARS;

        s[i] = s[i].wrapping_add(data[i]);
        s[far] ^= s[back2];
        s[back1] ^= s[i];
        s[i] = s[i].rotate_left(MIX_ROT[i]);
        s[back1] = s[back1].wrapping_add(s[next]);
    }
}

/// One round of final mixing over all 12 lanes.
#[inline(always)]
fn end_partial(h: &mut Block) {
    for (k, &rot) in END_ROT.iter().enumerate() {
        let src = (k + 1) % SC_NUM_VARS;
        let dst = (k + 2) % SC_NUM_VARS;
        let acc = (k + 11) % SC_NUM_VARS;

        h[acc] = h[acc].wrapping_add(h[src]);
        h[dst] ^= h[acc];
        h[src] = h[src].rotate_left(rot);
    }
}

/// Absorb the final block and run three rounds of `end_partial`.
#[inline(always)]
fn end(data: &Block, h: &mut Block) {
    for (lane, word) in h.iter_mut().zip(data) {
        *lane = lane.wrapping_add(*word);
    }
    end_partial(h);
    end_partial(h);
    end_partial(h);
}

/// Mixing for short messages. `h` is `[a, b, c, d]`.
#[inline(always)]
fn short_mix(h: &mut [u64; 4]) {
    for (k, &rot) in SHORT_MIX_ROT.iter().enumerate() {
        let x = (k + 2) % 4;
        let y = (k + 3) % 4;
        let z = k % 4;
        h[x] = h[x].rotate_left(rot);
        h[x] = h[x].wrapping_add(h[y]);
        h[z] ^= h[x];
    }
}

/// Final mixing for short messages. `h` is `[a, b, c, d]`.
#[inline(always)]
fn short_end(h: &mut [u64; 4]) {
    for (k, &rot) in SHORT_END_ROT.iter().enumerate() {
        let x = (k + 2) % 4;
        let y = (k + 3) % 4;
        h[y] ^= h[x];
        h[x] = h[x].rotate_left(rot);
        h[y] = h[y].wrapping_add(h[x]);
    }
}

/// Read a little-endian u64 from the first 8 bytes of `bytes`.
#[inline(always)]
fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Read a block of 12 little-endian u64s.
#[inline(always)]
fn read_block(bytes: &[u8]) -> Block {
    let mut block = [0u64; SC_NUM_VARS];
    for (word, chunk) in block.iter_mut().zip(bytes.chunks_exact(8)) {
        *word = read_u64_le(chunk);
    }
    block
}

/// Initial long-message state for a seed pair.
#[inline(always)]
fn seeded_state(seed1: u64, seed2: u64) -> Block {
    [
        seed1, seed2, SC_CONST,
        seed1, seed2, SC_CONST,
        seed1, seed2, SC_CONST,
        seed1, seed2, SC_CONST,
    ]
}

/// Pad the last partial block (< 96 bytes) and absorb it with `end`.
#[inline(always)]
fn end_with_tail(tail: &[u8], h: &mut Block) {
    let mut last = [0u8; SC_BLOCK_SIZE];
    last[..tail.len()].copy_from_slice(tail);
    last[SC_BLOCK_SIZE - 1] = tail.len() as u8;
    end(&read_block(&last), h);
}

/// Short hash for messages < 192 bytes
fn hash_short(message: &[u8], hash1: u64, hash2: u64) -> (u64, u64) {
    let length = message.len();
    let mut h = [hash1, hash2, SC_CONST, SC_CONST];
    let mut offset = 0;

    if length > 15 {
        // Complete 32-byte blocks
        let end = (length / 32) * 32;
        while offset < end {
            h[2] = h[2].wrapping_add(read_u64_le(&message[offset..]));
            h[3] = h[3].wrapping_add(read_u64_le(&message[offset + 8..]));
            short_mix(&mut h);
            h[0] = h[0].wrapping_add(read_u64_le(&message[offset + 16..]));
            h[1] = h[1].wrapping_add(read_u64_le(&message[offset + 24..]));
            offset += 32;
        }

        if length - offset >= 16 {
            h[2] = h[2].wrapping_add(read_u64_le(&message[offset..]));
            h[3] = h[3].wrapping_add(read_u64_le(&message[offset + 8..]));
            short_mix(&mut h);
            offset += 16;
        }
    }

    // Last 0..15 bytes, zero padded, plus the length in the top byte of d
    h[3] = h[3].wrapping_add((length as u64) << 56);
    let tail = &message[offset..];
    if tail.is_empty() {
        h[2] = h[2].wrapping_add(SC_CONST);
        h[3] = h[3].wrapping_add(SC_CONST);
    } else {
        let mut buf = [0u8; 16];
        buf[..tail.len()].copy_from_slice(tail);
        h[2] = h[2].wrapping_add(read_u64_le(&buf[..8]));
        h[3] = h[3].wrapping_add(read_u64_le(&buf[8..]));
    }

    short_end(&mut h);
    (h[0], h[1])
}

/// SpookyHash V2 hasher for incremental hashing
#[derive(Clone)]
pub struct SpookyHash {
    data: [u8; SC_BUF_SIZE], // unhashed bytes
    state: Block,            // seeds until the first block is mixed
    length: usize,           // total length so far
    remainder: usize,        // bytes buffered in `data`
}

impl SpookyHash {
    /// Create a new SpookyHash with the given seeds
    pub fn new(seed1: u64, seed2: u64) -> Self {
        let mut state = [0u64; SC_NUM_VARS];
        state[0] = seed1;
        state[1] = seed2;
        Self {
            data: [0u8; SC_BUF_SIZE],
            state,
            length: 0,
            remainder: 0,
        }
    }

    /// Update the hash with more data
    pub fn update(&mut self, message: &[u8]) {
        let new_length = self.remainder + message.len();

        // Not enough for two blocks yet, just buffer
        if new_length < SC_BUF_SIZE {
            self.data[self.remainder..new_length].copy_from_slice(message);
            self.length += message.len();
            self.remainder = new_length;
            return;
        }

        let mut h = if self.length < SC_BUF_SIZE {
            seeded_state(self.state[0], self.state[1])
        } else {
            self.state
        };
        self.length += message.len();

        let mut rest = message;
        if self.remainder > 0 {
            let prefix = SC_BUF_SIZE - self.remainder;
            self.data[self.remainder..].copy_from_slice(&message[..prefix]);
            mix(&read_block(&self.data[..SC_BLOCK_SIZE]), &mut h);
            mix(&read_block(&self.data[SC_BLOCK_SIZE..]), &mut h);
            rest = &message[prefix..];
        }

        let mut blocks = rest.chunks_exact(SC_BLOCK_SIZE);
        for block in &mut blocks {
            mix(&read_block(block), &mut h);
        }

        let tail = blocks.remainder();
        self.data[..tail.len()].copy_from_slice(tail);
        self.remainder = tail.len();
        self.state = h;
    }

    /// Finalize and return the 128-bit hash
    pub fn finalize(&self) -> (u64, u64) {
        if self.length < SC_BUF_SIZE {
            return hash_short(&self.data[..self.length], self.state[0], self.state[1]);
        }

        let mut h = self.state;
        let mut tail = &self.data[..self.remainder];
        if tail.len() >= SC_BLOCK_SIZE {
            mix(&read_block(&tail[..SC_BLOCK_SIZE]), &mut h);
            tail = &tail[SC_BLOCK_SIZE..];
        }
        end_with_tail(tail, &mut h);

        (h[0], h[1])
    }

    /// Total number of bytes fed so far.
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if nothing has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Hash a message in one call, returning 128-bit hash
    pub fn hash128(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
        if message.len() < SC_BUF_SIZE {
            return hash_short(message, seed1, seed2);
        }

        let mut h = seeded_state(seed1, seed2);
        let mut blocks = message.chunks_exact(SC_BLOCK_SIZE);
        for block in &mut blocks {
            mix(&read_block(block), &mut h);
        }
        end_with_tail(blocks.remainder(), &mut h);

        (h[0], h[1])
    }

    /// Hash a message in one call, returning 64-bit hash
    pub fn hash64(message: &[u8], seed: u64) -> u64 {
        let (h1, _) = Self::hash128(message, seed, seed);
        h1
    }
}

impl Default for SpookyHash {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Integers are fed little-endian so digests match on every target.
impl core::hash::Hasher for SpookyHash {
    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }

    fn write_u16(&mut self, i: u16) {
        self.update(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.update(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.update(&i.to_le_bytes());
    }

    fn write_u128(&mut self, i: u128) {
        self.update(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.update(&(i as u64).to_le_bytes());
    }

    fn write_i16(&mut self, i: i16) {
        self.update(&i.to_le_bytes());
    }

    fn write_i32(&mut self, i: i32) {
        self.update(&i.to_le_bytes());
    }

    fn write_i64(&mut self, i: i64) {
        self.update(&i.to_le_bytes());
    }

    fn write_i128(&mut self, i: i128) {
        self.update(&i.to_le_bytes());
    }

    fn write_isize(&mut self, i: isize) {
        self.update(&(i as i64).to_le_bytes());
    }

    /// Folds the 128-bit digest into 64 bits.
    fn finish(&self) -> u64 {
        let (h1, h2) = self.finalize();
        h1 ^ h2
    }
}
