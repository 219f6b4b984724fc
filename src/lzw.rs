// lzw.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Lempel-Ziv-Welch decompression for GIF image data
use crate::{Rgba, MAX_COLOURS};

/// Maximum code width in bits
pub(crate) const CODE_MAX: u8 = 12;

/// Dictionary capacity
const TABLE_SIZE: usize = 1 << CODE_MAX;

/// Errors produced while decompressing an LZW stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LzwError {
    /// Minimum code size out of range
    BadParam,
    /// A sub-block runs past the end of the source window
    NoData,
    /// End-of-information appeared as the first code
    EoiCode,
    /// First code after a clear was not a literal
    BadInitCode,
    /// Code beyond the current dictionary size
    BadCode,
}

/// Dictionary entry.
///
/// Entries form a DAG rooted at the literal codes: `prefix` links towards
/// the root and `count` / `first` are pre-recorded so a code can be
/// materialised in O(count) with no recursion.
#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Code this entry extends
    prefix: u16,
    /// First byte of the expansion
    first: u8,
    /// Last byte of the expansion
    value: u8,
    /// Expansion length in bytes
    count: u16,
}

/// LZW decompression context.
///
/// The context never borrows the source window; it records byte offsets, and
/// every call takes the window as a parameter so the embedder may reallocate
/// it between calls.
#[derive(Debug)]
pub(crate) struct Lzw {
    /// Code dictionary
    table: Vec<Entry>,
    /// Expansion of the most recent code
    stack: Vec<u8>,
    /// Valid bytes in `stack`
    stack_len: usize,
    /// Map-mode read cursor into `stack`
    stack_pos: usize,
    /// Offset of the next sub-block length byte
    block_next: usize,
    /// Offset of the next unread byte in the current sub-block
    block_pos: usize,
    /// Offset one past the current sub-block's data
    block_end: usize,
    /// Bit accumulator
    acc: u32,
    /// Bits held in the accumulator
    acc_len: u8,
    /// Minimum code size from the image data header
    min_code_size: u8,
    /// Clear code
    clear_code: u16,
    /// End-of-information code
    eoi_code: u16,
    /// Current code width
    code_size: u8,
    /// Previously decoded code
    prev_code: Option<u16>,
    /// End-of-information consumed
    finished: bool,
    /// Map-mode transparency index (> 0xFF disables skipping)
    transparency_idx: u32,
}

impl Lzw {
    /// Create a new LZW context
    pub fn new() -> Self {
        Lzw {
            table: Vec::new(),
            stack: Vec::new(),
            stack_len: 0,
            stack_pos: 0,
            block_next: 0,
            block_pos: 0,
            block_end: 0,
            acc: 0,
            acc_len: 0,
            min_code_size: 0,
            clear_code: 0,
            eoi_code: 0,
            code_size: 0,
            prev_code: None,
            finished: false,
            transparency_idx: u32::MAX,
        }
    }

    /// Initialise for stream decoding.
    ///
    /// `block_next` is the offset of the first sub-block length byte in the
    /// source window.
    pub fn init(
        &mut self,
        min_code_size: u8,
        block_next: usize,
    ) -> Result<(), LzwError> {
        if min_code_size >= CODE_MAX {
            return Err(LzwError::BadParam);
        }
        // the scratch buffer is allocated on first use, not at construction
        self.stack.resize(TABLE_SIZE, 0);
        self.min_code_size = min_code_size;
        self.clear_code = 1 << min_code_size;
        self.eoi_code = self.clear_code + 1;
        self.block_next = block_next;
        self.block_pos = 0;
        self.block_end = 0;
        self.acc = 0;
        self.acc_len = 0;
        self.stack_len = 0;
        self.stack_pos = 0;
        self.finished = false;
        self.transparency_idx = u32::MAX;
        self.reset_table();
        Ok(())
    }

    /// Initialise for map decoding.
    ///
    /// A `transparency_idx` above 0xFF means every pixel is written.
    pub fn init_map(
        &mut self,
        min_code_size: u8,
        block_next: usize,
        transparency_idx: u32,
    ) -> Result<(), LzwError> {
        self.init(min_code_size, block_next)?;
        self.transparency_idx = transparency_idx;
        Ok(())
    }

    /// Reset the dictionary to its literal codes
    fn reset_table(&mut self) {
        self.table.clear();
        for i in 0..self.clear_code {
            self.table.push(Entry {
                prefix: i,
                first: i as u8,
                value: i as u8,
                count: 1,
            });
        }
        // placeholders for the clear and end-of-information codes
        for i in self.clear_code..=self.eoi_code {
            self.table.push(Entry {
                prefix: i,
                first: 0,
                value: 0,
                count: 0,
            });
        }
        self.code_size = self.min_code_size + 1;
        self.prev_code = None;
    }

    /// Advance to the next sub-block.
    ///
    /// Returns `false` when the zero-length terminator is reached.
    fn next_block(&mut self, src: &[u8]) -> Result<bool, LzwError> {
        let pos = self.block_next;
        if pos >= src.len() {
            return Err(LzwError::NoData);
        }
        let size = usize::from(src[pos]);
        if size == 0 {
            return Ok(false);
        }
        if pos + size >= src.len() {
            return Err(LzwError::NoData);
        }
        self.block_pos = pos + 1;
        self.block_end = pos + 1 + size;
        self.block_next = self.block_end;
        Ok(true)
    }

    /// Read the next code from the bitstream.
    ///
    /// Returns `None` when the sub-block chain is terminated.
    fn next_code(&mut self, src: &[u8]) -> Result<Option<u16>, LzwError> {
        while self.acc_len < self.code_size {
            if self.block_pos >= self.block_end {
                if !self.next_block(src)? {
                    return Ok(None);
                }
            }
            self.acc |= u32::from(src[self.block_pos]) << self.acc_len;
            self.block_pos += 1;
            self.acc_len += 8;
        }
        let mask = (1 << self.code_size) - 1;
        let code = (self.acc & mask) as u16;
        self.acc >>= self.code_size;
        self.acc_len -= self.code_size;
        Ok(Some(code))
    }

    /// Add a dictionary entry extending `prefix` with `value`
    fn push_entry(&mut self, prefix: u16, value: u8) {
        if self.table.len() < TABLE_SIZE {
            let idx = self.table.len();
            let root = self.table[usize::from(prefix)];
            self.table.push(Entry {
                prefix,
                first: root.first,
                value,
                count: root.count + 1,
            });
            if idx == (1 << self.code_size) && self.code_size < CODE_MAX {
                self.code_size += 1;
            }
        }
    }

    /// Materialise a code's expansion into the stack.
    ///
    /// The prefix chain runs root-to-leaf in reverse, so bytes are written
    /// right-to-left using the entry's pre-recorded length.
    fn expand(&mut self, code: u16) {
        let count = usize::from(self.table[usize::from(code)].count);
        let mut pos = count;
        let mut c = usize::from(code);
        while pos > 0 {
            let e = self.table[c];
            pos -= 1;
            self.stack[pos] = e.value;
            c = usize::from(e.prefix);
        }
        self.stack_len = count;
        self.stack_pos = 0;
    }

    /// Pull one code and leave its expansion in the stack.
    ///
    /// Returns `false` at the clean end of the frame data, either from the
    /// end-of-information code or from the sub-block terminator.
    fn pull_code(&mut self, src: &[u8]) -> Result<bool, LzwError> {
        if self.finished {
            return Ok(false);
        }
        loop {
            let code = match self.next_code(src)? {
                Some(code) => code,
                None => {
                    self.finished = true;
                    return Ok(false);
                }
            };
            if code == self.clear_code {
                self.reset_table();
                continue;
            }
            match self.prev_code {
                None => {
                    // the dictionary holds only literals at this point
                    if code == self.eoi_code {
                        return Err(LzwError::EoiCode);
                    }
                    if code >= self.clear_code {
                        return Err(LzwError::BadInitCode);
                    }
                }
                Some(prev) => {
                    if code == self.eoi_code {
                        self.finished = true;
                        return Ok(false);
                    }
                    let next_entry = self.table.len() as u16;
                    if code > next_entry {
                        return Err(LzwError::BadCode);
                    }
                    if code == next_entry {
                        // KwKwK: the code refers to the entry being
                        // defined, so its last byte is the first byte of
                        // the previous expansion
                        let first = self.table[usize::from(prev)].first;
                        self.push_entry(prev, first);
                    } else {
                        let first = self.table[usize::from(code)].first;
                        self.push_entry(prev, first);
                    }
                }
            }
            self.expand(code);
            self.prev_code = Some(code);
            return Ok(true);
        }
    }

    /// Refill the pending expansion if it has been fully consumed.
    ///
    /// Returns `false` at the clean end of the frame data.
    pub fn refill(&mut self, src: &[u8]) -> Result<bool, LzwError> {
        if self.stack_pos < self.stack_len {
            return Ok(true);
        }
        self.pull_code(src)
    }

    /// View the unconsumed bytes of the current expansion
    pub fn pending(&self) -> &[u8] {
        &self.stack[self.stack_pos..self.stack_len]
    }

    /// Consume bytes of the current expansion
    pub fn consume(&mut self, count: usize) {
        self.stack_pos = (self.stack_pos + count).min(self.stack_len);
    }

    /// Decode a run of uncompressed bytes (stream mode).
    ///
    /// The returned view is valid until the next call; an empty view marks
    /// the clean end of the frame data.
    pub fn decode(&mut self, src: &[u8]) -> Result<&[u8], LzwError> {
        if self.pull_code(src)? {
            self.stack_pos = self.stack_len;
            Ok(&self.stack[..self.stack_len])
        } else {
            Ok(&[])
        }
    }

    /// Decode pixels directly into an RGBA destination (map mode).
    ///
    /// Each index is mapped through `palette`; indexes equal to the
    /// transparency index leave the destination bytes untouched.  Returns
    /// the number of pixels written, with 0 marking the clean end of the
    /// frame data.
    pub fn decode_map(
        &mut self,
        src: &[u8],
        palette: &[Rgba; MAX_COLOURS],
        dst: &mut [u8],
    ) -> Result<usize, LzwError> {
        if self.stack_pos >= self.stack_len {
            if !self.pull_code(src)? {
                return Ok(0);
            }
        }
        let avail = self.stack_len - self.stack_pos;
        let pixels = (dst.len() / 4).min(avail);
        for (i, px) in dst.chunks_exact_mut(4).take(pixels).enumerate() {
            let idx = self.stack[self.stack_pos + i];
            if u32::from(idx) != self.transparency_idx {
                px.copy_from_slice(&palette[usize::from(idx)]);
            }
        }
        self.stack_pos += pixels;
        Ok(pixels)
    }
}

impl From<LzwError> for crate::Error {
    fn from(err: LzwError) -> Self {
        use crate::Error::*;
        match err {
            LzwError::BadParam => DataError,
            LzwError::NoData => InsufficientFrameData,
            LzwError::EoiCode | LzwError::BadInitCode | LzwError::BadCode => {
                FrameDataError
            }
        }
    }
}
