//! Length-limited Huffman coding over byte values.
//!
//! A [`HuffmanCodec`] is trained on a corpus of bytes, builds a canonical
//! prefix code whose longest code word is [`HUFF_CUTOFF`] bits (via the
//! Larmore–Hirschberg package-merge algorithm), and then encodes and decodes
//! byte buffers against that code. An optional *escape code* introduces an
//! uncompressed 8-bit literal for symbols absent from the training corpus,
//! so a codec built on partial data can still encode anything.
//!
//! The compressed bit stream is written MSB-first through a 64-bit register
//! whose top two bits record the endianness of the encoding machine; whole
//! registers are flushed in native byte order and the decoder byte-swaps
//! when the stream and host disagree. If compression would ever expand the
//! input, the encoder falls back to a `0xFF` marker byte followed by the
//! input verbatim.

use oxione_core::error::{OneError, Result};
use std::fmt;

/// Longest permitted code word, in bits. Must be at most 16 so that the
/// decoder's 16-bit prefix lookup stays valid.
pub const HUFF_CUTOFF: usize = 12;

/// Upper bound on the size of a serialized codec in bytes.
pub const MAX_SERIAL_SIZE: usize = 257 + 2 * size_of::<i32>() + 256 * size_of::<u16>();

/// Whether this build targets a big-endian machine.
const HOST_IS_BIG: bool = cfg!(target_endian = "big");

/// Life cycle of a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CodecState {
    /// Just created, histogram zeroed.
    Empty,
    /// Histogram being filled, no code yet.
    Filled,
    /// Code built, histogram retained.
    CodedWith,
    /// Code present but no histogram (deserialized from a blob).
    CodedRead,
}

/// A trainable, serializable, length-limited Huffman codec.
pub struct HuffmanCodec {
    state: CodecState,
    code_bits: [u16; 256],
    code_lens: [u8; 256],
    /// 16-bit prefix to symbol lookup, valid once coded.
    lookup: Box<[u8; 0x10000]>,
    /// Escape symbol, or -1 if the code has no escape.
    esc_code: i32,
    /// Length in bits of the escape code, if present.
    esc_len: i32,
    hist: Box<[u64; 256]>,
}

impl Default for HuffmanCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HuffmanCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanCodec")
            .field("state", &self.state)
            .field("esc_code", &self.esc_code)
            .field("esc_len", &self.esc_len)
            .finish_non_exhaustive()
    }
}

impl HuffmanCodec {
    /// Create an empty codec ready to accumulate samples.
    pub fn new() -> Self {
        Self {
            state: CodecState::Empty,
            code_bits: [0; 256],
            code_lens: [0; 256],
            lookup: Box::new([0; 0x10000]),
            esc_code: -1,
            esc_len: 0,
            hist: Box::new([0; 256]),
        }
    }

    /// Current life-cycle state.
    pub fn state(&self) -> CodecState {
        self.state
    }

    /// True once a code has been built or deserialized.
    pub fn is_coded(&self) -> bool {
        self.state >= CodecState::CodedWith
    }

    /// Add the byte frequencies of `bytes` to the histogram.
    ///
    /// Illegal once a code has been built.
    pub fn add_samples(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_coded() {
            return Err(OneError::codec("cannot add samples: codec already built"));
        }
        for &b in bytes {
            self.hist[b as usize] += 1;
        }
        self.state = CodecState::Filled;
        Ok(())
    }

    /// Fold another codec's histogram into this one.
    ///
    /// Used to combine per-shard training histograms before committing one
    /// shared code. The source must still carry its histogram.
    pub fn merge_histogram(&mut self, other: &HuffmanCodec) -> Result<()> {
        if self.is_coded() {
            return Err(OneError::codec("cannot merge: codec already built"));
        }
        if other.state == CodecState::CodedRead {
            return Err(OneError::codec("cannot merge: source has no histogram"));
        }
        for i in 0..256 {
            self.hist[i] += other.hist[i];
        }
        self.state = CodecState::Filled;
        Ok(())
    }

    /// Build the length-limited code from the accumulated histogram.
    ///
    /// With `partial` set, an escape code is reserved so symbols that never
    /// appeared in the corpus can still be encoded: the escape is an unused
    /// byte value if one exists, otherwise the lowest-frequency byte.
    pub fn build_code(&mut self, partial: bool) -> Result<()> {
        if self.is_coded() {
            return Err(OneError::codec("codec already has a code"));
        }
        if self.state == CodecState::Empty {
            return Err(OneError::codec("codec has no byte distribution data"));
        }

        // Collect the participating symbols. An unused byte can serve as
        // the escape; if every byte occurs, the rarest one is drafted.
        let mut ecode: i32 = -1;
        let mut code: Vec<usize> = Vec::with_capacity(256);
        for i in 0..256 {
            if self.hist[i] > 0 {
                code.push(i);
            } else if partial && ecode < 0 {
                ecode = i as i32;
                code.push(i);
            }
        }
        let mut partial = partial;
        if partial && ecode < 0 {
            let min = code
                .iter()
                .copied()
                .min_by_key(|&i| (self.hist[i], i))
                .expect("state Filled implies a non-empty histogram");
            ecode = min as i32;
        }
        if ecode < 0 {
            partial = false;
        }

        code.sort_by_key(|&i| (self.hist[i], i));
        let ncode = code.len();

        let mut leng = vec![0u8; ncode];
        if ncode == 1 {
            leng[0] = 1;
        } else {
            self.package_merge(&code, &mut leng);
        }

        // Canonical bit assignment: the first (rarest, longest) symbol gets
        // the all-ones code word, later symbols count downward, extending
        // left as the length shrinks.
        let mut bits = vec![0u16; ncode];
        let mut llen = leng[0] as i32;
        let mut lbits: u16 = (1u16 << llen) - 1;
        bits[0] = lbits;
        for n in 1..ncode {
            while lbits & 0x1 == 0 {
                lbits >>= 1;
                llen -= 1;
            }
            lbits -= 1;
            while llen < leng[n] as i32 {
                lbits = (lbits << 1) | 0x1;
                llen += 1;
            }
            bits[n] = lbits;
        }

        self.code_lens = [0; 256];
        self.code_bits = [0; 256];
        for (n, &sym) in code.iter().enumerate() {
            self.code_lens[sym] = leng[n];
            self.code_bits[sym] = bits[n];
        }

        self.fill_lookup();

        if partial {
            self.esc_code = ecode;
            self.esc_len = self.code_lens[ecode as usize] as i32;
            self.code_lens[ecode as usize] = 0;
        } else {
            self.esc_code = -1;
            self.esc_len = 0;
        }
        self.state = CodecState::CodedWith;
        Ok(())
    }

    /// Package-merge (coin-collector) assignment of code lengths bounded by
    /// `HUFF_CUTOFF`, after Larmore & Hirschberg, JACM 37, 3 (1990).
    fn package_merge(&self, code: &[usize], leng: &mut [u8]) {
        let ncode = code.len();
        let dcode = 2 * ncode;

        let countb: Vec<u64> = code.iter().map(|&i| self.hist[i]).collect();
        let mut lcnt = countb.clone();
        lcnt.resize(dcode, 0);
        let mut ccnt = vec![0u64; dcode];
        let mut matrix = vec![vec![false; dcode]; HUFF_CUTOFF];

        let mut llen = ncode - 1;
        for level in (1..HUFF_CUTOFF).rev() {
            let mut j = 0;
            let mut k = 0;
            let mut n = 0;
            while j < ncode || k < llen {
                if k >= llen || (j < ncode && countb[j] <= lcnt[k] + lcnt[k + 1]) {
                    ccnt[n] = countb[j];
                    matrix[level][n] = true;
                    j += 1;
                } else {
                    ccnt[n] = lcnt[k] + lcnt[k + 1];
                    matrix[level][n] = false;
                    k += 2;
                }
                n += 1;
            }
            llen = n - 1;
            std::mem::swap(&mut lcnt, &mut ccnt);
        }

        // Back-trace the solution: each selected leaf at each level adds a
        // bit to the lengths of the cheapest remaining symbols.
        let mut span = 2 * (ncode - 1);
        for level in 1..HUFF_CUTOFF {
            let mut j = 0;
            for n in 0..span {
                if matrix[level][n] {
                    leng[j] += 1;
                    j += 1;
                }
            }
            span = 2 * (span - j);
        }
        for l in leng.iter_mut().take(span) {
            *l += 1;
        }
    }

    /// Fill the 16-bit prefix lookup from the current lengths and bits.
    fn fill_lookup(&mut self) {
        for i in 0..256 {
            let len = self.code_lens[i] as u32;
            if len > 0 {
                let base = (self.code_bits[i] as u32) << (16 - len);
                let span = 1u32 << (16 - len);
                for j in 0..span {
                    self.lookup[(base + j) as usize] = i as u8;
                }
            }
        }
    }

    /// Serialize the code (not the histogram) into `out`, returning the
    /// number of bytes appended. At most [`MAX_SERIAL_SIZE`] bytes.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<usize> {
        if !self.is_coded() {
            return Err(OneError::codec("cannot serialize: codec has no code"));
        }
        let start = out.len();
        out.push(HOST_IS_BIG as u8);
        out.extend_from_slice(&self.esc_code.to_ne_bytes());
        out.extend_from_slice(&self.esc_len.to_ne_bytes());
        for i in 0..256 {
            out.push(self.code_lens[i]);
            if self.code_lens[i] > 0 || i as i32 == self.esc_code {
                out.extend_from_slice(&self.code_bits[i].to_ne_bytes());
            }
        }
        Ok(out.len() - start)
    }

    /// Rebuild a codec from a serialized blob, byte-flipping integers and
    /// code words if the blob was written on a machine of the other
    /// endianness. The result is in the [`CodecState::CodedRead`] state.
    pub fn deserialize(input: &[u8]) -> Result<Self> {
        fn take<'a>(input: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
            if *pos + n > input.len() {
                return Err(OneError::codec("truncated codec blob"));
            }
            let s = &input[*pos..*pos + n];
            *pos += n;
            Ok(s)
        }

        fn read_i32(input: &[u8], pos: &mut usize, flip: bool) -> Result<i32> {
            let mut b: [u8; 4] = take(input, pos, 4)?.try_into().unwrap();
            if flip {
                b.reverse();
            }
            Ok(i32::from_ne_bytes(b))
        }

        let mut vc = Self::new();
        let mut pos = 0usize;

        let in_big = take(input, &mut pos, 1)?[0] != 0;
        let flip = in_big != HOST_IS_BIG;

        vc.esc_code = read_i32(input, &mut pos, flip)?;
        vc.esc_len = read_i32(input, &mut pos, flip)?;
        if vc.esc_code < -1 || vc.esc_code > 255 || !(0..=16).contains(&vc.esc_len) {
            return Err(OneError::codec("inconsistent escape code in codec blob"));
        }

        for i in 0..256 {
            let len = take(input, &mut pos, 1)?[0];
            if len as usize > 16 {
                return Err(OneError::codec("code length exceeds 16 bits in codec blob"));
            }
            vc.code_lens[i] = len;
            if len > 0 || i as i32 == vc.esc_code {
                let mut b: [u8; 2] = take(input, &mut pos, 2)?.try_into().unwrap();
                if flip {
                    b.reverse();
                }
                vc.code_bits[i] = u16::from_ne_bytes(b);
            }
        }

        if vc.esc_code >= 0 {
            vc.code_lens[vc.esc_code as usize] = vc.esc_len as u8;
        }
        vc.fill_lookup();
        if vc.esc_code >= 0 {
            vc.code_lens[vc.esc_code as usize] = 0;
        }

        vc.state = CodecState::CodedRead;
        Ok(vc)
    }

    /// Encode `input` into `out` (cleared first) and return the number of
    /// **bits** in the encoding.
    ///
    /// Symbols without a code are emitted as the escape code plus an 8-bit
    /// literal. If at any point the encoding would exceed the input size,
    /// the output becomes a single `0xFF` marker followed by the input
    /// verbatim, `8 * (input.len() + 1)` bits.
    pub fn encode(&self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        if !self.is_coded() {
            return Err(OneError::codec("cannot encode: codec has no code"));
        }
        out.clear();

        let ibits = input.len() * 8;
        let mut ocode: u64 = if HOST_IS_BIG { 0x4000_0000_0000_0000 } else { 0 };
        let mut rem: i32 = 62;
        let mut tbits: usize = 2;

        // Append `len` bits of `c` (right-aligned) to the MSB-first register,
        // flushing whole registers in native byte order.
        let put = |out: &mut Vec<u8>, ocode: &mut u64, rem: &mut i32, len: i32, c: u64| {
            *rem -= len;
            if *rem <= 0 {
                *ocode |= c >> (-*rem);
                out.extend_from_slice(&ocode.to_ne_bytes());
                if *rem < 0 {
                    *rem += 64;
                    *ocode = c << *rem;
                } else {
                    *rem = 64;
                    *ocode = 0;
                }
            } else {
                *ocode |= c << *rem;
            }
        };

        for &x in input {
            let n = self.code_lens[x as usize] as i32;
            if n == 0 {
                if self.esc_code < 0 {
                    return Err(OneError::codec(format!(
                        "no code for byte {x:#04x} and no escape code"
                    )));
                }
                tbits += 8 + self.esc_len as usize;
                if tbits > ibits {
                    return Ok(Self::encode_verbatim(input, out));
                }
                put(out, &mut ocode, &mut rem, self.esc_len, self.code_bits[self.esc_code as usize] as u64);
                put(out, &mut ocode, &mut rem, 8, x as u64);
            } else {
                tbits += n as usize;
                if tbits > ibits {
                    return Ok(Self::encode_verbatim(input, out));
                }
                put(out, &mut ocode, &mut rem, n, self.code_bits[x as usize] as u64);
            }
        }

        // Flush the partial register top byte first.
        let used = ((64 - rem) as usize).div_ceil(8);
        out.extend_from_slice(&ocode.to_be_bytes()[..used]);

        // Put the endian marker byte at the front of the stream.
        if tbits >= 64 && !HOST_IS_BIG {
            out.swap(0, 7);
        }

        Ok(tbits)
    }

    fn encode_verbatim(input: &[u8], out: &mut Vec<u8>) -> usize {
        out.clear();
        out.push(0xff);
        out.extend_from_slice(input);
        (input.len() + 1) * 8
    }

    /// Decode `nbits` bits of `input` into `out` (appended) and return the
    /// number of bytes produced.
    pub fn decode(&self, input: &[u8], nbits: usize, out: &mut Vec<u8>) -> Result<usize> {
        if !self.is_coded() {
            return Err(OneError::codec("cannot decode: codec has no code"));
        }
        let nbytes = nbits.div_ceil(8);
        if input.len() < nbytes {
            return Err(OneError::codec("compressed input shorter than bit count"));
        }

        if nbytes > 0 && input[0] == 0xff {
            let olen = nbits / 8 - 1;
            out.extend_from_slice(&input[1..1 + olen]);
            return Ok(olen);
        }

        // Normalize to a pure MSB-first byte stream: undo the front marker
        // swap, then rewrite each whole register in big-endian order
        // (swapping registers first if the stream's endianness differs from
        // the host's). The trailing partial register is already MSB-first.
        let mut data = input[..nbytes].to_vec();
        let in_big = nbytes > 0 && data[0] & 0x40 != 0;
        if !in_big && nbits >= 64 {
            data.swap(0, 7);
        }
        let full_words = nbits / 64;
        for w in 0..full_words {
            let chunk: [u8; 8] = data[w * 8..w * 8 + 8].try_into().unwrap();
            let v = if in_big == HOST_IS_BIG {
                u64::from_ne_bytes(chunk)
            } else {
                u64::from_ne_bytes(chunk).swap_bytes()
            };
            data[w * 8..w * 8 + 8].copy_from_slice(&v.to_be_bytes());
        }

        let peek16 = |pos: usize| -> u16 {
            let byte = pos / 8;
            let bit = pos % 8;
            let mut v: u32 = 0;
            for i in 0..3 {
                v = (v << 8) | *data.get(byte + i).unwrap_or(&0) as u32;
            }
            ((v >> (8 - bit)) & 0xffff) as u16
        };

        let start = out.len();
        let mut pos = 2usize;
        while pos < nbits {
            let c = self.lookup[peek16(pos) as usize];
            if self.esc_code >= 0 && c as i32 == self.esc_code {
                pos += self.esc_len as usize;
                let lit = (peek16(pos) >> 8) as u8;
                pos += 8;
                out.push(lit);
            } else {
                let len = self.code_lens[c as usize] as usize;
                if len == 0 {
                    return Err(OneError::codec("invalid code in compressed stream"));
                }
                pos += len;
                out.push(c);
            }
        }

        Ok(out.len() - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Training corpus with a geometric letter distribution, so code
    /// lengths spread over several values.
    fn trained(partial: bool) -> HuffmanCodec {
        let mut vc = HuffmanCodec::new();
        let letters = b"abcdefghijkl";
        for i in 0..letters.len() {
            for _ in 0..(1u32 << i) {
                vc.add_samples(&letters[i..]).unwrap();
            }
        }
        vc.build_code(partial).unwrap();
        vc
    }

    fn roundtrip(vc: &HuffmanCodec, input: &[u8]) {
        let mut enc = Vec::new();
        let nbits = vc.encode(input, &mut enc).unwrap();
        let mut dec = Vec::new();
        let n = vc.decode(&enc, nbits, &mut dec).unwrap();
        assert_eq!(n, input.len());
        assert_eq!(dec, input);
    }

    #[test]
    fn test_roundtrip_trained_symbols() {
        let vc = trained(true);
        roundtrip(&vc, b"llkllkjllkllkjithlhlkl");
        roundtrip(&vc, b"l");
        roundtrip(&vc, b"abcdefghijkl");
    }

    #[test]
    fn test_roundtrip_untrained_symbols_escape() {
        let vc = trained(true);
        // None of these appeared in the corpus; all must go via the escape,
        // which expands them, so a long-enough trained tail is added to keep
        // the encoding under the verbatim threshold.
        roundtrip(&vc, b"mnopqllllllllllllllllllllllllllllllll");
    }

    #[test]
    fn test_verbatim_fallback() {
        let vc = trained(true);
        // All-escape input cannot compress: expect the 0xFF marker path.
        let input = b"mnopqrstuv";
        let mut enc = Vec::new();
        let nbits = vc.encode(input, &mut enc).unwrap();
        assert_eq!(nbits, (input.len() + 1) * 8);
        assert_eq!(enc[0], 0xff);

        let mut dec = Vec::new();
        vc.decode(&enc, nbits, &mut dec).unwrap();
        assert_eq!(dec, input);
    }

    #[test]
    fn test_no_escape_without_partial() {
        let vc = trained(false);
        let mut enc = Vec::new();
        assert!(vc.encode(b"z", &mut enc).is_err());
    }

    #[test]
    fn test_code_lengths_bounded() {
        let vc = trained(true);
        for len in vc.code_lens {
            assert!(len as usize <= HUFF_CUTOFF);
        }
    }

    #[test]
    fn test_prefix_free() {
        let vc = trained(true);
        for i in 0..256usize {
            let li = vc.code_lens[i] as u32;
            if li == 0 {
                continue;
            }
            for j in 0..256usize {
                let lj = vc.code_lens[j] as u32;
                if i == j || lj == 0 || lj < li {
                    continue;
                }
                // code i must not be a prefix of code j
                assert_ne!(
                    vc.code_bits[i] as u32,
                    (vc.code_bits[j] as u32) >> (lj - li),
                    "code {i} is a prefix of code {j}"
                );
            }
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let vc = trained(true);
        let mut blob = Vec::new();
        let n = vc.serialize(&mut blob).unwrap();
        assert_eq!(n, blob.len());
        assert!(n <= MAX_SERIAL_SIZE);

        let vc2 = HuffmanCodec::deserialize(&blob).unwrap();
        assert_eq!(vc2.state(), CodecState::CodedRead);

        let input = b"llkllkjllkllkjithlhlkk";
        let mut enc = Vec::new();
        let nbits = vc.encode(input, &mut enc).unwrap();
        let mut dec = Vec::new();
        vc2.decode(&enc, nbits, &mut dec).unwrap();
        assert_eq!(dec, input);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(HuffmanCodec::deserialize(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_state_machine() {
        let mut vc = HuffmanCodec::new();
        assert_eq!(vc.state(), CodecState::Empty);
        assert!(vc.build_code(true).is_err());

        vc.add_samples(b"abc").unwrap();
        assert_eq!(vc.state(), CodecState::Filled);

        vc.build_code(true).unwrap();
        assert_eq!(vc.state(), CodecState::CodedWith);
        assert!(vc.add_samples(b"abc").is_err());
        assert!(vc.build_code(true).is_err());
    }

    #[test]
    fn test_merge_histogram() {
        let mut a = HuffmanCodec::new();
        a.add_samples(b"aaaa").unwrap();
        let mut b = HuffmanCodec::new();
        b.add_samples(b"bbcc").unwrap();

        a.merge_histogram(&b).unwrap();
        a.build_code(true).unwrap();
        let mut enc = Vec::new();
        let nbits = a.encode(b"abcabcaaaa", &mut enc).unwrap();
        let mut dec = Vec::new();
        a.decode(&enc, nbits, &mut dec).unwrap();
        assert_eq!(dec, b"abcabcaaaa");
    }

    #[test]
    fn test_long_input_crosses_registers() {
        let vc = trained(true);
        let input: Vec<u8> = b"jkl".iter().copied().cycle().take(4096).collect();
        roundtrip(&vc, &input);
    }

    #[test]
    fn test_all_bytes_used_escape_drafts_rarest() {
        let mut vc = HuffmanCodec::new();
        let all: Vec<u8> = (0u8..=255).collect();
        vc.add_samples(&all).unwrap();
        for _ in 0..100 {
            vc.add_samples(b"abcd").unwrap();
        }
        vc.build_code(true).unwrap();
        // every byte must remain encodable
        roundtrip(&vc, &all);
    }
}
