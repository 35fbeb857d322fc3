//! # OxiONE Codec
//!
//! Entropy codecs for the OxiONE record format:
//!
//! - [`huffman`]: trainable length-limited (≤12-bit) Huffman codec with an
//!   escape code for untrained symbols, serialization into binary footers,
//!   and an expansion-proof verbatim fallback
//! - [`dna`]: the predefined 2-bit-per-base DNA codec
//! - [`intpack`]: difference coding and top-byte stripping for 64-bit
//!   integer lists
//!
//! The file layer decides which codec applies to which line type; this
//! crate only transforms byte buffers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dna;
pub mod huffman;
pub mod intpack;

// Re-exports for convenience
pub use huffman::{CodecState, HUFF_CUTOFF, HuffmanCodec, MAX_SERIAL_SIZE};
