//! # OxiONE Core
//!
//! Core components for the OxiONE record-format library.
//!
//! This crate provides the building blocks shared by the codec and file
//! layers:
//!
//! - [`field`]: the 8-byte field cell carried by every record
//! - [`counts`]: per-line-type count/max/total statistics
//! - [`provenance`]: provenance and reference header records
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! OxiONE is designed as a layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: CLI                                                 │
//! │     validate, view, info, sim                           │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: File                                                │
//! │     schema table, record reader/writer, footer, shards  │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     length-limited Huffman, 2-bit DNA, int-list packing │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     Field, Counts, Provenance, errors                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counts;
pub mod error;
pub mod field;
pub mod provenance;

// Re-exports for convenience
pub use counts::Counts;
pub use error::{OneError, Result};
pub use field::{Field, LEN_MASK, MAX_FIELDS, fields_from_bytes, fields_to_bytes};
pub use provenance::{Provenance, Reference};
