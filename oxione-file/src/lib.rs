//! # OxiONE File
//!
//! Read and write sessions for the ONE-code record format:
//!
//! - [`schema`]: the 1.0 schema - file types, subtypes, line signatures
//! - [`line`]: runtime per-line-type state and the line table
//! - [`reader`]: streaming and random-access reading, header/footer
//!   parsing
//! - [`writer`]: streaming ASCII/binary writing, codec training, the
//!   binary footer, and parallel sharded output
//!
//! ## Example
//!
//! ```no_run
//! use oxione_file::{FileType, List, OneReader, OneWriter};
//!
//! # fn main() -> oxione_core::Result<()> {
//! let mut w = OneWriter::create("reads.seq", FileType::Seq, None, true)?;
//! w.add_provenance("mytool", "1.0", "mytool reads.seq", None)?;
//! w.write_header()?;
//! w.write_line(b'S', List::Bytes(b"acgtacgt"))?;
//! w.write_line(b'Q', List::Bytes(b"!!!!!!!!"))?;
//! w.finish()?;
//!
//! let mut r = OneReader::open("reads.seq", None)?;
//! while let Some(t) = r.read_line()? {
//!     if t == b'S' {
//!         println!("sequence of {} bases", r.list_len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod line;
pub mod reader;
pub mod schema;
pub mod writer;

mod trainer;

// Re-exports for convenience
pub use line::{CodecSlot, LineInfo, LineTable, ListCodec, ListStore, Ownership};
pub use reader::OneReader;
pub use schema::{FieldType, FileType, ListCodecKind, MAJOR_VERSION, MINOR_VERSION, SubType};
pub use trainer::CODEC_TRAINING_SIZE;
pub use writer::{List, OneWriter};
