//! Runtime per-line-type state: codecs, buffers, counters, and the table
//! that maps line characters and binary tags to their state.

use crate::schema::{
    self, FieldType, FileType, LineDef, ListCodecKind, MAX_BINARY_LINES,
};
use oxione_codec::HuffmanCodec;
use oxione_core::Counts;
use oxione_core::error::{OneError, Result};
use std::sync::Arc;

/// A Huffman codec slot: privately trainable until a code is committed,
/// immutable and reference-shared afterwards.
#[derive(Debug)]
pub enum CodecSlot {
    /// Shard-local codec still accumulating its histogram.
    Training(HuffmanCodec),
    /// Committed code, shared by reference and never mutated again.
    Committed(Arc<HuffmanCodec>),
}

impl CodecSlot {
    /// The codec, whichever side of the commit it is on.
    pub fn codec(&self) -> &HuffmanCodec {
        match self {
            Self::Training(c) => c,
            Self::Committed(c) => c,
        }
    }
}

/// Codec attached to a line type's list payload.
#[derive(Debug)]
pub enum ListCodec {
    /// The predefined 2-bit DNA codec.
    Dna,
    /// A trainable Huffman codec.
    Huffman(CodecSlot),
}

/// Typed storage backing a line type's list payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ListStore {
    /// Strings and string lists, NUL-terminated within the buffer.
    Bytes(Vec<u8>),
    /// Integer lists.
    Ints(Vec<i64>),
    /// Real lists.
    Reals(Vec<f64>),
}

impl ListStore {
    fn for_field(ft: FieldType) -> Self {
        match ft {
            FieldType::IntList => Self::Ints(Vec::new()),
            FieldType::RealList => Self::Reals(Vec::new()),
            _ => Self::Bytes(Vec::new()),
        }
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(v) => v.len(),
            Self::Ints(v) => v.len(),
            Self::Reals(v) => v.len(),
        }
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Bytes(v) => v.clear(),
            Self::Ints(v) => v.clear(),
            Self::Reals(v) => v.clear(),
        }
    }
}

/// Who owns a line type's list buffer.
///
/// A library-owned buffer is overwritten on every record. Once a caller
/// installs a buffer it becomes user-owned: list payloads append
/// sequentially and the library never discards the contents; the caller
/// takes the buffer back when done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Overwritten each record; freed with the session.
    Library,
    /// Appended to; contents belong to the caller.
    User,
}

/// Runtime state for one line type.
#[derive(Debug)]
pub struct LineInfo {
    /// Line type character.
    pub code: u8,
    /// Ordered field signature.
    pub fields: &'static [FieldType],
    /// Index of the list-valued field, if any.
    pub list_field: Option<usize>,
    /// Bytes per list element in the uncompressed binary encoding.
    pub list_byte_size: usize,
    /// Difference-code integer lists before packing.
    pub is_int_list_diff: bool,
    /// Binary tag byte (`0x80 | ordinal << 2`), or 0 for ASCII-only lines.
    pub binary_tag: u8,
    /// Codec over the packed field block, if the schema trains one.
    pub field_codec: Option<CodecSlot>,
    /// Codec over the list payload, if the schema attaches one.
    pub list_codec: Option<ListCodec>,
    /// Compress fields from now on.
    pub use_field_codec: bool,
    /// Compress lists from now on.
    pub use_list_codec: bool,
    /// Field bytes accumulated into the training histogram.
    pub field_tack: i64,
    /// List bytes accumulated into the training histogram.
    pub list_tack: i64,
    /// Counts declared by the header/footer.
    pub given: Counts,
    /// Counts accumulated from the records actually seen.
    pub accum: Counts,
    /// List payload storage.
    pub buffer: ListStore,
    /// Who owns `buffer`.
    pub ownership: Ownership,
    // Snapshots at the last group boundary, and before the first group.
    pub(crate) g_count: i64,
    pub(crate) g_total: i64,
    pub(crate) o_count: i64,
    pub(crate) o_total: i64,
    /// Element range of the current record's list within `buffer`.
    pub(crate) list_range: (usize, usize),
}

impl LineInfo {
    fn new(def: &LineDef, for_write: bool) -> Self {
        let list_field = def.fields.iter().position(|f| f.is_list());
        let list_byte_size = list_field.map_or(0, |i| def.fields[i].list_byte_size());
        let field_codec = if for_write && def.field_codec {
            Some(CodecSlot::Training(HuffmanCodec::new()))
        } else {
            None
        };
        let (list_codec, use_list_codec) = match def.list_codec {
            ListCodecKind::Dna => (Some(ListCodec::Dna), true),
            ListCodecKind::Huffman if for_write => {
                (Some(ListCodec::Huffman(CodecSlot::Training(HuffmanCodec::new()))), false)
            }
            _ => (None, false),
        };
        Self {
            code: def.code,
            fields: def.fields,
            list_field,
            list_byte_size,
            is_int_list_diff: def.int_list_diff,
            binary_tag: 0,
            field_codec,
            list_codec,
            use_field_codec: false,
            use_list_codec,
            field_tack: 0,
            list_tack: 0,
            given: Counts::default(),
            accum: Counts::default(),
            buffer: ListStore::for_field(
                list_field.map_or(FieldType::String, |i| def.fields[i]),
            ),
            ownership: Ownership::Library,
            g_count: 0,
            g_total: 0,
            o_count: 0,
            o_total: 0,
            list_range: (0, 0),
        }
    }

    /// The current record's list slice as raw bytes (strings, string lists).
    pub fn bytes_slice(&self) -> &[u8] {
        match &self.buffer {
            ListStore::Bytes(v) => &v[self.list_range.0..self.list_range.0 + self.list_range.1],
            _ => &[],
        }
    }

    /// The current record's list slice as integers.
    pub fn ints_slice(&self) -> &[i64] {
        match &self.buffer {
            ListStore::Ints(v) => &v[self.list_range.0..self.list_range.0 + self.list_range.1],
            _ => &[],
        }
    }

    /// The current record's list slice as reals.
    pub fn reals_slice(&self) -> &[f64] {
        match &self.buffer {
            ListStore::Reals(v) => &v[self.list_range.0..self.list_range.0 + self.list_range.1],
            _ => &[],
        }
    }
}

/// The per-session table of line types, keyed by line character and, for
/// binary records, by tag byte.
#[derive(Debug)]
pub struct LineTable {
    infos: Vec<LineInfo>,
    by_char: [u8; 128],
    unpack: [u8; 256],
    /// Line type whose records are the file's objects.
    pub object_type: u8,
    /// Line type that begins a group, if any.
    pub group_type: Option<u8>,
}

const NO_LINE: u8 = 0xff;

impl LineTable {
    /// Build the table for a file type, assigning binary tags to the
    /// reserved binary lines and the data lines in ascending code order.
    pub fn new(file_type: FileType, for_write: bool) -> Result<Self> {
        let mut defs: Vec<&LineDef> = schema::RESERVED_BINARY.iter().collect();
        defs.extend(schema::data_lines(file_type));
        defs.sort_by_key(|d| d.code);

        if defs.len() > MAX_BINARY_LINES {
            return Err(OneError::schema(format!(
                "file type {}: too many line specs {} >= {}",
                file_type.name(),
                defs.len(),
                MAX_BINARY_LINES
            )));
        }

        let mut infos = Vec::with_capacity(defs.len() + schema::RESERVED_HEADER.len());
        let mut by_char = [NO_LINE; 128];
        let mut unpack = [0u8; 256];

        for (ordinal, def) in defs.iter().enumerate() {
            let tag = 0x80 | ((ordinal as u8) << 2);
            let mut li = LineInfo::new(def, for_write);
            li.binary_tag = tag;
            for flags in 0..4 {
                unpack[(tag | flags) as usize] = def.code;
            }
            by_char[def.code as usize] = infos.len() as u8;
            infos.push(li);
        }

        for def in schema::RESERVED_HEADER {
            by_char[def.code as usize] = infos.len() as u8;
            infos.push(LineInfo::new(def, for_write));
        }

        Ok(Self {
            infos,
            by_char,
            unpack,
            object_type: file_type.object_type(),
            group_type: file_type.group_type(),
        })
    }

    /// Index of a line character in the table.
    pub fn index_of(&self, c: u8) -> Option<usize> {
        if c as usize >= 128 {
            return None;
        }
        match self.by_char[c as usize] {
            NO_LINE => None,
            i => Some(i as usize),
        }
    }

    /// Look up a line character.
    pub fn get(&self, c: u8) -> Option<&LineInfo> {
        self.index_of(c).map(|i| &self.infos[i])
    }

    /// Look up a line character, mutably.
    pub fn get_mut(&mut self, c: u8) -> Option<&mut LineInfo> {
        self.index_of(c).map(move |i| &mut self.infos[i])
    }

    pub(crate) fn info(&self, idx: usize) -> &LineInfo {
        &self.infos[idx]
    }

    pub(crate) fn info_mut(&mut self, idx: usize) -> &mut LineInfo {
        &mut self.infos[idx]
    }

    /// Resolve a binary tag byte to its line character (flag bits masked).
    pub fn char_from_tag(&self, tag: u8) -> Option<u8> {
        match self.unpack[tag as usize] {
            0 => None,
            c => Some(c),
        }
    }

    /// Data line characters that carry file statistics: the upper-case
    /// types in order, then the group type.
    pub fn stat_codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = (b'A'..=b'Z').filter(|&c| self.get(c).is_some()).collect();
        if let Some(g) = self.group_type {
            codes.push(g);
        }
        codes
    }

    /// All data line characters (letters), sorted.
    pub fn data_codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self
            .infos
            .iter()
            .map(|li| li.code)
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        codes.sort_unstable();
        codes
    }

    /// Fold the per-group deltas of every upper-case line type into the
    /// group maxima (when inside a group) or the pre-first-group snapshot
    /// (when not), and reset the group boundary snapshots.
    pub(crate) fn update_group_deltas(&mut self, in_group: bool) {
        for li in &mut self.infos {
            if !li.code.is_ascii_uppercase() {
                continue;
            }
            if in_group {
                if li.accum.group_count < li.accum.count - li.g_count {
                    li.accum.group_count = li.accum.count - li.g_count;
                }
                if li.accum.group_total < li.accum.total - li.g_total {
                    li.accum.group_total = li.accum.total - li.g_total;
                }
            } else {
                li.o_count = li.accum.count;
                li.o_total = li.accum.total;
            }
            li.g_count = li.accum.count;
            li.g_total = li.accum.total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_assignment_order() {
        let table = LineTable::new(FileType::Seq, false).unwrap();
        // Codes 1 and 2 sort first and get the first two ordinals.
        assert_eq!(table.get(1).unwrap().binary_tag, 0x80);
        assert_eq!(table.get(2).unwrap().binary_tag, 0x84);

        // Every tagged line round-trips through the inverse table with any
        // combination of flag bits.
        for c in [1u8, 2, b'&', b'*', b'/', b'S', b'Q', b'g'] {
            let tag = table.get(c).unwrap().binary_tag;
            assert!(tag & 0x80 != 0);
            for flags in 0..4 {
                assert_eq!(table.char_from_tag(tag | flags), Some(c));
            }
        }
    }

    #[test]
    fn test_header_lines_are_ascii_only() {
        let table = LineTable::new(FileType::Seq, false).unwrap();
        for c in [b'1', b'2', b'#', b'@', b'+', b'%', b'!', b'<', b'>', b'$', b'^'] {
            assert_eq!(table.get(c).unwrap().binary_tag, 0);
        }
    }

    #[test]
    fn test_object_and_group_types() {
        let table = LineTable::new(FileType::Seq, false).unwrap();
        assert_eq!(table.object_type, b'S');
        assert_eq!(table.group_type, Some(b'g'));

        let table = LineTable::new(FileType::Hit, false).unwrap();
        assert_eq!(table.object_type, b'H');
        assert_eq!(table.group_type, None);
    }

    #[test]
    fn test_codec_wiring_on_write() {
        let table = LineTable::new(FileType::Seq, true).unwrap();
        let s = table.get(b'S').unwrap();
        assert!(matches!(s.list_codec, Some(ListCodec::Dna)));
        assert!(s.use_list_codec);
        assert!(s.field_codec.is_some());

        let q = table.get(b'Q').unwrap();
        assert!(matches!(q.list_codec, Some(ListCodec::Huffman(_))));
        assert!(!q.use_list_codec);

        let g = table.get(b'g').unwrap();
        assert!(g.field_codec.is_none());
        assert!(g.list_codec.is_none());
    }

    #[test]
    fn test_codec_wiring_on_read() {
        let table = LineTable::new(FileType::Seq, false).unwrap();
        // Read sessions get codecs from the footer, except the implicit DNA.
        assert!(table.get(b'Q').unwrap().list_codec.is_none());
        assert!(matches!(table.get(b'S').unwrap().list_codec, Some(ListCodec::Dna)));
    }

    #[test]
    fn test_unknown_lookups() {
        let table = LineTable::new(FileType::Seq, false).unwrap();
        assert!(table.get(b'z').is_none());
        assert!(table.char_from_tag(0x00).is_none());
    }
}
