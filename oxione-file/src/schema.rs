//! The ONE-code schema: file types, subtypes, and line definitions.
//!
//! A file type fixes which line types may appear in a file, the field
//! signature of each, which line type is the *object* (indexed for random
//! access) and which is the *group*, and which lines get entropy codecs in
//! binary mode. This is schema version 1.0; files declaring any other
//! version are rejected.

use oxione_core::error::{OneError, Result};

/// Schema major version understood by this library.
pub const MAJOR_VERSION: i64 = 1;
/// Schema minor version understood by this library.
pub const MINOR_VERSION: i64 = 0;

/// Maximum number of binary (tagged) line types per file type: ordinals
/// must fit in the 5 tag bits.
pub const MAX_BINARY_LINES: usize = 32;

/// Type of one field in a line signature. At most one field of a line may
/// be list-valued (`String`, `IntList`, `RealList`, or `StringList`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Real,
    /// Single byte.
    Char,
    /// Length-prefixed byte string.
    String,
    /// List of 64-bit signed integers.
    IntList,
    /// List of 64-bit floats.
    RealList,
    /// List of length-prefixed byte strings.
    StringList,
}

impl FieldType {
    /// Whether this field carries the line's list payload.
    pub fn is_list(self) -> bool {
        !matches!(self, Self::Int | Self::Real | Self::Char)
    }

    /// Bytes per list element in the uncompressed binary encoding.
    pub fn list_byte_size(self) -> usize {
        match self {
            Self::String | Self::StringList => 1,
            Self::IntList | Self::RealList => 8,
            Self::Int | Self::Real | Self::Char => 0,
        }
    }
}

/// Primary file types of the 1.0 schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Sequences (`seq`).
    Seq,
    /// Restriction maps (`rmp`).
    Rmp,
    /// Alignments (`aln`).
    Aln,
    /// Hit lists (`hit`).
    Hit,
    /// Joins (`jns`).
    Jns,
    /// Breaks (`brk`).
    Brk,
    /// Lists (`lis`).
    Lis,
}

impl FileType {
    /// All file types, for CLI name resolution.
    pub const ALL: [FileType; 7] = [
        Self::Seq,
        Self::Rmp,
        Self::Aln,
        Self::Hit,
        Self::Jns,
        Self::Brk,
        Self::Lis,
    ];

    /// The name used in `1` header lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Seq => "seq",
            Self::Rmp => "rmp",
            Self::Aln => "aln",
            Self::Hit => "hit",
            Self::Jns => "jns",
            Self::Brk => "brk",
            Self::Lis => "lis",
        }
    }

    /// Resolve a header name to a file type.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Line type whose records are the file's objects.
    pub fn object_type(self) -> u8 {
        match self {
            Self::Seq => b'S',
            Self::Rmp => b'R',
            Self::Aln => b'A',
            Self::Hit => b'H',
            Self::Jns => b'J',
            Self::Brk => b'B',
            Self::Lis => b'L',
        }
    }

    /// Line type that begins a group, if the file type has groups.
    pub fn group_type(self) -> Option<u8> {
        match self {
            Self::Seq | Self::Aln => Some(b'g'),
            Self::Rmp => Some(b'r'),
            Self::Hit | Self::Jns | Self::Brk | Self::Lis => None,
        }
    }
}

/// Secondary file types of the 1.0 schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SubType {
    Irp,
    Pbr,
    TenX,
    Ctg,
    Kmr,
    Rmm,
    Rms,
    Rma,
    Sxs,
    Rxr,
    Sxr,
    Map,
    S2k,
    K2s,
    Lyo,
    Scf,
}

impl SubType {
    /// All subtypes, for name resolution.
    pub const ALL: [SubType; 16] = [
        Self::Irp,
        Self::Pbr,
        Self::TenX,
        Self::Ctg,
        Self::Kmr,
        Self::Rmm,
        Self::Rms,
        Self::Rma,
        Self::Sxs,
        Self::Rxr,
        Self::Sxr,
        Self::Map,
        Self::S2k,
        Self::K2s,
        Self::Lyo,
        Self::Scf,
    ];

    /// The name used in `2` header lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Irp => "irp",
            Self::Pbr => "pbr",
            Self::TenX => "10x",
            Self::Ctg => "ctg",
            Self::Kmr => "kmr",
            Self::Rmm => "rmm",
            Self::Rms => "rms",
            Self::Rma => "rma",
            Self::Sxs => "sxs",
            Self::Rxr => "rxr",
            Self::Sxr => "sxr",
            Self::Map => "map",
            Self::S2k => "s2k",
            Self::K2s => "k2s",
            Self::Lyo => "lyo",
            Self::Scf => "scf",
        }
    }

    /// Resolve a header name to a subtype.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// The primary file type this subtype refines.
    pub fn primary(self) -> FileType {
        match self {
            Self::Irp | Self::Pbr | Self::TenX | Self::Ctg | Self::Kmr => FileType::Seq,
            Self::Rmm | Self::Rms | Self::Rma => FileType::Rmp,
            Self::Sxs | Self::Rxr | Self::Sxr | Self::Map => FileType::Aln,
            Self::S2k | Self::K2s => FileType::Hit,
            Self::Lyo | Self::Scf => FileType::Lis,
        }
    }

    /// Resolve and validate a subtype for the given primary type.
    pub fn for_primary(name: &str, primary: FileType) -> Result<Self> {
        let sub = Self::from_name(name)
            .ok_or_else(|| OneError::schema(format!("unknown secondary subtype {name}")))?;
        if sub.primary() != primary {
            return Err(OneError::schema(format!(
                "subtype {} not compatible with primary type {}",
                name,
                primary.name()
            )));
        }
        Ok(sub)
    }
}

/// Which codec (if any) compresses a line's list payload in binary mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCodecKind {
    /// The list is stored raw.
    None,
    /// A trainable Huffman codec, serialized into the footer.
    Huffman,
    /// The predefined 2-bit DNA codec, never serialized.
    Dna,
}

/// Static definition of one line type.
#[derive(Debug, Clone, Copy)]
pub struct LineDef {
    /// The line type character.
    pub code: u8,
    /// Ordered field signature.
    pub fields: &'static [FieldType],
    /// Train a Huffman codec over the packed field block.
    pub field_codec: bool,
    /// Codec for the list payload.
    pub list_codec: ListCodecKind,
    /// Difference-code integer lists before packing.
    pub int_list_diff: bool,
}

impl LineDef {
    const fn new(code: u8, fields: &'static [FieldType]) -> Self {
        Self {
            code,
            fields,
            field_codec: false,
            list_codec: ListCodecKind::None,
            int_list_diff: false,
        }
    }

    const fn with_field_codec(mut self) -> Self {
        self.field_codec = true;
        self
    }

    const fn with_list_codec(mut self) -> Self {
        self.list_codec = ListCodecKind::Huffman;
        self
    }

    const fn with_dna_codec(mut self) -> Self {
        self.list_codec = ListCodecKind::Dna;
        self
    }

    const fn with_diff(mut self) -> Self {
        self.int_list_diff = true;
        self
    }
}

use FieldType::{Char, Int, IntList, Real, RealList, String, StringList};

const SEQ_LINES: &[LineDef] = &[
    LineDef::new(b'g', &[Int, String]),
    LineDef::new(b'S', &[String]).with_dna_codec().with_field_codec(),
    LineDef::new(b'Q', &[String]).with_list_codec().with_field_codec(),
    LineDef::new(b'P', &[]),
    LineDef::new(b'W', &[Int, Int, Int, Real]).with_field_codec(),
    LineDef::new(b'N', &[Real, Real, Real, Real]).with_field_codec(),
    LineDef::new(b'A', &[String]).with_list_codec(),
    LineDef::new(b'C', &[Int]).with_field_codec(),
    LineDef::new(b'I', &[String]),
];

const RMP_LINES: &[LineDef] = &[
    LineDef::new(b'r', &[Int, StringList]),
    LineDef::new(b'R', &[Int, IntList]).with_list_codec().with_diff(),
    LineDef::new(b'E', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'I', &[RealList]).with_list_codec(),
    LineDef::new(b'N', &[RealList]).with_list_codec(),
    LineDef::new(b'O', &[Int]),
];

const ALN_LINES: &[LineDef] = &[
    LineDef::new(b'g', &[Int, String]),
    LineDef::new(b'A', &[Int, Int]),
    LineDef::new(b'I', &[Int, Int, Int, Int, Int, Int]).with_field_codec(),
    LineDef::new(b'Q', &[Int]),
    LineDef::new(b'M', &[Int]),
    LineDef::new(b'D', &[Int]),
    LineDef::new(b'C', &[String]).with_list_codec(),
    LineDef::new(b'T', &[Int]),
    LineDef::new(b'U', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'V', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'W', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'X', &[IntList]).with_list_codec().with_diff(),
];

const HIT_LINES: &[LineDef] = &[
    LineDef::new(b'H', &[Int, IntList]).with_list_codec().with_diff(),
    LineDef::new(b'O', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'P', &[IntList]).with_list_codec().with_diff(),
];

const JNS_LINES: &[LineDef] = &[
    LineDef::new(b'J', &[Int, Int, Char, Int, Int, Char]),
    LineDef::new(b'G', &[Int, Int]),
    LineDef::new(b'Q', &[Int]),
    LineDef::new(b'X', &[IntList]),
];

const BRK_LINES: &[LineDef] = &[
    LineDef::new(b'B', &[Int, Int, Int]),
    LineDef::new(b'Q', &[Int]),
    LineDef::new(b'X', &[IntList]),
];

const LIS_LINES: &[LineDef] = &[
    LineDef::new(b'L', &[IntList]).with_list_codec().with_diff(),
    LineDef::new(b'N', &[String]),
    LineDef::new(b'S', &[Int]),
];

/// Data line definitions for a file type.
pub fn data_lines(t: FileType) -> &'static [LineDef] {
    match t {
        FileType::Seq => SEQ_LINES,
        FileType::Rmp => RMP_LINES,
        FileType::Aln => ALN_LINES,
        FileType::Hit => HIT_LINES,
        FileType::Jns => JNS_LINES,
        FileType::Brk => BRK_LINES,
        FileType::Lis => LIS_LINES,
    }
}

/// Reserved line code carrying a serialized field codec in binary footers.
pub const CODE_FIELD_CODEC: u8 = 1;
/// Reserved line code carrying a serialized list codec in binary footers.
pub const CODE_LIST_CODEC: u8 = 2;
/// Reserved line code for the object byte-offset index.
pub const CODE_OBJECT_INDEX: u8 = b'&';
/// Reserved line code for the group start-object index.
pub const CODE_GROUP_INDEX: u8 = b'*';
/// Reserved line code for free-form comments.
pub const CODE_COMMENT: u8 = b'/';

/// Reserved line types that participate in the binary tag space.
pub const RESERVED_BINARY: &[LineDef] = &[
    LineDef::new(CODE_FIELD_CODEC, &[Char, String]),
    LineDef::new(CODE_LIST_CODEC, &[Char, String]),
    LineDef::new(CODE_OBJECT_INDEX, &[IntList]).with_diff(),
    LineDef::new(CODE_GROUP_INDEX, &[IntList]).with_diff(),
    LineDef::new(CODE_COMMENT, &[String]),
];

/// Header line types, always written and read in ASCII.
pub const RESERVED_HEADER: &[LineDef] = &[
    LineDef::new(b'1', &[String, Int, Int]),
    LineDef::new(b'2', &[String]),
    LineDef::new(b'#', &[Char, Int]),
    LineDef::new(b'@', &[Char, Int]),
    LineDef::new(b'+', &[Char, Int]),
    LineDef::new(b'%', &[Char, Char, Char, Int]),
    LineDef::new(b'!', &[StringList]),
    LineDef::new(b'<', &[String, Int]),
    LineDef::new(b'>', &[String]),
    LineDef::new(b'$', &[Int]),
    LineDef::new(b'^', &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for t in FileType::ALL {
            assert_eq!(FileType::from_name(t.name()), Some(t));
        }
        for s in SubType::ALL {
            assert_eq!(SubType::from_name(s.name()), Some(s));
        }
        assert_eq!(FileType::from_name("zzz"), None);
    }

    #[test]
    fn test_subtype_primary_check() {
        assert!(SubType::for_primary("irp", FileType::Seq).is_ok());
        assert!(SubType::for_primary("irp", FileType::Aln).is_err());
        assert!(SubType::for_primary("nope", FileType::Seq).is_err());
    }

    #[test]
    fn test_at_most_one_list_field() {
        for t in FileType::ALL {
            for def in data_lines(t) {
                let lists = def.fields.iter().filter(|f| f.is_list()).count();
                assert!(lists <= 1, "{} line {} has {} list fields", t.name(), def.code as char, lists);
            }
        }
    }

    #[test]
    fn test_group_types_are_lower_case() {
        for t in FileType::ALL {
            if let Some(g) = t.group_type() {
                assert!(g.is_ascii_lowercase());
                assert!(data_lines(t).iter().any(|d| d.code == g));
            }
            let o = t.object_type();
            assert!(data_lines(t).iter().any(|d| d.code == o));
        }
    }

    #[test]
    fn test_binary_tag_budget() {
        for t in FileType::ALL {
            let n = data_lines(t).len() + RESERVED_BINARY.len();
            assert!(n <= MAX_BINARY_LINES);
        }
    }
}
