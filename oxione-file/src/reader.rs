//! Streaming and random-access reading of ONE-code files.
//!
//! [`OneReader`] opens a file, parses the ASCII header (and, for binary
//! files, the footer with its serialized codecs and indices), and then
//! yields one record per [`OneReader::read_line`] call. Field values are
//! read through typed accessors; list payloads land in per-line-type
//! buffers. Binary files whose footer was read also support seeking to an
//! object or group by number.

use crate::line::{CodecSlot, LineTable, ListCodec, ListStore, Ownership};
use crate::schema::{
    CODE_COMMENT, CODE_FIELD_CODEC, CODE_GROUP_INDEX, CODE_LIST_CODEC, CODE_OBJECT_INDEX,
    FieldType, FileType, MAJOR_VERSION, MINOR_VERSION, SubType,
};
use oxione_codec::{HuffmanCodec, dna, intpack};
use oxione_core::error::{OneError, Result};
use oxione_core::{Counts, Field, MAX_FIELDS, Provenance, Reference, fields_from_bytes};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Whether this build targets a big-endian machine.
const HOST_IS_BIG: bool = cfg!(target_endian = "big");

/// Longest ASCII token (number, character) accepted.
const MAX_TOKEN: usize = 32;

/// Bytes of the offending line kept for parse-error diagnostics.
const EXCERPT_CAP: usize = 128;

/// Lexical layer: byte-at-a-time access with one-byte lookahead, a line
/// counter, and an excerpt of the current line for error reporting.
#[derive(Debug)]
pub(crate) struct Lex<R> {
    src: R,
    pub line: i64,
    excerpt: Vec<u8>,
}

impl<R: BufRead> Lex<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            line: 0,
            excerpt: Vec::with_capacity(EXCERPT_CAP),
        }
    }

    pub fn start_line(&mut self) {
        self.excerpt.clear();
    }

    pub fn err(&self, message: impl Into<String>) -> OneError {
        OneError::parse(
            self.line,
            message,
            String::from_utf8_lossy(&self.excerpt).into_owned(),
        )
    }

    pub fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.src.fill_buf()?;
        Ok(buf.first().copied())
    }

    pub fn getc(&mut self) -> Result<Option<u8>> {
        let Some(c) = self.peek()? else {
            return Ok(None);
        };
        self.src.consume(1);
        if self.excerpt.len() < EXCERPT_CAP {
            self.excerpt.push(c);
        }
        Ok(Some(c))
    }

    fn getc_req(&mut self, what: &str) -> Result<u8> {
        self.getc()?
            .ok_or_else(|| self.err(format!("premature end of file in {what}")))
    }

    pub fn eat_white(&mut self) -> Result<()> {
        let c = self.getc_req("field separator")?;
        if c == b' ' || c == b'\t' {
            Ok(())
        } else {
            Err(self.err("failed to find expected whitespace"))
        }
    }

    fn read_token(&mut self) -> Result<String> {
        self.eat_white()?;
        let mut token = String::new();
        loop {
            match self.peek()? {
                None | Some(b' ') | Some(b'\t') | Some(b'\n') => break,
                Some(c) => {
                    if token.len() >= MAX_TOKEN {
                        return Err(self.err(format!("overlong item {token}")));
                    }
                    self.getc()?;
                    token.push(c as char);
                }
            }
        }
        Ok(token)
    }

    pub fn read_int(&mut self) -> Result<i64> {
        let token = self.read_token()?;
        if token.is_empty() {
            return Err(self.err("empty int field"));
        }
        token.parse().map_err(|_| self.err("bad int"))
    }

    pub fn read_real(&mut self) -> Result<f64> {
        let token = self.read_token()?;
        if token.is_empty() {
            return Err(self.err("empty real field"));
        }
        token.parse().map_err(|_| self.err("bad real"))
    }

    pub fn read_char(&mut self) -> Result<u8> {
        self.eat_white()?;
        self.getc_req("char field")
    }

    /// Read exactly `buf.len()` raw bytes.
    pub fn read_exact_into(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.src.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                OneError::binary(self.line, format!("short read of {what}"))
            } else {
                e.into()
            }
        })
    }

    /// Read a length-prefixed string payload, appending to `out`.
    pub fn read_string(&mut self, n: usize, out: &mut Vec<u8>) -> Result<()> {
        self.eat_white()?;
        let start = out.len();
        out.resize(start + n, 0);
        self.read_exact_into(&mut out[start..], "string")
    }

    /// Consume to end of line. A single space before the newline starts a
    /// comment attached to the record, which is returned.
    pub fn read_flush(&mut self) -> Result<Option<Vec<u8>>> {
        match self.getc_req("line terminator")? {
            b'\n' => Ok(None),
            b' ' => {
                let mut comment = Vec::new();
                loop {
                    match self.getc()? {
                        None => return Err(self.err("premature end of file in comment")),
                        Some(b'\n') => return Ok(Some(comment)),
                        Some(c) => comment.push(c),
                    }
                }
            }
            _ => Err(self.err("comment not separated by a space")),
        }
    }

    /// Consume to end of line, discarding everything.
    pub fn skip_line(&mut self) -> Result<()> {
        loop {
            match self.getc()? {
                None => return Err(self.err("end of file before end of line")),
                Some(b'\n') => return Ok(()),
                Some(_) => {}
            }
        }
    }
}

impl<R: Seek> Lex<R> {
    pub fn pos(&mut self) -> Result<u64> {
        Ok(self.src.stream_position()?)
    }

    pub fn seek(&mut self, to: SeekFrom) -> Result<u64> {
        Ok(self.src.seek(to)?)
    }
}

/// A read session over one ONE-code file.
#[derive(Debug)]
pub struct OneReader<R> {
    lex: Lex<R>,
    table: LineTable,
    file_type: FileType,
    sub_type: Option<SubType>,
    is_binary: bool,
    is_header: bool,
    is_final: bool,
    line_type: u8,
    object: i64,
    group: i64,
    in_group: bool,
    fields: [Field; MAX_FIELDS],
    comment: Option<Vec<u8>>,
    object_index: Vec<i64>,
    group_index: Vec<i64>,
    is_index_in: bool,
    provenance: Vec<Provenance>,
    references: Vec<Reference>,
    deferred: Vec<Reference>,
    scratch: Vec<u8>,
}

impl OneReader<BufReader<File>> {
    /// Open a file for reading and parse its header (and footer, for a
    /// binary file). If the file has no `1` header line, `file_type` must
    /// be given; if it has one and `file_type` is given, they must match.
    pub fn open(path: impl AsRef<Path>, file_type: Option<FileType>) -> Result<Self> {
        let f = File::open(path)?;
        Self::from_reader(BufReader::new(f), file_type)
    }
}

impl<R: BufRead + Seek> OneReader<R> {
    /// Open a read session over any buffered, seekable byte source.
    pub fn from_reader(src: R, file_type: Option<FileType>) -> Result<Self> {
        let mut lex = Lex::new(src);

        let first = lex
            .peek()?
            .ok_or_else(|| OneError::state("file is empty"))?;

        let mut is_header = false;
        let resolved = if first == b'1' {
            lex.line = 1;
            lex.start_line();
            lex.getc()?;
            let len = lex.read_int()? as usize;
            let mut name = Vec::new();
            lex.read_string(len, &mut name)?;
            let major = lex.read_int()?;
            let minor = lex.read_int()?;
            lex.skip_line()?;

            if major != MAJOR_VERSION {
                return Err(lex.err(format!("major version file {major} != {MAJOR_VERSION}")));
            }
            if minor != MINOR_VERSION {
                return Err(lex.err(format!("minor version file {minor} != {MINOR_VERSION}")));
            }

            let name = String::from_utf8_lossy(&name).into_owned();
            let t = FileType::from_name(&name)
                .ok_or_else(|| lex.err(format!("unknown primary file type {name}")))?;
            if file_type.is_some_and(|want| want != t) {
                return Err(lex.err(format!(
                    "primary file type mismatch: file {} != {}",
                    t.name(),
                    file_type.map_or("", |w| w.name())
                )));
            }
            is_header = true;
            t
        } else {
            file_type.ok_or_else(|| {
                OneError::schema("file type not defined in file or by caller".to_string())
            })?
        };

        let table = LineTable::new(resolved, false)?;
        let mut reader = Self {
            lex,
            table,
            file_type: resolved,
            sub_type: None,
            is_binary: false,
            is_header,
            is_final: false,
            line_type: 0,
            object: 0,
            group: 0,
            in_group: false,
            fields: [Field::default(); MAX_FIELDS],
            comment: None,
            object_index: Vec::new(),
            group_index: Vec::new(),
            is_index_in: false,
            provenance: Vec::new(),
            references: Vec::new(),
            deferred: Vec::new(),
            scratch: Vec::new(),
        };
        reader.read_header()?;
        Ok(reader)
    }

    /// Parse header lines (and the footer of a binary file) until the
    /// first data line.
    fn read_header(&mut self) -> Result<()> {
        let mut data_pos: u64 = 0;
        let mut foot_off: u64 = u64::MAX;
        loop {
            let Some(mut peek) = self.lex.peek()? else {
                break;
            };
            if peek & 0x80 != 0 {
                peek = self.table.char_from_tag(peek).unwrap_or(0);
            }
            if peek.is_ascii_alphabetic() {
                break;
            }

            let Some(t) = self.read_line()? else {
                continue;
            };
            match t {
                b'1' => return Err(self.lex.err("1 should be first line in header")),
                b'2' => {
                    let name = String::from_utf8_lossy(self.string()).into_owned();
                    self.sub_type = Some(SubType::for_primary(&name, self.file_type)?);
                }
                b'#' | b'@' | b'+' => {
                    let c = self.chr(0);
                    let v = self.int(1);
                    if c == self.table.object_type && t == b'#' {
                        self.object_index.reserve(v.max(0) as usize);
                    }
                    if Some(c) == self.table.group_type && t == b'#' {
                        self.group_index.reserve(v.max(0) as usize + 1);
                    }
                    let li = self
                        .table
                        .get_mut(c)
                        .ok_or_else(|| self.lex.err(format!("unknown line type {}", c as char)))?;
                    match t {
                        b'#' => li.given.count = v,
                        b'@' => li.given.max = v,
                        _ => li.given.total = v,
                    }
                }
                b'%' => {
                    let op = self.chr(1);
                    let c = self.chr(2);
                    let v = self.int(3);
                    let li = self
                        .table
                        .get_mut(c)
                        .ok_or_else(|| self.lex.err(format!("unknown line type {}", c as char)))?;
                    match op {
                        b'#' => li.given.group_count = v,
                        b'+' => li.given.group_total = v,
                        _ => {
                            return Err(self
                                .lex
                                .err(format!("unrecognised symbol {}", op as char)));
                        }
                    }
                }
                b'!' => {
                    let strings: Vec<String> = self
                        .string_list()
                        .iter()
                        .map(|s| String::from_utf8_lossy(s).into_owned())
                        .collect();
                    if strings.len() != 4 {
                        return Err(self.lex.err("provenance line must carry 4 strings"));
                    }
                    self.provenance.push(Provenance {
                        program: strings[0].clone(),
                        version: strings[1].clone(),
                        command: strings[2].clone(),
                        date: strings[3].clone(),
                    });
                }
                b'<' => {
                    let filename = String::from_utf8_lossy(self.string()).into_owned();
                    let count = self.int(1);
                    self.references.push(Reference { filename, count });
                }
                b'>' => {
                    let filename = String::from_utf8_lossy(self.string()).into_owned();
                    self.deferred.push(Reference { filename, count: 0 });
                }
                b'$' => {
                    if self.int(0) != HOST_IS_BIG as i64 {
                        return Err(OneError::binary(
                            self.lex.line,
                            "endian mismatch - write the file as ASCII to transport it",
                        ));
                    }
                    self.is_binary = true;
                    data_pos = self.lex.pos()?;
                    self.lex.seek(SeekFrom::End(-8))?;
                    let mut off = [0u8; 8];
                    self.lex.read_exact_into(&mut off, "footer offset")?;
                    foot_off = i64::from_ne_bytes(off) as u64;
                    self.lex.seek(SeekFrom::Start(foot_off))?;
                }
                b'^' => {
                    if data_pos >= foot_off {
                        // The file has no records; park at end of file so
                        // the footer is not replayed as data.
                        self.lex.seek(SeekFrom::End(0))?;
                        break;
                    }
                    self.lex.seek(SeekFrom::Start(data_pos))?;
                }
                CODE_OBJECT_INDEX => {
                    self.object_index = self.int_list().to_vec();
                    self.is_index_in = true;
                }
                CODE_GROUP_INDEX => {
                    self.group_index = self.int_list().to_vec();
                }
                CODE_FIELD_CODEC => {
                    let c = self.chr(0);
                    let vc = HuffmanCodec::deserialize(self.string())?;
                    let li = self
                        .table
                        .get_mut(c)
                        .ok_or_else(|| self.lex.err(format!("unknown line type {}", c as char)))?;
                    li.field_codec = Some(CodecSlot::Committed(Arc::new(vc)));
                }
                CODE_LIST_CODEC => {
                    let c = self.chr(0);
                    let vc = HuffmanCodec::deserialize(self.string())?;
                    let li = self
                        .table
                        .get_mut(c)
                        .ok_or_else(|| self.lex.err(format!("unknown line type {}", c as char)))?;
                    li.list_codec = Some(ListCodec::Huffman(CodecSlot::Committed(Arc::new(vc))));
                }
                other => {
                    return Err(self
                        .lex
                        .err(format!("unknown header line type {}", other as char)));
                }
            }
        }
        Ok(())
    }

    /// Read the next record. Returns its line type, or `None` at end of
    /// file (or at the blank line that ends a binary file's record
    /// stream).
    pub fn read_line(&mut self) -> Result<Option<u8>> {
        if self.is_final {
            return Err(OneError::state("cannot read more data after counts are finalized"));
        }
        self.comment = None;
        let Some((t, was_binary)) = self.read_line_raw()? else {
            return Ok(None);
        };

        // A `/` record following a binary record is that record's comment;
        // absorb it and re-surface the record's fields unchanged.
        if was_binary {
            loop {
                let Some(mut peek) = self.lex.peek()? else {
                    break;
                };
                if peek & 0x80 != 0 {
                    peek = self.table.char_from_tag(peek).unwrap_or(0);
                }
                if peek != CODE_COMMENT {
                    break;
                }
                let saved_fields = self.fields;
                self.read_line_raw()?;
                let li = self
                    .table
                    .get(CODE_COMMENT)
                    .expect("comment line is always in the table");
                self.comment = Some(li.bytes_slice().to_vec());
                self.fields = saved_fields;
                self.line_type = t;
            }
        }
        Ok(Some(t))
    }

    fn read_line_raw(&mut self) -> Result<Option<(u8, bool)>> {
        self.lex.start_line();
        let Some(x) = self.lex.getc()? else {
            return Ok(None);
        };
        if x == b'\n' {
            return Ok(None);
        }
        self.lex.line += 1;

        let (t, is_ascii) = if x & 0x80 != 0 {
            let t = self
                .table
                .char_from_tag(x)
                .ok_or_else(|| self.lex.err(format!("unknown binary line tag {x:#04x}")))?;
            (t, false)
        } else {
            (x, true)
        };
        self.line_type = t;

        let idx = self
            .table
            .index_of(t)
            .ok_or_else(|| self.lex.err(format!("unknown line type {}", t as char)))?;
        self.table.info_mut(idx).accum.count += 1;
        if t == self.table.object_type {
            self.object += 1;
        }
        if Some(t) == self.table.group_type {
            self.table.update_group_deltas(self.in_group);
            self.group += 1;
            self.in_group = true;
        }

        if is_ascii {
            self.read_ascii_body(idx, t)?;
        } else {
            self.read_binary_body(idx, x)?;
        }
        Ok(Some((t, !is_ascii)))
    }

    fn read_ascii_body(&mut self, idx: usize, t: u8) -> Result<()> {
        let nfield = self.table.info(idx).fields.len();
        for i in 0..nfield {
            match self.table.info(idx).fields[i] {
                FieldType::Int => self.fields[i] = Field::from_int(self.lex.read_int()?),
                FieldType::Real => self.fields[i] = Field::from_real(self.lex.read_real()?),
                FieldType::Char => self.fields[i] = Field::from_char(self.lex.read_char()?),
                FieldType::String => {
                    let len = self.read_list_len()?;
                    self.fields[i] = Field::from_len(len as i64);
                    let li = self.table.info_mut(idx);
                    li.accum.add_list(len as i64);
                    let ListStore::Bytes(buf) = prepare(&mut li.buffer, li.ownership) else {
                        return Err(OneError::state("string line buffer has wrong store type"));
                    };
                    let start = buf.len();
                    self.lex.read_string(len, buf)?;
                    buf.push(0);
                    li.list_range = (start, len);
                }
                FieldType::IntList => {
                    let len = self.read_list_len()?;
                    self.fields[i] = Field::from_len(len as i64);
                    let li = self.table.info_mut(idx);
                    li.accum.add_list(len as i64);
                    let ListStore::Ints(buf) = prepare(&mut li.buffer, li.ownership) else {
                        return Err(OneError::state("int list buffer has wrong store type"));
                    };
                    let start = buf.len();
                    for _ in 0..len {
                        buf.push(self.lex.read_int()?);
                    }
                    li.list_range = (start, len);
                }
                FieldType::RealList => {
                    let len = self.read_list_len()?;
                    self.fields[i] = Field::from_len(len as i64);
                    let li = self.table.info_mut(idx);
                    li.accum.add_list(len as i64);
                    let ListStore::Reals(buf) = prepare(&mut li.buffer, li.ownership) else {
                        return Err(OneError::state("real list buffer has wrong store type"));
                    };
                    let start = buf.len();
                    for _ in 0..len {
                        buf.push(self.lex.read_real()?);
                    }
                    li.list_range = (start, len);
                }
                FieldType::StringList => {
                    // Provenance lines carry exactly 4 strings and no count.
                    let count = if t == b'!' { 4 } else { self.read_list_len()? };
                    self.fields[i] = Field::from_len(count as i64);
                    self.table.info_mut(idx).accum.add_list(count as i64);
                    self.read_string_list_body(idx, count)?;
                }
            }
        }
        self.comment = self.lex.read_flush()?;
        Ok(())
    }

    fn read_list_len(&mut self) -> Result<usize> {
        let len = self.lex.read_int()?;
        if len < 0 {
            return Err(self.lex.err(format!("negative list length {len}")));
        }
        Ok(len as usize)
    }

    fn read_string_list_body(&mut self, idx: usize, count: usize) -> Result<()> {
        let li = self.table.info_mut(idx);
        let ListStore::Bytes(buf) = prepare(&mut li.buffer, li.ownership) else {
            return Err(OneError::state("string list buffer has wrong store type"));
        };
        let start = buf.len();
        for _ in 0..count {
            let slen = self.lex.read_int()?;
            if slen < 0 {
                return Err(self.lex.err(format!("negative string length {slen}")));
            }
            self.lex.read_string(slen as usize, buf)?;
            buf.push(0);
        }
        let total = buf.len() - start;
        li.list_range = (start, total);
        Ok(())
    }

    fn read_binary_body(&mut self, idx: usize, x: u8) -> Result<()> {
        let nfield = self.table.info(idx).fields.len();
        if nfield > 0 {
            if x & 0x1 != 0 {
                let mut b = [0u8; 1];
                self.lex.read_exact_into(&mut b, "compressed field bit count")?;
                let nbits = b[0] as usize;
                self.scratch.resize(nbits.div_ceil(8), 0);
                let Lex { src, line, .. } = &mut self.lex;
                src.read_exact(&mut self.scratch).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        OneError::binary(*line, "short read of compressed fields")
                    } else {
                        OneError::from(e)
                    }
                })?;

                let li = self.table.info(idx);
                let codec = li
                    .field_codec
                    .as_ref()
                    .ok_or_else(|| OneError::binary(self.lex.line, "compressed fields but no field codec"))?;
                let mut block = Vec::with_capacity(nfield * 8);
                codec.codec().decode(&self.scratch, nbits, &mut block)?;
                if block.len() < nfield * 8 {
                    return Err(OneError::binary(self.lex.line, "short compressed field block"));
                }
                fields_from_bytes(&block, &mut self.fields[..nfield]);
            } else {
                self.scratch.resize(nfield * 8, 0);
                let mut block = std::mem::take(&mut self.scratch);
                self.lex.read_exact_into(&mut block, "fields")?;
                fields_from_bytes(&block, &mut self.fields[..nfield]);
                self.scratch = block;
            }
        }

        // A group record's leading count is recomputed from the index; the
        // value in the file may predate the group's completion.
        if Some(self.line_type) == self.table.group_type && self.is_index_in {
            let g = self.group as usize;
            if g >= 1 && g < self.group_index.len() {
                self.fields[0] =
                    Field::from_int(self.group_index[g] - self.group_index[g - 1]);
            }
        }

        let (list_field, elem_size) = {
            let li = self.table.info(idx);
            (li.list_field, li.list_byte_size)
        };
        let Some(ix) = list_field else {
            return Ok(());
        };
        let ft = self.table.info(idx).fields[ix];
        let list_len = self.fields[ix].len() as usize;
        let z = self.fields[ix].pack_zeros() as usize;
        self.table.info_mut(idx).accum.add_list(list_len as i64);

        if list_len == 0 {
            let li = self.table.info_mut(idx);
            li.list_range = (li.buffer.len(), 0);
            return Ok(());
        }

        if ft == FieldType::StringList {
            return self.read_string_list_body(idx, list_len);
        }

        if z > elem_size {
            return Err(OneError::binary(self.lex.line, "pack-zero count exceeds element size"));
        }
        let payload = if x & 0x2 != 0 {
            let mut nb = [0u8; 8];
            self.lex.read_exact_into(&mut nb, "list bit count")?;
            let nbits = i64::from_ne_bytes(nb);
            if nbits < 0 {
                return Err(OneError::binary(self.lex.line, "negative list bit count"));
            }
            let nbits = nbits as usize;
            self.scratch.resize(nbits.div_ceil(8), 0);
            let mut raw = std::mem::take(&mut self.scratch);
            self.lex.read_exact_into(&mut raw, "compressed list")?;
            self.scratch = raw;

            let mut decoded = Vec::new();
            match &self.table.info(idx).list_codec {
                Some(ListCodec::Dna) => {
                    dna::decode(&self.scratch, nbits, &mut decoded);
                }
                Some(ListCodec::Huffman(slot)) => {
                    slot.codec().decode(&self.scratch, nbits, &mut decoded)?;
                }
                None => {
                    return Err(OneError::binary(self.lex.line, "compressed list but no list codec"));
                }
            }
            decoded
        } else {
            let used = elem_size - z;
            let mut raw = vec![0u8; list_len * used];
            self.lex.read_exact_into(&mut raw, "list")?;
            raw
        };

        let li = self.table.info_mut(idx);
        match ft {
            FieldType::String => {
                let ListStore::Bytes(buf) = prepare(&mut li.buffer, li.ownership) else {
                    return Err(OneError::state("string line buffer has wrong store type"));
                };
                if payload.len() < list_len {
                    return Err(OneError::binary(self.lex.line, "short string payload"));
                }
                let start = buf.len();
                buf.extend_from_slice(&payload[..list_len]);
                buf.push(0);
                li.list_range = (start, list_len);
            }
            FieldType::IntList => {
                let values = intpack::unpack(&payload, list_len, z as u8, li.is_int_list_diff)
                    .ok_or_else(|| OneError::binary(self.lex.line, "short packed int list"))?;
                let ListStore::Ints(buf) = prepare(&mut li.buffer, li.ownership) else {
                    return Err(OneError::state("int list buffer has wrong store type"));
                };
                let start = buf.len();
                buf.extend_from_slice(&values);
                li.list_range = (start, list_len);
            }
            FieldType::RealList => {
                if payload.len() < list_len * 8 {
                    return Err(OneError::binary(self.lex.line, "short real list payload"));
                }
                let ListStore::Reals(buf) = prepare(&mut li.buffer, li.ownership) else {
                    return Err(OneError::state("real list buffer has wrong store type"));
                };
                let start = buf.len();
                for chunk in payload[..list_len * 8].chunks_exact(8) {
                    buf.push(f64::from_ne_bytes(chunk.try_into().unwrap()));
                }
                li.list_range = (start, list_len);
            }
            _ => unreachable!("list field types are exhaustive"),
        }
        Ok(())
    }

    /// Seek so the next record read is object `i`. Returns `false` when no
    /// index is available or `i` is out of range.
    pub fn goto_object(&mut self, i: i64) -> Result<bool> {
        if !self.is_index_in {
            return Ok(false);
        }
        let count = self
            .table
            .get(self.table.object_type)
            .map_or(0, |li| li.given.count);
        if i < 0 || i >= count {
            return Ok(false);
        }
        self.lex
            .seek(SeekFrom::Start(self.object_index[i as usize] as u64))?;
        self.object = i;
        Ok(true)
    }

    /// Seek to the first object of group `g` and return the group's size
    /// in objects, or 0 when no index is available or `g` is out of range.
    pub fn goto_group(&mut self, g: i64) -> Result<i64> {
        if !self.is_index_in {
            return Ok(0);
        }
        let count = self
            .table
            .group_type
            .and_then(|c| self.table.get(c))
            .map_or(0, |li| li.given.count);
        if g < 0 || g >= count {
            return Ok(0);
        }
        let g = g as usize;
        if !self.goto_object(self.group_index[g])? {
            return Ok(0);
        }
        Ok(self.group_index[g + 1] - self.group_index[g])
    }

    /// Close the trailing group and freeze the accumulated counts.
    pub fn finalize_counts(&mut self) {
        self.table.update_group_deltas(self.in_group);
        self.is_final = true;
    }

    // ------ accessors ------

    /// The file's primary type.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// The file's subtype, if the header declared one.
    pub fn sub_type(&self) -> Option<SubType> {
        self.sub_type
    }

    /// True when the file is binary.
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// True when the file began with a `1` header line.
    pub fn has_header(&self) -> bool {
        self.is_header
    }

    /// True when the binary footer's object index was read, enabling
    /// [`Self::goto_object`] and [`Self::goto_group`].
    pub fn has_index(&self) -> bool {
        self.is_index_in
    }

    /// Line type of the current record.
    pub fn line_type(&self) -> u8 {
        self.line_type
    }

    /// 1-based number of the current line.
    pub fn line(&self) -> i64 {
        self.lex.line
    }

    /// Objects read so far (or the seek target after [`Self::goto_object`]).
    pub fn object(&self) -> i64 {
        self.object
    }

    /// Groups entered so far.
    pub fn group(&self) -> i64 {
        self.group
    }

    /// Field `i` of the current record as an integer.
    pub fn int(&self, i: usize) -> i64 {
        self.fields[i].int()
    }

    /// Field `i` of the current record as a real.
    pub fn real(&self, i: usize) -> f64 {
        self.fields[i].real()
    }

    /// Field `i` of the current record as a character.
    pub fn chr(&self, i: usize) -> u8 {
        self.fields[i].chr()
    }

    /// Length of the current record's list (0 if the line has none).
    pub fn list_len(&self) -> i64 {
        self.table
            .get(self.line_type)
            .and_then(|li| li.list_field)
            .map_or(0, |ix| self.fields[ix].len())
    }

    /// The current record's string payload.
    pub fn string(&self) -> &[u8] {
        self.table
            .get(self.line_type)
            .map_or(&[][..], |li| li.bytes_slice())
    }

    /// The current record's integer list.
    pub fn int_list(&self) -> &[i64] {
        self.table
            .get(self.line_type)
            .map_or(&[][..], |li| li.ints_slice())
    }

    /// The current record's real list.
    pub fn real_list(&self) -> &[f64] {
        self.table
            .get(self.line_type)
            .map_or(&[][..], |li| li.reals_slice())
    }

    /// The current record's string list.
    pub fn string_list(&self) -> Vec<&[u8]> {
        let count = self.list_len() as usize;
        self.string().split(|&b| b == 0).take(count).collect()
    }

    /// The comment attached to the current record, if any.
    pub fn comment(&self) -> Option<&[u8]> {
        self.comment.as_deref()
    }

    /// Counts declared by the header/footer for a line type.
    pub fn given(&self, t: u8) -> Option<Counts> {
        self.table.get(t).map(|li| li.given)
    }

    /// Counts accumulated from the records read so far.
    pub fn accum(&self, t: u8) -> Option<Counts> {
        self.table.get(t).map(|li| li.accum)
    }

    /// The line type whose records are the file's objects.
    pub fn object_type(&self) -> u8 {
        self.table.object_type
    }

    /// The line type that begins a group, if any.
    pub fn group_type(&self) -> Option<u8> {
        self.table.group_type
    }

    /// Field signature of a line type.
    pub fn field_types(&self, t: u8) -> Option<&'static [FieldType]> {
        self.table.get(t).map(|li| li.fields)
    }

    /// Current byte position in the underlying source.
    pub fn position(&mut self) -> Result<u64> {
        self.lex.pos()
    }

    /// Data line characters of this file type, sorted.
    pub fn data_codes(&self) -> Vec<u8> {
        self.table.data_codes()
    }

    /// Statistics-bearing line characters: upper-case types, then the
    /// group type.
    pub fn stat_codes(&self) -> Vec<u8> {
        self.table.stat_codes()
    }

    /// Provenance records from the header.
    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }

    /// Reference records from the header.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Deferred-reference records from the header.
    pub fn deferred(&self) -> &[Reference] {
        &self.deferred
    }

    /// Retain list payloads of line type `t`: subsequent records append to
    /// the buffer instead of overwriting it, until the caller takes the
    /// buffer back with [`Self::take_list_buffer`].
    pub fn retain_lists(&mut self, t: u8) -> Result<()> {
        let li = self
            .table
            .get_mut(t)
            .ok_or_else(|| OneError::schema(format!("unknown line type {}", t as char)))?;
        li.ownership = Ownership::User;
        Ok(())
    }

    /// Take the accumulated list buffer of line type `t`, reverting it to
    /// library ownership.
    pub fn take_list_buffer(&mut self, t: u8) -> Result<ListStore> {
        let li = self
            .table
            .get_mut(t)
            .ok_or_else(|| OneError::schema(format!("unknown line type {}", t as char)))?;
        li.ownership = Ownership::Library;
        li.list_range = (0, 0);
        let empty = match &li.buffer {
            ListStore::Bytes(_) => ListStore::Bytes(Vec::new()),
            ListStore::Ints(_) => ListStore::Ints(Vec::new()),
            ListStore::Reals(_) => ListStore::Reals(Vec::new()),
        };
        Ok(std::mem::replace(&mut li.buffer, empty))
    }
}

/// Clear a library-owned buffer before a record lands in it; user-owned
/// buffers accumulate.
fn prepare(store: &mut ListStore, ownership: Ownership) -> &mut ListStore {
    if ownership == Ownership::Library {
        store.clear();
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn seq_reader(text: &str) -> OneReader<Cursor<Vec<u8>>> {
        OneReader::from_reader(Cursor::new(text.as_bytes().to_vec()), Some(FileType::Seq))
            .unwrap()
    }

    #[test]
    fn test_headerless_ascii_records() {
        let mut r = seq_reader("S 5 acgtn\nQ 5 !!!!!\n");
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.list_len(), 5);
        assert_eq!(r.string(), b"acgtn");
        assert_eq!(r.object(), 1);

        assert_eq!(r.read_line().unwrap(), Some(b'Q'));
        assert_eq!(r.string(), b"!!!!!");
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn test_header_line_parsed() {
        let text = "1 3 seq 1 0\n# S 2\n@ S 4\nS 4 acgt\nS 3 acg\n";
        let mut r = OneReader::from_reader(Cursor::new(text.as_bytes().to_vec()), None).unwrap();
        assert_eq!(r.file_type(), FileType::Seq);
        assert!(r.has_header());
        assert_eq!(r.given(b'S').unwrap().count, 2);
        assert_eq!(r.given(b'S').unwrap().max, 4);
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.string(), b"acgt");
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let text = "1 3 seq 0 1\nS 3 acg\n";
        let err = OneReader::from_reader(Cursor::new(text.as_bytes().to_vec()), None).unwrap_err();
        assert!(err.to_string().contains("major version"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let text = "1 3 seq 1 0\n";
        let err = OneReader::from_reader(Cursor::new(text.as_bytes().to_vec()), Some(FileType::Aln))
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_unknown_line_type_fails_with_line_number() {
        let mut r = seq_reader("S 3 acg\nZ 1 2\n");
        r.read_line().unwrap();
        let err = r.read_line().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown line type Z"), "{msg}");
        assert!(msg.contains("line 2"), "{msg}");
    }

    #[test]
    fn test_bad_int_reports_excerpt() {
        let mut r = seq_reader("S x acg\n");
        let err = r.read_line().unwrap_err();
        assert!(err.to_string().contains("bad int"));
        assert!(err.to_string().contains("S x"));
    }

    #[test]
    fn test_trailing_comment_captured() {
        let mut r = seq_reader("S 3 acg this one came from lane 7\n");
        r.read_line().unwrap();
        assert_eq!(r.comment(), Some(&b"this one came from lane 7"[..]));
        assert_eq!(r.string(), b"acg");
    }

    #[test]
    fn test_group_stats_accumulate() {
        let text = "g 2 5 first\nS 3 aaa\nS 3 ccc\ng 1 6 second\nS 4 gggg\n";
        let mut r = seq_reader(text);
        while r.read_line().unwrap().is_some() {}
        r.finalize_counts();

        let s = r.accum(b'S').unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.total, 10);
        assert_eq!(s.group_count, 2);
        assert_eq!(s.group_total, 6);
        assert_eq!(r.group(), 2);
    }

    #[test]
    fn test_fields_and_lists() {
        let text = "W 1 10 90 0.750000\nN 1.000000 2.000000 3.000000 4.000000\n";
        let mut r = seq_reader(text);
        assert_eq!(r.read_line().unwrap(), Some(b'W'));
        assert_eq!(r.int(0), 1);
        assert_eq!(r.int(1), 10);
        assert_eq!(r.int(2), 90);
        assert_eq!(r.real(3), 0.75);

        assert_eq!(r.read_line().unwrap(), Some(b'N'));
        assert_eq!(r.real(2), 3.0);
    }

    #[test]
    fn test_string_list_line() {
        let text = "r 2 2 3 GAT 4 CTAG\n";
        let mut r = OneReader::from_reader(Cursor::new(text.as_bytes().to_vec()), Some(FileType::Rmp))
            .unwrap();
        assert_eq!(r.read_line().unwrap(), Some(b'r'));
        assert_eq!(r.int(0), 2);
        assert_eq!(r.list_len(), 2);
        assert_eq!(r.string_list(), vec![&b"GAT"[..], &b"CTAG"[..]]);
    }

    #[test]
    fn test_retained_buffer_accumulates() {
        let mut r = seq_reader("S 3 aaa\nS 4 cccc\n");
        r.retain_lists(b'S').unwrap();
        r.read_line().unwrap();
        r.read_line().unwrap();
        assert_eq!(r.string(), b"cccc");
        let ListStore::Bytes(all) = r.take_list_buffer(b'S').unwrap() else {
            panic!("expected byte store");
        };
        assert_eq!(all, b"aaa\0cccc\0");
    }
}
