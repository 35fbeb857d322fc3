//! Streaming write of ONE-code files, in ASCII or binary form, with
//! optional parallel sharding.
//!
//! A [`OneWriter`] is driven record by record: set the non-list fields with
//! the typed setters, then call [`OneWriter::write_line`] with the list
//! payload. Binary sessions maintain the object and group indices, train
//! the per-line-type codecs, and write the footer at
//! [`OneWriter::finish`].
//!
//! A parallel session ([`OneWriter::create_parallel`]) hands one writer
//! per shard to the caller, who drives each from its own thread. Shard 0
//! writes the real output file; the others write uniquely named temporary
//! segments that [`OneWriter::finish_parallel`] concatenates, after
//! folding the shard accumulators together and stitching the indices with
//! cumulative byte and object offsets.

use crate::line::{CodecSlot, LineTable, ListCodec};
use crate::reader::OneReader;
use crate::schema::{
    self, CODE_COMMENT, CODE_FIELD_CODEC, CODE_GROUP_INDEX, CODE_LIST_CODEC, CODE_OBJECT_INDEX,
    FieldType, FileType, ListCodecKind, MAJOR_VERSION, MINOR_VERSION, SubType,
};
use crate::trainer::{CODEC_TRAINING_SIZE, SharedTraining};
use chrono::Local;
use oxione_codec::{dna, intpack};
use oxione_core::error::{OneError, Result};
use oxione_core::{Counts, Field, LEN_MASK, MAX_FIELDS, Provenance, Reference, fields_to_bytes};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether this build targets a big-endian machine.
const HOST_IS_BIG: bool = cfg!(target_endian = "big");

/// Block size used when concatenating shard segments at close.
const CONCAT_BLOCK: usize = 10_000_000;

/// A writer that tracks its byte position, so binary record offsets never
/// need a seek.
struct CountingWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// List payload passed to [`OneWriter::write_line`].
#[derive(Debug, Clone, Copy)]
pub enum List<'a> {
    /// The line carries no list.
    None,
    /// Payload of a `STRING` field.
    Bytes(&'a [u8]),
    /// Payload of an `INT_LIST` field.
    Ints(&'a [i64]),
    /// Payload of a `REAL_LIST` field.
    Reals(&'a [f64]),
    /// Payload of a `STRING_LIST` field.
    Strings(&'a [&'a [u8]]),
}

/// Parallel-session context of one shard.
struct ShardCtx {
    index: usize,
    shared: Arc<SharedTraining>,
    local_threshold: i64,
}

/// A write session producing one ONE-code file (or one shard of one).
pub struct OneWriter<W: Write> {
    out: CountingWriter<W>,
    table: LineTable,
    file_type: FileType,
    sub_type: Option<SubType>,
    is_binary: bool,
    line: i64,
    object: i64,
    group: i64,
    in_group: bool,
    fields: [Field; MAX_FIELDS],
    is_last_line_binary: bool,
    is_header_out: bool,
    is_final: bool,
    codec_buf: Vec<u8>,
    pack_vals: Vec<i64>,
    pack_buf: Vec<u8>,
    object_index: Vec<i64>,
    group_index: Vec<i64>,
    provenance: Vec<Provenance>,
    references: Vec<Reference>,
    deferred: Vec<Reference>,
    codec_training_size: i64,
    shard: Option<ShardCtx>,
    temp_path: Option<PathBuf>,
    finished: bool,
}

impl OneWriter<BufWriter<File>> {
    /// Create a file and open a single-threaded write session on it.
    pub fn create(
        path: impl AsRef<Path>,
        file_type: FileType,
        sub_type: Option<SubType>,
        is_binary: bool,
    ) -> Result<Self> {
        let f = File::create(path)?;
        Self::from_writer(BufWriter::new(f), file_type, sub_type, is_binary)
    }

    /// Open a write session inheriting an open reader's type, subtype,
    /// provenance, references, deferrals, and counts.
    ///
    /// With `use_accum` the counts actually accumulated by the source
    /// session are inherited; otherwise the counts its header declared
    /// are copied verbatim, whatever fraction of the source has been
    /// read.
    pub fn create_from<R: BufRead + Seek>(
        path: impl AsRef<Path>,
        source: &OneReader<R>,
        use_accum: bool,
        is_binary: bool,
    ) -> Result<Self> {
        let mut w = Self::create(path, source.file_type(), source.sub_type(), is_binary)?;
        w.inherit_from(source, use_accum)?;
        Ok(w)
    }

    /// Open a parallel write session of `nshards` writers. Shard 0 writes
    /// `path`; shards `1..n` write `.part.<pid>.<i>` temporaries next to
    /// it. Drive each shard from its own thread, then pass all of them to
    /// [`OneWriter::finish_parallel`].
    pub fn create_parallel(
        path: impl AsRef<Path>,
        file_type: FileType,
        sub_type: Option<SubType>,
        is_binary: bool,
        nshards: usize,
    ) -> Result<Vec<Self>> {
        if nshards == 0 {
            return Err(OneError::state("a parallel session needs at least one shard"));
        }
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let pid = std::process::id();

        let field_codes: Vec<u8> = schema::data_lines(file_type)
            .iter()
            .filter(|d| d.field_codec)
            .map(|d| d.code)
            .collect();
        let list_codes: Vec<u8> = schema::data_lines(file_type)
            .iter()
            .filter(|d| d.list_codec == ListCodecKind::Huffman)
            .map(|d| d.code)
            .collect();
        let shared = Arc::new(SharedTraining::new(&field_codes, &list_codes));
        let local_threshold = CODEC_TRAINING_SIZE / (3 * nshards as i64);

        let mut shards = Vec::with_capacity(nshards);
        for i in 0..nshards {
            let (mut w, temp_path) = if i == 0 {
                (Self::create(path, file_type, sub_type, is_binary)?, None)
            } else {
                let tp = dir.join(format!(".part.{pid}.{i}"));
                let f = File::create(&tp)?;
                (
                    Self::from_writer(BufWriter::new(f), file_type, sub_type, is_binary)?,
                    Some(tp),
                )
            };
            if i > 0 {
                w.is_last_line_binary = is_binary;
            }
            w.shard = Some(ShardCtx {
                index: i,
                shared: shared.clone(),
                local_threshold,
            });
            w.temp_path = temp_path;
            shards.push(w);
        }
        Ok(shards)
    }

    /// Finish a parallel session: fold the shard accumulators into shard
    /// 0, stitch the indices, concatenate and unlink the temporary
    /// segments, and write the end-of-data marker and footer.
    pub fn finish_parallel(mut shards: Vec<Self>) -> Result<()> {
        let master_ctx = shards
            .first()
            .and_then(|s| s.shard.as_ref())
            .ok_or_else(|| OneError::state("finish_parallel needs a parallel session"))?;
        if master_ctx.index != 0 {
            return Err(OneError::state("shard 0 must lead a parallel close"));
        }
        let n = shards.len();

        // Close each shard's trailing group against the leading partial
        // group of the shards that follow it.
        if shards[0].table.group_type.is_some() {
            let codes: Vec<u8> = (b'A'..=b'Z')
                .filter(|&c| shards[0].table.get(c).is_some())
                .collect();
            for &c in &codes {
                for j in 0..n {
                    if !shards[j].in_group {
                        continue;
                    }
                    let mut oc = 0i64;
                    let mut ot = 0i64;
                    for shard in &shards[j + 1..] {
                        let lk = shard.table.get(c).expect("shards share a schema");
                        if shard.in_group {
                            oc += lk.o_count;
                            ot += lk.o_total;
                            break;
                        }
                        oc += lk.accum.count;
                        ot += lk.accum.total;
                    }
                    let li = shards[j].table.get_mut(c).expect("shards share a schema");
                    let gc = (li.accum.count - li.g_count) + oc;
                    if gc > li.accum.group_count {
                        li.accum.group_count = gc;
                    }
                    let gt = (li.accum.total - li.g_total) + ot;
                    if gt > li.accum.group_total {
                        li.accum.group_total = gt;
                    }
                }
            }
        }

        // Stitch the indices with cumulative byte and object offsets.
        let mut stitched_obj = Vec::new();
        let mut stitched_grp = Vec::new();
        let mut byte_off = 0i64;
        let mut obj_off = 0i64;
        for shard in &shards {
            for &v in &shard.object_index {
                stitched_obj.push(v + byte_off);
            }
            for &v in &shard.group_index {
                stitched_grp.push(v + obj_off);
            }
            byte_off += shard.out.pos as i64;
            obj_off += shard.object;
        }
        let total_objects: i64 = shards.iter().map(|s| s.object).sum();
        let total_groups: i64 = shards.iter().map(|s| s.group).sum();

        // Fold the accumulators into shard 0.
        let (master_slice, rest) = shards.split_at_mut(1);
        let master = &mut master_slice[0];
        let codes = master.table.data_codes();
        for shard in rest.iter() {
            for &c in &codes {
                let src = shard.table.get(c).expect("shards share a schema").accum;
                if src.count == 0 {
                    continue;
                }
                let dst = &mut master.table.get_mut(c).expect("shards share a schema").accum;
                dst.count += src.count;
                dst.total += src.total;
                if src.max > dst.max {
                    dst.max = src.max;
                }
                if src.group_count > dst.group_count {
                    dst.group_count = src.group_count;
                }
                if src.group_total > dst.group_total {
                    dst.group_total = src.group_total;
                }
            }
        }
        master.object = total_objects;
        master.group = total_groups;
        master.object_index = stitched_obj;
        master.group_index = stitched_grp;

        // Codecs committed by any shard must reach the footer, even if
        // shard 0 never wrote that line type again after the commit.
        for &c in &codes {
            if let Some(idx) = master.table.index_of(c) {
                master.adopt_shared_codecs(idx, c);
            }
        }

        // Concatenate the shard segments in shard order.
        let mut master = shards.remove(0);
        let mut block = vec![0u8; CONCAT_BLOCK];
        for mut shard in shards {
            shard.out.flush()?;
            let temp = shard
                .temp_path
                .take()
                .ok_or_else(|| OneError::state("parallel shard is missing its temporary file"))?;
            drop(shard);
            let mut f = File::open(&temp)?;
            loop {
                let nread = f.read(&mut block)?;
                if nread == 0 {
                    break;
                }
                master.out.write_all(&block[..nread])?;
            }
            std::fs::remove_file(&temp)?;
        }

        master.is_final = true;
        master.finish_tail()
    }
}

impl<W: Write> OneWriter<W> {
    /// Open a write session over any byte sink.
    pub fn from_writer(
        w: W,
        file_type: FileType,
        sub_type: Option<SubType>,
        is_binary: bool,
    ) -> Result<Self> {
        if let Some(sub) = sub_type {
            if sub.primary() != file_type {
                return Err(OneError::schema(format!(
                    "subtype {} is not secondary for file type {}",
                    sub.name(),
                    file_type.name()
                )));
            }
        }
        Ok(Self {
            out: CountingWriter::new(w),
            table: LineTable::new(file_type, true)?,
            file_type,
            sub_type,
            is_binary,
            line: 0,
            object: 0,
            group: 0,
            in_group: false,
            fields: [Field::default(); MAX_FIELDS],
            is_last_line_binary: true,
            is_header_out: false,
            is_final: false,
            codec_buf: Vec::new(),
            pack_vals: Vec::new(),
            pack_buf: Vec::new(),
            object_index: Vec::new(),
            group_index: Vec::new(),
            provenance: Vec::new(),
            references: Vec::new(),
            deferred: Vec::new(),
            codec_training_size: CODEC_TRAINING_SIZE,
            shard: None,
            temp_path: None,
            finished: false,
        })
    }

    // ------ header material ------

    /// Inherit an open reader's provenance, references, deferrals, and
    /// counts (the accumulated ones with `use_accum`, the header-declared
    /// ones otherwise).
    pub fn inherit_from<R: BufRead + Seek>(
        &mut self,
        source: &OneReader<R>,
        use_accum: bool,
    ) -> Result<()> {
        if source.file_type() != self.file_type {
            return Err(OneError::schema(format!(
                "cannot inherit from a {} session into a {} session",
                source.file_type().name(),
                self.file_type.name()
            )));
        }
        self.inherit_provenance(source)?;
        self.inherit_references(source)?;
        self.inherit_deferred(source)?;
        for c in self.table.data_codes() {
            let counts = if use_accum {
                source.accum(c)
            } else {
                source.given(c)
            };
            if let Some(counts) = counts {
                if let Some(li) = self.table.get_mut(c) {
                    li.given = counts;
                }
            }
        }
        Ok(())
    }

    /// Add a provenance record. With `date == None` the current local
    /// time is stamped. Fails once the header has been written.
    pub fn add_provenance(
        &mut self,
        program: &str,
        version: &str,
        command: &str,
        date: Option<&str>,
    ) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add provenance after writing the header"));
        }
        self.provenance.push(Provenance {
            program: program.to_owned(),
            version: version.to_owned(),
            command: command.to_owned(),
            date: date.map_or_else(|| Local::now().format("%F_%T").to_string(), str::to_owned),
        });
        Ok(())
    }

    /// Copy all provenance records from an open reader.
    pub fn inherit_provenance<R: BufRead + Seek>(&mut self, source: &OneReader<R>) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add provenance after writing the header"));
        }
        self.provenance.extend_from_slice(source.provenance());
        Ok(())
    }

    /// Add a `<` reference record. Fails once the header has been written.
    pub fn add_reference(&mut self, filename: &str, count: i64) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add a reference after writing the header"));
        }
        self.references.push(Reference {
            filename: filename.to_owned(),
            count,
        });
        Ok(())
    }

    /// Copy all reference records from an open reader.
    pub fn inherit_references<R: BufRead + Seek>(&mut self, source: &OneReader<R>) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add a reference after writing the header"));
        }
        self.references.extend_from_slice(source.references());
        Ok(())
    }

    /// Add a `>` deferred-reference record. Fails once the header has
    /// been written.
    pub fn add_deferred(&mut self, filename: &str) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add a deferral after writing the header"));
        }
        self.deferred.push(Reference {
            filename: filename.to_owned(),
            count: 0,
        });
        Ok(())
    }

    /// Copy all deferred-reference records from an open reader.
    pub fn inherit_deferred<R: BufRead + Seek>(&mut self, source: &OneReader<R>) -> Result<()> {
        if self.is_header_out {
            return Err(OneError::state("cannot add a deferral after writing the header"));
        }
        self.deferred.extend_from_slice(source.deferred());
        Ok(())
    }

    /// Write the ASCII header. In binary mode the header ends with the
    /// `$` line and all statistics are deferred to the footer; in ASCII
    /// mode the statistics come from the inherited (`given`) counts, so
    /// the session must have been opened with
    /// [`OneWriter::create_from`].
    pub fn write_header(&mut self) -> Result<()> {
        if self.line > 0 {
            return Err(OneError::state("cannot write the header after data lines"));
        }
        if !self.is_binary
            && self
                .table
                .get(self.table.object_type)
                .is_none_or(|li| li.given.count == 0)
        {
            return Err(OneError::state(
                "counts for an ASCII header are not present; open the writer with create_from",
            ));
        }

        let name = self.file_type.name();
        write!(self.out, "1 {} {} {} {}", name.len(), name, MAJOR_VERSION, MINOR_VERSION)?;
        if let Some(sub) = self.sub_type {
            write!(self.out, "\n2 {} {}", sub.name().len(), sub.name())?;
        }
        for r in &self.references {
            write!(self.out, "\n< {} {} {}", r.filename.len(), r.filename, r.count)?;
        }
        for d in &self.deferred {
            write!(self.out, "\n> {} {}", d.filename.len(), d.filename)?;
        }
        for p in &self.provenance {
            write!(
                self.out,
                "\n! {} {} {} {} {} {} {} {}",
                p.program.len(),
                p.program,
                p.version.len(),
                p.version,
                p.command.len(),
                p.command,
                p.date.len(),
                p.date
            )?;
        }

        if self.is_binary {
            write!(self.out, "\n$ {}", HOST_IS_BIG as i64)?;
        } else {
            let group = self.table.group_type;
            for c in self.table.stat_codes() {
                let given = self.table.get(c).map(|li| li.given).unwrap_or_default();
                if given.count == 0 {
                    continue;
                }
                write!(self.out, "\n# {} {}", c as char, given.count)?;
                if given.max > 0 {
                    write!(self.out, "\n@ {} {}", c as char, given.max)?;
                }
                if given.total > 0 {
                    write!(self.out, "\n+ {} {}", c as char, given.total)?;
                }
                if let Some(g) = group {
                    if given.group_count > 0 {
                        write!(self.out, "\n% {} # {} {}", g as char, c as char, given.group_count)?;
                    }
                    if given.group_total > 0 {
                        write!(self.out, "\n% {} + {} {}", g as char, c as char, given.group_total)?;
                    }
                }
            }
        }
        self.out.flush()?;
        self.is_last_line_binary = false;
        self.is_header_out = true;
        Ok(())
    }

    // ------ field setters ------

    /// Set field `i` of the next record to an integer.
    pub fn set_int(&mut self, i: usize, v: i64) {
        self.fields[i] = Field::from_int(v);
    }

    /// Set field `i` of the next record to a real.
    pub fn set_real(&mut self, i: usize, v: f64) {
        self.fields[i] = Field::from_real(v);
    }

    /// Set field `i` of the next record to a character.
    pub fn set_char(&mut self, i: usize, c: u8) {
        self.fields[i] = Field::from_char(c);
    }

    // ------ record writing ------

    /// Write one record of line type `t` with list payload `list`.
    ///
    /// Non-list fields must have been set beforehand; the list-length
    /// field is derived from `list`.
    pub fn write_line(&mut self, t: u8, list: List<'_>) -> Result<()> {
        if self.is_final && t.is_ascii_alphabetic() {
            return Err(OneError::state(format!(
                "cannot write more data after counts are finalized: {}",
                t as char
            )));
        }
        let idx = self.table.index_of(t).ok_or_else(|| {
            OneError::schema(format!(
                "line type {} not present in file spec {}",
                t as char,
                self.file_type.name()
            ))
        })?;

        // The list argument must match the line's signature.
        let list_field = self.table.info(idx).list_field;
        let list_type = list_field.map(|ix| self.table.info(idx).fields[ix]);
        let list_len: i64 = match (list_type, &list) {
            (None, List::None) => 0,
            (Some(FieldType::String), List::Bytes(b)) => b.len() as i64,
            (Some(FieldType::IntList), List::Ints(v)) => v.len() as i64,
            (Some(FieldType::RealList), List::Reals(v)) => v.len() as i64,
            (Some(FieldType::StringList), List::Strings(v)) => v.len() as i64,
            _ => {
                return Err(OneError::state(format!(
                    "list payload does not match the signature of line type {}",
                    t as char
                )));
            }
        };
        if list_len > LEN_MASK as i64 {
            return Err(OneError::state(format!("list length {list_len} exceeds 56 bits")));
        }

        // Terminate the previous ASCII line.
        if !self.is_last_line_binary {
            self.out.write_all(b"\n")?;
        }

        self.line += 1;
        self.table.info_mut(idx).accum.count += 1;
        if Some(t) == self.table.group_type {
            self.table.update_group_deltas(self.in_group);
            self.group += 1;
            self.in_group = true;
        }
        if t == self.table.object_type {
            if self.is_binary {
                self.object_index.push(self.out.pos as i64);
            }
            self.object += 1;
        }
        if self.is_binary && Some(t) == self.table.group_type {
            self.group_index.push(self.object);
        }

        if let Some(ix) = list_field {
            self.fields[ix] = Field::from_len(list_len);
            self.table.info_mut(idx).accum.add_list(list_len);
        }

        if self.is_binary {
            self.write_binary(idx, t, list)?;
            self.is_last_line_binary = true;
        } else {
            self.write_ascii(idx, list)?;
            self.is_last_line_binary = false;
        }
        Ok(())
    }

    /// Attach a comment to the record just written.
    pub fn write_comment(&mut self, text: &[u8]) -> Result<()> {
        if self.is_last_line_binary && self.is_binary {
            self.write_line(CODE_COMMENT, List::Bytes(text))
        } else {
            self.out.write_all(b" ")?;
            self.out.write_all(text)?;
            Ok(())
        }
    }

    fn write_ascii(&mut self, idx: usize, list: List<'_>) -> Result<()> {
        let code = self.table.info(idx).code;
        self.out.write_all(&[code])?;
        let nfield = self.table.info(idx).fields.len();
        for i in 0..nfield {
            match self.table.info(idx).fields[i] {
                FieldType::Int => write!(self.out, " {}", self.fields[i].int())?,
                FieldType::Real => write!(self.out, " {:.6}", self.fields[i].real())?,
                FieldType::Char => write!(self.out, " {}", self.fields[i].chr() as char)?,
                FieldType::String => {
                    let List::Bytes(b) = list else { unreachable!() };
                    write!(self.out, " {} ", b.len())?;
                    self.out.write_all(b)?;
                }
                FieldType::IntList => {
                    let List::Ints(v) = list else { unreachable!() };
                    write!(self.out, " {}", v.len())?;
                    for x in v {
                        write!(self.out, " {x}")?;
                    }
                }
                FieldType::RealList => {
                    let List::Reals(v) = list else { unreachable!() };
                    write!(self.out, " {}", v.len())?;
                    for x in v {
                        write!(self.out, " {x:.6}")?;
                    }
                }
                FieldType::StringList => {
                    let List::Strings(v) = list else { unreachable!() };
                    write!(self.out, " {}", v.len())?;
                    for s in v {
                        write!(self.out, " {} ", s.len())?;
                        self.out.write_all(s)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_binary(&mut self, idx: usize, t: u8, list: List<'_>) -> Result<()> {
        self.adopt_shared_codecs(idx, t);

        let li = self.table.info(idx);
        if li.binary_tag == 0 {
            return Err(OneError::state(format!(
                "line type {} has no binary form",
                t as char
            )));
        }
        let nfield = li.fields.len();
        let list_field = li.list_field;
        let is_diff = li.is_int_list_diff;

        // Pack an integer list first: the stripped-byte count has to land
        // in the length field before the fields are written.
        self.pack_buf.clear();
        match list {
            List::Ints(v) => {
                self.pack_vals.clear();
                self.pack_vals.extend_from_slice(v);
                let z = intpack::pack(&mut self.pack_vals, is_diff, &mut self.pack_buf);
                if let Some(ix) = list_field {
                    self.fields[ix].set_pack_zeros(z);
                }
            }
            List::Bytes(b) => self.pack_buf.extend_from_slice(b),
            List::Reals(v) => {
                for x in v {
                    self.pack_buf.extend_from_slice(&x.to_ne_bytes());
                }
            }
            List::None | List::Strings(_) => {}
        }

        let li = self.table.info(idx);
        let mut x = li.binary_tag;
        if li.use_list_codec {
            x |= 0x2;
        }

        let mut block = [0u8; MAX_FIELDS * 8];
        fields_to_bytes(&self.fields[..nfield], &mut block);
        let fbytes = &block[..nfield * 8];

        // Fields, compressed when a code is in use and the result is
        // small enough for a one-byte bit count.
        if li.use_field_codec {
            let codec = li
                .field_codec
                .as_ref()
                .ok_or_else(|| OneError::state("field codec flagged in use but missing"))?;
            let nbits = codec.codec().encode(fbytes, &mut self.codec_buf)?;
            if nbits < 256 {
                self.out.write_all(&[x | 0x1, nbits as u8])?;
                self.out.write_all(&self.codec_buf)?;
            } else {
                self.out.write_all(&[x])?;
                self.out.write_all(fbytes)?;
            }
        } else {
            self.out.write_all(&[x])?;
            self.out.write_all(fbytes)?;
            if nfield > 0 {
                let threshold = self.local_threshold();
                let mut ready = false;
                let li = self.table.info_mut(idx);
                if let Some(CodecSlot::Training(vc)) = &mut li.field_codec {
                    vc.add_samples(fbytes)?;
                    li.field_tack += fbytes.len() as i64;
                    ready = li.field_tack > threshold;
                }
                if ready {
                    self.commit_field_codec(idx, t)?;
                }
            }
        }

        // The list payload.
        let Some(ix) = list_field else {
            return Ok(());
        };
        let list_len = self.fields[ix].len();
        if list_len == 0 {
            return Ok(());
        }
        if let List::Strings(v) = list {
            for s in v {
                write!(self.out, " {} ", s.len())?;
                self.out.write_all(s)?;
            }
            return Ok(());
        }

        let li = self.table.info(idx);
        if li.use_list_codec {
            let nbits = match &li.list_codec {
                Some(ListCodec::Dna) => {
                    self.codec_buf.clear();
                    dna::encode(&self.pack_buf, &mut self.codec_buf)
                }
                Some(ListCodec::Huffman(slot)) => slot.codec().encode(&self.pack_buf, &mut self.codec_buf)?,
                None => {
                    return Err(OneError::state("list codec flagged in use but missing"));
                }
            };
            self.out.write_all(&(nbits as i64).to_ne_bytes())?;
            self.out.write_all(&self.codec_buf)?;
        } else {
            self.out.write_all(&self.pack_buf)?;
            let threshold = self.local_threshold();
            let mut ready = false;
            let li = self.table.info_mut(idx);
            if let Some(ListCodec::Huffman(CodecSlot::Training(vc))) = &mut li.list_codec {
                vc.add_samples(&self.pack_buf)?;
                li.list_tack += self.pack_buf.len() as i64;
                ready = li.list_tack > threshold;
            }
            if ready {
                self.commit_list_codec(idx, t)?;
            }
        }
        Ok(())
    }

    /// Pick up codecs committed by other shards since the last write.
    fn adopt_shared_codecs(&mut self, idx: usize, t: u8) {
        let Some(ctx) = &self.shard else {
            return;
        };
        let li = self.table.info_mut(idx);
        if !li.use_field_codec && matches!(li.field_codec, Some(CodecSlot::Training(_))) {
            if let Some(arc) = ctx.shared.field.committed(t) {
                li.field_codec = Some(CodecSlot::Committed(arc));
                li.use_field_codec = true;
                li.field_tack = 0;
            }
        }
        if !li.use_list_codec
            && matches!(li.list_codec, Some(ListCodec::Huffman(CodecSlot::Training(_))))
        {
            if let Some(arc) = ctx.shared.list.committed(t) {
                li.list_codec = Some(ListCodec::Huffman(CodecSlot::Committed(arc)));
                li.use_list_codec = true;
                li.list_tack = 0;
            }
        }
    }

    fn local_threshold(&self) -> i64 {
        self.shard
            .as_ref()
            .map_or(self.codec_training_size, |c| c.local_threshold)
    }

    fn commit_field_codec(&mut self, idx: usize, t: u8) -> Result<()> {
        match &self.shard {
            None => {
                let li = self.table.info_mut(idx);
                if let Some(CodecSlot::Training(vc)) = &mut li.field_codec {
                    let mut codec = std::mem::take(vc);
                    codec.build_code(true)?;
                    li.field_codec = Some(CodecSlot::Committed(Arc::new(codec)));
                    li.use_field_codec = true;
                    li.field_tack = 0;
                }
            }
            Some(ctx) => {
                let li = self.table.info_mut(idx);
                if let Some(CodecSlot::Training(vc)) = &mut li.field_codec {
                    let tack = li.field_tack;
                    li.field_tack = 0;
                    if let Some(arc) =
                        ctx.shared.field.contribute(t, vc, tack, ctx.shared.training_size)?
                    {
                        li.field_codec = Some(CodecSlot::Committed(arc));
                        li.use_field_codec = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn commit_list_codec(&mut self, idx: usize, t: u8) -> Result<()> {
        match &self.shard {
            None => {
                let li = self.table.info_mut(idx);
                if let Some(ListCodec::Huffman(CodecSlot::Training(vc))) = &mut li.list_codec {
                    let mut codec = std::mem::take(vc);
                    codec.build_code(true)?;
                    li.list_codec = Some(ListCodec::Huffman(CodecSlot::Committed(Arc::new(codec))));
                    li.use_list_codec = true;
                    li.list_tack = 0;
                }
            }
            Some(ctx) => {
                let li = self.table.info_mut(idx);
                if let Some(ListCodec::Huffman(CodecSlot::Training(vc))) = &mut li.list_codec {
                    let tack = li.list_tack;
                    li.list_tack = 0;
                    if let Some(arc) =
                        ctx.shared.list.contribute(t, vc, tack, ctx.shared.training_size)?
                    {
                        li.list_codec = Some(ListCodec::Huffman(CodecSlot::Committed(arc)));
                        li.use_list_codec = true;
                    }
                }
            }
        }
        Ok(())
    }

    // ------ close ------

    /// Close the trailing group and freeze the accumulated counts.
    pub fn finalize_counts(&mut self) -> Result<()> {
        if self.shard.is_some() {
            return Err(OneError::state(
                "parallel shards are finalized by finish_parallel",
            ));
        }
        self.table.update_group_deltas(self.in_group);
        self.is_final = true;
        Ok(())
    }

    /// Finish a single-threaded session: write the end-of-data marker
    /// and, in binary mode, the footer.
    pub fn finish(&mut self) -> Result<()> {
        if self.shard.is_some() {
            return Err(OneError::state("parallel sessions are closed by finish_parallel"));
        }
        if self.finished {
            return Err(OneError::state("session is already finished"));
        }
        if !self.is_final {
            self.table.update_group_deltas(self.in_group);
            self.is_final = true;
        }
        self.finish_tail()
    }

    fn finish_tail(&mut self) -> Result<()> {
        self.finished = true;
        self.out.write_all(b"\n")?;
        if self.is_binary {
            self.write_footer()?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Consume the session and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.out.inner
    }

    fn write_footer(&mut self) -> Result<()> {
        let foot_off = self.out.pos;
        let group = self.table.group_type;

        for c in self.table.stat_codes() {
            let idx = self.table.index_of(c).expect("stat codes are in the table");
            let (accum, has_list, use_field, use_list, is_dna) = {
                let li = self.table.info(idx);
                (
                    li.accum,
                    li.list_field.is_some(),
                    li.use_field_codec,
                    li.use_list_codec,
                    matches!(li.list_codec, Some(ListCodec::Dna)),
                )
            };
            if accum.count == 0 {
                continue;
            }
            writeln!(self.out, "# {} {}", c as char, accum.count)?;
            if has_list {
                writeln!(self.out, "@ {} {}", c as char, accum.max)?;
                writeln!(self.out, "+ {} {}", c as char, accum.total)?;
            }
            if let Some(g) = group {
                if c != g && self.group > 0 {
                    writeln!(self.out, "% {} # {} {}", g as char, c as char, accum.group_count)?;
                    if has_list {
                        writeln!(self.out, "% {} + {} {}", g as char, c as char, accum.group_total)?;
                    }
                }
            }
            if use_field {
                let blob = {
                    let li = self.table.info(idx);
                    let slot = li
                        .field_codec
                        .as_ref()
                        .ok_or_else(|| OneError::state("field codec flagged in use but missing"))?;
                    let mut b = Vec::new();
                    slot.codec().serialize(&mut b)?;
                    b
                };
                self.fields[0] = Field::from_char(c);
                self.write_line(CODE_FIELD_CODEC, List::Bytes(&blob))?;
            }
            if use_list && !is_dna {
                let blob = {
                    let li = self.table.info(idx);
                    let Some(ListCodec::Huffman(slot)) = &li.list_codec else {
                        return Err(OneError::state("list codec flagged in use but missing"));
                    };
                    let mut b = Vec::new();
                    slot.codec().serialize(&mut b)?;
                    b
                };
                self.fields[0] = Field::from_char(c);
                self.write_line(CODE_LIST_CODEC, List::Bytes(&blob))?;
            }
        }

        let obj = std::mem::take(&mut self.object_index);
        self.write_line(CODE_OBJECT_INDEX, List::Ints(&obj))?;
        self.object_index = obj;

        if group.is_some() && self.group > 0 {
            self.group_index.push(self.object);
            let grp = std::mem::take(&mut self.group_index);
            self.write_line(CODE_GROUP_INDEX, List::Ints(&grp))?;
            self.group_index = grp;
        }

        self.out.write_all(b"^\n")?;
        self.out.write_all(&(foot_off as i64).to_ne_bytes())?;
        Ok(())
    }

    // ------ accessors ------

    /// The session's primary file type.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// True when the session writes binary records.
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Records written so far.
    pub fn line(&self) -> i64 {
        self.line
    }

    /// Objects written so far.
    pub fn object(&self) -> i64 {
        self.object
    }

    /// Groups begun so far.
    pub fn group(&self) -> i64 {
        self.group
    }

    /// Counts accumulated for a line type.
    pub fn accum(&self, t: u8) -> Option<Counts> {
        self.table.get(t).map(|li| li.accum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::OneReader;
    use std::io::Cursor;

    fn ascii_writer() -> OneWriter<Vec<u8>> {
        OneWriter::from_writer(Vec::new(), FileType::Seq, None, false).unwrap()
    }

    #[test]
    fn test_ascii_lines_newline_separated() {
        let mut w = ascii_writer();
        w.write_line(b'S', List::Bytes(b"acgt")).unwrap();
        w.write_line(b'Q', List::Bytes(b"!!!!")).unwrap();
        w.finish().unwrap();
        // Each line gets its newline *before* the next line; finish adds
        // the final one.
        assert_eq!(w.into_inner(), b"S 4 acgt\nQ 4 !!!!\n");
    }

    #[test]
    fn test_ascii_real_and_int_fields() {
        let mut w = ascii_writer();
        w.set_int(0, 3);
        w.set_int(1, 10);
        w.set_int(2, 90);
        w.set_real(3, 0.75);
        w.write_line(b'W', List::None).unwrap();
        assert_eq!(w.into_inner(), b"W 3 10 90 0.750000");
    }

    #[test]
    fn test_list_signature_mismatch() {
        let mut w = ascii_writer();
        assert!(w.write_line(b'S', List::Ints(&[1, 2])).is_err());
        assert!(w.write_line(b'S', List::None).is_err());
        assert!(w.write_line(b'P', List::Bytes(b"x")).is_err());
    }

    #[test]
    fn test_write_after_finalize_fails() {
        let mut w = ascii_writer();
        w.write_line(b'S', List::Bytes(b"a")).unwrap();
        w.finalize_counts().unwrap();
        assert!(w.write_line(b'S', List::Bytes(b"c")).is_err());
    }

    #[test]
    fn test_header_requires_counts_in_ascii() {
        let mut w = ascii_writer();
        assert!(w.write_header().is_err());
    }

    #[test]
    fn test_header_after_data_fails() {
        let mut w = OneWriter::from_writer(Vec::new(), FileType::Seq, None, true).unwrap();
        w.write_line(b'S', List::Bytes(b"acgt")).unwrap();
        assert!(w.write_header().is_err());
    }

    #[test]
    fn test_provenance_locked_after_header() {
        let mut w = OneWriter::from_writer(Vec::new(), FileType::Seq, None, true).unwrap();
        w.add_provenance("onetool", "0.1.0", "onetool sim", Some("2020-05-06_23:29:00"))
            .unwrap();
        w.write_header().unwrap();
        assert!(w.add_provenance("x", "y", "z", None).is_err());
        assert!(w.add_reference("f.seq", 1).is_err());
    }

    #[test]
    fn test_binary_stream_roundtrips_in_memory() {
        let mut w = OneWriter::from_writer(Vec::new(), FileType::Seq, None, true).unwrap();
        w.write_header().unwrap();
        w.set_int(0, 2);
        w.write_line(b'g', List::Bytes(b"lane1")).unwrap();
        w.write_line(b'S', List::Bytes(b"acgtacgt")).unwrap();
        w.write_line(b'Q', List::Bytes(b"!!!!!!!!")).unwrap();
        w.write_line(b'S', List::Bytes(b"ttgg")).unwrap();
        w.finish().unwrap();

        let mut r = OneReader::from_reader(Cursor::new(w.into_inner()), None).unwrap();
        assert!(r.is_binary());
        assert_eq!(r.read_line().unwrap(), Some(b'g'));
        assert_eq!(r.int(0), 2);
        assert_eq!(r.string(), b"lane1");
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.string(), b"acgtacgt");
        assert_eq!(r.read_line().unwrap(), Some(b'Q'));
        assert_eq!(r.string(), b"!!!!!!!!");
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.string(), b"ttgg");
        assert_eq!(r.read_line().unwrap(), None);
    }
}
