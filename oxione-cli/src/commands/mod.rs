//! Subcommand implementations and shared plumbing.

mod info;
mod sim;
mod validate;
mod view;

pub use info::cmd_info;
pub use sim::cmd_sim;
pub use validate::cmd_validate;
pub use view::cmd_view;

use oxione_core::error::{OneError, Result};
use oxione_file::{FieldType, FileType, List, OneReader, OneWriter};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Seek, Write};
use std::path::Path;

/// Resolve a `-t` argument to a file type.
pub(crate) fn parse_file_type(name: Option<&str>) -> Result<Option<FileType>> {
    match name {
        None => Ok(None),
        Some(n) => FileType::from_name(n)
            .map(Some)
            .ok_or_else(|| OneError::schema(format!("unknown file type {n} requested"))),
    }
}

/// Open `-o` output: a file when a path is given, stdout otherwise.
pub(crate) fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(File::create(p)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

/// Copy the current record of `src` into `dst`, comment included.
pub(crate) fn copy_record<R: BufRead + Seek, W: Write>(
    src: &OneReader<R>,
    dst: &mut OneWriter<W>,
    t: u8,
) -> Result<()> {
    let fields = src
        .field_types(t)
        .ok_or_else(|| OneError::schema(format!("unknown line type {}", t as char)))?;
    for (i, ft) in fields.iter().enumerate() {
        match ft {
            FieldType::Int => dst.set_int(i, src.int(i)),
            FieldType::Real => dst.set_real(i, src.real(i)),
            FieldType::Char => dst.set_char(i, src.chr(i)),
            _ => {}
        }
    }
    match fields.iter().find(|f| f.is_list()) {
        None => dst.write_line(t, List::None)?,
        Some(FieldType::String) => dst.write_line(t, List::Bytes(src.string()))?,
        Some(FieldType::IntList) => dst.write_line(t, List::Ints(src.int_list()))?,
        Some(FieldType::RealList) => dst.write_line(t, List::Reals(src.real_list()))?,
        Some(FieldType::StringList) => {
            let parts = src.string_list();
            dst.write_line(t, List::Strings(&parts))?;
        }
        Some(_) => unreachable!("non-list field types are filtered out"),
    }
    if let Some(c) = src.comment() {
        dst.write_comment(c)?;
    }
    Ok(())
}

/// Parse an object selection `x[-y](,x[-y])*` into half-open ranges.
pub(crate) fn parse_object_ranges(s: &str) -> Result<Vec<(i64, i64)>> {
    let mut ranges = Vec::new();
    for part in s.split(',') {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => {
                let a: i64 = a
                    .parse()
                    .map_err(|_| OneError::schema(format!("bad object index {a}")))?;
                let b: i64 = b
                    .parse()
                    .map_err(|_| OneError::schema(format!("bad object index {b}")))?;
                (a, b)
            }
            None => {
                let a: i64 = part
                    .parse()
                    .map_err(|_| OneError::schema(format!("bad object index {part}")))?;
                (a, a + 1)
            }
        };
        if end <= start {
            return Err(OneError::schema(format!(
                "end index {end} <= start index {start}"
            )));
        }
        ranges.push((start, end));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_ranges() {
        assert_eq!(parse_object_ranges("5").unwrap(), vec![(5, 6)]);
        assert_eq!(parse_object_ranges("0-10").unwrap(), vec![(0, 10)]);
        assert_eq!(
            parse_object_ranges("1,3-5,9").unwrap(),
            vec![(1, 2), (3, 5), (9, 10)]
        );
        assert!(parse_object_ranges("5-5").unwrap_err().to_string().contains("<="));
        assert!(parse_object_ranges("x").is_err());
    }

    #[test]
    fn test_parse_file_type() {
        assert_eq!(parse_file_type(Some("seq")).unwrap(), Some(FileType::Seq));
        assert_eq!(parse_file_type(None).unwrap(), None);
        assert!(parse_file_type(Some("nope")).is_err());
    }
}
