//! `one view` - re-emit a file in ASCII or binary, whole or restricted to
//! an object selection, or report per-line-type byte usage.

use super::{copy_record, open_output, parse_file_type, parse_object_ranges};
use oxione_core::error::{OneError, Result};
use oxione_file::{OneReader, OneWriter};
use std::path::{Path, PathBuf};

#[allow(clippy::too_many_arguments)]
pub fn cmd_view(
    file: &Path,
    file_type: Option<&str>,
    mut header: bool,
    header_only: bool,
    mut binary: bool,
    output: Option<PathBuf>,
    index: Option<&str>,
    usage: bool,
) -> Result<()> {
    let file_type = parse_file_type(file_type)?;
    let ranges = index.map(parse_object_ranges).transpose()?;

    let mut reader = OneReader::open(file, file_type)?;

    if usage {
        return report_usage(&mut reader);
    }

    // Binary output cannot defer its header, and a header-only request is
    // necessarily ASCII.
    if binary {
        header = true;
    }
    if header_only {
        binary = false;
    }

    let out = open_output(output.as_deref())?;
    let mut writer = OneWriter::from_writer(out, reader.file_type(), reader.sub_type(), binary)?;
    writer.inherit_from(&reader, false)?;

    if header || header_only {
        writer.write_header()?;
    }
    if header_only {
        return writer.finish();
    }

    match ranges {
        Some(ranges) => {
            if !reader.has_index() {
                return Err(OneError::state(
                    "object selection needs a binary file with its index",
                ));
            }
            for (start, end) in ranges {
                if !reader.goto_object(start)? {
                    return Err(OneError::state(format!("bad seek to object {start}")));
                }
                while let Some(t) = reader.read_line()? {
                    if reader.object() > end {
                        break;
                    }
                    copy_record(&reader, &mut writer, t)?;
                }
            }
        }
        None => {
            while let Some(t) = reader.read_line()? {
                copy_record(&reader, &mut writer, t)?;
            }
        }
    }
    writer.finish()
}

/// Tally the bytes each line type occupies and print the breakdown.
fn report_usage(reader: &mut OneReader<std::io::BufReader<std::fs::File>>) -> Result<()> {
    let mut usage: Vec<(u8, u64, u64)> = Vec::new();
    let mut last = reader.position()?;
    while let Some(t) = reader.read_line()? {
        let here = reader.position()?;
        match usage.iter_mut().find(|(c, _, _)| *c == t) {
            Some(entry) => {
                entry.1 += 1;
                entry.2 += here - last;
            }
            None => usage.push((t, 1, here - last)),
        }
        last = here;
    }
    usage.sort_by_key(|&(c, _, _)| c);

    let total: u64 = usage.iter().map(|(_, _, b)| b).sum();
    println!("{:>4} {:>12} {:>14} {:>7}", "type", "lines", "bytes", "%");
    for (c, lines, bytes) in &usage {
        println!(
            "{:>4} {:>12} {:>14} {:>6.1}%",
            *c as char,
            lines,
            bytes,
            if total > 0 { 100.0 * *bytes as f64 / total as f64 } else { 0.0 }
        );
    }
    Ok(())
}
