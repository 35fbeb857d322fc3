//! `one validate` - parse a file, check group sizes, and compare the
//! header's declared statistics with what the records actually contain.

use super::{copy_record, open_output, parse_file_type};
use indicatif::ProgressBar;
use oxione_core::error::Result;
use oxione_file::{OneReader, OneWriter};
use std::path::{Path, PathBuf};

pub fn cmd_validate(
    file: &Path,
    file_type: Option<&str>,
    header: bool,
    rewrite: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let file_type = parse_file_type(file_type)?;
    let mut reader = OneReader::open(file, file_type)?;

    if reader.has_header() {
        eprintln!("read {} header lines", reader.line());
    } else {
        eprintln!("header missing");
    }

    // Scan every record, checking each group's asserted size against the
    // number of objects that actually follow it.
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("scanning records");
    let group_type = reader.group_type();
    let mut last_line = 0i64;
    let mut last_size = 0i64;
    let mut last_obj = 0i64;
    let mut group_mismatches = 0u64;
    while let Some(t) = reader.read_line()? {
        if Some(t) == group_type {
            if last_line > 0 && reader.object() - last_obj != last_size {
                eprintln!(
                    "group size mismatch: group {} at line {} asserted {} objects but found {}",
                    t as char,
                    last_line,
                    last_size,
                    reader.object() - last_obj
                );
                group_mismatches += 1;
            }
            last_line = reader.line();
            last_size = reader.int(0);
            last_obj = reader.object();
        }
        if reader.line() % 100_000 == 0 {
            spinner.set_message(format!("{} objects", reader.object()));
            spinner.tick();
        }
    }
    if last_line > 0 && reader.object() - last_obj != last_size {
        eprintln!(
            "group size mismatch: group at line {} asserted {} objects but found {}",
            last_line,
            last_size,
            reader.object() - last_obj
        );
        group_mismatches += 1;
    }
    spinner.finish_and_clear();

    eprintln!(
        "read {} objects in {} lines from ONE file {} type {}",
        reader.object(),
        reader.line(),
        file.display(),
        reader.file_type().name()
    );
    reader.finalize_counts();

    // Header statistics versus accumulated statistics.
    let mut n_total = 0u64;
    let mut n_bad = 0u64;
    let mut n_missing = 0u64;
    for c in reader.stat_codes() {
        let given = reader.given(c).unwrap_or_default();
        let accum = reader.accum(c).unwrap_or_default();
        let pairs = [
            ("count", given.count, accum.count),
            ("max", given.max, accum.max),
            ("total", given.total, accum.total),
            ("group count", given.group_count, accum.group_count),
            ("group total", given.group_total, accum.group_total),
        ];
        for (what, g, a) in pairs {
            if g > 0 && g != a {
                eprintln!("header mismatch {what} {}: header {g} data {a}", c as char);
                n_bad += 1;
            } else if a > 0 && g == 0 {
                eprintln!("header {what} line missing for {}, value is {a}", c as char);
                n_missing += 1;
            }
            if a > 0 {
                n_total += 1;
            }
        }
    }
    eprintln!(
        "total {n_total} header content lines expected, of which {n_bad} bad and {n_missing} missing"
    );

    if header || rewrite {
        let out = open_output(output.as_deref())?;
        let mut writer = OneWriter::from_writer(out, reader.file_type(), reader.sub_type(), false)?;
        writer.inherit_from(&reader, true)?;
        writer.write_header()?;

        if rewrite {
            // Stream the records again through the fresh header.
            let mut reader = OneReader::open(file, file_type)?;
            while let Some(t) = reader.read_line()? {
                copy_record(&reader, &mut writer, t)?;
            }
        }
        writer.finish()?;
    }

    if group_mismatches > 0 || n_bad > 0 {
        eprintln!("validation found problems");
    }
    Ok(())
}
