//! `one info` - summarize a file's type, encoding, and statistics.

use super::parse_file_type;
use oxione_core::error::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct LineStats {
    code: String,
    count: i64,
    max: i64,
    total: i64,
    group_count: i64,
    group_total: i64,
}

#[derive(Serialize)]
struct FileInfo {
    path: String,
    file_type: String,
    sub_type: Option<String>,
    binary: bool,
    indexed: bool,
    objects: i64,
    line_types: Vec<LineStats>,
    provenance: Vec<ProvenanceInfo>,
}

#[derive(Serialize)]
struct ProvenanceInfo {
    program: String,
    version: String,
    command: String,
    date: String,
}

pub fn cmd_info(file: &Path, file_type: Option<&str>, json: bool) -> Result<()> {
    let file_type = parse_file_type(file_type)?;
    let mut reader = oxione_file::OneReader::open(file, file_type)?;

    // Binary files carry full statistics in the footer; an ASCII file
    // without counts has to be scanned.
    let declared = reader
        .given(reader.object_type())
        .is_some_and(|c| c.count > 0);
    if !declared {
        while reader.read_line()?.is_some() {}
        reader.finalize_counts();
    }

    let stats = |c: u8| {
        if declared {
            reader.given(c).unwrap_or_default()
        } else {
            reader.accum(c).unwrap_or_default()
        }
    };

    let line_types: Vec<LineStats> = reader
        .stat_codes()
        .into_iter()
        .map(|c| {
            let s = stats(c);
            LineStats {
                code: (c as char).to_string(),
                count: s.count,
                max: s.max,
                total: s.total,
                group_count: s.group_count,
                group_total: s.group_total,
            }
        })
        .filter(|s| s.count > 0)
        .collect();

    let info = FileInfo {
        path: file.display().to_string(),
        file_type: reader.file_type().name().to_string(),
        sub_type: reader.sub_type().map(|s| s.name().to_string()),
        binary: reader.is_binary(),
        indexed: reader.has_index(),
        objects: stats(reader.object_type()).count,
        line_types,
        provenance: reader
            .provenance()
            .iter()
            .map(|p| ProvenanceInfo {
                program: p.program.clone(),
                version: p.version.clone(),
                command: p.command.clone(),
                date: p.date.clone(),
            })
            .collect(),
    };

    if json {
        let text = serde_json::to_string_pretty(&info)
            .map_err(|e| oxione_core::OneError::state(format!("json encoding failed: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("File:    {}", info.path);
    println!("Type:    {}", info.file_type);
    if let Some(sub) = &info.sub_type {
        println!("Subtype: {sub}");
    }
    println!(
        "Format:  {}{}",
        if info.binary { "binary" } else { "ascii" },
        if info.indexed { " (indexed)" } else { "" }
    );
    println!("Objects: {}", info.objects);
    println!();
    println!(
        "{:>4} {:>12} {:>12} {:>14} {:>12} {:>14}",
        "type", "count", "max", "total", "group max", "group total"
    );
    for s in &info.line_types {
        println!(
            "{:>4} {:>12} {:>12} {:>14} {:>12} {:>14}",
            s.code, s.count, s.max, s.total, s.group_count, s.group_total
        );
    }
    if !info.provenance.is_empty() {
        println!();
        for p in &info.provenance {
            println!("! {} {} ({}): {}", p.program, p.version, p.date, p.command);
        }
    }
    Ok(())
}
