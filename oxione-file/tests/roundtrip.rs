//! End-to-end round trips through real files: ASCII and binary record
//! streams, codec training, random access, and parallel sharded writes.

use oxione_file::{FileType, List, ListStore, OneReader, OneWriter};
use std::path::Path;
use tempfile::TempDir;

fn write_seq(path: &Path, binary: bool, records: &[(u8, Vec<u8>)]) {
    let mut w = OneWriter::create(path, FileType::Seq, None, binary).unwrap();
    w.add_provenance("onetest", "0.1.0", "onetest roundtrip", Some("2020-05-06_23:29:00"))
        .unwrap();
    if binary {
        w.write_header().unwrap();
    }
    for (t, payload) in records {
        if *t == b'g' {
            w.set_int(0, 0);
        }
        w.write_line(*t, List::Bytes(payload)).unwrap();
    }
    w.finish().unwrap();
}

fn read_all(path: &Path) -> (Vec<(u8, Vec<u8>)>, OneReader<std::io::BufReader<std::fs::File>>) {
    let mut r = OneReader::open(path, Some(FileType::Seq)).unwrap();
    let mut records = Vec::new();
    while let Some(t) = r.read_line().unwrap() {
        records.push((t, r.string().to_vec()));
    }
    r.finalize_counts();
    (records, r)
}

#[test]
fn test_sequence_roundtrip_ascii() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s1.seq");
    write_seq(
        &path,
        false,
        &[(b'S', b"acgtn".to_vec()), (b'Q', b"!!!!!".to_vec())],
    );

    let (records, r) = read_all(&path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], (b'S', b"acgtn".to_vec()));
    assert_eq!(records[1], (b'Q', b"!!!!!".to_vec()));

    let s = r.accum(b'S').unwrap();
    assert_eq!((s.count, s.max, s.total), (1, 5, 5));
    let q = r.accum(b'Q').unwrap();
    assert_eq!((q.count, q.max, q.total), (1, 5, 5));
}

#[test]
fn test_sequence_roundtrip_binary() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s1.1seq");
    write_seq(
        &path,
        true,
        &[(b'S', b"acgtn".to_vec()), (b'Q', b"!!!!!".to_vec())],
    );

    let (records, r) = read_all(&path);
    // The DNA codec maps the n to an a on the way through.
    assert_eq!(records[0], (b'S', b"acgta".to_vec()));
    assert_eq!(records[1], (b'Q', b"!!!!!".to_vec()));
    assert!(r.is_binary());
    assert!(r.has_index());

    let s = r.given(b'S').unwrap();
    assert_eq!((s.count, s.max, s.total), (1, 5, 5));
}

#[test]
fn test_group_stats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s2.seq");
    write_seq(
        &path,
        false,
        &[
            (b'g', b"first".to_vec()),
            (b'S', b"aaa".to_vec()),
            (b'S', b"ccc".to_vec()),
            (b'g', b"second".to_vec()),
            (b'S', b"gggg".to_vec()),
        ],
    );

    let (_, r) = read_all(&path);
    let s = r.accum(b'S').unwrap();
    assert_eq!(s.count, 3);
    assert_eq!(s.total, 10);
    assert_eq!(s.group_count, 2);
    assert_eq!(s.group_total, 6);
}

#[test]
fn test_binary_group_counts_from_index() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grp.1seq");
    write_seq(
        &path,
        true,
        &[
            (b'g', b"first".to_vec()),
            (b'S', b"aaa".to_vec()),
            (b'S', b"ccc".to_vec()),
            (b'g', b"second".to_vec()),
            (b'S', b"gggg".to_vec()),
        ],
    );

    let mut r = OneReader::open(&path, None).unwrap();
    assert_eq!(r.read_line().unwrap(), Some(b'g'));
    // The count field of a binary group record comes from the index.
    assert_eq!(r.int(0), 2);
    assert_eq!(r.string(), b"first");
    for _ in 0..2 {
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
    }
    assert_eq!(r.read_line().unwrap(), Some(b'g'));
    assert_eq!(r.int(0), 1);
}

#[test]
fn test_header_and_provenance_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prov.1seq");
    let mut w = OneWriter::create(&path, FileType::Seq, None, true).unwrap();
    w.add_provenance("onetest", "0.1.0", "onetest prov", Some("2020-05-06_23:29:00"))
        .unwrap();
    w.add_reference("input.seq", 42).unwrap();
    w.add_deferred("later.aln").unwrap();
    w.write_header().unwrap();
    w.write_line(b'S', List::Bytes(b"acgt")).unwrap();
    w.finish().unwrap();

    let r = OneReader::open(&path, None).unwrap();
    assert_eq!(r.provenance().len(), 1);
    assert_eq!(r.provenance()[0].program, "onetest");
    assert_eq!(r.provenance()[0].date, "2020-05-06_23:29:00");
    assert_eq!(r.references().len(), 1);
    assert_eq!(r.references()[0].filename, "input.seq");
    assert_eq!(r.references()[0].count, 42);
    assert_eq!(r.deferred().len(), 1);
    assert_eq!(r.deferred()[0].filename, "later.aln");
}

#[test]
fn test_comments_roundtrip() {
    let dir = TempDir::new().unwrap();
    for binary in [false, true] {
        let path = dir.path().join(format!("com-{binary}.seq"));
        let mut w = OneWriter::create(&path, FileType::Seq, None, binary).unwrap();
        if binary {
            w.write_header().unwrap();
        }
        w.write_line(b'S', List::Bytes(b"acgt")).unwrap();
        w.write_comment(b"from lane 3").unwrap();
        w.write_line(b'S', List::Bytes(b"ttaa")).unwrap();
        w.finish().unwrap();

        let mut r = OneReader::open(&path, Some(FileType::Seq)).unwrap();
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.string(), b"acgt");
        assert_eq!(r.comment(), Some(&b"from lane 3"[..]), "binary={binary}");
        assert_eq!(r.read_line().unwrap(), Some(b'S'));
        assert_eq!(r.string(), b"ttaa");
        assert_eq!(r.comment(), None);
    }
}

#[test]
fn test_int_and_real_lists_roundtrip() {
    let dir = TempDir::new().unwrap();
    for binary in [false, true] {
        let path = dir.path().join(format!("rmp-{binary}.rmp"));
        let mut w = OneWriter::create(&path, FileType::Rmp, None, binary).unwrap();
        if binary {
            w.write_header().unwrap();
        }
        w.set_int(0, 48_000);
        w.write_line(b'R', List::Ints(&[100, 200, 300, 1_000_000]))
            .unwrap();
        w.write_line(b'I', List::Reals(&[0.5, 1.25, -3.0, 2.0]))
            .unwrap();
        w.write_line(b'E', List::Ints(&[1, 2, 2, 1])).unwrap();
        w.finish().unwrap();

        let mut r = OneReader::open(&path, Some(FileType::Rmp)).unwrap();
        assert_eq!(r.read_line().unwrap(), Some(b'R'));
        assert_eq!(r.int(0), 48_000);
        assert_eq!(r.int_list(), &[100, 200, 300, 1_000_000]);
        assert_eq!(r.read_line().unwrap(), Some(b'I'));
        assert_eq!(r.real_list(), &[0.5, 1.25, -3.0, 2.0]);
        assert_eq!(r.read_line().unwrap(), Some(b'E'));
        assert_eq!(r.int_list(), &[1, 2, 2, 1]);
    }
}

#[test]
fn test_codec_training_kicks_in() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("train.1seq");

    // Enough quality bytes to cross the training threshold, so later
    // records are Huffman-compressed in the file.
    let quals: Vec<Vec<u8>> = (0..2500)
        .map(|i| {
            (0..60)
                .map(|j| b'!' + (((i * 7 + j * 3) % 40) as u8))
                .collect()
        })
        .collect();

    let mut w = OneWriter::create(&path, FileType::Seq, None, true).unwrap();
    w.write_header().unwrap();
    for q in &quals {
        w.write_line(b'S', List::Bytes(b"acgtacgtacgt")).unwrap();
        w.write_line(b'Q', List::Bytes(q)).unwrap();
    }
    w.finish().unwrap();

    let mut r = OneReader::open(&path, None).unwrap();
    let mut i = 0;
    while let Some(t) = r.read_line().unwrap() {
        if t == b'Q' {
            assert_eq!(r.string(), &quals[i][..], "record {i}");
            i += 1;
        }
    }
    assert_eq!(i, quals.len());
}

#[test]
fn test_ascii_to_binary_conversion() {
    let dir = TempDir::new().unwrap();
    let ascii = dir.path().join("conv.seq");
    let binary = dir.path().join("conv.1seq");
    let records = vec![
        (b'g', b"lane".to_vec()),
        (b'S', b"acgtacgt".to_vec()),
        (b'Q', b"!#%'')((".to_vec()),
        (b'S', b"ggttaacc".to_vec()),
    ];
    write_seq(&ascii, false, &records);

    // Convert by streaming records from the ASCII session into a binary
    // writer opened from it.
    {
        let mut src = OneReader::open(&ascii, Some(FileType::Seq)).unwrap();
        let mut dst = OneWriter::create_from(&binary, &src, false, true).unwrap();
        dst.write_header().unwrap();
        while let Some(t) = src.read_line().unwrap() {
            if t == b'g' {
                dst.set_int(0, src.int(0));
            }
            dst.write_line(t, List::Bytes(src.string())).unwrap();
        }
        dst.finish().unwrap();
    }

    let (got, r) = read_all(&binary);
    assert_eq!(got.len(), records.len());
    assert_eq!(got[1].1, records[1].1);
    assert_eq!(got[2].1, records[2].1);
    assert_eq!(got[3].1, records[3].1);
    let s = r.accum(b'S').unwrap();
    assert_eq!((s.count, s.max, s.total), (2, 8, 16));
}

#[test]
fn test_random_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ra.1seq");
    let seqs: Vec<Vec<u8>> = (0..10)
        .map(|i| b"acgt".iter().copied().cycle().take(4 + i).collect())
        .collect();
    let records: Vec<(u8, Vec<u8>)> = seqs.iter().map(|s| (b'S', s.clone())).collect();
    write_seq(&path, true, &records);

    let mut r = OneReader::open(&path, None).unwrap();
    assert!(r.goto_object(7).unwrap());
    assert_eq!(r.read_line().unwrap(), Some(b'S'));
    assert_eq!(r.string(), &seqs[7][..]);

    assert!(r.goto_object(0).unwrap());
    assert_eq!(r.read_line().unwrap(), Some(b'S'));
    assert_eq!(r.string(), &seqs[0][..]);

    assert!(!r.goto_object(10).unwrap());
    assert!(!r.goto_object(-1).unwrap());
}

#[test]
fn test_goto_group() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gg.1seq");
    write_seq(
        &path,
        true,
        &[
            (b'g', b"one".to_vec()),
            (b'S', b"aaaa".to_vec()),
            (b'S', b"cccc".to_vec()),
            (b'g', b"two".to_vec()),
            (b'S', b"gggg".to_vec()),
            (b'S', b"tttt".to_vec()),
            (b'S', b"acac".to_vec()),
        ],
    );

    let mut r = OneReader::open(&path, None).unwrap();
    assert_eq!(r.goto_group(1).unwrap(), 3);
    assert_eq!(r.read_line().unwrap(), Some(b'S'));
    assert_eq!(r.string(), b"gggg");

    assert_eq!(r.goto_group(0).unwrap(), 2);
    assert_eq!(r.read_line().unwrap(), Some(b'S'));
    assert_eq!(r.string(), b"aaaa");

    assert_eq!(r.goto_group(2).unwrap(), 0);
}

#[test]
fn test_retained_user_buffer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("buf.seq");
    write_seq(
        &path,
        false,
        &[(b'S', b"aaa".to_vec()), (b'S', b"cc".to_vec()), (b'S', b"t".to_vec())],
    );

    let mut r = OneReader::open(&path, Some(FileType::Seq)).unwrap();
    r.retain_lists(b'S').unwrap();
    while r.read_line().unwrap().is_some() {}
    let ListStore::Bytes(all) = r.take_list_buffer(b'S').unwrap() else {
        panic!("expected a byte store");
    };
    assert_eq!(all, b"aaa\0cc\0t\0");
}

/// The record sequence used by the parallel-equivalence test: groups of
/// sequence/quality pairs, sized so the list-codec training commits.
fn parallel_records() -> Vec<(u8, Vec<u8>)> {
    let mut records = Vec::new();
    for g in 0..40 {
        records.push((b'g', format!("lane{g}").into_bytes()));
        for i in 0..50 {
            let n = 40 + (g * 7 + i * 11) % 31;
            let seq: Vec<u8> = (0..n)
                .map(|j| b"acgt"[((g + i + j) % 4) as usize])
                .collect();
            let qual: Vec<u8> = (0..n)
                .map(|j| b'!' + (((g * 5 + i * 3 + j) % 40) as u8))
                .collect();
            records.push((b'S', seq));
            records.push((b'Q', qual));
        }
    }
    records
}

#[test]
fn test_parallel_write_equivalence() {
    let dir = TempDir::new().unwrap();
    let single = dir.path().join("single.1seq");
    let sharded = dir.path().join("sharded.1seq");
    let records = parallel_records();

    write_seq(&single, true, &records);

    // Split the same record sequence into 4 contiguous chunks, one per
    // shard, each driven from its own thread.
    {
        let mut shards =
            OneWriter::create_parallel(&sharded, FileType::Seq, None, true, 4).unwrap();
        shards[0].write_header().unwrap();

        let chunk = records.len().div_ceil(4);
        let mut chunks = records.chunks(chunk);
        std::thread::scope(|scope| {
            for shard in shards.iter_mut() {
                let part = chunks.next().unwrap_or(&[]);
                scope.spawn(move || {
                    for (t, payload) in part {
                        if *t == b'g' {
                            shard.set_int(0, 0);
                        }
                        shard.write_line(*t, List::Bytes(payload)).unwrap();
                    }
                });
            }
        });
        OneWriter::finish_parallel(shards).unwrap();
    }

    let (rec_a, ra) = read_all(&single);
    let (rec_b, rb) = read_all(&sharded);
    assert_eq!(rec_a, rec_b);

    for c in [b'S', b'Q', b'g'] {
        assert_eq!(ra.accum(c).unwrap(), rb.accum(c).unwrap(), "type {}", c as char);
        assert_eq!(ra.given(c).unwrap(), rb.given(c).unwrap(), "type {}", c as char);
    }

    // Random access must land on the same objects in both files.
    let mut ra = OneReader::open(&single, None).unwrap();
    let mut rb = OneReader::open(&sharded, None).unwrap();
    for i in [0i64, 1, 500, 1999] {
        assert!(ra.goto_object(i).unwrap());
        assert!(rb.goto_object(i).unwrap());
        ra.read_line().unwrap();
        rb.read_line().unwrap();
        assert_eq!(ra.string(), rb.string(), "object {i}");
    }
    for g in [0i64, 7, 39] {
        assert_eq!(ra.goto_group(g).unwrap(), rb.goto_group(g).unwrap(), "group {g}");
    }
}
