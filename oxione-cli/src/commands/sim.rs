//! `one sim` - generate a synthetic sequence file through the library,
//! deterministically from a seed. Useful for exercising readers and for
//! benchmarking the binary codecs on realistic record streams.

use oxione_core::error::Result;
use oxione_file::{FileType, List, OneWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const BASES: &[u8; 4] = b"acgt";

/// Reads per `g` group line.
const READS_PER_GROUP: usize = 100;

struct ReadSim {
    rng: StdRng,
    mean_len: usize,
}

impl ReadSim {
    fn new(seed: u64, mean_len: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            mean_len,
        }
    }

    fn next_read(&mut self) -> (Vec<u8>, Vec<u8>) {
        let lo = (self.mean_len / 2).max(1);
        let hi = self.mean_len + self.mean_len / 2;
        let n = self.rng.gen_range(lo..=hi);
        let seq: Vec<u8> = (0..n).map(|_| BASES[self.rng.gen_range(0..4)]).collect();
        let qual: Vec<u8> = (0..n).map(|_| b'!' + self.rng.gen_range(0..40u8)).collect();
        (seq, qual)
    }
}

fn write_reads<W: std::io::Write>(
    w: &mut OneWriter<W>,
    sim: &mut ReadSim,
    count: usize,
    first_group: usize,
) -> Result<()> {
    for i in 0..count {
        if i % READS_PER_GROUP == 0 {
            let group = first_group + i / READS_PER_GROUP;
            w.set_int(0, 0);
            w.write_line(b'g', List::Bytes(format!("sim{group}").as_bytes()))?;
        }
        let (seq, qual) = sim.next_read();
        w.write_line(b'S', List::Bytes(&seq))?;
        w.write_line(b'Q', List::Bytes(&qual))?;
    }
    Ok(())
}

pub fn cmd_sim(
    output: &Path,
    count: usize,
    mean_len: usize,
    seed: u64,
    binary: bool,
    shards: usize,
) -> Result<()> {
    let command = format!(
        "one sim -n {count} -l {mean_len} --seed {seed}{}",
        if binary { " -b" } else { "" }
    );

    if shards <= 1 {
        let mut w = OneWriter::create(output, FileType::Seq, None, binary)?;
        w.add_provenance("one", env!("CARGO_PKG_VERSION"), &command, None)?;
        if binary {
            w.write_header()?;
        }
        let mut sim = ReadSim::new(seed, mean_len);
        write_reads(&mut w, &mut sim, count, 0)?;
        w.finish()?;
    } else {
        let mut writers = OneWriter::create_parallel(output, FileType::Seq, None, binary, shards)?;
        writers[0].add_provenance("one", env!("CARGO_PKG_VERSION"), &command, None)?;
        if binary {
            writers[0].write_header()?;
        }

        let per_shard = count.div_ceil(shards);
        let mut failures: Vec<Result<()>> = Vec::new();
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (i, w) in writers.iter_mut().enumerate() {
                let reads = per_shard.min(count.saturating_sub(i * per_shard));
                handles.push(scope.spawn(move || {
                    let mut sim = ReadSim::new(seed.wrapping_add(i as u64), mean_len);
                    write_reads(w, &mut sim, reads, i * per_shard / READS_PER_GROUP)
                }));
            }
            for h in handles {
                match h.join() {
                    Ok(r) => failures.push(r),
                    Err(_) => failures.push(Err(oxione_core::OneError::state(
                        "simulator shard thread panicked",
                    ))),
                }
            }
        });
        for r in failures {
            r?;
        }
        OneWriter::finish_parallel(writers)?;
    }

    eprintln!(
        "wrote {count} simulated reads (mean length {mean_len}) to {}",
        output.display()
    );
    Ok(())
}
