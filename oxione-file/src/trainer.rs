//! Shared codec training for parallel write sessions.
//!
//! Every shard trains its line-type codecs on its own records. When a
//! shard's local byte tally crosses its (divided) threshold it takes the
//! bank's mutex and contributes its histogram to the aggregate; the shard
//! that pushes the aggregate past the global threshold builds the code and
//! publishes it. From then on the committed codec is immutable and every
//! shard picks it up by reference on its next write of that line type.
//! No shard ever reaches into another shard's table.

use oxione_codec::HuffmanCodec;
use oxione_core::error::{OneError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Bytes of training data accumulated before a codec is committed.
pub const CODEC_TRAINING_SIZE: i64 = 100_000;

struct Trainer {
    codec: HuffmanCodec,
    tack: i64,
}

/// One bank of trainers: either all field codecs or all list codecs of a
/// parallel session, guarded by a single mutex as a unit.
pub(crate) struct CodecBank {
    trainers: Mutex<HashMap<u8, Trainer>>,
    committed: HashMap<u8, OnceLock<Arc<HuffmanCodec>>>,
}

impl CodecBank {
    fn new(codes: &[u8]) -> Self {
        let mut trainers = HashMap::new();
        let mut committed = HashMap::new();
        for &c in codes {
            trainers.insert(
                c,
                Trainer {
                    codec: HuffmanCodec::new(),
                    tack: 0,
                },
            );
            committed.insert(c, OnceLock::new());
        }
        Self {
            trainers: Mutex::new(trainers),
            committed,
        }
    }

    /// The committed codec for a line type, if the commit has happened.
    pub fn committed(&self, code: u8) -> Option<Arc<HuffmanCodec>> {
        self.committed.get(&code)?.get().cloned()
    }

    /// Merge a shard's local histogram into the aggregate. The local codec
    /// is reset so nothing is contributed twice. If this contribution
    /// pushes the aggregate past `training_size`, the code is built and
    /// published; the committed codec (new or pre-existing) is returned.
    pub fn contribute(
        &self,
        code: u8,
        local: &mut HuffmanCodec,
        tack: i64,
        training_size: i64,
    ) -> Result<Option<Arc<HuffmanCodec>>> {
        let slot = self
            .committed
            .get(&code)
            .ok_or_else(|| OneError::state(format!("line type {} has no shared codec", code as char)))?;

        let mut trainers = self
            .trainers
            .lock()
            .map_err(|_| OneError::state("codec trainer mutex poisoned"))?;

        if let Some(arc) = slot.get() {
            return Ok(Some(arc.clone()));
        }

        let trainer = trainers
            .get_mut(&code)
            .expect("trainer and committed maps share keys");
        trainer.codec.merge_histogram(local)?;
        *local = HuffmanCodec::new();
        trainer.tack += tack;

        if trainer.tack > training_size {
            let mut codec = std::mem::take(&mut trainer.codec);
            codec.build_code(true)?;
            let arc = Arc::new(codec);
            let _ = slot.set(arc.clone());
            return Ok(Some(arc));
        }
        Ok(None)
    }
}

/// Shared training state of one parallel write session.
pub(crate) struct SharedTraining {
    /// Global commit threshold in bytes.
    pub training_size: i64,
    /// Trainers for field codecs.
    pub field: CodecBank,
    /// Trainers for list codecs.
    pub list: CodecBank,
}

impl SharedTraining {
    /// Create the banks for the line types that train codecs.
    pub fn new(field_codes: &[u8], list_codes: &[u8]) -> Self {
        Self {
            training_size: CODEC_TRAINING_SIZE,
            field: CodecBank::new(field_codes),
            list: CodecBank::new(list_codes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contribute_until_commit() {
        let bank = CodecBank::new(&[b'Q']);

        let mut local = HuffmanCodec::new();
        local.add_samples(&vec![b'x'; 600]).unwrap();
        assert!(bank.contribute(b'Q', &mut local, 600, 1000).unwrap().is_none());
        assert!(bank.committed(b'Q').is_none());

        let mut local2 = HuffmanCodec::new();
        local2.add_samples(&vec![b'y'; 600]).unwrap();
        let arc = bank.contribute(b'Q', &mut local2, 600, 1000).unwrap();
        assert!(arc.is_some());
        assert!(bank.committed(b'Q').is_some());

        // A late contribution just hands back the committed codec.
        let mut local3 = HuffmanCodec::new();
        local3.add_samples(b"zzz").unwrap();
        let again = bank.contribute(b'Q', &mut local3, 3, 1000).unwrap();
        assert!(Arc::ptr_eq(&again.unwrap(), &bank.committed(b'Q').unwrap()));
    }

    #[test]
    fn test_unknown_line_type() {
        let bank = CodecBank::new(&[b'Q']);
        let mut local = HuffmanCodec::new();
        local.add_samples(b"x").unwrap();
        assert!(bank.contribute(b'Z', &mut local, 1, 10).is_err());
    }
}
