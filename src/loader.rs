//! Checkpoint loading: memory-maps a binary checkpoint file and exposes its
//! header as a `LlamaConfig` plus its weight region as a `Weights`.

use crate::config::LlamaConfig;
use crate::error::{LlamaError, Result};
use crate::weights::Weights;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Size in bytes of the seven-`i32` checkpoint header.
const HEADER_BYTES: usize = 7 * 4;

/// Load `Config` and `Weights` from a memory-mapped checkpoint file.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<(LlamaConfig, Weights)> {
    let file = File::open(path)?;
    // SAFETY: the file is opened read-only for the lifetime of the mapping;
    // the mapped region is never written to by this process or observed to
    // be mutated concurrently by another.
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < HEADER_BYTES {
        return Err(LlamaError::Format(
            "checkpoint file is shorter than the header".into(),
        ));
    }

    let read_i32 = |off: usize| i32::from_le_bytes(mmap[off..off + 4].try_into().unwrap());
    let config = LlamaConfig::from_header_fields(
        read_i32(0),
        read_i32(4),
        read_i32(8),
        read_i32(12),
        read_i32(16),
        read_i32(20),
        read_i32(24),
    )?;

    let data_offset = HEADER_BYTES;
    let available_floats = (mmap.len() - data_offset) / 4;
    let required_floats = Weights::floats_consumed(&config);
    if available_floats < required_floats {
        return Err(LlamaError::Format(format!(
            "checkpoint weight region too short: need {required_floats} floats, have {available_floats}"
        )));
    }

    let weights = Weights::from_mmap(mmap, data_offset, &config);
    Ok((config, weights))
}
