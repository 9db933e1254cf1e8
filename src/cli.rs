//! Command-line surface for the `llama2-rs` binary.

use clap::Parser;
use std::time::{SystemTime, UNIX_EPOCH};

/// Run inference against a Llama-2-family checkpoint.
#[derive(Parser, Debug)]
#[command(name = "llama2-rs", about = "Single-binary Llama-2 inference engine")]
pub struct Cli {
    /// Path to the checkpoint file (.bin)
    pub checkpoint: String,

    /// Sampling temperature; 0 disables randomness (greedy argmax)
    #[arg(short = 't', long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Nucleus sampling threshold; values outside [0, 1] fall back to the default
    #[arg(short = 'p', long = "top-p", default_value_t = 0.9)]
    pub top_p: f32,

    /// RNG seed; 0 seeds from wall-clock time
    #[arg(short = 's', long, default_value_t = 0)]
    pub seed: u64,

    /// Number of tokens to generate; 0 means the checkpoint's max sequence length
    #[arg(short = 'n', long, default_value_t = 256)]
    pub steps: i32,

    /// Flush stdout every this many generated tokens
    #[arg(short = 'b', long = "buffer-tokens", default_value_t = 1)]
    pub buffer_tokens: u32,

    /// Print achieved tok/s to stderr when generation finishes
    #[arg(short = 'x', long, default_value_t = 1)]
    pub stats: u8,

    /// Prompt text; if absent, one line is read from stdin
    #[arg(short = 'i', long)]
    pub prompt: Option<String>,

    /// Path to the tokenizer vocabulary file
    #[arg(short = 'z', long, default_value = "tokenizer.bin")]
    pub tokenizer: String,
}

/// Normalized generation parameters, derived from `Cli` by clamping and
/// resolving the zero-sentinel defaults (`-n 0`, `-s 0`) against the loaded
/// checkpoint's own config.
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub seed: u64,
    pub steps: i32,
    pub buffer_tokens: u32,
    pub stats: bool,
}

impl Cli {
    /// Resolve this CLI invocation into a `GenerationConfig`, clamping
    /// temperature/top-p to their valid ranges, seeding from wall-clock time
    /// if `seed == 0`, and resolving `steps == 0` against `seq_len`.
    pub fn into_config(self, seq_len: i32) -> GenerationConfig {
        let temperature = self.temperature.max(0.0);
        let top_p = if (0.0..=1.0).contains(&self.top_p) {
            self.top_p
        } else {
            0.9
        };
        let seed = if self.seed == 0 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1)
        } else {
            self.seed
        };
        let steps = if self.steps == 0 { seq_len } else { self.steps };

        GenerationConfig {
            temperature,
            top_p,
            seed,
            steps,
            buffer_tokens: self.buffer_tokens.max(1),
            stats: self.stats != 0,
        }
    }
}
