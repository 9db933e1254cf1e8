//! Llama-2 inference library in Rust
//!
//! A single-binary inference engine for Llama-2-family checkpoints: memory-mapped
//! checkpoint loading, a byte-pair-encoding tokenizer, and temperature/top-p
//! sampling on top of a straightforward Transformer forward pass.

pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod ops;
pub mod sampler;
pub mod state;
pub mod tokenizer;
pub mod weights;

pub use config::LlamaConfig;
pub use error::{LlamaError, Result};
pub use loader::load_checkpoint;
pub use model::forward;
pub use sampler::Sampler;
pub use state::LlamaState;
pub use tokenizer::{Tokenizer, load_tokenizer};
pub use weights::Weights;
