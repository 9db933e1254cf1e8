//! Llama model configuration.

use crate::error::{LlamaError, Result};

/// Transformer hyperparameters, aligned with LlamaConfig in Hugging Face Transformers.
///
/// Mirrors the 7-int32 header of the reference checkpoint format. `vocab_size`
/// is stored here as its absolute value; the sign bit it carried on disk is
/// preserved separately as `shared_classifier`.
#[derive(Debug, Clone, Copy)]
pub struct LlamaConfig {
    /// Transformer embedding dimension (hidden_size)
    pub dim: i32,
    /// FFN intermediate dimension (intermediate_size)
    pub hidden_dim: i32,
    /// Number of decoder layers (num_hidden_layers)
    pub n_layers: i32,
    /// Number of query attention heads (num_attention_heads)
    pub n_heads: i32,
    /// Number of key/value heads for GQA (num_key_value_heads)
    pub n_kv_heads: i32,
    /// Vocabulary size (vocab_size), always positive after parsing
    pub vocab_size: i32,
    /// Maximum context length (max_position_embeddings)
    pub seq_len: i32,
    /// Whether the classifier head shares weights with the embedding table.
    /// Encoded on disk as the sign of `vocab_size`: positive means shared.
    pub shared_classifier: bool,
}

impl LlamaConfig {
    /// Build a config from the seven raw header fields as read from disk,
    /// splitting the shared-classifier sign convention out of `vocab_size`.
    pub fn from_header_fields(
        dim: i32,
        hidden_dim: i32,
        n_layers: i32,
        n_heads: i32,
        n_kv_heads: i32,
        raw_vocab_size: i32,
        seq_len: i32,
    ) -> Result<Self> {
        let shared_classifier = raw_vocab_size > 0;
        let config = LlamaConfig {
            dim,
            hidden_dim,
            n_layers,
            n_heads,
            n_kv_heads,
            vocab_size: raw_vocab_size.abs(),
            seq_len,
            shared_classifier,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dim <= 0
            || self.hidden_dim <= 0
            || self.n_layers <= 0
            || self.n_heads <= 0
            || self.n_kv_heads <= 0
            || self.vocab_size <= 0
            || self.seq_len <= 0
        {
            return Err(LlamaError::Format(
                "checkpoint header contains a non-positive dimension".into(),
            ));
        }
        if self.dim % self.n_heads != 0 {
            return Err(LlamaError::Format(
                "dim is not divisible by n_heads".into(),
            ));
        }
        if self.n_heads % self.n_kv_heads != 0 {
            return Err(LlamaError::Format(
                "n_heads is not divisible by n_kv_heads".into(),
            ));
        }
        Ok(())
    }

    /// Returns the key/value dimension per head group.
    #[inline]
    pub fn kv_dim(&self) -> usize {
        ((self.dim * self.n_kv_heads) / self.n_heads) as usize
    }

    /// Returns the head size.
    #[inline]
    pub fn head_size(&self) -> usize {
        (self.dim / self.n_heads) as usize
    }

    /// Returns the number of query heads sharing one KV head (for GQA).
    #[inline]
    pub fn group_size(&self) -> usize {
        (self.n_heads / self.n_kv_heads) as usize
    }
}
