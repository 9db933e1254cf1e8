//! Model weights for Llama: a single mmap'd float region sliced into named,
//! non-overlapping tensor views.

use crate::config::LlamaConfig;
use memmap2::Mmap;

/// Offset and length (in f32 elements) of one tensor within the weight region.
#[derive(Debug, Clone, Copy)]
struct Span {
    offset: usize,
    len: usize,
}

/// Per-layer tensor spans, aligned with LlamaModel's decoder layers.
#[derive(Debug, Clone, Copy)]
struct LayerSpans {
    attn_norm: Span,
    q_proj: Span,
    k_proj: Span,
    v_proj: Span,
    o_proj: Span,
    ffn_norm: Span,
    gate_proj: Span,
    up_proj: Span,
    down_proj: Span,
}

/// All model parameters, borrowed from one memory-mapped weight region.
///
/// Owns the `Mmap` so the backing pages stay alive for as long as any tensor
/// view derived from it is in use.
pub struct Weights {
    mmap: Mmap,
    data_offset: usize,
    embed_tokens: Span,
    layers: Vec<LayerSpans>,
    norm: Span,
    wcls: Span,
}

impl Weights {
    /// Walk the mapped region (starting just past the header) and compute
    /// the tensor layout in checkpoint-declaration order, aligned with
    /// `memory_map_weights` in the reference implementation.
    pub fn from_mmap(mmap: Mmap, data_offset: usize, config: &LlamaConfig) -> Self {
        let dim = config.dim as usize;
        let hdim = config.hidden_dim as usize;
        let n_layers = config.n_layers as usize;
        let vocab = config.vocab_size as usize;
        let kv_dim = config.kv_dim();
        let head_size = config.head_size();
        let seq_len = config.seq_len as usize;

        let mut cursor = 0usize;
        let mut take = |len: usize| {
            let span = Span { offset: cursor, len };
            cursor += len;
            span
        };

        let embed_tokens = take(vocab * dim);
        let rms_att = take(n_layers * dim);
        let wq = take(n_layers * dim * dim);
        let wk = take(n_layers * dim * kv_dim);
        let wv = take(n_layers * dim * kv_dim);
        let wo = take(n_layers * dim * dim);
        let rms_ffn = take(n_layers * dim);
        let w1 = take(n_layers * hdim * dim);
        let w2 = take(n_layers * dim * hdim);
        let w3 = take(n_layers * hdim * dim);
        let norm = take(dim);
        // legacy RoPE frequency tables, unused
        let _ = take(seq_len * head_size / 2);
        let _ = take(seq_len * head_size / 2);

        let wcls = if config.shared_classifier {
            embed_tokens
        } else {
            take(vocab * dim)
        };

        let mut layers = Vec::with_capacity(n_layers);
        for l in 0..n_layers {
            layers.push(LayerSpans {
                attn_norm: Span { offset: rms_att.offset + l * dim, len: dim },
                q_proj: Span { offset: wq.offset + l * dim * dim, len: dim * dim },
                k_proj: Span { offset: wk.offset + l * dim * kv_dim, len: dim * kv_dim },
                v_proj: Span { offset: wv.offset + l * dim * kv_dim, len: dim * kv_dim },
                o_proj: Span { offset: wo.offset + l * dim * dim, len: dim * dim },
                ffn_norm: Span { offset: rms_ffn.offset + l * dim, len: dim },
                gate_proj: Span { offset: w1.offset + l * hdim * dim, len: hdim * dim },
                up_proj: Span { offset: w3.offset + l * hdim * dim, len: hdim * dim },
                down_proj: Span { offset: w2.offset + l * dim * hdim, len: dim * hdim },
            });
        }

        Weights {
            mmap,
            data_offset,
            embed_tokens,
            layers,
            norm,
            wcls,
        }
    }

    /// Total number of f32 elements the tensor walk consumes for `config`,
    /// including the skipped legacy RoPE tables and (if present) the
    /// separate classifier tail.
    pub(crate) fn floats_consumed(config: &LlamaConfig) -> usize {
        let dim = config.dim as usize;
        let hdim = config.hidden_dim as usize;
        let n_layers = config.n_layers as usize;
        let vocab = config.vocab_size as usize;
        let kv_dim = config.kv_dim();
        let head_size = config.head_size();
        let seq_len = config.seq_len as usize;

        let mut total = vocab * dim
            + n_layers * dim
            + n_layers * dim * dim
            + n_layers * dim * kv_dim
            + n_layers * dim * kv_dim
            + n_layers * dim * dim
            + n_layers * dim
            + n_layers * hdim * dim
            + n_layers * dim * hdim
            + n_layers * hdim * dim
            + dim
            + seq_len * head_size / 2
            + seq_len * head_size / 2;
        if !config.shared_classifier {
            total += vocab * dim;
        }
        total
    }

    #[inline]
    fn slice(&self, span: Span) -> &[f32] {
        let byte_start = self.data_offset + span.offset * 4;
        let byte_len = span.len * 4;
        let bytes = &self.mmap[byte_start..byte_start + byte_len];
        // SAFETY: `bytes` is a `span.len * 4`-byte region entirely within the
        // mapped file, and the checkpoint format guarantees 4-byte alignment
        // of the weight region (validated when the mapping is opened).
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, span.len) }
    }

    pub fn embed_tokens(&self) -> &[f32] {
        self.slice(self.embed_tokens)
    }

    pub fn norm(&self) -> &[f32] {
        self.slice(self.norm)
    }

    pub fn wcls(&self) -> &[f32] {
        self.slice(self.wcls)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn attn_norm(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].attn_norm)
    }

    pub fn q_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].q_proj)
    }

    pub fn k_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].k_proj)
    }

    pub fn v_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].v_proj)
    }

    pub fn o_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].o_proj)
    }

    pub fn ffn_norm(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].ffn_norm)
    }

    pub fn gate_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].gate_proj)
    }

    pub fn up_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].up_proj)
    }

    pub fn down_proj(&self, layer: usize) -> &[f32] {
        self.slice(self.layers[layer].down_proj)
    }
}
