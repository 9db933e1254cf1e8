//! Llama model forward pass.

use crate::config::LlamaConfig;
use crate::ops::{accum, apply_rotary_emb, matmul, rms_norm, softmax, swiglu};
use crate::state::LlamaState;
use crate::weights::Weights;
use rayon::prelude::*;

/// Perform a single-token forward pass, aligned with LlamaModel.forward.
///
/// Preconditions (fatal if violated — there is no recoverable path once the
/// cache or embedding table would be indexed out of bounds):
/// `0 <= token < vocab_size` and `0 <= pos < seq_len`.
pub fn forward(
    token: i32,
    pos: i32,
    config: &LlamaConfig,
    state: &mut LlamaState,
    weights: &Weights,
) {
    debug_assert!(token >= 0 && (token as usize) < config.vocab_size as usize);
    debug_assert!(pos >= 0 && (pos as usize) < config.seq_len as usize);

    let dim = config.dim as usize;

    // Token embedding
    let emb_offset = (token as usize) * dim;
    let embed_tokens = weights.embed_tokens();
    state
        .x
        .copy_from_slice(&embed_tokens[emb_offset..emb_offset + dim]);

    // Decoder layers
    for l in 0..config.n_layers as usize {
        attention(l, pos, config, state, weights);
        mlp(l, state, weights);
    }

    // Final norm
    let x_clone = state.x.clone();
    rms_norm(&mut state.x, &x_clone, weights.norm());

    // Logits via the classifier head (shared with embeddings, or a separate tail)
    matmul(&mut state.logits, &state.x, weights.wcls());
}

/// Self-attention for one layer, aligned with LlamaAttention.forward.
fn attention(layer_idx: usize, pos: i32, config: &LlamaConfig, state: &mut LlamaState, weights: &Weights) {
    let n_heads = config.n_heads as usize;
    let head_size = config.head_size();
    let kv_dim = config.kv_dim();
    let group_size = config.group_size();

    // Input norm
    rms_norm(&mut state.xb, &state.x, weights.attn_norm(layer_idx));

    // QKV projections
    matmul(&mut state.q, &state.xb, weights.q_proj(layer_idx));
    matmul(&mut state.k, &state.xb, weights.k_proj(layer_idx));
    matmul(&mut state.v, &state.xb, weights.v_proj(layer_idx));

    // Apply RoPE: q spans the full model dim, k only spans kv_dim, so
    // rotating each independently with the same head-relative angle
    // reproduces "rotate k only when i < kv_dim" from the reference.
    apply_rotary_emb(&mut state.q, pos, head_size);
    apply_rotary_emb(&mut state.k, pos, head_size);

    // Cache K and V
    let cache_offset = (pos as usize) * kv_dim;
    state.key_cache[layer_idx][cache_offset..cache_offset + kv_dim].copy_from_slice(&state.k);
    state.value_cache[layer_idx][cache_offset..cache_offset + kv_dim].copy_from_slice(&state.v);

    // Multi-head attention (parallelized across heads)
    let key_cache = &state.key_cache[layer_idx];
    let value_cache = &state.value_cache[layer_idx];

    let head_outputs: Vec<Vec<f32>> = (0..n_heads)
        .into_par_iter()
        .map(|h| {
            let q_off = h * head_size;
            let q = &state.q[q_off..q_off + head_size];
            let kv_h = h / group_size;

            // Compute attention scores
            let mut att = vec![0.0f32; (pos + 1) as usize];
            for t in 0..=pos as usize {
                let k_off = t * kv_dim + kv_h * head_size;
                let k = &key_cache[k_off..k_off + head_size];

                let mut score = 0.0f32;
                for i in 0..head_size {
                    score += q[i] * k[i];
                }
                att[t] = score / (head_size as f32).sqrt();
            }

            // Softmax
            softmax(&mut att);

            // Weighted sum of values
            let mut out = vec![0.0f32; head_size];
            for t in 0..=pos as usize {
                let v_off = t * kv_dim + kv_h * head_size;
                let v = &value_cache[v_off..v_off + head_size];
                let a = att[t];
                for i in 0..head_size {
                    out[i] += a * v[i];
                }
            }
            out
        })
        .collect();

    // Gather results into xb
    for (h, out) in head_outputs.into_iter().enumerate() {
        let xb_off = h * head_size;
        state.xb[xb_off..xb_off + head_size].copy_from_slice(&out);
    }

    // Output projection
    matmul(&mut state.xb2, &state.xb, weights.o_proj(layer_idx));

    // Residual add
    accum(&mut state.x, &state.xb2);
}

/// FFN for one layer, aligned with LlamaMLP.forward.
fn mlp(layer_idx: usize, state: &mut LlamaState, weights: &Weights) {
    // Input norm
    rms_norm(&mut state.xb, &state.x, weights.ffn_norm(layer_idx));

    // Gate and up projections
    matmul(&mut state.hb, &state.xb, weights.gate_proj(layer_idx));
    matmul(&mut state.hb2, &state.xb, weights.up_proj(layer_idx));

    // SwiGLU activation
    swiglu(&mut state.hb, &state.hb2);

    // Down projection
    matmul(&mut state.xb, &state.hb, weights.down_proj(layer_idx));

    // Residual add
    accum(&mut state.x, &state.xb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_checkpoint;
    use std::fs::File;
    use std::io::Write;

    /// Writes a synthetic single-head checkpoint with identity projections
    /// so that attention degenerates to copying the embedding row through.
    fn write_identity_checkpoint(path: &std::path::Path) {
        let dim = 4i32;
        let head_size = 4usize;
        let hidden_dim = 4i32;
        let n_layers = 1i32;
        let n_heads = 1i32;
        let n_kv_heads = 1i32;
        let vocab_size = 4i32;
        let seq_len = 4i32;

        let mut file = File::create(path).unwrap();
        for v in [dim, hidden_dim, n_layers, n_heads, n_kv_heads, vocab_size, seq_len] {
            file.write_all(&v.to_le_bytes()).unwrap();
        }

        let write_f32 = |file: &mut File, v: f32| file.write_all(&v.to_le_bytes()).unwrap();
        let write_identity = |file: &mut File, n: usize| {
            for i in 0..n {
                for j in 0..n {
                    write_f32(file, if i == j { 1.0 } else { 0.0 });
                }
            }
        };
        let write_zeros = |file: &mut File, n: usize| {
            for _ in 0..n {
                write_f32(file, 0.0);
            }
        };
        let write_ones = |file: &mut File, n: usize| {
            for _ in 0..n {
                write_f32(file, 1.0);
            }
        };

        // embed_tokens: vocab_size x dim, row i filled with value i
        for i in 0..vocab_size as usize {
            for _ in 0..dim as usize {
                write_f32(&mut file, i as f32);
            }
        }
        write_ones(&mut file, dim as usize); // rms_att_weight
        write_identity(&mut file, dim as usize); // wq
        write_identity(&mut file, dim as usize); // wk
        write_identity(&mut file, dim as usize); // wv
        write_identity(&mut file, dim as usize); // wo
        write_ones(&mut file, dim as usize); // rms_ffn_weight
        write_zeros(&mut file, hidden_dim as usize * dim as usize); // w1
        write_zeros(&mut file, dim as usize * hidden_dim as usize); // w2
        write_zeros(&mut file, hidden_dim as usize * dim as usize); // w3
        write_ones(&mut file, dim as usize); // rms_final_weight
        write_zeros(&mut file, seq_len as usize * head_size / 2); // legacy RoPE
        write_zeros(&mut file, seq_len as usize * head_size / 2);
        // shared classifier: vocab_size is positive, no trailing wcls
    }

    #[test]
    fn causal_mask_ignores_future_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        write_identity_checkpoint(&path);
        let (config, weights) = load_checkpoint(&path).unwrap();

        let mut state_a = LlamaState::new(&config);
        forward(1, 0, &config, &mut state_a, &weights);
        let out_a = state_a.logits.clone();

        // Perturb the cache entries at position pos+1 before repeating the
        // pos=0 forward pass; the result must be unchanged because
        // attention at pos=0 only ever looks at position 0.
        let kv_dim = config.kv_dim();
        let mut state_b = LlamaState::new(&config);
        forward(1, 0, &config, &mut state_b, &weights);
        state_b.key_cache[0][kv_dim..2 * kv_dim].fill(999.0);
        state_b.value_cache[0][kv_dim..2 * kv_dim].fill(999.0);
        forward(1, 0, &config, &mut state_b, &weights);
        let out_b = state_b.logits.clone();

        for (a, b) in out_a.iter().zip(out_b.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
