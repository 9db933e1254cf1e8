//! Tokenizer loading and BPE encoding.

use crate::error::{LlamaError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Tokenizer holding vocabulary, merge scores, and a sorted lookup table.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pub vocab: Vec<String>,
    pub scores: Vec<f32>,
    pub max_token_length: u32,
    /// Sorted `(string, id)` view for O(log N) lookup, the Rust analogue of
    /// the reference implementation's sorted-array-plus-bsearch.
    sorted_vocab: BTreeMap<String, i32>,
}

impl Tokenizer {
    /// Encode text using BPE, with an implicit leading dummy-prefix space,
    /// matching the SentencePiece convention.
    pub fn encode(&self, text: &str) -> Result<Vec<i32>> {
        bpe_encode(text, &self.vocab, &self.scores, &self.sorted_vocab)
    }

    /// Decode a single token, applying the BOS-leading-space-strip and
    /// `<0xHH>` raw-byte-literal rules.
    pub fn decode(&self, prev_id: i32, id: i32) -> Result<String> {
        let piece = self
            .vocab
            .get(id as usize)
            .ok_or_else(|| LlamaError::Tokenizer(format!("token id {id} out of range")))?;

        let piece = if prev_id == 1 {
            piece.strip_prefix(' ').unwrap_or(piece)
        } else {
            piece.as_str()
        };

        if let Some(byte) = parse_byte_literal(piece) {
            return Ok(if byte.is_ascii_graphic() || byte.is_ascii_whitespace() {
                (byte as char).to_string()
            } else {
                String::new()
            });
        }

        Ok(piece.to_string())
    }

    fn lookup(&self, s: &str) -> Option<i32> {
        self.sorted_vocab.get(s).copied()
    }
}

/// Parse a `<0xHH>` literal-byte token, returning the encoded byte value.
fn parse_byte_literal(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Load a tokenizer from a binary vocabulary file:
/// `u32 max_token_length`, then `vocab_size` records of
/// `(f32 score, i32 length, length bytes of UTF-8)`.
pub fn load_tokenizer<P: AsRef<Path>>(path: P, vocab_size: usize) -> Result<Tokenizer> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let max_token_length = reader.read_u32::<LittleEndian>()?;

    let mut vocab = Vec::with_capacity(vocab_size);
    let mut scores = Vec::with_capacity(vocab_size);
    let mut sorted_vocab = BTreeMap::new();

    for i in 0..vocab_size {
        let score = reader.read_f32::<LittleEndian>()?;
        scores.push(score);

        let len = reader.read_i32::<LittleEndian>()?;
        if len < 0 {
            return Err(LlamaError::Format(format!(
                "negative token length {len} at vocab index {i}"
            )));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;

        let token = String::from_utf8_lossy(&buf).into_owned();
        sorted_vocab.insert(token.clone(), i as i32);
        vocab.push(token);
    }

    Ok(Tokenizer {
        vocab,
        scores,
        max_token_length,
        sorted_vocab,
    })
}

/// BPE encode text, aligned with the reference implementation's `encode()`:
/// dummy-prefix space, UTF-8-aware byte-fallback seeding, then greedy
/// highest-score adjacent-pair merging.
pub fn bpe_encode(
    text: &str,
    vocab: &[String],
    scores: &[f32],
    sorted_vocab: &BTreeMap<String, i32>,
) -> Result<Vec<i32>> {
    let lookup = |s: &str| sorted_vocab.get(s).copied();

    let dummy_prefix = lookup(" ")
        .ok_or_else(|| LlamaError::Tokenizer("dummy prefix ' ' not found in vocabulary".into()))?;
    let mut tokens: Vec<i32> = vec![dummy_prefix];

    // UTF-8-aware byte-fallback seeding: walk the input bytewise, grouping
    // continuation bytes with the leading byte of their codepoint.
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let mut j = i + 1;
        while j < bytes.len() && is_continuation_byte(bytes[j]) && (j - i) < 4 {
            j += 1;
        }
        let piece = std::str::from_utf8(&bytes[i..j]).unwrap_or("");
        if let Some(id) = lookup(piece) {
            tokens.push(id);
        } else {
            for &b in &bytes[i..j] {
                tokens.push(b as i32 + 3);
            }
        }
        i = j;
    }

    // Iteratively merge the best-scoring adjacent pair.
    let max_len = vocab.iter().map(|s| s.len()).max().unwrap_or(1);
    let mut merge_buf = String::with_capacity(2 * max_len);
    loop {
        let mut best_score = f32::NEG_INFINITY;
        let mut best_id = -1i32;
        let mut best_idx = None;

        for i in 0..tokens.len().saturating_sub(1) {
            merge_buf.clear();
            merge_buf.push_str(&vocab[tokens[i] as usize]);
            merge_buf.push_str(&vocab[tokens[i + 1] as usize]);
            if let Some(id) = lookup(&merge_buf) {
                if scores[id as usize] > best_score {
                    best_score = scores[id as usize];
                    best_id = id;
                    best_idx = Some(i);
                }
            }
        }

        let Some(idx) = best_idx else { break };
        tokens[idx] = best_id;
        tokens.remove(idx + 1);
    }

    Ok(tokens)
}

#[inline]
fn is_continuation_byte(b: u8) -> bool {
    (b & 0xC0) == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal byte-level vocabulary: `<unk>, <s>, </s>`, then every byte
    /// value as its own `<0xHH>` token, plus a handful of printable
    /// strings/merges so encode/decode round-trips exercise real merges.
    fn byte_level_vocab() -> (Vec<String>, Vec<f32>, BTreeMap<String, i32>) {
        let mut vocab = vec!["<unk>".to_string(), "<s>".to_string(), "</s>".to_string()];
        for b in 0u16..256 {
            vocab.push(format!("<0x{:02X}>", b));
        }
        let mut scores = vec![0.0f32; vocab.len()];

        let mut add = |s: &str, score: f32| {
            vocab.push(s.to_string());
            scores.push(score);
        };
        add(" ", -1.0);
        add("H", -1.0);
        add("e", -1.0);
        add("l", -1.0);
        add("o", -1.0);
        add("He", 1.0);
        add("ll", 1.0);
        add("Hel", 2.0);
        add("Hell", 3.0);
        add("Hello", 4.0);

        let sorted_vocab = vocab
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as i32))
            .collect();
        (vocab, scores, sorted_vocab)
    }

    fn make_tokenizer() -> Tokenizer {
        let (vocab, scores, sorted_vocab) = byte_level_vocab();
        Tokenizer {
            vocab,
            scores,
            max_token_length: 8,
            sorted_vocab,
        }
    }

    #[test]
    fn encode_then_decode_round_trips_ascii() {
        let tok = make_tokenizer();
        let ids = tok.encode("Hello").unwrap();

        let mut out = String::new();
        let mut prev = 1; // BOS
        for &id in &ids {
            out.push_str(&tok.decode(prev, id).unwrap());
            prev = id;
        }
        assert_eq!(out.trim_start(), "Hello");
    }

    #[test]
    fn byte_fallback_covers_every_ascii_byte_without_vocab_entry() {
        let tok = make_tokenizer();
        // Every ASCII byte not explicitly seeded above must fall back to
        // a single-byte encoding of id = byte + 3.
        for b in 0u8..128 {
            if b"Helo ".contains(&b) {
                continue;
            }
            let s = (b as char).to_string();
            let ids = tok.encode(&s).unwrap();
            assert_eq!(ids.last().copied(), Some(b as i32 + 3), "byte {b}");
        }
    }

    #[test]
    fn encode_emoji_emits_four_byte_fallback_ids() {
        let tok = make_tokenizer();
        let emoji = "\u{1F600}";
        let expected: Vec<i32> = emoji.as_bytes().iter().map(|&b| b as i32 + 3).collect();
        let ids = tok.encode(emoji).unwrap();
        assert_eq!(&ids[1..], expected.as_slice());
    }

    #[test]
    fn decode_strips_leading_space_after_bos() {
        let tok = make_tokenizer();
        let space_id = tok.lookup(" ").unwrap();
        assert_eq!(tok.decode(1, space_id).unwrap(), "");
        assert_eq!(tok.decode(5, space_id).unwrap(), " ");
    }

    #[test]
    fn decode_byte_literal_printable_and_control() {
        let tok = make_tokenizer();
        let printable_id = tok.lookup("<0x41>").unwrap(); // 'A'
        assert_eq!(tok.decode(0, printable_id).unwrap(), "A");

        let control_id = tok.lookup("<0x01>").unwrap();
        assert_eq!(tok.decode(0, control_id).unwrap(), "");
    }
}
