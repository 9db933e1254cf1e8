//! `llama2-rs` binary entry point: parses CLI flags, loads a checkpoint and
//! tokenizer, and streams autoregressively generated text to stdout.

use clap::Parser;
use llama2_rs::cli::Cli;
use llama2_rs::sampler::Sampler;
use llama2_rs::{LlamaError, LlamaState, forward, load_checkpoint, load_tokenizer};
use std::io::{self, BufRead, Write};
use std::time::Instant;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), LlamaError> {
    let tokenizer_path = cli.tokenizer.clone();
    let checkpoint_path = cli.checkpoint.clone();
    let prompt_arg = cli.prompt.clone();

    info!(checkpoint = %checkpoint_path, "loading checkpoint");
    let (config, weights) = load_checkpoint(&checkpoint_path)?;
    info!(
        dim = config.dim,
        n_layers = config.n_layers,
        n_heads = config.n_heads,
        vocab_size = config.vocab_size,
        "checkpoint loaded"
    );

    info!(tokenizer = %tokenizer_path, "loading tokenizer");
    let tokenizer = load_tokenizer(&tokenizer_path, config.vocab_size as usize)?;

    let gen_cfg = cli.into_config(config.seq_len);

    let prompt = match prompt_arg {
        Some(p) => p,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches('\n').to_string()
        }
    };

    let mut prompt_tokens = vec![1i32]; // BOS
    prompt_tokens.extend(tokenizer.encode(&prompt)?);

    let mut state = LlamaState::new(&config);
    let mut sampler = Sampler::new(config.vocab_size as usize, gen_cfg.seed);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let start = Instant::now();
    let mut generated = 0u32;
    let mut token = prompt_tokens[0];
    let mut pos = 0i32;

    while pos < gen_cfg.steps {
        forward(token, pos, &config, &mut state, &weights);

        let next = if (pos as usize) < prompt_tokens.len() - 1 {
            prompt_tokens[pos as usize + 1]
        } else {
            sampler.sample(&mut state.logits, gen_cfg.temperature, gen_cfg.top_p)
        };

        if next == 1 {
            break;
        }

        let piece = tokenizer.decode(token, next)?;
        out.write_all(piece.as_bytes())?;
        generated += 1;
        if generated % gen_cfg.buffer_tokens == 0 {
            out.flush()?;
        }

        token = next;
        pos += 1;
    }
    out.flush()?;
    println!();

    if gen_cfg.stats {
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            eprintln!("achieved tok/s: {:.3}", generated as f64 / elapsed);
        }
    }

    Ok(())
}
