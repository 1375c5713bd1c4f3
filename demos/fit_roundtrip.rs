use acttok::{ActionArray, ActionChunk, ActionCodec, DctCodec, DctCodecConfig, DecodeShape};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2-D reaching motions: constant velocity towards a target, 10 steps each.
    let corpus: Vec<ActionChunk> = (0..200)
        .map(|i| {
            let angle = i as f64 * 0.13;
            let rows: Vec<Vec<f64>> = (0..10)
                .map(|t| vec![0.05 * t as f64 * angle.cos(), 0.05 * t as f64 * angle.sin()])
                .collect();
            ActionChunk::from_rows(&rows)
        })
        .collect::<Result<_, _>>()?;

    let mut codec = DctCodec::new(DctCodecConfig {
        vocab_size: 1024,
        time_horizon: Some(10),
        action_dim: Some(2),
        ..DctCodecConfig::default()
    })?;
    codec.fit(&corpus)?;

    let sample = ActionArray::stack(&corpus[..4])?;
    let tokens = codec.tokenize(&sample)?;
    for (i, seq) in tokens.iter().enumerate() {
        println!("chunk {i}: {} tokens {seq:?}", seq.len());
    }

    let decoded = codec.detokenize(&tokens, DecodeShape::default())?;
    for (i, (orig, back)) in corpus.iter().zip(&decoded).enumerate() {
        println!("chunk {i}: max abs error {:.4}", orig.max_abs_diff(back));
    }
    Ok(())
}
