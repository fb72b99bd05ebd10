//! `hashchain` - mines a small demo chain and prints every block

use anyhow::{Context, Result};
use clap::Parser;
use hashchain_core::{Blockchain, Miner, MinerConfigBuilder, DEFAULT_DIFFICULTY};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "hashchain", version, about = "Proof-of-work hash chain demo")]
struct Args {
    /// Leading zero bits required of every block hash
    #[arg(short, long, env = "HASHCHAIN_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Worker threads for the nonce search (0 = one per CPU)
    #[arg(short, long, env = "HASHCHAIN_THREADS", default_value_t = 1)]
    threads: usize,

    /// Abort a block search after this many seconds
    #[arg(long, env = "HASHCHAIN_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Print the chain as JSON instead of block reports
    #[arg(long)]
    json: bool,

    /// Payloads of the blocks appended after the genesis block
    #[arg(default_values_t = [
        "send 1 btc to cong".to_string(),
        "send 2 more btc to cong".to_string(),
    ])]
    data: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };

    let mut builder = MinerConfigBuilder::new().threads(threads);
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let miner = Miner::new(builder.build()).context("invalid miner configuration")?;

    log::info!(
        "Mining {} block(s) at difficulty {} with {} thread(s)",
        args.data.len() + 1,
        args.difficulty,
        threads
    );

    let mut chain =
        Blockchain::with_miner(&miner, args.difficulty).context("failed to seal genesis block")?;
    for data in &args.data {
        chain
            .add_block_with(&miner, data.as_str())
            .with_context(|| format!("failed to seal block \"{data}\""))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
    } else {
        for block in &chain {
            println!("{block}");
            println!();
        }
    }

    chain.verify().context("mined chain failed verification")?;
    Ok(())
}
