//! Cancellable, multi-threaded proof-of-work search

use crate::block::{Block, BlockHeader};
use crate::config::{ConfigError, MinerConfig};
use crate::pow::{ProofOfWork, Seal};
use crate::MAX_NONCE;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Miner sealing blocks with a configurable number of worker threads
pub struct Miner {
    /// Search settings
    config: MinerConfig,
    /// Stop request, consumed by the search that observes it
    should_stop: Arc<AtomicBool>,
    /// Hashes computed by the last search to finish
    hashes_done: AtomicU64,
}

/// Result of a successful search
#[derive(Debug, Clone)]
pub struct MiningOutcome {
    /// Block sealed by the search
    pub block: Block,
    /// Search statistics
    pub stats: SearchStats,
}

/// Statistics of one search
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    /// Hashes computed across all workers
    pub hashes: u64,
    /// Wall-clock search time
    pub elapsed: Duration,
    /// Average hash rate (H/s)
    pub hash_rate: f64,
    /// Workers used
    pub threads: usize,
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Found,
    Finished,
    Exhausted,
    Stopped,
    TimedOut,
}

/// State shared by the workers of one search
struct SearchContext<'a> {
    pow: &'a ProofOfWork,
    header: &'a BlockHeader,
    next_nonce: AtomicU64,
    hashes: AtomicU64,
    done: AtomicBool,
    deadline: Option<Instant>,
    started: Instant,
}

impl Miner {
    /// Creates a miner after validating `config`
    pub fn new(config: MinerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            should_stop: Arc::new(AtomicBool::new(false)),
            hashes_done: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Asks the running (or next) search to give up.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Shared stop flag, for callers that outlive a borrow of the miner
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_stop)
    }

    /// Hashes computed by the last search to finish.
    ///
    /// Searches running concurrently on one miner each keep their own count in
    /// [`MiningOutcome::stats`]; this only records whichever finished last.
    pub fn hashes_done(&self) -> u64 {
        self.hashes_done.load(Ordering::Relaxed)
    }

    /// Seals a new block on top of `prev_hash`, stamped with the current time
    pub fn seal_block(
        &self,
        data: impl Into<Vec<u8>>,
        prev_hash: impl Into<Vec<u8>>,
        difficulty: u32,
    ) -> Result<MiningOutcome, MiningError> {
        self.seal(BlockHeader::new(data, prev_hash), difficulty)
    }

    /// Searches for a nonce sealing `header` at `difficulty`.
    ///
    /// Any valid nonce may win when more than one thread is used. A stop
    /// request is consumed when the search returns, whatever its result.
    pub fn seal(
        &self,
        header: BlockHeader,
        difficulty: u32,
    ) -> Result<MiningOutcome, MiningError> {
        let pow = ProofOfWork::new(difficulty)?;
        let started = Instant::now();

        log::debug!(
            "Mining block containing \"{}\" at difficulty {} with {} thread(s), target {}",
            String::from_utf8_lossy(header.data()),
            difficulty,
            self.config.threads,
            pow.target()
        );

        let ctx = SearchContext {
            pow: &pow,
            header: &header,
            next_nonce: AtomicU64::new(0),
            hashes: AtomicU64::new(0),
            done: AtomicBool::new(false),
            deadline: self.config.timeout.map(|timeout| started + timeout),
            started,
        };

        let (tx, rx) = mpsc::channel();
        let exits: Vec<WorkerExit> = if self.config.threads == 1 {
            vec![self.search_worker(&ctx, 0, &tx)]
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = (0..self.config.threads)
                    .map(|worker_id| {
                        let tx = tx.clone();
                        let ctx = &ctx;
                        scope.spawn(move || self.search_worker(ctx, worker_id, &tx))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(WorkerExit::Finished))
                    .collect()
            })
        };
        drop(tx);

        self.should_stop.store(false, Ordering::SeqCst);
        let stats = self.stats_of(&ctx);
        self.hashes_done.store(stats.hashes, Ordering::Relaxed);

        // The first worker to send wins; later finds are dropped.
        if let Ok(seal) = rx.try_recv() {
            log::info!(
                "Block sealed: nonce {}, hash {}, {} hashes in {:?} ({})",
                seal.nonce,
                hex::encode(seal.hash),
                stats.hashes,
                stats.elapsed,
                stats.format_hash_rate()
            );

            return Ok(MiningOutcome {
                block: Block::from_seal(header, difficulty, seal),
                stats,
            });
        }

        if exits.contains(&WorkerExit::Stopped) {
            log::warn!("Mining stopped after {} hashes", stats.hashes);
            return Err(MiningError::Stopped);
        }

        if exits.contains(&WorkerExit::TimedOut) {
            log::warn!("Mining timed out after {:?}", stats.elapsed);
            return Err(MiningError::Timeout {
                after: stats.elapsed,
            });
        }

        log::error!(
            "Nonce space exhausted at difficulty {} after {} hashes",
            difficulty,
            stats.hashes
        );
        Err(MiningError::SearchExhausted { difficulty })
    }

    /// Claims nonce batches until a seal is found or the search must end.
    fn search_worker(
        &self,
        ctx: &SearchContext<'_>,
        worker_id: usize,
        found: &mpsc::Sender<Seal>,
    ) -> WorkerExit {
        let batch_size = self.config.batch_size;
        let nonce_limit = self.config.nonce_limit.min(MAX_NONCE);
        let mut last_stats_time = ctx.started;

        loop {
            if ctx.done.load(Ordering::SeqCst) {
                return WorkerExit::Finished;
            }
            if self.should_stop.load(Ordering::SeqCst) {
                ctx.done.store(true, Ordering::SeqCst);
                return WorkerExit::Stopped;
            }
            if ctx.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                ctx.done.store(true, Ordering::SeqCst);
                return WorkerExit::TimedOut;
            }

            let start = ctx.next_nonce.fetch_add(batch_size, Ordering::SeqCst);
            if start > nonce_limit {
                return WorkerExit::Exhausted;
            }
            let end = start.saturating_add(batch_size - 1).min(nonce_limit);

            match ctx.pow.find_in(ctx.header, start..=end) {
                Some(seal) => {
                    ctx.hashes
                        .fetch_add(seal.nonce - start + 1, Ordering::Relaxed);
                    ctx.done.store(true, Ordering::SeqCst);
                    let _ = found.send(seal);
                    return WorkerExit::Found;
                }
                None => {
                    ctx.hashes.fetch_add(end - start + 1, Ordering::Relaxed);
                }
            }

            if worker_id == 0 && last_stats_time.elapsed() >= self.config.stats_interval {
                let stats = self.stats_of(ctx);
                let expected = ctx.pow.target().expected_time(stats.hash_rate);
                log::info!(
                    "Mining stats: {} hashes, {}, nonce: {}, elapsed: {:?}, expected: {:?}",
                    stats.hashes,
                    stats.format_hash_rate(),
                    end,
                    stats.elapsed,
                    expected
                );
                last_stats_time = Instant::now();
            }
        }
    }

    /// Statistics of the search running in `ctx`
    fn stats_of(&self, ctx: &SearchContext<'_>) -> SearchStats {
        let elapsed = ctx.started.elapsed();
        let hashes = ctx.hashes.load(Ordering::Relaxed);
        let hash_rate = if elapsed.as_secs_f64() > 0.0 {
            hashes as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        SearchStats {
            hashes,
            elapsed,
            hash_rate,
            threads: self.config.threads,
        }
    }
}

/// Mining errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MiningError {
    #[error("Nonce space exhausted without a valid hash at difficulty {difficulty}")]
    SearchExhausted { difficulty: u32 },
    #[error("Mining stopped by user")]
    Stopped,
    #[error("Mining timeout after {after:?}")]
    Timeout { after: Duration },
    #[error("Difficulty out of range: {bits} (max: {})", crate::MAX_DIFFICULTY)]
    InvalidDifficulty { bits: u32 },
}

impl SearchStats {
    /// Hash rate in human-readable units
    pub fn format_hash_rate(&self) -> String {
        if self.hash_rate >= 1_000_000_000.0 {
            format!("{:.2} GH/s", self.hash_rate / 1_000_000_000.0)
        } else if self.hash_rate >= 1_000_000.0 {
            format!("{:.2} MH/s", self.hash_rate / 1_000_000.0)
        } else if self.hash_rate >= 1_000.0 {
            format!("{:.2} KH/s", self.hash_rate / 1_000.0)
        } else {
            format!("{:.2} H/s", self.hash_rate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MinerConfigBuilder, MAX_DIFFICULTY};

    const TIMESTAMP: i64 = 1704067200;

    fn miner(threads: usize) -> Miner {
        Miner::new(MinerConfigBuilder::new().threads(threads).batch_size(64).build()).unwrap()
    }

    #[test]
    fn test_single_thread_matches_reference_search() {
        let header = BlockHeader::with_timestamp("single", b"prev".to_vec(), TIMESTAMP);
        let expected = Block::seal(header.clone(), 10).unwrap();
        let miner = miner(1);

        let outcome = miner.seal(header, 10).unwrap();

        assert_eq!(outcome.block, expected);
        assert_eq!(outcome.stats.threads, 1);
        assert_eq!(outcome.stats.hashes, outcome.block.nonce() + 1);
        assert_eq!(miner.hashes_done(), outcome.stats.hashes);
    }

    #[test]
    fn test_threaded_search_returns_valid_block() {
        let header = BlockHeader::with_timestamp("threaded", "", TIMESTAMP);

        let outcome = miner(4).seal(header, 12).unwrap();

        assert!(outcome.block.is_valid());
        assert_eq!(outcome.block.difficulty(), 12);
        assert_eq!(outcome.stats.threads, 4);
    }

    #[test]
    fn test_stop_before_search() {
        let miner = miner(2);
        miner.stop();

        let result = miner.seal_block("stopped", "", MAX_DIFFICULTY);
        assert_eq!(result.unwrap_err(), MiningError::Stopped);

        // the flag is consumed by the stopped search
        let outcome = miner.seal_block("after", "", 4).unwrap();
        assert!(outcome.block.is_valid());
    }

    #[test]
    fn test_stop_from_other_thread() {
        let miner = miner(2);
        let handle = miner.stop_handle();

        let result = thread::scope(|scope| {
            let search = scope.spawn(|| miner.seal_block("endless", "", MAX_DIFFICULTY));
            thread::sleep(Duration::from_millis(50));
            handle.store(true, Ordering::SeqCst);
            search.join().unwrap()
        });

        assert_eq!(result.unwrap_err(), MiningError::Stopped);
    }

    #[test]
    fn test_stop_is_consumed_by_finished_search() {
        // one batch covers the whole range, so the worker checks the flag once
        let config = MinerConfigBuilder::new().threads(1).batch_size(u64::MAX).build();
        let miner = Miner::new(config).unwrap();
        let handle = miner.stop_handle();
        // lowest sealing nonce is 1_728_247, far past the first flag check
        let header = BlockHeader::with_timestamp("stop request", "", TIMESTAMP);

        let result = thread::scope(|scope| {
            let search = scope.spawn(|| miner.seal(header, 20));
            thread::sleep(Duration::from_millis(20));
            miner.stop();
            search.join().unwrap()
        });

        // the worker only looks at the flag before its single batch
        let outcome = result.unwrap();
        assert_eq!(outcome.block.nonce(), 1_728_247);
        assert!(!handle.load(Ordering::SeqCst));
        assert!(miner.seal_block("next", "", 4).is_ok());
    }

    #[test]
    fn test_concurrent_seals_keep_separate_stats() {
        let miner = miner(1);

        let outcomes: Vec<MiningOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let miner = &miner;
                    scope.spawn(move || {
                        let header =
                            BlockHeader::with_timestamp(format!("block {i}"), "", TIMESTAMP);
                        miner.seal(header, 10).unwrap()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for outcome in &outcomes {
            assert_eq!(outcome.stats.hashes, outcome.block.nonce() + 1);
        }
        assert!(outcomes
            .iter()
            .any(|outcome| outcome.stats.hashes == miner.hashes_done()));
    }

    #[test]
    fn test_timeout() {
        let config = MinerConfigBuilder::new()
            .threads(1)
            .batch_size(32)
            .timeout(Duration::from_millis(20))
            .build();
        let miner = Miner::new(config).unwrap();

        match miner.seal_block("slow", "", MAX_DIFFICULTY) {
            Err(MiningError::Timeout { after }) => assert!(after >= Duration::from_millis(20)),
            other => panic!("Wrong result: {:?}", other),
        }
    }

    #[test]
    fn test_exhausted_nonce_limit() {
        let config = MinerConfigBuilder::new()
            .threads(3)
            .batch_size(16)
            .nonce_limit(200)
            .build();
        let miner = Miner::new(config).unwrap();

        let result = miner.seal_block("nothing", "", MAX_DIFFICULTY);

        assert_eq!(
            result.unwrap_err(),
            MiningError::SearchExhausted { difficulty: MAX_DIFFICULTY }
        );
        assert_eq!(miner.hashes_done(), 201);
    }

    #[test]
    fn test_invalid_config() {
        let config = MinerConfigBuilder::new().threads(0).build();
        assert!(matches!(Miner::new(config), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    fn test_hash_rate_formatting() {
        let stats = SearchStats {
            hashes: 1000,
            elapsed: Duration::from_secs(1),
            hash_rate: 1_500_000.0,
            threads: 1,
        };

        assert_eq!(stats.format_hash_rate(), "1.50 MH/s");
    }

    #[test]
    fn test_stats_json() {
        let stats = SearchStats {
            hashes: 4096,
            elapsed: Duration::from_millis(1500),
            hash_rate: 2048.0,
            threads: 2,
        };

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["hashes"], 4096);
        assert_eq!(value["threads"], 2);
        assert_eq!(value["elapsed"]["secs"], 1);
        assert_eq!(value["elapsed"]["nanos"], 500_000_000);
    }
}
