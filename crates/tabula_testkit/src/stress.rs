//! Stress tests for Tabula.
//!
//! These helpers run many threads, each with its own handle on one file,
//! and count the transactions that succeeded or broke an invariant.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tabula_core::{ColumnType, CoreResult, Durability, SharedGroup};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions performed.
    pub total_ops: usize,
    /// Transactions that completed and saw consistent data.
    pub successful_ops: usize,
    /// Transactions that failed or saw inconsistent data.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total transactions: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tx/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of accounts in the transfer test.
    pub accounts: usize,
    /// Durability of the file.
    pub durability: Durability,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            accounts: 16,
            durability: Durability::MemOnly,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record(&self, ok: bool) {
        let counter = if ok { &self.successful } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn result(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

/// Every thread increments one shared counter `operations` times.
///
/// The caller checks that the counter ends at `threads * operations`; any
/// lost update means two writers overlapped.
pub fn stress_concurrent_increments(path: &Path, config: &StressConfig) -> StressTestResult {
    let setup = SharedGroup::open(path, config.durability, false).expect("open");
    {
        let wt = setup.begin_write().expect("begin_write");
        let t = wt.get_table("counter").expect("get_table");
        if t.column_count().expect("column_count") == 0 {
            t.add_column(ColumnType::Int, "n").expect("add_column");
            t.add_empty_row().expect("add_empty_row");
        }
        wt.commit().expect("commit");
    }

    let counters = Arc::new(Counters::default());
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let path = path.to_path_buf();
            let counters = Arc::clone(&counters);
            let (operations, durability) = (config.operations, config.durability);
            thread::spawn(move || {
                let db = SharedGroup::open(&path, durability, true).expect("open");
                for _ in 0..operations {
                    counters.record(increment(&db).is_ok());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    drop(setup);
    counters.result(start)
}

fn increment(db: &SharedGroup) -> CoreResult<()> {
    let wt = db.begin_write()?;
    let t = wt.get_table("counter")?;
    let n = t.get_long(0, 0)?;
    t.set_long(0, 0, n + 1)?;
    wt.commit().map(|_| ())
}

/// Writers move money between accounts while readers check that every
/// snapshot they see still sums to the starting total.
///
/// Half the threads write, half read. A reader transaction that sees a
/// different total counts as failed.
pub fn stress_snapshot_transfers(path: &Path, config: &StressConfig) -> StressTestResult {
    const BALANCE: i64 = 1_000;
    let accounts = config.accounts.max(2);
    let setup = SharedGroup::open(path, config.durability, false).expect("open");
    {
        let wt = setup.begin_write().expect("begin_write");
        let t = wt.get_table("accounts").expect("get_table");
        t.add_column(ColumnType::Int, "balance").expect("add_column");
        t.add_empty_rows(accounts).expect("add_empty_rows");
        for row in 0..accounts {
            t.set_long(0, row, BALANCE).expect("set_long");
        }
        wt.commit().expect("commit");
    }
    let total = BALANCE * accounts as i64;

    let counters = Arc::new(Counters::default());
    let writing = Arc::new(AtomicUsize::new(config.threads.div_ceil(2)));
    let stop = Arc::new(AtomicBool::new(false));
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let path = path.to_path_buf();
            let counters = Arc::clone(&counters);
            let writing = Arc::clone(&writing);
            let stop = Arc::clone(&stop);
            let (operations, durability) = (config.operations, config.durability);
            thread::spawn(move || {
                let db = SharedGroup::open(&path, durability, true).expect("open");
                if t % 2 == 0 {
                    for i in 0..operations {
                        let from = (t + i) % accounts;
                        let to = (t + 3 * i + 1) % accounts;
                        counters.record(transfer(&db, from, to, (i % 7) as i64).is_ok());
                    }
                    if writing.fetch_sub(1, Ordering::AcqRel) == 1 {
                        stop.store(true, Ordering::Release);
                    }
                } else {
                    while !stop.load(Ordering::Acquire) {
                        counters.record(sum_balances(&db).is_ok_and(|sum| sum == total));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    drop(setup);
    counters.result(start)
}

fn transfer(db: &SharedGroup, from: usize, to: usize, amount: i64) -> CoreResult<()> {
    let wt = db.begin_write()?;
    let t = wt.get_table("accounts")?;
    let a = t.get_long(0, from)?;
    t.set_long(0, from, a - amount)?;
    let b = t.get_long(0, to)?;
    t.set_long(0, to, b + amount)?;
    wt.commit().map(|_| ())
}

fn sum_balances(db: &SharedGroup) -> CoreResult<i64> {
    let rt = db.begin_read()?;
    let t = rt.get_table("accounts")?;
    let mut sum = 0;
    for row in 0..t.size()? {
        sum += t.get_long(0, row)?;
    }
    rt.end_read()?;
    Ok(sum)
}
