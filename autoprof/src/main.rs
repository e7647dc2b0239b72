//! # autoprof - Demo Entry Point
//!
//! Runs a small fan-in workload (producer threads feeding one consumer) and
//! captures the selected profile of it on every SIGQUIT.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};

use autoprof::cli::Args;
use autoprof::{block_tracked, lock_tracked, CaptureConfig, Orchestrator, TrackingAllocator};

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator::system();

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

/// Messages kept in the shared history
const HISTORY_LIMIT: usize = 256;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.capture_config(CaptureConfig::from_env());

    if !args.quiet {
        println!("autoprof v{}", env!("CARGO_PKG_VERSION"));
        println!("profile: {}", args.profile);
        println!("viewer: {}", config.viewer());
        println!("artifacts: {}", config.artifacts().dir().display());
    }

    let handle = Orchestrator::builder(args.profile())
        .config(&config)
        .spawn()
        .context("Failed to start profile capture")?;

    let history = Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)));
    let (tx, rx) = unbounded();
    for worker in 0..args.workers.max(1) {
        spawn_producer(worker, tx.clone(), Arc::clone(&history))?;
    }
    drop(tx);

    let deadline = (args.run_for > 0).then(|| Instant::now() + Duration::from_secs(args.run_for));
    let received = consume(&rx, deadline, args.quiet);

    let stats = handle.stats();
    info!(
        "received {received} messages, {} captures ({} failed), {} viewer runs ({} failed)",
        stats.captured, stats.capture_failures, stats.viewer_invocations, stats.viewer_failures
    );
    if !args.quiet {
        println!("You're boring: I'm leaving");
    }
    Ok(())
}

/// A named producer that burns some CPU, records into the shared history,
/// and sends a message, at a jittered pace.
fn spawn_producer(
    worker: usize,
    tx: Sender<String>,
    history: Arc<Mutex<VecDeque<String>>>,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("producer-{worker}"))
        .spawn(move || {
            for n in 0u64.. {
                let digest = busy_hash(worker as u64, n);
                let message = format!("producer-{worker} {n} ({digest:016x})");

                if let Ok(mut history) = lock_tracked(&history, "history::push") {
                    remember(&mut history, message.clone());
                }

                if tx.send(message).is_err() {
                    debug!("producer-{worker} stopping, consumer gone");
                    return;
                }
                std::thread::sleep(jitter(worker as u64, n));
            }
        })
        .with_context(|| format!("Failed to spawn producer-{worker}"))?;
    Ok(())
}

/// Append to the history, dropping the oldest entry once it is full
fn remember(history: &mut VecDeque<String>, message: String) {
    if history.len() >= HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(message);
}

fn consume(rx: &Receiver<String>, deadline: Option<Instant>, quiet: bool) -> u64 {
    let mut received = 0;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return received;
        }
        match block_tracked("fan-in::recv", || rx.recv_timeout(Duration::from_millis(200))) {
            Ok(message) => {
                received += 1;
                if !quiet {
                    println!("{message}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return received,
        }
    }
}

/// Deterministic pseudo-random pause between 0 and ~1s
fn jitter(worker: u64, n: u64) -> Duration {
    let x = (worker + 1)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(n.wrapping_mul(1_442_695_040_888_963_407));
    Duration::from_millis((x >> 33) % 1000)
}

/// CPU work for the CPU profile to find
fn busy_hash(worker: u64, n: u64) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325_u64 ^ worker;
    for i in 0..200_000u64 {
        h ^= i.wrapping_add(n);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_bounded() {
        for worker in 0..4 {
            for n in 0..100 {
                assert!(jitter(worker, n) < Duration::from_secs(1));
            }
        }
    }

    #[test]
    fn test_history_keeps_newest() {
        let mut history = VecDeque::new();
        for n in 0..HISTORY_LIMIT + 10 {
            remember(&mut history, n.to_string());
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.front().map(String::as_str), Some("10"));
        assert_eq!(history.back(), Some(&(HISTORY_LIMIT + 9).to_string()));
    }

    #[test]
    fn test_global_allocator_is_tracked() {
        assert!(autoprof::runtime::heap::tracking_installed());
    }

    #[test]
    fn test_consume_stops_when_producers_gone() {
        let (tx, rx) = unbounded();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);
        assert_eq!(consume(&rx, None, true), 2);
    }
}
