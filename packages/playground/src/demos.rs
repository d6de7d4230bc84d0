//! Channel, worker pool and multiplexer demonstrations.

use anyhow::anyhow;
use clap::ValueEnum;
use sluice::{
    channel,
    clock::SystemClock,
    error::SendError,
    pool::{run_batch, PoolConfig},
    producer::PeriodicProducer,
    select::Multiplexer,
};
use std::{
    thread,
    time::{Duration, Instant},
};


// deliberately exponential, to give the workers something to chew on.
fn fib(n: u64) -> u64 {
    if n <= 1 {
        n
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

/// Compute Fibonacci numbers `0..jobs` on a pool of `workers` threads, printing results as they
/// arrive.
pub fn workers(workers: usize, jobs: u64) -> anyhow::Result<()> {
    info!(workers, jobs, "computing fibonacci numbers on worker pool");
    let start = Instant::now();
    let config = PoolConfig::default()
        .with_workers(workers)
        .with_thread_name("fib-worker");
    let results = run_batch(config, 0..jobs, |job| Ok(fib(job.payload)))?;
    for result in &results {
        match &result.outcome {
            Ok(n) => println!("fib({}) = {}", result.job_id, n),
            Err(e) => warn!(%e, "job failed"),
        }
    }
    info!(results = results.len(), elapsed = ?start.elapsed(), "worker pool finished");
    Ok(())
}


#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SelectMode {
    /// Receive from each channel in turn, so the fast one is held back by the slow one
    Naive,
    /// Receive from whichever channel is ready
    Multiplexed,
}

/// Consume two periodic producers of different speeds for a while, either naively or through a
/// multiplexer.
pub fn select(
    mode: SelectMode,
    fast: Duration,
    slow: Duration,
    duration: Duration,
) -> anyhow::Result<()> {
    let (send_fast, recv_fast) = channel(0);
    let (send_slow, recv_slow) = channel(0);
    let clock = SystemClock::new();
    let fast_label = format!("every {:?}", fast);
    let slow_label = format!("every {:?}", slow);
    let fast_producer = PeriodicProducer::new(fast, send_fast, clock, move |_| fast_label.clone())
        .with_name("fast-producer")
        .spawn()?;
    let slow_producer = PeriodicProducer::new(slow, send_slow, clock, move |_| slow_label.clone())
        .with_name("slow-producer")
        .spawn()?;

    info!(?mode, ?duration, "consuming producers");
    let start = Instant::now();
    let mut counts = [0u64; 2];
    match mode {
        SelectMode::Naive => {
            while start.elapsed() < duration {
                let Some(msg) = recv_fast.recv_blocking() else { break };
                println!("{}", msg);
                counts[0] += 1;
                let Some(msg) = recv_slow.recv_blocking() else { break };
                println!("{}", msg);
                counts[1] += 1;
            }
        }
        SelectMode::Multiplexed => {
            let mut mux = Multiplexer::new();
            mux.recv(recv_fast);
            mux.recv(recv_slow);
            while start.elapsed() < duration {
                let Some((index, msg)) = mux.wait_any_blocking() else { break };
                println!("{}", msg);
                counts[index] += 1;
            }
        }
    }

    fast_producer.stop_and_join();
    slow_producer.stop_and_join();
    info!(fast = counts[0], slow = counts[1], "finished consuming");
    Ok(())
}


/// Fill a channel of capacity 2 without any receiver waiting, then drain it.
pub fn buffered() -> anyhow::Result<()> {
    let (send, recv) = channel(2);
    send.try_send("hello")?;
    send.try_send("world")?;
    if let Err(e) = send.try_send("!") {
        info!(%e, "third message does not fit");
    }

    println!("{}", recv.try_recv()?);
    println!("{}", recv.try_recv()?);
    Ok(())
}


/// Count `thing` on a separate thread which closes the channel when done, while the calling
/// thread iterates until the end of the stream.
pub fn count(thing: String, times: u64, interval: Duration) -> anyhow::Result<()> {
    let (send, recv) = channel(0);
    let counter = thread::Builder::new()
        .name("counter".into())
        .spawn(move || -> Result<(), SendError<String>> {
            for _ in 0..times {
                send.send_blocking(thing.clone())?;
                thread::sleep(interval);
            }
            send.close();
            Ok(())
        })?;

    for msg in &recv {
        println!("{}", msg);
    }
    counter
        .join()
        .map_err(|_| anyhow!("counter thread panicked"))??;
    debug!("counter finished");
    Ok(())
}
