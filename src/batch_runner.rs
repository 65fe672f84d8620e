/*!
# Batch Runner
Drives a set of worker tasks over an input stream in fixed-size batches.
One reader thread cuts the input into batches and feeds them through a bounded queue; each worker pulls whole batches, processes them, and sends the results back.
Results are written in input order regardless of which worker finished first.
After the input is exhausted every worker gets one `drain` call, whose output is written after all regular batches.

A failure in any worker (or in reading the input) stops the run: remaining batches are discarded and the error is returned.
*/
use anyhow::{anyhow, ensure, Context};
use derive_builder::Builder;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// Controls batching and parallelism
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct RunnerConfig {
    /// Lines per batch
    batch_size: usize,
    /// Maximum number of batches waiting for a worker
    queue_capacity: usize
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            queue_capacity: 16
        }
    }
}

impl RunnerConfig {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

/// Work done by one worker
pub trait BatchTask: Send {
    type Output: Send;

    /// Called once on the worker thread before any batch
    fn pre(&mut self) -> anyhow::Result<()>;

    /// Processes one batch of raw input lines
    fn apply(&mut self, batch: Vec<String>) -> anyhow::Result<Vec<Self::Output>>;

    /// Called once after the input is exhausted; may return records that were held back
    fn drain(&mut self) -> anyhow::Result<Vec<Self::Output>>;

    /// Called once on the worker thread after `drain`
    fn post(&mut self) -> anyhow::Result<()>;
}

/// Counters for one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStatistics {
    /// Input lines read, including headers and blank lines that reached the workers
    pub input_lines: u64,
    /// Batches dispatched to workers
    pub batches: u64,
    /// Records returned from regular batches
    pub batch_records: u64,
    /// Records returned from the drain step
    pub drained_records: u64
}

enum WorkerMessage<O> {
    Batch { index: u64, records: Vec<O> },
    Drained(Vec<O>),
    Failed(anyhow::Error)
}

type BatchQueue = Mutex<Receiver<(u64, Vec<String>)>>;

/// Runs `tasks` (one worker per task) over `lines`, passing results to `sink` in input order.
/// # Arguments
/// * `lines` - the input stream
/// * `tasks` - one task per worker thread
/// * `config` - batching controls
/// * `sink` - receives each batch's results on the calling thread; drained records come last
/// # Errors
/// * if no tasks are provided
/// * if reading the input fails
/// * if any task or the sink returns an error
pub fn run_batches<I, T, W>(lines: I, tasks: Vec<T>, config: &RunnerConfig, mut sink: W) -> anyhow::Result<RunStatistics>
where
    I: Iterator<Item = std::io::Result<String>> + Send,
    T: BatchTask,
    W: FnMut(Vec<T::Output>) -> anyhow::Result<()>
{
    ensure!(!tasks.is_empty(), "At least one worker task is required");
    let batch_size = config.batch_size().max(1);
    let num_workers = tasks.len();

    let (batch_tx, batch_rx) = mpsc::sync_channel::<(u64, Vec<String>)>(config.queue_capacity().max(1));
    let batch_rx: BatchQueue = Mutex::new(batch_rx);
    let (result_tx, result_rx) = mpsc::channel::<WorkerMessage<T::Output>>();
    let abort = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for (worker_index, mut task) in tasks.into_iter().enumerate() {
            let result_tx = result_tx.clone();
            let batch_rx = &batch_rx;
            let abort = &abort;
            scope.spawn(move || {
                if let Err(e) = run_worker(&mut task, batch_rx, &result_tx, abort) {
                    abort.store(true, Ordering::SeqCst);
                    let _ = result_tx.send(WorkerMessage::Failed(e.context(format!("Worker {worker_index} failed"))));
                    // keep the queue moving so the reader never blocks
                    discard_remaining(batch_rx);
                }
                trace!("Worker {worker_index} exiting");
            });
        }
        drop(result_tx);

        let reader_abort = &abort;
        let reader = scope.spawn(move || -> anyhow::Result<(u64, u64)> {
            let mut batch = Vec::with_capacity(batch_size);
            let mut batch_index = 0;
            let mut line_count = 0;
            for line in lines {
                if reader_abort.load(Ordering::SeqCst) {
                    break;
                }
                let line = match line.context("Error while reading input:") {
                    Ok(l) => l,
                    Err(e) => {
                        reader_abort.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                };
                line_count += 1;
                batch.push(line);
                if batch.len() == batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    batch_tx.send((batch_index, full)).map_err(|_| anyhow!("All workers exited early"))?;
                    batch_index += 1;
                }
            }
            if !batch.is_empty() && !reader_abort.load(Ordering::SeqCst) {
                batch_tx.send((batch_index, batch)).map_err(|_| anyhow!("All workers exited early"))?;
                batch_index += 1;
            }
            Ok((batch_index, line_count))
        });

        // collect on this thread, writing batches as soon as they are in order
        let mut stats = RunStatistics::default();
        let mut pending: BTreeMap<u64, Vec<T::Output>> = BTreeMap::new();
        let mut next_index = 0;
        let mut drained = vec![];
        let mut failure: Option<anyhow::Error> = None;
        for message in result_rx.iter() {
            match message {
                WorkerMessage::Batch { index, records } => {
                    pending.insert(index, records);
                    while let Some(records) = pending.remove(&next_index) {
                        next_index += 1;
                        stats.batch_records += records.len() as u64;
                        if failure.is_none() {
                            if let Err(e) = sink(records) {
                                abort.store(true, Ordering::SeqCst);
                                failure = Some(e);
                            }
                        }
                    }
                },
                WorkerMessage::Drained(records) => drained.extend(records),
                WorkerMessage::Failed(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        let (batch_count, line_count) = reader.join()
            .map_err(|_| anyhow!("Input reader thread panicked"))??;
        if let Some(e) = failure {
            return Err(e);
        }
        ensure!(
            next_index == batch_count && pending.is_empty(),
            "Only {next_index} of {batch_count} batches were returned by {num_workers} workers"
        );

        stats.input_lines = line_count;
        stats.batches = batch_count;
        stats.drained_records = drained.len() as u64;
        if !drained.is_empty() {
            sink(drained)?;
        }
        debug!("Batch run complete: {stats:?}");
        Ok(stats)
    })
}

/// Pulls batches until the queue closes, then drains the task
fn run_worker<T: BatchTask>(
    task: &mut T,
    batch_rx: &BatchQueue,
    result_tx: &Sender<WorkerMessage<T::Output>>,
    abort: &AtomicBool
) -> anyhow::Result<()> {
    task.pre()?;
    loop {
        let next = {
            let receiver = batch_rx.lock().map_err(|_| anyhow!("Batch queue lock was poisoned"))?;
            receiver.recv()
        };
        let Ok((index, batch)) = next else {
            // queue closed, input exhausted
            break;
        };
        if abort.load(Ordering::SeqCst) {
            continue;
        }
        let records = task.apply(batch)?;
        result_tx.send(WorkerMessage::Batch { index, records })
            .map_err(|_| anyhow!("Result channel closed"))?;
    }

    if !abort.load(Ordering::SeqCst) {
        let drained = task.drain()?;
        if !drained.is_empty() {
            result_tx.send(WorkerMessage::Drained(drained))
                .map_err(|_| anyhow!("Result channel closed"))?;
        }
    }
    task.post()
}

fn discard_remaining(batch_rx: &BatchQueue) {
    loop {
        let next = match batch_rx.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return
        };
        if next.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Parses each line as a number; the last worker to drain emits a sentinel
    struct NumberTask {
        finished: Arc<AtomicUsize>,
        num_workers: usize,
        fail_on: Option<u64>
    }

    impl BatchTask for NumberTask {
        type Output = u64;

        fn pre(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn apply(&mut self, batch: Vec<String>) -> anyhow::Result<Vec<u64>> {
            let mut values = vec![];
            for line in batch.iter() {
                let value: u64 = line.parse()?;
                if Some(value) == self.fail_on {
                    anyhow::bail!("bad value {value}");
                }
                values.push(value);
            }
            Ok(values)
        }

        fn drain(&mut self) -> anyhow::Result<Vec<u64>> {
            let previous = self.finished.fetch_add(1, Ordering::SeqCst);
            if previous + 1 == self.num_workers {
                Ok(vec![u64::MAX])
            } else {
                Ok(vec![])
            }
        }

        fn post(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn tasks(num_workers: usize, fail_on: Option<u64>) -> Vec<NumberTask> {
        let finished = Arc::new(AtomicUsize::new(0));
        (0..num_workers).map(|_| NumberTask { finished: finished.clone(), num_workers, fail_on }).collect()
    }

    fn input(count: u64) -> impl Iterator<Item = std::io::Result<String>> + Send {
        (0..count).map(|i| Ok(i.to_string()))
    }

    #[test]
    fn test_ordered_output() {
        let config = RunnerConfigBuilder::default()
            .batch_size(7)
            .queue_capacity(2)
            .build().unwrap();
        let mut output = vec![];
        let stats = run_batches(input(1000), tasks(4, None), &config, |records| {
            output.extend(records);
            Ok(())
        }).unwrap();

        let mut expected: Vec<u64> = (0..1000).collect();
        expected.push(u64::MAX);
        assert_eq!(output, expected);
        assert_eq!(stats, RunStatistics {
            input_lines: 1000,
            batches: 143,
            batch_records: 1000,
            drained_records: 1
        });
    }

    #[test]
    fn test_empty_input() {
        let mut output = vec![];
        let stats = run_batches(input(0), tasks(3, None), &RunnerConfig::default(), |records| {
            output.extend(records);
            Ok(())
        }).unwrap();
        assert_eq!(output, vec![u64::MAX]);
        assert_eq!(stats.batches, 0);
    }

    #[test]
    fn test_worker_failure() {
        let config = RunnerConfigBuilder::default().batch_size(10).build().unwrap();
        let result = run_batches(input(500), tasks(2, Some(123)), &config, |_records| Ok(()));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("bad value 123"));
    }

    #[test]
    fn test_no_tasks() {
        let result = run_batches(input(5), Vec::<NumberTask>::new(), &RunnerConfig::default(), |_records| Ok(()));
        assert!(result.is_err());
    }
}
