//! Background compilation of cached passes on worker threads.

use std::{sync::Arc, thread};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use super::{PassCache, PassHandle};

struct Job {
    handle: PassHandle,
    name: String,
}

/// Result of one deferred compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub name: String,
    pub hash: u32,
    pub success: bool,
}

/// Worker pool that compiles submitted passes.
///
/// Queued jobs own a [`PassHandle`], so their passes survive garbage
/// collection until compiled.
pub struct DeferredCompiler {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<CompileOutcome>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl DeferredCompiler {
    pub fn spawn(cache: Arc<PassCache>, workers: usize) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<CompileOutcome>();

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let cache = Arc::clone(&cache);
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("pass-compile-{index}"))
                .spawn(move || run_worker(&cache, job_rx, outcome_tx))
                .with_context(|| format!("failed to spawn pass compile worker {index}"))?;
            handles.push(handle);
        }

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            workers: handles,
        })
    }

    /// Spawn with the worker count from the cache config.
    pub fn from_config(cache: Arc<PassCache>) -> Result<Self> {
        let workers = cache.config().deferred_workers;
        Self::spawn(cache, workers)
    }

    pub fn submit(&self, handle: PassHandle, name: impl Into<String>) {
        let job = Job {
            handle,
            name: name.into(),
        };
        if let Some(jobs) = &self.jobs {
            // Workers only exit once the sender is gone, so this cannot fail.
            let _ = jobs.send(job);
        }
    }

    /// Close the queue, wait for the workers and collect every outcome.
    pub fn finish(mut self) -> Vec<CompileOutcome> {
        self.shutdown();
        self.outcomes.try_iter().collect()
    }

    fn shutdown(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("[pass] compile worker panicked");
            }
        }
    }
}

impl Drop for DeferredCompiler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(cache: &PassCache, jobs: Receiver<Job>, outcomes: Sender<CompileOutcome>) {
    for Job { handle, name } in jobs.iter() {
        let success = cache.compile_pass(&handle, &name);
        debug!("[pass] deferred compile of {name}: {success}");
        let _ = outcomes.send(CompileOutcome {
            name,
            hash: handle.hash(),
            success,
        });
    }
}
