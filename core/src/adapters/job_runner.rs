//! Job runners: a real one backed by rayon's global thread pool, and a null
//! one that runs everything inline on the caller's thread. Both give the
//! same semantics — only wall-clock time differs.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{Error, Result};
use crate::ports::JobRunner;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked with a non-string payload".to_string()
    }
}

fn run_one<T>(f: &(impl Fn(usize) -> Result<T> + Sync), i: usize) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(|| f(i))) {
        Ok(r) => r,
        Err(payload) => Err(Error::JobPanic(panic_message(payload))),
    }
}

/// Submits one rayon task per index and blocks until all complete.
#[derive(Clone, Copy, Default)]
pub struct RayonJobRunner;

impl RayonJobRunner {
    pub fn new() -> Self {
        Self
    }
}

impl JobRunner for RayonJobRunner {
    fn run_indexed<T, F>(&self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map(|i| run_one(&f, i))
            .collect::<Result<Vec<T>>>()
            .map_err(|e| Error::JobFailure(Box::new(e)))
    }
}

/// Runs every job inline, in index order, on the caller's thread. Identical
/// semantics to the parallel runner, just single-threaded — useful in
/// tests and for small inputs where spinning up the pool isn't worth it.
#[derive(Clone, Copy, Default)]
pub struct InlineJobRunner;

impl InlineJobRunner {
    pub fn new() -> Self {
        Self
    }
}

impl JobRunner for InlineJobRunner {
    fn run_indexed<T, F>(&self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        (0..n)
            .map(|i| run_one(&f, i))
            .collect::<Result<Vec<T>>>()
            .map_err(|e| Error::JobFailure(Box::new(e)))
    }
}
