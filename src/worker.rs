// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Work queues and worker pools.
//!
//! A scan runs as fixed-size pools of OS threads draining bounded
//! queues. Shutdown is time-based: the feeder stops a queue after a
//! drain timeout, and workers obey the stop signal even if items
//! remain, because under tail latency "the queue looks empty" is not a
//! reliable completion signal.

use std::collections::VecDeque;
use std::io;
use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::error;

////////////////////////////////////////////////////////////////////////
// WORK QUEUES                                                        //
////////////////////////////////////////////////////////////////////////

/// A bounded multi-producer multi-consumer queue with a stop signal.
///
/// [`WorkQueue::push`] blocks while the queue is full, providing
/// backpressure toward the feeder. [`WorkQueue::take`] blocks until an
/// item arrives or the queue is stopped; after [`WorkQueue::stop`],
/// `take` returns `None` immediately (even if items remain) and
/// `push` refuses new items.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,

    /// Wakes consumers blocked in `take`. Used with the `state` mutex.
    take_wakeup: Condvar,

    /// Wakes producers blocked in `push`. Used with the `state` mutex.
    put_wakeup: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    stopped: bool,
}

impl<T> WorkQueue<T> {
    /// Creates a new queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            capacity,
            take_wakeup: Condvar::new(),
            put_wakeup: Condvar::new(),
        }
    }

    /// Enqueues `item`, blocking while the queue is full. Returns
    /// whether the item was accepted; a stopped queue accepts nothing.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped {
                return false;
            } else if state.items.len() < self.capacity {
                break;
            }
            state = self.put_wakeup.wait(state).unwrap();
        }
        state.items.push_back(item);
        self.take_wakeup.notify_one();
        true
    }

    /// Dequeues an item, blocking until one is available. Returns
    /// `None` once the queue has been stopped.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped {
                return None;
            } else if let Some(item) = state.items.pop_front() {
                self.put_wakeup.notify_one();
                return Some(item);
            }
            state = self.take_wakeup.wait(state).unwrap();
        }
    }

    /// Stops the queue, waking all blocked producers and consumers.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        self.take_wakeup.notify_all();
        self.put_wakeup.notify_all();
    }
}

////////////////////////////////////////////////////////////////////////
// WORKER POOLS                                                       //
////////////////////////////////////////////////////////////////////////

/// A fixed group of named worker threads.
///
/// Workers are plain one-shot threads: each runs its task to completion
/// (normally until its [`WorkQueue`] is stopped) and exits. A crashed
/// worker is not respawned: a scan is a batch job, and resurrecting a
/// worker mid-drain would only distort the measurement.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `count` threads named `<name> worker <i>`, each running
    /// the task produced for its index by `make_task`.
    pub fn start<F, W>(name: &str, count: usize, make_task: F) -> io::Result<Self>
    where
        F: Fn(usize) -> W,
        W: FnOnce() + Send + 'static,
    {
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let handle = thread::Builder::new()
                .name(format!("{} worker {}", name, i))
                .spawn(make_task(i))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Waits for every worker to exit, logging any panics.
    pub fn join(self) {
        for handle in self.handles {
            let name = handle
                .thread()
                .name()
                .unwrap_or("anonymous")
                .to_owned();
            if handle.join().is_err() {
                error!("thread {} panicked", name);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
