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

//! The two scan phases.
//!
//! A scan proceeds in strict order: first every input domain is pushed
//! through the iterative resolver to discover its authoritative
//! nameserver (Phase 1); then, for each subnet in the input list, every
//! resolved `(domain, nameserver)` pair is probed with an ECS query
//! (Phase 2). Phase 1 finishes completely before Phase 2 starts, so
//! every pair either carries its nameserver address or is skipped.
//!
//! Within a phase there is no ordering: workers drain a shared queue
//! and the output is a multiset. The feeder shuffles the domain list,
//! pushes everything, sleeps for a configured drain timeout, and then
//! stops the queue; workers exit on the stop signal rather than on
//! queue exhaustion, which is imprecise under tail latency.

use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use ipnet::Ipv4Net;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::blocklist::Blocklist;
use crate::cache::Cache;
use crate::name::Domain;
use crate::net::Transport;
use crate::probe::Prober;
use crate::resolver::Resolver;
use crate::worker::{WorkQueue, WorkerPool};

/// The capacity of the domain queue feeding a phase's workers.
pub const DOMAIN_QUEUE_CAPACITY: usize = 256;

/// The capacity of the queues feeding the output writers. These are
/// deep so that bursts of results never block the probing workers.
pub const WRITE_QUEUE_CAPACITY: usize = 4096;

////////////////////////////////////////////////////////////////////////
// SCAN DATA                                                          //
////////////////////////////////////////////////////////////////////////

/// An input domain together with the authoritative nameserver address
/// discovered for it.
///
/// The address is written at most once, by Phase 1; Phase 2 only reads
/// it and skips pairs where discovery came up empty.
#[derive(Debug)]
pub struct DomainNsPair {
    domain: Domain,
    nsip: OnceLock<Ipv4Addr>,
}

impl DomainNsPair {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            nsip: OnceLock::new(),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn nsip(&self) -> Option<Ipv4Addr> {
        self.nsip.get().copied()
    }

    /// Records the discovered nameserver address. Returns whether this
    /// call was the one that set it.
    pub fn record_nsip(&self, nsip: Ipv4Addr) -> bool {
        self.nsip.set(nsip).is_ok()
    }
}

/// One row of scan output: the outcome of probing `pair` with
/// `req_subnet`. Empty answer fields are recorded as such; a server
/// that ignores ECS is a result, not an error.
#[derive(Debug)]
pub struct ScanItem {
    pub pair: Arc<DomainNsPair>,
    pub req_subnet: Ipv4Net,
    pub ans_subnet: Option<Ipv4Net>,
    pub ans_scope: Option<u8>,
    pub ans_ips: Vec<Ipv4Addr>,
}

/// Per-phase tuning: the worker-pool size and how long to keep workers
/// alive after the feeder has pushed the last domain.
#[derive(Clone, Copy, Debug)]
pub struct PhaseOptions {
    pub workers: usize,
    pub drain_timeout: Duration,
}

////////////////////////////////////////////////////////////////////////
// PHASE 1: NAMESERVER DISCOVERY                                      //
////////////////////////////////////////////////////////////////////////

/// Runs Phase 1: resolves every pair's domain and records the
/// authoritative nameserver that answered. Pairs that resolve are
/// forwarded to `ns_sink` (when nameserver write-out is enabled).
///
/// `make_transport` constructs one transport per worker; production
/// callers pass `UdpTransport::default`.
pub fn discover_nameservers<T, F>(
    pairs: &[Arc<DomainNsPair>],
    cache: Arc<Cache>,
    blocklist: Arc<Blocklist>,
    root_server: Ipv4Addr,
    options: PhaseOptions,
    ns_sink: Option<Arc<WorkQueue<Arc<DomainNsPair>>>>,
    make_transport: F,
) -> io::Result<()>
where
    T: Transport + Send + 'static,
    F: Fn() -> T,
{
    info!(
        "starting {} nameserver discovery workers",
        options.workers
    );
    let started = Instant::now();
    let queue: Arc<WorkQueue<Arc<DomainNsPair>>> = Arc::new(WorkQueue::new(DOMAIN_QUEUE_CAPACITY));
    let pool = WorkerPool::start("ns", options.workers, |_| {
        let queue = queue.clone();
        let cache = cache.clone();
        let blocklist = blocklist.clone();
        let ns_sink = ns_sink.clone();
        let transport = make_transport();
        move || {
            let mut resolver = Resolver::new(
                cache,
                blocklist,
                transport,
                root_server,
                SmallRng::from_entropy(),
            );
            while let Some(pair) = queue.take() {
                let query_started = Instant::now();
                let resolution = resolver.resolve(pair.domain());
                let elapsed = query_started.elapsed().as_millis();
                let resolution = match resolution {
                    Some(resolution) => resolution,
                    None => {
                        debug!("domain {} did not resolve ({} ms)", pair.domain(), elapsed);
                        continue;
                    }
                };
                debug!(
                    "domain: {} answers: {:?} auth nameserver: {:?} took: {} ms",
                    pair.domain(),
                    resolution.ips,
                    resolution.server,
                    elapsed
                );
                if let Some(server) = resolution.server {
                    if pair.record_nsip(server) {
                        if let Some(sink) = &ns_sink {
                            sink.push(pair.clone());
                        }
                    }
                }
            }
        }
    })?;

    feed_shuffled(&queue, pairs);
    info!("waiting to end nameserver discovery workers");
    thread::sleep(options.drain_timeout);
    queue.stop();
    pool.join();
    info!(
        "nameserver discovery finished in {} s",
        started.elapsed().as_secs()
    );
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// PHASE 2: ECS SCANNING                                              //
////////////////////////////////////////////////////////////////////////

/// Runs one round of Phase 2: probes every resolved pair with an ECS
/// query declaring `subnet`, emitting one [`ScanItem`] per attempt to
/// `scan_sink`. Pairs without a discovered nameserver are skipped.
pub fn scan_subnet<T, F>(
    pairs: &[Arc<DomainNsPair>],
    subnet: Ipv4Net,
    blocklist: Arc<Blocklist>,
    options: PhaseOptions,
    scan_sink: Arc<WorkQueue<ScanItem>>,
    make_transport: F,
) -> io::Result<()>
where
    T: Transport + Send + 'static,
    F: Fn() -> T,
{
    info!("starting {} ecs scan workers for {}", options.workers, subnet);
    let queue: Arc<WorkQueue<Arc<DomainNsPair>>> = Arc::new(WorkQueue::new(DOMAIN_QUEUE_CAPACITY));
    let pool = WorkerPool::start("ecs", options.workers, |_| {
        let queue = queue.clone();
        let blocklist = blocklist.clone();
        let scan_sink = scan_sink.clone();
        let transport = make_transport();
        move || {
            let mut prober = Prober::new(blocklist, transport, SmallRng::from_entropy());
            while let Some(pair) = queue.take() {
                let nsip = match pair.nsip() {
                    Some(nsip) => nsip,
                    None => continue,
                };
                let result = prober.probe(pair.domain(), nsip, subnet);
                scan_sink.push(ScanItem {
                    pair,
                    req_subnet: subnet,
                    ans_subnet: result.ecs_subnet,
                    ans_scope: result.ecs_scope,
                    ans_ips: result.ips,
                });
            }
        }
    })?;

    feed_shuffled(&queue, pairs);
    info!("waiting to end this round");
    thread::sleep(options.drain_timeout);
    queue.stop();
    pool.join();
    Ok(())
}

/// Pushes every pair into `queue` in a fresh random order. Stops early
/// if the queue is stopped underneath us.
fn feed_shuffled(queue: &WorkQueue<Arc<DomainNsPair>>, pairs: &[Arc<DomainNsPair>]) {
    let mut order: Vec<Arc<DomainNsPair>> = pairs.to_vec();
    order.shuffle(&mut rand::thread_rng());
    for pair in order {
        if !queue.push(pair) {
            break;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
