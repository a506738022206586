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

//! Implements the `scopescan` run: input loading, the two scan phases,
//! and writer shutdown.

use std::fmt::Write;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use scopescan::blocklist::Blocklist;
use scopescan::cache::Cache;
use scopescan::net::UdpTransport;
use scopescan::scan::{self, PhaseOptions, WRITE_QUEUE_CAPACITY};
use scopescan::worker::WorkQueue;
use scopescan::{input, output};

use crate::args::Args;
use crate::config::{self, Config};

/// The output file for scan rows.
const SCAN_OUTPUT_PATH: &str = "scan.csv.gz";

/// The output file for discovered nameserver pairs.
const NS_OUTPUT_PATH: &str = "nameserver.csv.gz";

/// How long to let in-flight results reach the writers before their
/// queues are stopped.
const WRITER_SETTLE_TIME: Duration = Duration::from_secs(5);

/// Runs the scan.
pub fn run(args: Args) {
    // The logger's default filter comes from the configuration, so the
    // configuration has to be loaded first; problems with it go to
    // stderr directly.
    let config = match config::load_from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}:", args.config.display());
            for (i, cause) in e.chain().enumerate() {
                eprintln!("[{}] {}", i + 1, cause);
            }
            process::exit(1);
        }
    };
    env_logger::init_from_env(
        Env::new().default_filter_or(config.log_filter().to_string().to_ascii_lowercase()),
    );

    if let Err(e) = try_running(&config) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Scan complete; exiting with success.");
}

fn try_running(config: &Config) -> Result<()> {
    info!(
        "scopescan v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    let blocklist = match &config.blocklist_path {
        Some(path) => Blocklist::load(path).context("failed to load the IP exclusion list")?,
        None => Blocklist::empty(),
    };
    let blocklist = Arc::new(blocklist);

    let pairs = input::read_toplist(&config.toplist_fname, config.no_of_domains)
        .context("failed to read the toplist")?;

    // The nameserver writer runs across Phase 1; its queue doubles as
    // the enable flag.
    let mut ns_writer = None;
    let mut ns_sink = None;
    if config.nameserver_writeout {
        let queue = Arc::new(WorkQueue::new(WRITE_QUEUE_CAPACITY));
        let handle = output::spawn_ns_writer(Path::new(NS_OUTPUT_PATH), queue.clone())
            .context("failed to create the nameserver output file")?;
        ns_writer = Some(handle);
        ns_sink = Some(queue);
    }

    // Phase 1: find the authoritative nameserver of every domain. The
    // delegation cache lives exactly as long as this phase; the pairs
    // carry everything the scan phase needs.
    let cache = Arc::new(Cache::new(config.intermediate_depth));
    scan::discover_nameservers(
        &pairs,
        cache,
        blocklist.clone(),
        config.root_server,
        PhaseOptions {
            workers: config.simul_ns_reqs,
            drain_timeout: Duration::from_secs(config.routine_stop_timeout),
        },
        ns_sink.clone(),
        UdpTransport::default,
    )
    .context("failed to run nameserver discovery")?;

    let resolved = pairs.iter().filter(|pair| pair.nsip().is_some()).count();
    info!("{} of {} domains have a nameserver", resolved, pairs.len());

    // Phase 2: probe every resolved pair once per subnet.
    let subnets =
        input::read_subnets(&config.subnets_fname).context("failed to read the subnet list")?;
    let scan_sink = Arc::new(WorkQueue::new(WRITE_QUEUE_CAPACITY));
    let scan_writer = output::spawn_scan_writer(Path::new(SCAN_OUTPUT_PATH), scan_sink.clone())
        .context("failed to create the scan output file")?;

    for (i, subnet) in subnets.iter().enumerate() {
        info!("scanning subnet {} of {}: {}", i + 1, subnets.len(), subnet);
        scan::scan_subnet(
            &pairs,
            *subnet,
            blocklist.clone(),
            PhaseOptions {
                workers: config.simul_ecs_reqs,
                drain_timeout: Duration::from_secs(config.routine_stop_timeout),
            },
            scan_sink.clone(),
            UdpTransport::default,
        )
        .context("failed to run the ECS scan")?;
    }

    // Let stragglers reach the writers, then shut them down.
    thread::sleep(WRITER_SETTLE_TIME);
    scan_sink.stop();
    if let Some(queue) = &ns_sink {
        queue.stop();
    }
    if scan_writer.join().is_err() {
        error!("the scan writer panicked");
    }
    if let Some(handle) = ns_writer {
        if handle.join().is_err() {
            error!("the nameserver writer panicked");
        }
    }
    Ok(())
}
