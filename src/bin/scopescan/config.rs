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

//! Implements the scan configuration file.

use std::fmt::Write;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::Level::Debug;
use log::LevelFilter;
use log::{debug, log_enabled};
use serde::Deserialize;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the scan configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config =
        fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        serde_yaml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Toplist:            {} ({} domains)\n\
         Subnets:            {}\n\
         Root server:        {}\n\
         Pools (ns/ecs):     {}/{}\n\
         Drain timeout:      {} s\n\
         Intermediate depth: {}\n\
         NS write-out:       {}",
        config.toplist_fname.display(),
        config.no_of_domains,
        config.subnets_fname.display(),
        config.root_server,
        config.simul_ns_reqs,
        config.simul_ecs_reqs,
        config.routine_stop_timeout,
        config.intermediate_depth,
        config.nameserver_writeout,
    );
    match &config.blocklist_path {
        Some(path) => write!(message, "\nBlocklist:          {}", path.display()).unwrap(),
        None => message.push_str("\nBlocklist:          none"),
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log gating: 0 is silent, 5 logs every cache update.
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,

    /// Whether to also emit the discovered `(domain, nsip)` pairs.
    #[serde(default)]
    pub nameserver_writeout: bool,

    pub toplist_fname: PathBuf,
    pub subnets_fname: PathBuf,

    /// How many toplist rows to scan; -1 scans all of them.
    #[serde(default = "default_no_of_domains")]
    pub no_of_domains: i64,

    #[serde(default = "default_pool_size")]
    pub simul_ecs_reqs: usize,
    #[serde(default = "default_pool_size")]
    pub simul_ns_reqs: usize,

    /// Seconds to let workers drain after the feeder has pushed the
    /// last domain of a phase.
    #[serde(default = "default_stop_timeout")]
    pub routine_stop_timeout: u64,

    /// Cache-trie label compression depth; 0 disables compression.
    #[serde(default)]
    pub intermediate_depth: usize,

    /// Optional path to an IP exclusion list; an absent file is
    /// silently skipped.
    #[serde(default)]
    pub blocklist_path: Option<PathBuf>,

    /// The root server every resolution starts from. The default is
    /// k.root-servers.net, operated by RIPE NCC.
    #[serde(default = "default_root_server")]
    pub root_server: Ipv4Addr,
}

fn default_verbosity() -> u8 {
    2
}

fn default_no_of_domains() -> i64 {
    -1
}

fn default_pool_size() -> usize {
    10
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_root_server() -> Ipv4Addr {
    // https://www.iana.org/domains/root/servers
    Ipv4Addr::new(193, 0, 14, 129)
}

impl Config {
    /// Maps the `verbosity` key onto a log filter.
    pub fn log_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let config: Config = serde_yaml::from_str(
            "verbosity: 4\n\
             nameserver_writeout: true\n\
             toplist_fname: top-1m.csv\n\
             subnets_fname: subnets.csv\n\
             no_of_domains: 1000\n\
             simul_ecs_reqs: 20\n\
             simul_ns_reqs: 40\n\
             routine_stop_timeout: 15\n\
             intermediate_depth: 3\n\
             blocklist_path: exclude.txt\n\
             root_server: 198.41.0.4\n",
        )
        .unwrap();
        assert_eq!(config.verbosity, 4);
        assert!(config.nameserver_writeout);
        assert_eq!(config.no_of_domains, 1000);
        assert_eq!(config.simul_ecs_reqs, 20);
        assert_eq!(config.simul_ns_reqs, 40);
        assert_eq!(config.routine_stop_timeout, 15);
        assert_eq!(config.intermediate_depth, 3);
        assert_eq!(config.blocklist_path, Some(PathBuf::from("exclude.txt")));
        assert_eq!(config.root_server, Ipv4Addr::new(198, 41, 0, 4));
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(
            "toplist_fname: top-1m.csv\n\
             subnets_fname: subnets.csv\n",
        )
        .unwrap();
        assert_eq!(config.verbosity, 2);
        assert!(!config.nameserver_writeout);
        assert_eq!(config.no_of_domains, -1);
        assert_eq!(config.simul_ecs_reqs, 10);
        assert_eq!(config.simul_ns_reqs, 10);
        assert_eq!(config.routine_stop_timeout, 10);
        assert_eq!(config.intermediate_depth, 0);
        assert_eq!(config.blocklist_path, None);
        assert_eq!(config.root_server, Ipv4Addr::new(193, 0, 14, 129));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str(
            "toplist_fname: top-1m.csv\n\
             subnets_fname: subnets.csv\n\
             no_such_key: 1\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn log_filter_maps_the_verbosity_range() {
        let mut config: Config = serde_yaml::from_str(
            "toplist_fname: a\n\
             subnets_fname: b\n",
        )
        .unwrap();
        config.verbosity = 0;
        assert_eq!(config.log_filter(), LevelFilter::Off);
        config.verbosity = 3;
        assert_eq!(config.log_filter(), LevelFilter::Info);
        config.verbosity = 5;
        assert_eq!(config.log_filter(), LevelFilter::Trace);
        config.verbosity = 99;
        assert_eq!(config.log_filter(), LevelFilter::Trace);
    }
}
