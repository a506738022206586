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

//! The IP-block exclusion list.
//!
//! Measurement runs must be able to exclude networks whose operators
//! have asked not to be probed. The list is consulted before every
//! outbound query, by the resolver and by the ECS prober alike.

use std::fmt;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use log::info;

////////////////////////////////////////////////////////////////////////
// BLOCKLIST                                                          //
////////////////////////////////////////////////////////////////////////

/// A list of IPv4 networks that must never be sent a query.
///
/// Lists are small (at most a handful of operator opt-outs), so
/// [`Blocklist::contains`] is a linear scan.
#[derive(Clone, Debug, Default)]
pub struct Blocklist {
    nets: Vec<Ipv4Net>,
}

impl Blocklist {
    /// Returns an empty `Blocklist` that blocks nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a blocklist from the file at `path`. The format is plain
    /// text: one CIDR per line, with `#` starting a comment and blank
    /// lines ignored. A missing file is not an error (it yields an
    /// empty list), but a malformed entry is.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("IP exclusion list {} not found, skipping", path.display());
                return Ok(Self::empty());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parses blocklist file contents; see [`Blocklist::load`].
    pub fn parse(contents: &str) -> Result<Self, Error> {
        let mut nets = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let entry = match line.split_once('#') {
                Some((before_comment, _)) => before_comment,
                None => line,
            };
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let net: Ipv4Net = entry.parse().map_err(|_| Error::InvalidCidr {
                line: index + 1,
                entry: entry.to_owned(),
            })?;
            info!("added blocked net: {}", net);
            nets.push(net);
        }
        Ok(Self { nets })
    }

    /// Returns whether `ip` falls within any blocked network.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while loading a blocklist.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    InvalidCidr { line: usize, entry: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::InvalidCidr { line, entry } => {
                write!(f, "line {}: {} is not in CIDR notation", line, entry)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidCidr { .. } => None,
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
    fn parse_handles_comments_and_blank_lines() {
        let blocklist = Blocklist::parse(
            "# operator opt-outs\n\
             \n\
             192.0.2.0/24\n\
             198.51.100.0/25 # partial\n",
        )
        .unwrap();
        assert!(blocklist.contains("192.0.2.77".parse().unwrap()));
        assert!(blocklist.contains("198.51.100.1".parse().unwrap()));
        assert!(!blocklist.contains("198.51.100.200".parse().unwrap()));
        assert!(!blocklist.contains("203.0.113.1".parse().unwrap()));
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        assert!(matches!(
            Blocklist::parse("not-a-cidr\n"),
            Err(Error::InvalidCidr { line: 1, .. })
        ));
    }

    #[test]
    fn empty_blocklist_blocks_nothing() {
        assert!(!Blocklist::empty().contains("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let blocklist = Blocklist::load(Path::new("/nonexistent/blocklist.txt")).unwrap();
        assert!(!blocklist.contains("192.0.2.1".parse().unwrap()));
    }
}
