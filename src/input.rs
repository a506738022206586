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

//! Readers for the scan's input files.
//!
//! Two inputs drive a scan: a toplist CSV whose second column holds the
//! domains to measure (the Tranco/Umbrella layout), and a subnet list
//! with one CIDR per line. Input problems are fatal: a scan over a
//! half-read toplist would silently measure the wrong population.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use csv::ReaderBuilder;
use ipnet::Ipv4Net;
use log::info;

use crate::name;
use crate::name::Domain;
use crate::scan::DomainNsPair;

/// The toplist column holding the domain.
const TOPLIST_DOMAIN_COLUMN: usize = 1;

////////////////////////////////////////////////////////////////////////
// TOPLIST                                                            //
////////////////////////////////////////////////////////////////////////

/// Reads up to `limit` domains from the toplist at `path` (−1 reads
/// all), producing the pair list that both scan phases work over.
pub fn read_toplist(path: &Path, limit: i64) -> Result<Vec<Arc<DomainNsPair>>, Error> {
    info!("reading toplist {}", path.display());
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(Error::Csv)?;
    let pairs = toplist_from_csv(reader, limit)?;
    info!("read {} toplist entries", pairs.len());
    Ok(pairs)
}

fn toplist_from_csv<R: io::Read>(
    mut reader: csv::Reader<R>,
    limit: i64,
) -> Result<Vec<Arc<DomainNsPair>>, Error> {
    let mut pairs = Vec::new();
    for (index, record) in reader.records().enumerate() {
        if limit >= 0 && pairs.len() as i64 >= limit {
            break;
        }
        let record = record.map_err(Error::Csv)?;
        let field = record
            .get(TOPLIST_DOMAIN_COLUMN)
            .ok_or(Error::MissingDomainColumn { line: index + 1 })?;
        let domain: Domain = field.parse().map_err(|source| Error::InvalidDomain {
            line: index + 1,
            source,
        })?;
        pairs.push(Arc::new(DomainNsPair::new(domain)));
    }
    Ok(pairs)
}

////////////////////////////////////////////////////////////////////////
// SUBNET LIST                                                        //
////////////////////////////////////////////////////////////////////////

/// Reads the subnet list at `path`: one CIDR per line, blank lines
/// skipped. Subnets are normalized to their network address.
pub fn read_subnets(path: &Path) -> Result<Vec<Ipv4Net>, Error> {
    info!("reading subnets {}", path.display());
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(Error::Csv)?;
    let subnets = subnets_from_csv(reader)?;
    info!("read {} subnets", subnets.len());
    Ok(subnets)
}

fn subnets_from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<Ipv4Net>, Error> {
    let mut subnets = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(Error::Csv)?;
        let field = match record.get(0) {
            Some(field) if !field.trim().is_empty() => field.trim(),
            _ => continue,
        };
        let subnet: Ipv4Net = field.parse().map_err(|_| Error::InvalidCidr {
            line: index + 1,
            entry: field.to_owned(),
        })?;
        subnets.push(subnet.trunc());
    }
    Ok(subnets)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while reading an input file.
#[derive(Debug)]
pub enum Error {
    Csv(csv::Error),
    MissingDomainColumn { line: usize },
    InvalidDomain { line: usize, source: name::Error },
    InvalidCidr { line: usize, entry: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Csv(err) => err.fmt(f),
            Self::MissingDomainColumn { line } => {
                write!(f, "line {}: no domain column", line)
            }
            Self::InvalidDomain { line, source } => {
                write!(f, "line {}: invalid domain: {}", line, source)
            }
            Self::InvalidCidr { line, entry } => {
                write!(f, "line {}: {} is not in CIDR notation", line, entry)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(err) => Some(err),
            Self::InvalidDomain { source, .. } => Some(source),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn toplist_reader(data: &str) -> csv::Reader<&[u8]> {
        ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn toplist_takes_the_second_column() {
        let pairs = toplist_from_csv(
            toplist_reader("1,example.test\n2,other.test\n"),
            -1,
        )
        .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].domain(), &"example.test".parse::<Domain>().unwrap());
        assert_eq!(pairs[1].domain(), &"other.test".parse::<Domain>().unwrap());
    }

    #[test]
    fn toplist_respects_the_cap() {
        let data = "1,a.test\n2,b.test\n3,c.test\n";
        assert_eq!(toplist_from_csv(toplist_reader(data), 2).unwrap().len(), 2);
        assert_eq!(toplist_from_csv(toplist_reader(data), 0).unwrap().len(), 0);
        assert_eq!(toplist_from_csv(toplist_reader(data), -1).unwrap().len(), 3);
    }

    #[test]
    fn toplist_rejects_missing_columns() {
        assert!(matches!(
            toplist_from_csv(toplist_reader("justonecolumn\n"), -1),
            Err(Error::MissingDomainColumn { line: 1 })
        ));
    }

    #[test]
    fn toplist_rejects_invalid_domains() {
        assert!(matches!(
            toplist_from_csv(toplist_reader("1,..\n"), -1),
            Err(Error::InvalidDomain { line: 1, .. })
        ));
    }

    #[test]
    fn subnets_parse_and_truncate() {
        let reader = toplist_reader("192.0.2.77/24\n\n10.0.0.0/8\n");
        let subnets = subnets_from_csv(reader).unwrap();
        assert_eq!(
            subnets,
            vec![
                "192.0.2.0/24".parse::<Ipv4Net>().unwrap(),
                "10.0.0.0/8".parse::<Ipv4Net>().unwrap(),
            ]
        );
    }

    #[test]
    fn subnets_reject_malformed_entries() {
        assert!(matches!(
            subnets_from_csv(toplist_reader("not-a-subnet\n")),
            Err(Error::InvalidCidr { line: 1, .. })
        ));
    }
}
