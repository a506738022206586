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

//! The iterative resolver.
//!
//! Starting from a root server, the resolver walks the delegation tree
//! one referral at a time: every response either answers the question,
//! redirects it through a CNAME, or names the servers of a deeper zone
//! (plus, with luck, glue addresses for them). Everything learned along
//! the way goes into the shared [`Cache`], so domains that share
//! TLD/ccTLD authorities skip the upper levels of the walk entirely.
//!
//! Alongside the addresses, a successful resolution reports the single
//! server IP that produced the final answer. That server is what the
//! ECS scan phase probes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use log::{debug, warn};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::blocklist::Blocklist;
use crate::cache::Cache;
use crate::message::{writer, Response};
use crate::name::Domain;
use crate::net::Transport;
use crate::rr::Rdata;

/// The maximum number of recursive resolution steps for one top-level
/// `resolve` call. Referral chains, CNAME chains, and nameserver-name
/// lookups all count toward this bound; anything that exceeds it is a
/// runaway and is dropped.
pub const MAX_RESOLUTION_DEPTH: usize = 50;

////////////////////////////////////////////////////////////////////////
// RESOLVER                                                           //
////////////////////////////////////////////////////////////////////////

/// A successful resolution: the answer addresses and, when one was
/// actually contacted, the authoritative server that produced them.
/// `server` is `None` when the answer came entirely from the cache and
/// no nameserver address was cached alongside it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub ips: Vec<Ipv4Addr>,
    pub server: Option<Ipv4Addr>,
}

/// An iterative resolver.
///
/// Each worker owns one `Resolver`; the cache and blocklist behind it
/// are shared. The random source is owned so that tests can seed it
/// deterministically.
pub struct Resolver<T> {
    cache: Arc<Cache>,
    blocklist: Arc<Blocklist>,
    transport: T,
    root_server: Ipv4Addr,
    rng: SmallRng,
}

impl<T: Transport> Resolver<T> {
    pub fn new(
        cache: Arc<Cache>,
        blocklist: Arc<Blocklist>,
        transport: T,
        root_server: Ipv4Addr,
        rng: SmallRng,
    ) -> Self {
        Self {
            cache,
            blocklist,
            transport,
            root_server,
            rng,
        }
    }

    /// Resolves `domain` to its A records.
    ///
    /// Returns `None` when the domain cannot be resolved for any
    /// reason: a dead end in the delegation tree, a timeout, a
    /// blocklisted server, a runaway chain. The caller drops such
    /// domains; per-query failures never abort a scan.
    pub fn resolve(&mut self, domain: &Domain) -> Option<Resolution> {
        let mut path = Vec::new();
        self.resolve_at(domain, &mut path)
    }

    fn resolve_at(&mut self, domain: &Domain, path: &mut Vec<Domain>) -> Option<Resolution> {
        path.push(domain.clone());
        if path.len() > MAX_RESOLUTION_DEPTH {
            warn!("maximum resolution depth exceeded for {}", domain);
            return None;
        }

        // === cache consultation ===
        let cached = self.cache.lookup(domain);

        // Authorities exist that name a zone's own (glueless) contents
        // as its nameservers, e.g.
        //   NULL1.KG. IN NS NS1.NULL1.KG.
        //   NULL1.KG. IN NS NS2.NULL1.KG.
        // with an empty additional section. Resolving the nameserver
        // requires the nameserver; this path cannot progress.
        if cached.nss.contains(domain) {
            return None;
        }
        if let Some(target) = cached.cname.clone() {
            debug!("cached CNAME found: {} points to {}", domain, target);
            return self.resolve_at(&target, path);
        }

        // Scan the cached NS names in order and take the first whose
        // address is itself cached. Resolving an arbitrary one instead
        // would risk querying for a name when we already hold an
        // address for its sibling.
        let mut cached_ns_ips: Vec<Ipv4Addr> = Vec::new();
        for ns in &cached.nss {
            let ns_lookup = self.cache.lookup(ns);
            if !ns_lookup.ips.is_empty() {
                cached_ns_ips = ns_lookup.ips;
                break;
            }
        }

        let mut server = self.root_server;
        if !cached.ips.is_empty() {
            let server = cached_ns_ips.choose(&mut self.rng).copied();
            return Some(Resolution {
                ips: cached.ips,
                server,
            });
        } else if !cached_ns_ips.is_empty() {
            // The unwrap() is okay: the vector is non-empty.
            server = *cached_ns_ips.choose(&mut self.rng).unwrap();
        } else if !cached.nss.is_empty() {
            // We know nameserver names but no addresses; resolve one.
            // If that fails, abort this lookup rather than falling back
            // to the root, so that corrupt cache entries cannot amplify
            // work without bound.
            let ns = cached.nss.choose(&mut self.rng).unwrap().clone();
            match self.resolve_at(&ns, path) {
                // Resolutions always carry at least one address, so the
                // unwrap() is okay.
                Some(resolved) => server = *resolved.ips.choose(&mut self.rng).unwrap(),
                None => {
                    debug!("no address found for cached nameserver {}", ns);
                    return None;
                }
            }
        }

        // === blocklist gate ===
        if self.blocklist.contains(server) {
            return None;
        }

        // === query ===
        let query = writer::a_query(&mut self.rng, domain);
        debug!("questioning {} for {}", server, domain);
        let octets = match self.transport.exchange(server, &query) {
            Ok(Some(octets)) => octets,
            Ok(None) => {
                debug!("query to {} for {} timed out", server, domain);
                return None;
            }
            Err(e) => {
                debug!("query to {} for {} failed: {}", server, domain, e);
                return None;
            }
        };
        let response = match Response::parse(&octets) {
            Ok(response) => response,
            Err(e) => {
                debug!("malformed response from {} for {}: {}", server, domain, e);
                return None;
            }
        };

        // The original query is looked up exactly once per scan, so
        // caching what we learn about it would only grow the trie.
        let is_original = path.first() == Some(domain);

        // === answer section ===
        if !response.answers.is_empty() {
            let mut answers = Vec::new();
            let mut cname = None;
            for rr in &response.answers {
                match &rr.rdata {
                    Rdata::A(ip) => {
                        answers.push(*ip);
                        if !is_original {
                            self.cache.update_a(domain, *ip);
                        }
                    }
                    Rdata::Cname(target) => {
                        debug!("found CNAME {} for {}", target, domain);
                        if cname.is_some() {
                            warn!(
                                "multiple CNAMEs in one answer for {}, keeping the last",
                                domain
                            );
                        }
                        if !is_original {
                            self.cache.update_cname(domain, target);
                        }
                        cname = Some(target.clone());
                    }
                    _ => (),
                }
            }
            if answers.is_empty() {
                if let Some(target) = cname {
                    return self.resolve_at(&target, path);
                }
                return None;
            }
            debug!("resolve found answers {:?} for {}", answers, domain);
            return Some(Resolution {
                ips: answers,
                server: Some(server),
            });
        } else if cached.definitive {
            // The cache had the final node for this name and the
            // authoritative server answered with nothing: there is no
            // such record.
            return None;
        }

        // === authority section: referrals ===
        if response.authority.is_empty() {
            debug!("no nameservers found for {}", domain);
            return None;
        }
        let mut new_ns_names = Vec::new();
        for rr in &response.authority {
            if let Rdata::Ns(ns_name) = &rr.rdata {
                self.cache.update_ns(&rr.owner, ns_name);
                new_ns_names.push(ns_name.clone());
            }
        }

        // === additional section: glue ===
        for rr in &response.additional {
            if let Rdata::A(ip) = &rr.rdata {
                self.cache.update_a(&rr.owner, *ip);
            }
        }

        if !new_ns_names.is_empty() {
            debug!(
                "found referral to {:?}, descending for {}",
                new_ns_names, domain
            );
            // The next cache consultation picks up the freshly cached
            // NS entries (and glue) and advances the walk by one level.
            return self.resolve_at(domain, path);
        }
        None
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
