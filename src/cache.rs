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

//! The shared DNS delegation cache.
//!
//! The cache is a trie over the label sequences of domain names, keyed
//! from the right: the root's children are TLDs, their children are
//! second-level domains, and so on. Each node records what has been
//! learned about its name during the current scan phase: NS names,
//! A addresses (glue or answers), and at most one CNAME target. Nothing
//! carries a TTL; the cache lives only as long as one phase.
//!
//! All operations take a single internal mutex. The resolver's
//! throughput is bounded by network latency, not cache contention, so
//! nothing fancier is warranted.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use log::trace;

use crate::name::{Domain, Label, LabelBuf};

////////////////////////////////////////////////////////////////////////
// CACHE                                                              //
////////////////////////////////////////////////////////////////////////

/// The delegation cache shared by all resolver workers.
pub struct Cache {
    root: Mutex<Node>,
    intermediate_depth: usize,
}

/// A node of the cache trie.
///
/// `children` maps full labels to the next level of the trie. When
/// intermediate compression is enabled (`intermediate_depth` > 0),
/// labels are additionally split octet by octet into the `splits` maps
/// of up to `intermediate_depth` interior nodes before the full-label
/// child is reached; the interior nodes reached through `splits` never
/// carry record data and never terminate a lookup.
#[derive(Default)]
struct Node {
    nss: Vec<Domain>,
    ips: Vec<Ipv4Addr>,
    cname: Option<Domain>,
    children: HashMap<LabelBuf, Node>,
    splits: HashMap<u8, Node>,
}

/// The result of a [`Cache::lookup`].
///
/// On a full match (`definitive`), either `cname` is set (and takes
/// precedence over everything else the node holds) or `ips` and `nss`
/// are the node's addresses and nameserver names. On a partial match,
/// only `nss` is populated: the NS set of the deepest useful ancestor.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Lookup {
    pub ips: Vec<Ipv4Addr>,
    pub nss: Vec<Domain>,
    pub cname: Option<Domain>,
    pub definitive: bool,
}

impl Cache {
    /// Creates an empty cache. `intermediate_depth` bounds the
    /// octet-splitting compression of labels; 0 disables it.
    pub fn new(intermediate_depth: usize) -> Self {
        Self {
            root: Mutex::new(Node::default()),
            intermediate_depth,
        }
    }

    /// Records that `nameserver` is a nameserver for `zone`. Inserting
    /// the same name twice is a no-op.
    pub fn update_ns(&self, zone: &Domain, nameserver: &Domain) {
        trace!("cache: NS of {} += {}", zone, nameserver);
        let mut root = self.root.lock().unwrap();
        let node = create_node(&mut root, zone, self.intermediate_depth);
        if !node.nss.contains(nameserver) {
            node.nss.push(nameserver.clone());
        }
    }

    /// Records an A address for `owner` (glue or an answer). Inserting
    /// the same address twice is a no-op.
    pub fn update_a(&self, owner: &Domain, ip: Ipv4Addr) {
        trace!("cache: A of {} += {}", owner, ip);
        let mut root = self.root.lock().unwrap();
        let node = create_node(&mut root, owner, self.intermediate_depth);
        if !node.ips.contains(&ip) {
            node.ips.push(ip);
        }
    }

    /// Records a CNAME target for `owner`. The last writer wins.
    pub fn update_cname(&self, owner: &Domain, target: &Domain) {
        trace!("cache: CNAME of {} = {}", owner, target);
        let mut root = self.root.lock().unwrap();
        let node = create_node(&mut root, owner, self.intermediate_depth);
        node.cname = Some(target.clone());
    }

    /// Looks up `domain`, descending the trie as far as its labels
    /// match.
    ///
    /// If every label matched, the result is `definitive` and carries
    /// the node's CNAME (preferred) or its addresses and NS names.
    /// Otherwise the result carries the NS names of the deepest
    /// descended node that owns any. (A deeper node may exist merely
    /// because some cousin was inserted, in which case it tells us
    /// nothing useful about where to go next.)
    pub fn lookup(&self, domain: &Domain) -> Lookup {
        let root = self.root.lock().unwrap();
        let (node, definitive) = find_node(&root, domain, self.intermediate_depth);
        if definitive {
            if let Some(target) = &node.cname {
                return Lookup {
                    cname: Some(target.clone()),
                    definitive: true,
                    ..Lookup::default()
                };
            }
            Lookup {
                ips: node.ips.clone(),
                nss: node.nss.clone(),
                cname: None,
                definitive: true,
            }
        } else {
            Lookup {
                nss: node.nss.clone(),
                definitive: false,
                ..Lookup::default()
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TRIE DESCENT                                                       //
////////////////////////////////////////////////////////////////////////

/// Descends one label from `node`, walking through any intermediate
/// octet-split levels. Returns `None` if the trie has no entry for
/// `label` here.
fn descend_label<'a>(node: &'a Node, label: &Label, depth: usize) -> Option<&'a Node> {
    let mut cur = node;
    let mut pos = 0;
    while pos < depth && pos < label.len() {
        cur = cur.splits.get(&label.octets()[pos])?;
        pos += 1;
    }
    cur.children.get(label)
}

/// The mutating counterpart of [`descend_label`]: descends one label
/// from `node`, creating any missing intermediate and full-label nodes
/// along the way.
fn descend_or_create<'a>(node: &'a mut Node, label: &Label, depth: usize) -> &'a mut Node {
    let mut cur = node;
    let mut pos = 0;
    while pos < depth && pos < label.len() {
        cur = cur.splits.entry(label.octets()[pos]).or_default();
        pos += 1;
    }
    cur.children.entry(label.to_owned()).or_default()
}

/// Finds the node for `domain`, or the deepest useful node on the way
/// there. The boolean is true iff every label of `domain` matched.
fn find_node<'a>(root: &'a Node, domain: &Domain, depth: usize) -> (&'a Node, bool) {
    let mut cur = root;
    let mut deepest_ns: Option<&Node> = None;
    for label in domain.labels().rev() {
        match descend_label(cur, label, depth) {
            Some(next) => {
                cur = next;
                if !cur.nss.is_empty() {
                    deepest_ns = Some(cur);
                }
            }
            None => return (deepest_ns.unwrap_or(cur), false),
        }
    }
    (cur, true)
}

/// Gets or creates the node for `domain`.
fn create_node<'a>(root: &'a mut Node, domain: &Domain, depth: usize) -> &'a mut Node {
    let mut cur = root;
    for label in domain.labels().rev() {
        cur = descend_or_create(cur, label, depth);
    }
    cur
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(s: &str) -> Domain {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn update_a_is_idempotent() {
        let cache = Cache::new(0);
        cache.update_a(&domain("example.test"), ip("192.0.2.7"));
        cache.update_a(&domain("example.test"), ip("192.0.2.7"));
        let lookup = cache.lookup(&domain("example.test"));
        assert!(lookup.definitive);
        assert_eq!(lookup.ips, vec![ip("192.0.2.7")]);
    }

    #[test]
    fn update_ns_is_idempotent() {
        let cache = Cache::new(0);
        cache.update_ns(&domain("test"), &domain("ns1.test"));
        cache.update_ns(&domain("test"), &domain("ns1.test"));
        cache.update_ns(&domain("test"), &domain("ns2.test"));
        let lookup = cache.lookup(&domain("test"));
        assert_eq!(lookup.nss, vec![domain("ns1.test"), domain("ns2.test")]);
    }

    #[test]
    fn cname_is_preferred_on_full_matches() {
        let cache = Cache::new(0);
        cache.update_a(&domain("a.test"), ip("192.0.2.7"));
        cache.update_cname(&domain("a.test"), &domain("b.test"));
        let lookup = cache.lookup(&domain("a.test"));
        assert!(lookup.definitive);
        assert_eq!(lookup.cname, Some(domain("b.test")));
        assert!(lookup.ips.is_empty());
        assert!(lookup.nss.is_empty());
    }

    #[test]
    fn cname_last_writer_wins() {
        let cache = Cache::new(0);
        cache.update_cname(&domain("a.test"), &domain("b.test"));
        cache.update_cname(&domain("a.test"), &domain("c.test"));
        let lookup = cache.lookup(&domain("a.test"));
        assert_eq!(lookup.cname, Some(domain("c.test")));
    }

    #[test]
    fn partial_match_returns_deepest_ns_ancestor() {
        // The com.uy node exists (it has glue), but only uy. has an NS
        // set; a lookup of google.com.uy must surface uy.'s referral,
        // not com.uy's empty one.
        let cache = Cache::new(0);
        cache.update_ns(&domain("uy"), &domain("a.nic.uy"));
        cache.update_a(&domain("com.uy"), ip("192.0.2.1"));
        let lookup = cache.lookup(&domain("google.com.uy"));
        assert!(!lookup.definitive);
        assert_eq!(lookup.nss, vec![domain("a.nic.uy")]);
        assert!(lookup.ips.is_empty());
        assert!(lookup.cname.is_none());
    }

    #[test]
    fn partial_match_falls_back_to_last_matched_node() {
        let cache = Cache::new(0);
        cache.update_a(&domain("example.test"), ip("192.0.2.7"));
        let lookup = cache.lookup(&domain("sub.example.test"));
        assert!(!lookup.definitive);
        assert!(lookup.nss.is_empty());
        assert!(lookup.ips.is_empty());
    }

    #[test]
    fn lookup_of_the_root_is_definitive_and_empty() {
        let cache = Cache::new(0);
        let lookup = cache.lookup(&Domain::root());
        assert!(lookup.definitive);
        assert!(lookup.ips.is_empty());
        assert!(lookup.nss.is_empty());
    }

    #[test]
    fn partial_match_ips_are_never_returned() {
        let cache = Cache::new(0);
        cache.update_a(&domain("test"), ip("192.0.2.1"));
        let lookup = cache.lookup(&domain("example.test"));
        assert!(!lookup.definitive);
        assert!(lookup.ips.is_empty());
    }

    #[test]
    fn intermediate_compression_is_transparent() {
        for depth in [0, 1, 2, 8] {
            let cache = Cache::new(depth);
            cache.update_a(&domain("verylonglabel.test"), ip("192.0.2.7"));
            cache.update_a(&domain("verylong.test"), ip("192.0.2.8"));
            cache.update_ns(&domain("test"), &domain("ns1.test"));

            let lookup = cache.lookup(&domain("verylonglabel.test"));
            assert!(lookup.definitive, "depth {}", depth);
            assert_eq!(lookup.ips, vec![ip("192.0.2.7")]);

            let lookup = cache.lookup(&domain("verylong.test"));
            assert!(lookup.definitive, "depth {}", depth);
            assert_eq!(lookup.ips, vec![ip("192.0.2.8")]);

            // A label that only matches part of an octet-split path
            // must not produce a hit: intermediate levels never
            // terminate a lookup.
            let lookup = cache.lookup(&domain("very.test"));
            assert!(!lookup.definitive, "depth {}", depth);
            assert_eq!(lookup.nss, vec![domain("ns1.test")], "depth {}", depth);
        }
    }

    #[test]
    fn cache_is_shareable_across_threads() {
        use std::sync::Arc;
        let cache = Arc::new(Cache::new(2));
        let mut handles = Vec::new();
        for i in 0..4u8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                let owner = domain("example.test");
                cache.update_a(&owner, Ipv4Addr::new(192, 0, 2, i));
                cache.lookup(&owner)
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.lookup(&domain("example.test")).ips.len(), 4);
    }
}
