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

//! An active-measurement library for EDNS Client Subnet behavior.
//!
//! `scopescan` probes authoritative DNS servers with queries carrying
//! the EDNS Client Subnet (ECS) option ([RFC 7871]) to observe how
//! their answers vary with the declared client subnet. A scan has two
//! phases:
//!
//! 1. **Nameserver discovery.** For each input domain, a from-scratch
//!    [iterative resolver](resolver) walks the delegation tree from a
//!    root server down, recording referrals and glue in a
//!    [shared label-trie cache](cache), until it finds the
//!    authoritative server that answers the domain's A query.
//! 2. **ECS probing.** For each subnet in an input list, the
//!    [prober](probe) asks each discovered authoritative server the
//!    same A question with an ECS hint for that subnet, recording the
//!    answer addresses and the SCOPE prefix length the server reports.
//!
//! Both phases run as [worker pools](worker) draining shared queues,
//! with results [streamed to gzip CSV files](output) as they arrive.
//! An [exclusion list](blocklist) of operator opt-out networks is
//! honored before every outbound packet.
//!
//! The `scopescan` binary ties these pieces together; see its
//! configuration file for the tunables (pool sizes, drain timeouts,
//! input paths, cache compression depth).
//!
//! [RFC 7871]: https://datatracker.ietf.org/doc/html/rfc7871

pub mod blocklist;
pub mod cache;
pub mod input;
pub mod message;
pub mod name;
pub mod net;
pub mod output;
pub mod probe;
pub mod resolver;
pub mod rr;
pub mod scan;
pub mod worker;

#[cfg(test)]
mod testutil;
