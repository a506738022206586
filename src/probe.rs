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

//! The ECS prober.
//!
//! Once the authoritative server for a domain is known, the prober asks
//! it the same A question once per subnet in the input list, each time
//! declaring the subnet in an EDNS Client Subnet option. The answer
//! addresses and the SCOPE prefix the server advertises back are the
//! scan's measurement: they show at what granularity the authority
//! localizes its answers.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use log::{debug, warn};
use rand::rngs::SmallRng;

use crate::blocklist::Blocklist;
use crate::message::{writer, Response};
use crate::name::Domain;
use crate::net::Transport;
use crate::rr::{ecs, ClientSubnet, Rdata};

////////////////////////////////////////////////////////////////////////
// PROBER                                                             //
////////////////////////////////////////////////////////////////////////

/// The outcome of one ECS probe.
///
/// All fields may be empty: a transport failure leaves everything
/// unset, and a server that ignores ECS yields answers without the
/// `ecs_*` fields. Absence is data and is recorded as such.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProbeResult {
    pub ips: Vec<Ipv4Addr>,
    pub ecs_subnet: Option<Ipv4Net>,
    pub ecs_scope: Option<u8>,
}

/// An ECS prober. Each scan worker owns one.
pub struct Prober<T> {
    blocklist: Arc<Blocklist>,
    transport: T,
    rng: SmallRng,
}

impl<T: Transport> Prober<T> {
    pub fn new(blocklist: Arc<Blocklist>, transport: T, rng: SmallRng) -> Self {
        Self {
            blocklist,
            transport,
            rng,
        }
    }

    /// Probes `nsip` for `domain`'s A records as seen from `subnet`.
    pub fn probe(&mut self, domain: &Domain, nsip: Ipv4Addr, subnet: Ipv4Net) -> ProbeResult {
        if self.blocklist.contains(nsip) {
            return ProbeResult::default();
        }

        debug!("ecs questioning {} for {} with subnet {}", nsip, domain, subnet);
        let query = writer::ecs_a_query(&mut self.rng, domain, subnet);
        let octets = match self.transport.exchange(nsip, &query) {
            Ok(Some(octets)) => octets,
            Ok(None) => {
                debug!("ecs query to {} for {} timed out", nsip, domain);
                return ProbeResult::default();
            }
            Err(e) => {
                debug!("ecs query to {} for {} failed: {}", nsip, domain, e);
                return ProbeResult::default();
            }
        };
        let response = match Response::parse(&octets) {
            Ok(response) => response,
            Err(e) => {
                debug!("malformed ecs response from {} for {}: {}", nsip, domain, e);
                return ProbeResult::default();
            }
        };

        let mut result = ProbeResult::default();
        for rr in &response.answers {
            if let Rdata::A(ip) = &rr.rdata {
                result.ips.push(*ip);
            }
        }

        // The first ECS option of the first OPT record is the
        // authoritative word on the scope.
        let options = response.additional.iter().find_map(|rr| match &rr.rdata {
            Rdata::Opt(options) => Some(options),
            _ => None,
        });
        let option = options.and_then(|options| {
            options.iter().find(|option| option.code == ecs::CLIENT_SUBNET)
        });
        if let Some(option) = option {
            match ClientSubnet::parse(&option.data) {
                Ok(client_subnet) => {
                    result.ecs_subnet = Some(client_subnet.subnet());
                    result.ecs_scope = Some(client_subnet.scope_prefix);
                }
                Err(e) => {
                    warn!("malformed ecs option from {} for {}: {}", nsip, domain, e);
                }
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::EdnsOption;
    use crate::testutil::{MockNetwork, ResponseBuilder};
    use rand::SeedableRng;

    const NSIP: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 1);

    fn prober(network: &Arc<MockNetwork>, blocklist: Blocklist) -> Prober<Arc<MockNetwork>> {
        Prober::new(
            Arc::new(blocklist),
            network.clone(),
            SmallRng::seed_from_u64(7),
        )
    }

    fn subnet(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    /// An authority that echoes the requested subnet with a fixed scope
    /// and a fixed answer.
    fn echoing_server(scope: u8, answer: Ipv4Addr) -> impl Fn(&[u8]) -> Option<Vec<u8>> {
        move |query| {
            let request = crate::message::Response::parse(query).unwrap();
            let options = request
                .additional
                .iter()
                .find_map(|rr| match &rr.rdata {
                    Rdata::Opt(options) => Some(options.clone()),
                    _ => None,
                })
                .expect("query carries no OPT record");
            let mut echoed =
                ClientSubnet::parse(&options[0].data).expect("query carries a malformed option");
            echoed.scope_prefix = scope;
            let (_, qname) = crate::testutil::query_parts(query);
            Some(
                ResponseBuilder::answering(query)
                    .answer_a(&qname.to_string(), answer)
                    .additional_opt(&[EdnsOption {
                        code: ecs::CLIENT_SUBNET,
                        data: echoed.encode(),
                    }])
                    .build(),
            )
        }
    }

    #[test]
    fn probe_round_trips_the_subnet_and_scope() {
        let network = MockNetwork::new()
            .server(NSIP, echoing_server(24, Ipv4Addr::new(192, 0, 2, 10)))
            .into_transport();
        let mut prober = prober(&network, Blocklist::empty());

        let result = prober.probe(
            &"example.test".parse().unwrap(),
            NSIP,
            subnet("192.0.2.0/24"),
        );
        assert_eq!(result.ips, vec![Ipv4Addr::new(192, 0, 2, 10)]);
        assert_eq!(result.ecs_subnet, Some(subnet("192.0.2.0/24")));
        assert_eq!(result.ecs_scope, Some(24));
    }

    #[test]
    fn probe_without_ecs_in_the_response_reports_empty_fields() {
        let network = MockNetwork::new()
            .server(NSIP, |query| {
                Some(
                    ResponseBuilder::answering(query)
                        .answer_a("example.test", Ipv4Addr::new(192, 0, 2, 10))
                        .build(),
                )
            })
            .into_transport();
        let mut prober = prober(&network, Blocklist::empty());

        let result = prober.probe(
            &"example.test".parse().unwrap(),
            NSIP,
            subnet("192.0.2.0/24"),
        );
        assert_eq!(result.ips, vec![Ipv4Addr::new(192, 0, 2, 10)]);
        assert_eq!(result.ecs_subnet, None);
        assert_eq!(result.ecs_scope, None);
    }

    #[test]
    fn probe_timeout_reports_all_empty() {
        let network = MockNetwork::new().into_transport();
        let mut prober = prober(&network, Blocklist::empty());

        let result = prober.probe(
            &"example.test".parse().unwrap(),
            NSIP,
            subnet("192.0.2.0/24"),
        );
        assert_eq!(result, ProbeResult::default());
        assert_eq!(network.queries_sent(), 1);
    }

    #[test]
    fn probe_skips_blocklisted_targets() {
        let network = MockNetwork::new()
            .server(NSIP, echoing_server(24, Ipv4Addr::new(192, 0, 2, 10)))
            .into_transport();
        let blocklist = Blocklist::parse("198.51.100.0/24\n").unwrap();
        let mut prober = prober(&network, blocklist);

        let result = prober.probe(
            &"example.test".parse().unwrap(),
            NSIP,
            subnet("192.0.2.0/24"),
        );
        assert_eq!(result, ProbeResult::default());
        assert_eq!(network.queries_sent(), 0);
    }

    #[test]
    fn probe_rejects_overwide_scopes_as_malformed() {
        let network = MockNetwork::new()
            .server(NSIP, |query| {
                // SCOPE=64 cannot happen under FAMILY=1.
                Some(
                    ResponseBuilder::answering(query)
                        .answer_a("example.test", Ipv4Addr::new(192, 0, 2, 10))
                        .additional_opt(&[EdnsOption {
                            code: ecs::CLIENT_SUBNET,
                            data: b"\x00\x01\x18\x40\xc0\x00\x02".to_vec(),
                        }])
                        .build(),
                )
            })
            .into_transport();
        let mut prober = prober(&network, Blocklist::empty());

        let result = prober.probe(
            &"example.test".parse().unwrap(),
            NSIP,
            subnet("192.0.2.0/24"),
        );
        assert_eq!(result.ips, vec![Ipv4Addr::new(192, 0, 2, 10)]);
        assert_eq!(result.ecs_subnet, None);
        assert_eq!(result.ecs_scope, None);
    }
}
