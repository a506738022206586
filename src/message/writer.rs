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

//! Implementation of the [`Writer`] type to build query messages.
//!
//! The scanner only ever sends queries: a single question, optionally
//! followed by one OPT pseudo-record in the additional section. Unlike
//! a server's response path there is no need for name compression or
//! truncation handling, so the `Writer` here is a thin serializer over
//! a growable buffer.

use ipnet::Ipv4Net;
use rand::Rng;

use super::constants::*;
use crate::name::Domain;
use crate::rr::ecs::{self, ClientSubnet};
use crate::rr::{Class, EdnsOption, Type};

/// The maximum UDP payload size advertised in the OPT records we send.
pub const ADVERTISED_UDP_PAYLOAD_SIZE: u16 = 4096;

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// Serializes a DNS query message into a growable buffer.
///
/// The header is zeroed at construction apart from the given ID.
/// Questions and the optional OPT record are appended with
/// [`Writer::add_question`] and [`Writer::add_opt`]; the section counts
/// in the header are kept up to date as they are added. Call
/// [`Writer::finish`] to obtain the serialized message.
pub struct Writer {
    octets: Vec<u8>,
}

impl Writer {
    /// Creates a new `Writer` with the provided message ID.
    pub fn new(id: u16) -> Self {
        let mut octets = vec![0; HEADER_SIZE];
        octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
        Self { octets }
    }

    /// Sets or clears the RD (recursion desired) bit.
    pub fn set_recursion_desired(&mut self, rd: bool) {
        if rd {
            self.octets[RD_BYTE] |= RD_MASK;
        } else {
            self.octets[RD_BYTE] &= !RD_MASK;
        }
    }

    /// Appends a question to the message.
    pub fn add_question(&mut self, qname: &Domain, qtype: Type, qclass: Class) {
        qname.write_wire(&mut self.octets);
        self.octets.extend_from_slice(&u16::from(qtype).to_be_bytes());
        self.octets
            .extend_from_slice(&u16::from(qclass).to_be_bytes());
        increment_count(&mut self.octets, QDCOUNT_START);
    }

    /// Appends an OPT pseudo-record ([RFC 6891 § 6.1]) carrying the
    /// given EDNS options to the additional section. The record's class
    /// field advertises `udp_payload_size`; its TTL field (extended
    /// RCODE, version, and flags) is left zero.
    ///
    /// [RFC 6891 § 6.1]: https://datatracker.ietf.org/doc/html/rfc6891#section-6.1
    pub fn add_opt(&mut self, udp_payload_size: u16, options: &[EdnsOption]) {
        let rdlength: usize = options.iter().map(|o| 4 + o.data.len()).sum();
        assert!(rdlength <= u16::MAX as usize);

        self.octets.push(0); // root owner name
        self.octets
            .extend_from_slice(&u16::from(Type::OPT).to_be_bytes());
        self.octets
            .extend_from_slice(&udp_payload_size.to_be_bytes());
        self.octets.extend_from_slice(&0u32.to_be_bytes());
        self.octets
            .extend_from_slice(&(rdlength as u16).to_be_bytes());
        for option in options {
            self.octets.extend_from_slice(&option.code.to_be_bytes());
            self.octets
                .extend_from_slice(&(option.data.len() as u16).to_be_bytes());
            self.octets.extend_from_slice(&option.data);
        }
        increment_count(&mut self.octets, ARCOUNT_START);
    }

    /// Finishes the message and returns the serialized octets.
    pub fn finish(self) -> Vec<u8> {
        self.octets
    }
}

/// Increments the 16-bit section count starting at `offset`.
fn increment_count(octets: &mut [u8], offset: usize) {
    let count = u16::from_be_bytes([octets[offset], octets[offset + 1]]);
    octets[offset..offset + 2].copy_from_slice(&(count + 1).to_be_bytes());
}

////////////////////////////////////////////////////////////////////////
// QUERY CONSTRUCTORS                                                 //
////////////////////////////////////////////////////////////////////////

/// Builds an A query for `qname` with a random ID and the RD bit set.
/// (Recursion is never needed from an authoritative server, but some
/// still honor it, and it is harmless otherwise.)
pub fn a_query<R: Rng>(rng: &mut R, qname: &Domain) -> Vec<u8> {
    let mut writer = Writer::new(rng.gen());
    writer.set_recursion_desired(true);
    writer.add_question(qname, Type::A, Class::IN);
    writer.finish()
}

/// Builds an A query for `qname` carrying an EDNS Client Subnet option
/// that hints at `subnet`.
pub fn ecs_a_query<R: Rng>(rng: &mut R, qname: &Domain, subnet: Ipv4Net) -> Vec<u8> {
    let mut writer = Writer::new(rng.gen());
    writer.set_recursion_desired(true);
    writer.add_question(qname, Type::A, Class::IN);
    writer.add_opt(
        ADVERTISED_UDP_PAYLOAD_SIZE,
        &[EdnsOption {
            code: ecs::CLIENT_SUBNET,
            data: ClientSubnet::for_query(subnet).encode(),
        }],
    );
    writer.finish()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn writer_builds_a_plain_question() {
        let mut writer = Writer::new(0x1234);
        writer.set_recursion_desired(true);
        writer.add_question(&"example.test".parse().unwrap(), Type::A, Class::IN);
        assert_eq!(
            writer.finish(),
            b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
              \x07example\x04test\x00\x00\x01\x00\x01"
        );
    }

    #[test]
    fn writer_builds_an_opt_record() {
        let mut writer = Writer::new(0);
        writer.add_opt(
            4096,
            &[EdnsOption {
                code: 12,
                data: vec![0; 4],
            }],
        );
        assert_eq!(
            writer.finish(),
            b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01\
              \x00\x00\x29\x10\x00\x00\x00\x00\x00\x00\x08\
              \x00\x0c\x00\x04\x00\x00\x00\x00"
        );
    }

    #[test]
    fn ecs_a_query_carries_the_subnet_option() {
        let mut rng = rand::rngs::mock::StepRng::new(0, 0);
        let qname: Domain = "example.test".parse().unwrap();
        let subnet: Ipv4Net = "192.0.2.0/24".parse().unwrap();
        let query = ecs_a_query(&mut rng, &qname, subnet);

        // Parse our own output and check the pieces we care about.
        let response = crate::message::Response::parse(&query).unwrap();
        assert_eq!(response.additional.len(), 1);
        let opt = &response.additional[0];
        assert_eq!(opt.rr_type, Type::OPT);
        assert_eq!(opt.class, Class::from(4096));
        match &opt.rdata {
            crate::rr::Rdata::Opt(options) => {
                assert_eq!(options.len(), 1);
                assert_eq!(options[0].code, ecs::CLIENT_SUBNET);
                let parsed = ClientSubnet::parse(&options[0].data).unwrap();
                assert_eq!(parsed.source_prefix, 24);
                assert_eq!(parsed.scope_prefix, 0);
                assert_eq!(parsed.addr, Ipv4Addr::new(192, 0, 2, 0));
            }
            other => panic!("unexpected rdata: {:?}", other),
        }
    }
}
