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

//! Mock servers and response construction for tests.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::message::constants::*;
use crate::message::Reader;
use crate::name::Domain;
use crate::net::Transport;
use crate::rr::{Class, EdnsOption, Type};

////////////////////////////////////////////////////////////////////////
// RESPONSE CONSTRUCTION                                              //
////////////////////////////////////////////////////////////////////////

/// Builds response messages for mock servers, one section at a time.
/// Names are written uncompressed.
pub(crate) struct ResponseBuilder {
    octets: Vec<u8>,
}

impl ResponseBuilder {
    /// Starts a response to the given query: same ID, same question,
    /// QR set.
    pub(crate) fn answering(query: &[u8]) -> Self {
        let (id, qname) = query_parts(query);
        let mut octets = vec![0; HEADER_SIZE];
        octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
        octets[QR_BYTE] |= QR_MASK;
        let mut builder = Self { octets };
        qname.write_wire(&mut builder.octets);
        builder
            .octets
            .extend_from_slice(&u16::from(Type::A).to_be_bytes());
        builder
            .octets
            .extend_from_slice(&u16::from(Class::IN).to_be_bytes());
        builder.bump_count(QDCOUNT_START);
        builder
    }

    pub(crate) fn answer_a(mut self, owner: &str, ip: Ipv4Addr) -> Self {
        self.push_rr(owner, Type::A, &ip.octets());
        self.bump_count(ANCOUNT_START);
        self
    }

    pub(crate) fn answer_cname(mut self, owner: &str, target: &str) -> Self {
        let rdata = name_wire(target);
        self.push_rr(owner, Type::CNAME, &rdata);
        self.bump_count(ANCOUNT_START);
        self
    }

    pub(crate) fn authority_ns(mut self, zone: &str, nameserver: &str) -> Self {
        let rdata = name_wire(nameserver);
        self.push_rr(zone, Type::NS, &rdata);
        self.bump_count(NSCOUNT_START);
        self
    }

    pub(crate) fn additional_a(mut self, owner: &str, ip: Ipv4Addr) -> Self {
        self.push_rr(owner, Type::A, &ip.octets());
        self.bump_count(ARCOUNT_START);
        self
    }

    pub(crate) fn additional_opt(mut self, options: &[EdnsOption]) -> Self {
        self.octets.push(0); // root owner
        self.octets
            .extend_from_slice(&u16::from(Type::OPT).to_be_bytes());
        self.octets.extend_from_slice(&4096u16.to_be_bytes());
        self.octets.extend_from_slice(&0u32.to_be_bytes());
        let rdlength: usize = options.iter().map(|o| 4 + o.data.len()).sum();
        self.octets
            .extend_from_slice(&(rdlength as u16).to_be_bytes());
        for option in options {
            self.octets.extend_from_slice(&option.code.to_be_bytes());
            self.octets
                .extend_from_slice(&(option.data.len() as u16).to_be_bytes());
            self.octets.extend_from_slice(&option.data);
        }
        self.bump_count(ARCOUNT_START);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.octets
    }

    fn push_rr(&mut self, owner: &str, rr_type: Type, rdata: &[u8]) {
        let owner: Domain = owner.parse().unwrap();
        owner.write_wire(&mut self.octets);
        self.octets
            .extend_from_slice(&u16::from(rr_type).to_be_bytes());
        self.octets
            .extend_from_slice(&u16::from(Class::IN).to_be_bytes());
        self.octets.extend_from_slice(&300u32.to_be_bytes());
        self.octets
            .extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.octets.extend_from_slice(rdata);
    }

    fn bump_count(&mut self, offset: usize) {
        let count = u16::from_be_bytes([self.octets[offset], self.octets[offset + 1]]);
        self.octets[offset..offset + 2].copy_from_slice(&(count + 1).to_be_bytes());
    }
}

/// Extracts the ID and question name from a query.
pub(crate) fn query_parts(query: &[u8]) -> (u16, Domain) {
    let mut reader = Reader::try_from(query).unwrap();
    let id = reader.id();
    let question = reader.read_question().unwrap();
    (id, question.qname)
}

fn name_wire(name: &str) -> Vec<u8> {
    let domain: Domain = name.parse().unwrap();
    let mut buf = Vec::new();
    domain.write_wire(&mut buf);
    buf
}

////////////////////////////////////////////////////////////////////////
// SCRIPTED TRANSPORT                                                 //
////////////////////////////////////////////////////////////////////////

/// A handler playing the role of one mock server.
pub(crate) type Handler = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// A [`Transport`] backed by per-address handlers. Queries to an
/// address without a handler time out. Every call is counted, so tests
/// can assert how many packets would have hit the network.
#[derive(Default)]
pub(crate) struct MockNetwork {
    handlers: HashMap<Ipv4Addr, Handler>,
    queries: AtomicUsize,
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` as the server at `addr`.
    pub(crate) fn server<F>(mut self, addr: Ipv4Addr, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.insert(addr, Box::new(handler));
        self
    }

    pub(crate) fn into_transport(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn queries_sent(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Transport for Arc<MockNetwork> {
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> io::Result<Option<Vec<u8>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.handlers.get(&server).and_then(|handler| handler(query)))
    }
}
