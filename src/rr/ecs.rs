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

//! The EDNS Client Subnet (ECS) option.
//!
//! This follows [RFC 7871]. Only the IPv4 address family (FAMILY=1) is
//! supported; the scanner fixes its measurements to IPv4.
//!
//! [RFC 7871]: https://datatracker.ietf.org/doc/html/rfc7871

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// The EDNS option code of the Client Subnet option.
pub const CLIENT_SUBNET: u16 = 8;

/// The ADDRESS FAMILY value for IPv4 ([RFC 7871 § 6]).
const FAMILY_IPV4: u16 = 1;

////////////////////////////////////////////////////////////////////////
// CLIENT SUBNET OPTION DATA                                          //
////////////////////////////////////////////////////////////////////////

/// The data of an EDNS Client Subnet option, restricted to the IPv4
/// address family.
///
/// In a query, `source_prefix` carries the prefix length of the subnet
/// hint and `scope_prefix` is zero. In a response, `scope_prefix` is
/// the prefix length the server actually used to compute the answer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClientSubnet {
    pub source_prefix: u8,
    pub scope_prefix: u8,
    pub addr: Ipv4Addr,
}

impl ClientSubnet {
    /// Constructs the option data for a query hinting at `subnet`: the
    /// subnet's network address and prefix length, with a zero scope.
    pub fn for_query(subnet: Ipv4Net) -> Self {
        Self {
            source_prefix: subnet.prefix_len(),
            scope_prefix: 0,
            addr: subnet.network(),
        }
    }

    /// Returns the subnet described by the ADDRESS and SOURCE
    /// PREFIX-LENGTH fields.
    pub fn subnet(&self) -> Ipv4Net {
        // The unwrap() is okay: both constructors guarantee that
        // source_prefix is at most 32.
        Ipv4Net::new(self.addr, self.source_prefix).unwrap()
    }

    /// Serializes the option data ([RFC 7871 § 6] wire format). The
    /// ADDRESS field is truncated to the minimum number of octets
    /// covering the source prefix.
    ///
    /// [RFC 7871 § 6]: https://datatracker.ietf.org/doc/html/rfc7871#section-6
    pub fn encode(&self) -> Vec<u8> {
        let address_len = (self.source_prefix as usize + 7) / 8;
        let mut data = Vec::with_capacity(4 + address_len);
        data.extend_from_slice(&FAMILY_IPV4.to_be_bytes());
        data.push(self.source_prefix);
        data.push(self.scope_prefix);
        data.extend_from_slice(&self.addr.octets()[..address_len]);
        data
    }

    /// Parses option data.
    ///
    /// Address families other than IPv4 and prefix lengths over 32 are
    /// rejected; under FAMILY=1 such values cannot describe anything
    /// real. A truncated ADDRESS field is zero-extended.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let header = data.get(0..4).ok_or(Error::Truncated)?;
        let family = u16::from_be_bytes([header[0], header[1]]);
        if family != FAMILY_IPV4 {
            return Err(Error::UnsupportedFamily(family));
        }
        let source_prefix = header[2];
        let scope_prefix = header[3];
        if source_prefix > 32 || scope_prefix > 32 {
            return Err(Error::PrefixTooLong);
        }
        let address = &data[4..];
        if address.len() > 4 {
            return Err(Error::AddressTooLong);
        }
        let mut octets = [0; 4];
        octets[..address.len()].copy_from_slice(address);
        Ok(Self {
            source_prefix,
            scope_prefix,
            addr: octets.into(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that Client Subnet option data is malformed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    Truncated,
    UnsupportedFamily(u16),
    PrefixTooLong,
    AddressTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("option data is truncated"),
            Self::UnsupportedFamily(family) => {
                write!(f, "unsupported address family {}", family)
            }
            Self::PrefixTooLong => f.write_str("prefix length exceeds 32 bits"),
            Self::AddressTooLong => f.write_str("address field exceeds 4 octets"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
