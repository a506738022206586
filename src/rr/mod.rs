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

//! Data structures and routines for handling DNS resource record data.

use std::convert::TryInto;
use std::fmt;
use std::net::Ipv4Addr;

use crate::name::{self, Domain};

pub mod ecs;
pub use ecs::ClientSubnet;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// Represents the RR type of a DNS record.
///
/// An RR type is represented on the wire as an unsigned 16-bit integer,
/// so this is basically a wrapper around `u16` with nice
/// [`Debug`](fmt::Debug) and [`Display`](fmt::Display) implementations
/// and constants for the types this crate works with.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const CNAME: Type = Type(5);
    pub const SOA: Type = Type(6);
    pub const AAAA: Type = Type(28);
    pub const OPT: Type = Type(41);
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::CNAME => f.write_str("CNAME"),
            Self::SOA => f.write_str("SOA"),
            Self::AAAA => f.write_str("AAAA"),
            Self::OPT => f.write_str("OPT"),
            Self(value) => write!(f, "TYPE{}", value),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

////////////////////////////////////////////////////////////////////////
// CLASSES                                                            //
////////////////////////////////////////////////////////////////////////

/// Represents a class in the DNS.
///
/// A class is represented on the wire as an unsigned 16-bit integer.
/// The only class this crate queries is [`IN`](Class::IN); note that in
/// OPT pseudo-records the class field instead carries the requester's
/// maximum UDP payload size, so it is kept as a raw number.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Class(u16);

impl Class {
    pub const IN: Self = Self(1);
}

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Class(value)
    }
}

impl From<Class> for u16 {
    fn from(class: Class) -> Self {
        class.0
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IN => f.write_str("IN"),
            Self(value) => write!(f, "CLASS{}", value),
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

////////////////////////////////////////////////////////////////////////
// RDATA                                                              //
////////////////////////////////////////////////////////////////////////

/// A single EDNS option: an attribute-value pair from the RDATA of an
/// OPT pseudo-record ([RFC 6891 § 6.1.2]).
///
/// [RFC 6891 § 6.1.2]: https://datatracker.ietf.org/doc/html/rfc6891#section-6.1.2
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// The decoded RDATA of a resource record.
///
/// Only the types the scanner consumes are decoded; everything else is
/// carried as [`Rdata::Other`] so that a message containing (say)
/// RRSIGs can still be walked record by record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rdata {
    A(Ipv4Addr),
    Ns(Domain),
    Cname(Domain),
    Opt(Vec<EdnsOption>),
    Other,
}

impl Rdata {
    /// Reads the RDATA of a record of type `rr_type` from a message.
    ///
    /// `rdlength` octets are read starting from `&message[start..]`.
    /// The whole message is passed (rather than just the RDATA octets)
    /// because NS and CNAME RDATA may contain compressed domain names,
    /// whose pointers refer to earlier parts of the message.
    pub fn read(
        rr_type: Type,
        message: &[u8],
        start: usize,
        rdlength: u16,
    ) -> Result<Self, ReadRdataError> {
        let end = start + rdlength as usize;
        if end > message.len() {
            return Err(ReadRdataError::UnexpectedEom);
        }
        match rr_type {
            Type::A => {
                if rdlength != 4 {
                    Err(ReadRdataError::InvalidLength)
                } else {
                    // The unwrap() is okay: we just checked the length.
                    let octets: [u8; 4] = message[start..end].try_into().unwrap();
                    Ok(Self::A(octets.into()))
                }
            }
            Type::NS => {
                let (name, _) = Domain::try_from_compressed(message, start)?;
                Ok(Self::Ns(name))
            }
            Type::CNAME => {
                let (name, _) = Domain::try_from_compressed(message, start)?;
                Ok(Self::Cname(name))
            }
            Type::OPT => read_options(&message[..end], start).map(Self::Opt),
            _ => Ok(Self::Other),
        }
    }
}

/// Reads the options of an OPT record's RDATA, which occupies
/// `octets[start..]`.
fn read_options(octets: &[u8], start: usize) -> Result<Vec<EdnsOption>, ReadRdataError> {
    let mut options = Vec::new();
    let mut offset = start;
    while offset < octets.len() {
        let header = octets
            .get(offset..offset + 4)
            .ok_or(ReadRdataError::UnexpectedEom)?;
        let code = u16::from_be_bytes([header[0], header[1]]);
        let len = u16::from_be_bytes([header[2], header[3]]) as usize;
        let data = octets
            .get(offset + 4..offset + 4 + len)
            .ok_or(ReadRdataError::UnexpectedEom)?;
        options.push(EdnsOption {
            code,
            data: data.to_vec(),
        });
        offset += 4 + len;
    }
    Ok(options)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA could not be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadRdataError {
    UnexpectedEom,
    InvalidLength,
    InvalidName(name::Error),
}

impl From<name::Error> for ReadRdataError {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for ReadRdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedEom => f.write_str("unexpected end of message in RDATA"),
            Self::InvalidLength => f.write_str("invalid RDATA length"),
            Self::InvalidName(err) => write!(f, "invalid name in RDATA: {}", err),
        }
    }
}

impl std::error::Error for ReadRdataError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
