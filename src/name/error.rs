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

//! The error type for domain-name handling.

use std::fmt;

/// An error encountered while constructing or parsing a [`Domain`]
/// or [`Label`].
///
/// [`Domain`]: super::Domain
/// [`Label`]: super::Label
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A label exceeds 63 octets.
    LabelTooLong,

    /// The on-the-wire representation of the name exceeds 255 octets.
    NameTooLong,

    /// An empty (null) label occurred somewhere other than at the end
    /// of a textual name.
    EmptyLabel,

    /// A textual name was empty.
    StrEmpty,

    /// A textual name contained non-ASCII characters.
    StrNotAscii,

    /// The end of the message was reached in the middle of an
    /// on-the-wire name.
    UnexpectedEom,

    /// A compression pointer did not point strictly backward.
    InvalidPointer,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LabelTooLong => f.write_str("label exceeds 63 octets"),
            Self::NameTooLong => f.write_str("name exceeds 255 octets"),
            Self::EmptyLabel => f.write_str("empty non-terminal label"),
            Self::StrEmpty => f.write_str("string is empty"),
            Self::StrNotAscii => f.write_str("string is not ASCII"),
            Self::UnexpectedEom => f.write_str("unexpected end of message in name"),
            Self::InvalidPointer => f.write_str("compression pointer does not point backward"),
        }
    }
}

impl std::error::Error for Error {}
