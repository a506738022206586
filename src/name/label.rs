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

//! Implementation of the [`Label`] and [`LabelBuf`] types.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use super::{Error, MAX_LABEL_LEN};

////////////////////////////////////////////////////////////////////////
// LABELS                                                             //
////////////////////////////////////////////////////////////////////////

/// A single label of a domain name.
///
/// `Label` is a wrapper over `[u8]` that can only be constructed if the
/// slice is a valid DNS label, that is, if it is no more than 63 octets
/// long. In accordance with [RFC 1034 § 3.1], comparisons between
/// `Label`s are ASCII-case-insensitive. (The [`Domain`](super::Domain)
/// type additionally normalizes every label it stores to lowercase, so
/// within this crate the distinction rarely matters.)
///
/// `&Label` implements [`TryFrom`] for `&[u8]` and `From` for
/// `&[u8; N]` (where 0 ≤ `N` ≤ 63) for easy construction:
///
/// ```
/// use std::convert::TryFrom;
/// use scopescan::name::Label;
///
/// let label1: &Label = b"com".into();
/// let label2 = <&Label>::try_from(&b"org"[..]).unwrap();
/// ```
///
/// [RFC 1034 § 3.1]: https://tools.ietf.org/html/rfc1034#section-3.1
#[repr(transparent)]
pub struct Label {
    octets: [u8],
}

impl Label {
    /// Wraps up a `&[u8]` as a `Label` without checking its length for
    /// validity. To be used only within the parent module, and only
    /// after performing the length check manually.
    pub(super) fn from_unchecked(octets: &[u8]) -> &Self {
        unsafe { &*(octets as *const [u8] as *const Label) }
    }

    /// Returns whether this `Label` is empty (zero-length).
    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    /// Returns the number of octets in this `Label`.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns the octets of this `Label`.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }
}

impl<'a> TryFrom<&'a [u8]> for &'a Label {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self, Self::Error> {
        if octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            Ok(Label::from_unchecked(octets))
        }
    }
}

macro_rules! make_label_from_impl_for_n {
    ($n:expr) => {
        impl<'a> From<&'a [u8; $n]> for &'a Label {
            fn from(octets: &'a [u8; $n]) -> Self {
                Label::from_unchecked(octets)
            }
        }

        impl From<&[u8; $n]> for LabelBuf {
            fn from(octets: &[u8; $n]) -> Self {
                Self::from_unchecked(octets)
            }
        }
    };
}

macro_rules! make_label_from_impl_for_eight {
    ($n:expr) => {
        make_label_from_impl_for_n!($n);
        make_label_from_impl_for_n!($n + 1);
        make_label_from_impl_for_n!($n + 2);
        make_label_from_impl_for_n!($n + 3);
        make_label_from_impl_for_n!($n + 4);
        make_label_from_impl_for_n!($n + 5);
        make_label_from_impl_for_n!($n + 6);
        make_label_from_impl_for_n!($n + 7);
    };
}

make_label_from_impl_for_eight!(0);
make_label_from_impl_for_eight!(8);
make_label_from_impl_for_eight!(16);
make_label_from_impl_for_eight!(24);
make_label_from_impl_for_eight!(32);
make_label_from_impl_for_eight!(40);
make_label_from_impl_for_eight!(48);
make_label_from_impl_for_eight!(56);

impl ToOwned for Label {
    type Owned = LabelBuf;

    fn to_owned(&self) -> Self::Owned {
        Self::Owned::from_unchecked(self.octets())
    }
}

/// When a `Label` is displayed, periods, backslashes, and octets that
/// are not ASCII graphic characters are escaped in accordance with
/// RFC 1035 § 5.1 and RFC 4343 § 2.1.
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for octet in self.octets() {
            if *octet == b'.' {
                f.write_str("\\.")?;
            } else if *octet == b'\\' {
                f.write_str("\\\\")?;
            } else if octet.is_ascii_graphic() {
                write!(f, "{}", *octet as char)?;
            } else {
                write!(f, "\\{:03}", *octet)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// In accordance with RFC 1034 § 3.1 (clarified by RFC 4343),
/// comparison of `Label`s is ASCII-case-insensitive.
impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.octets().eq_ignore_ascii_case(other.octets())
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `Label`s are ordered as unsigned left-justified octet strings with
/// uppercase ASCII letters treated as if they were lowercase, following
/// the canonical ordering of [RFC 4034 § 6.1].
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.octets
            .iter()
            .zip(other.octets.iter())
            .find_map(
                |(a, b)| match a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()) {
                    Ordering::Less => Some(Ordering::Less),
                    Ordering::Greater => Some(Ordering::Greater),
                    Ordering::Equal => None,
                },
            )
            .unwrap_or_else(|| self.octets.len().cmp(&other.octets.len()))
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // We have to hash in a case-insensitive manner to match our
        // implementations of PartialEq and Eq.
        for octet in self.octets().iter().map(|octet| octet.to_ascii_lowercase()) {
            state.write_u8(octet);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// LABEL BUFFERS                                                      //
////////////////////////////////////////////////////////////////////////

/// A fixed-size buffer capable of holding any valid DNS label. It
/// dereferences to a [`Label`].
#[derive(Clone, Copy)]
pub struct LabelBuf {
    len: u8,
    data: [u8; MAX_LABEL_LEN],
}

impl LabelBuf {
    /// Constructs a `LabelBuf` from the given octets. The length of the
    /// slice is checked only in an assertion; the caller is expected to
    /// ensure that it is valid.
    pub(super) fn from_unchecked(octets: &[u8]) -> Self {
        assert!(octets.len() <= MAX_LABEL_LEN);
        let mut buf = LabelBuf {
            len: octets.len() as u8,
            data: [0; MAX_LABEL_LEN],
        };
        buf.data[..octets.len()].copy_from_slice(octets);
        buf
    }

    /// Makes all ASCII letters in this `LabelBuf` lowercase.
    pub fn make_ascii_lowercase(&mut self) {
        let len = self.len as usize;
        self.data[..len].make_ascii_lowercase();
    }
}

impl TryFrom<&[u8]> for LabelBuf {
    type Error = Error;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            Ok(Self::from_unchecked(octets))
        }
    }
}

impl Deref for LabelBuf {
    type Target = Label;

    fn deref(&self) -> &Self::Target {
        let len = self.len as usize;
        unsafe { &*(&self.data[..len] as *const [u8] as *const Label) }
    }
}

impl Borrow<Label> for LabelBuf {
    fn borrow(&self) -> &Label {
        self.deref()
    }
}

impl fmt::Display for LabelBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.deref())
    }
}

impl fmt::Debug for LabelBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.deref())
    }
}

// For use in HashMaps, Eq and Hash must be the same as for the
// corresponding Label.
impl PartialEq for LabelBuf {
    fn eq(&self, other: &Self) -> bool {
        self.deref() == other.deref()
    }
}

impl Eq for LabelBuf {}

impl PartialOrd for LabelBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.deref().partial_cmp(other.deref())
    }
}

impl Ord for LabelBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deref().cmp(other.deref())
    }
}

impl Hash for LabelBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.deref().hash(state)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    #[test]
    fn label_try_from_slice_accepts_ok_lengths() {
        let octets = &[0; MAX_LABEL_LEN];
        for i in 0..=MAX_LABEL_LEN {
            <&Label>::try_from(&octets[0..i]).unwrap();
        }
    }

    #[test]
    fn label_try_from_slice_rejects_bad_lengths() {
        assert_eq!(
            <&Label>::try_from(&[0; MAX_LABEL_LEN + 1][..]),
            Err(Error::LabelTooLong)
        );
        assert_eq!(LabelBuf::try_from(&[0; 97][..]), Err(Error::LabelTooLong));
    }

    fn eq_and_hash_are_case_insensitive<L>()
    where
        L: fmt::Debug + Eq + Hash + From<&'static [u8; 7]>,
    {
        let uppercase: L = b"EXAMPLE".into();
        let lowercase: L = b"example".into();
        assert_eq!(uppercase, lowercase);

        let mut hasher = DefaultHasher::new();
        uppercase.hash(&mut hasher);
        let uppercase_hash = hasher.finish();
        let mut hasher = DefaultHasher::new();
        lowercase.hash(&mut hasher);
        let lowercase_hash = hasher.finish();
        assert_eq!(uppercase_hash, lowercase_hash);
    }

    #[test]
    fn label_eq_and_hash_are_case_insensitive() {
        eq_and_hash_are_case_insensitive::<&Label>();
    }

    #[test]
    fn labelbuf_eq_and_hash_are_case_insensitive() {
        eq_and_hash_are_case_insensitive::<LabelBuf>();
    }

    #[test]
    fn labelbuf_hash_matches_label_hash() {
        // The hashes need to match so that LabelBufs can be HashMap
        // keys.
        let labelbuf: LabelBuf = b"label".into();
        let label: &Label = labelbuf.borrow();

        let mut hasher = DefaultHasher::new();
        label.hash(&mut hasher);
        let label_hash = hasher.finish();
        let mut hasher = DefaultHasher::new();
        labelbuf.hash(&mut hasher);
        let labelbuf_hash = hasher.finish();
        assert_eq!(label_hash, labelbuf_hash);
    }

    #[test]
    fn labelbuf_make_ascii_lowercase_works() {
        let mut label: LabelBuf = b"ExAmPlE".into();
        label.make_ascii_lowercase();
        assert_eq!(label.octets(), b"example");
    }

    #[test]
    fn label_display_escaping_works() {
        assert_eq!(<&Label>::from(b"\x00\\.a").to_string(), "\\000\\\\\\.a");
    }
}
