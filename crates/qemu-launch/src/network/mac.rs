use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LaunchError;

/// Leading octets of generated addresses.
///
/// `ca:fe` has the locally-administered bit set and is not assigned to any
/// vendor (IANA ethernet-numbers registry).
const PREFIX: [u8; 2] = [0xca, 0xfe];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Random `ca:fe:xx:xx:xx:xx` address.
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    /// Each tail octet is two hex digits drawn independently.
    fn random_with(rng: &mut impl Rng) -> Self {
        let [a, b] = PREFIX;
        let mut octets = [a, b, 0, 0, 0, 0];
        for octet in octets.iter_mut().skip(PREFIX.len()) {
            let hi = pick_hex_digit(rng);
            let lo = pick_hex_digit(rng);
            *octet = (hi << 4) | lo;
        }
        Self(octets)
    }

    /// Random address guaranteed to differ from `other`.
    pub fn random_distinct_from(other: &MacAddress) -> Self {
        loop {
            let mac = Self::random();
            if mac != *other {
                return mac;
            }
        }
    }
}

/// Value (0..16) of a digit chosen uniformly from the hex alphabet.
fn pick_hex_digit(rng: &mut impl Rng) -> u8 {
    let idx = rng.gen_range(0..HEX_DIGITS.len());
    HEX_DIGITS
        .get(idx)
        .and_then(|&c| char::from(c).to_digit(16))
        .map_or(0, |d| d as u8)
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LaunchError::Config(format!("invalid MAC address: {s:?}"));
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
