// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Packed address encoding.
//
// bytes : 1       | 2     | 2*N
// name  : family  | port  | host groups (u16 each; N=4 for IPv4, 8 for IPv6)
//
// The length of one address is implied by its family byte rather than
// carried explicitly, so a sequence of addresses is decoded by consuming
// bytes until the buffer is exhausted (`unpack_addresses`).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const FAMILY_V4: u8 = 1;
const FAMILY_V6: u8 = 2;

/// A (family, numeric host, port) triple, compared and hashed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    V4([u16; 4], u16),
    V6([u16; 8], u16),
}

impl Address {
    pub fn port(&self) -> u16 {
        match *self {
            Address::V4(_, port) | Address::V6(_, port) => port,
        }
    }

    /// Number of bytes `pack` produces for this address.
    pub fn packed_len(&self) -> usize {
        match self {
            Address::V4(..) => 1 + 2 + 4 * 2,
            Address::V6(..) => 1 + 2 + 8 * 2,
        }
    }

    pub fn pack(&self, out: &mut Vec<u8>) {
        match *self {
            Address::V4(groups, port) => {
                out.push(FAMILY_V4);
                out.write_u16::<BigEndian>(port).expect("Vec writes never fail");
                for g in groups {
                    out.write_u16::<BigEndian>(g).expect("Vec writes never fail");
                }
            }
            Address::V6(groups, port) => {
                out.push(FAMILY_V6);
                out.write_u16::<BigEndian>(port).expect("Vec writes never fail");
                for g in groups {
                    out.write_u16::<BigEndian>(g).expect("Vec writes never fail");
                }
            }
        }
    }

    /// Decode one address from the front of `buf`, returning the address
    /// and the number of bytes consumed.
    pub fn unpack(buf: &[u8]) -> Result<(Address, usize)> {
        if buf.is_empty() {
            return Err(Error::Malformed("empty address buffer".into()));
        }
        let family = buf[0];
        let n = match family {
            FAMILY_V4 => 4,
            FAMILY_V6 => 8,
            other => return Err(Error::Malformed(format!("unknown address family {other}"))),
        };
        let needed = 1 + 2 + n * 2;
        if buf.len() < needed {
            return Err(Error::Malformed("address buffer too short".into()));
        }
        let mut cur = &buf[1..];
        let port = cur.read_u16::<BigEndian>().expect("length checked above");
        let mut groups = [0u16; 8];
        for slot in groups.iter_mut().take(n) {
            *slot = cur.read_u16::<BigEndian>().expect("length checked above");
        }
        let addr = if family == FAMILY_V4 {
            Address::V4([groups[0], groups[1], groups[2], groups[3]], port)
        } else {
            Address::V6(groups, port)
        };
        Ok((addr, needed))
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(a) => {
                let o = a.ip().octets();
                Address::V4([o[0] as u16, o[1] as u16, o[2] as u16, o[3] as u16], a.port())
            }
            SocketAddr::V6(a) => Address::V6(a.ip().segments(), a.port()),
        }
    }
}

impl From<Address> for SocketAddr {
    fn from(addr: Address) -> Self {
        match addr {
            Address::V4(groups, port) => {
                let octets = [groups[0] as u8, groups[1] as u8, groups[2] as u8, groups[3] as u8];
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port))
            }
            Address::V6(groups, port) => {
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(groups), port, 0, 0))
            }
        }
    }
}

/// Pack a tight, concatenated sequence of addresses.
pub fn pack_addresses(addrs: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addrs.iter().map(Address::packed_len).sum());
    for a in addrs {
        a.pack(&mut out);
    }
    out
}

/// Decode a concatenated sequence of addresses until the buffer is
/// exhausted.
pub fn unpack_addresses(buf: &[u8]) -> Result<Vec<Address>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        let (addr, consumed) = Address::unpack(&buf[i..])?;
        out.push(addr);
        i += consumed;
    }
    Ok(out)
}
