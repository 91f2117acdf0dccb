//! Big-endian primitives shared by every peer wire message.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    chain::{AgentId, Balance, Balances, Color, Hash, RequestId, TransactionId, AGENT_ID_LENGTH},
    error::WireError,
};

/// Types with a binary wire representation
pub trait Wire: Sized {
    /// Append the encoding of `self` to `buf`
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError>;

    /// Decode a value from the front of `r`, advancing it
    fn read_from(r: &mut &[u8]) -> Result<Self, WireError>;

    /// Encode into a fresh buffer
    fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = vec![];
        self.write_to(&mut buf)?;

        Ok(buf)
    }

    /// Decode a whole buffer. Trailing bytes are ignored.
    fn from_wire(mut data: &[u8]) -> Result<Self, WireError> {
        Self::read_from(&mut data)
    }
}

pub(crate) fn write_u8(buf: &mut Vec<u8>, v: u8) -> Result<(), WireError> {
    buf.write_u8(v)?;
    Ok(())
}

pub(crate) fn read_u8(r: &mut &[u8], what: &'static str) -> Result<u8, WireError> {
    r.read_u8().map_err(|_| WireError::Truncated(what))
}

pub(crate) fn write_bool(buf: &mut Vec<u8>, v: bool) -> Result<(), WireError> {
    write_u8(buf, u8::from(v))
}

pub(crate) fn read_bool(r: &mut &[u8], what: &'static str) -> Result<bool, WireError> {
    match read_u8(r, what)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(WireError::InvalidBool(other)),
    }
}

pub(crate) fn write_u16(buf: &mut Vec<u8>, v: u16) -> Result<(), WireError> {
    buf.write_u16::<BigEndian>(v)?;
    Ok(())
}

pub(crate) fn read_u16(r: &mut &[u8], what: &'static str) -> Result<u16, WireError> {
    r.read_u16::<BigEndian>()
        .map_err(|_| WireError::Truncated(what))
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, v: u32) -> Result<(), WireError> {
    buf.write_u32::<BigEndian>(v)?;
    Ok(())
}

pub(crate) fn read_u32(r: &mut &[u8], what: &'static str) -> Result<u32, WireError> {
    r.read_u32::<BigEndian>()
        .map_err(|_| WireError::Truncated(what))
}

pub(crate) fn write_i64(buf: &mut Vec<u8>, v: i64) -> Result<(), WireError> {
    buf.write_i64::<BigEndian>(v)?;
    Ok(())
}

pub(crate) fn read_i64(r: &mut &[u8], what: &'static str) -> Result<i64, WireError> {
    r.read_i64::<BigEndian>()
        .map_err(|_| WireError::Truncated(what))
}

pub(crate) fn read_array<const N: usize>(
    r: &mut &[u8],
    what: &'static str,
) -> Result<[u8; N], WireError> {
    let mut out = [0; N];
    r.read_exact(&mut out)
        .map_err(|_| WireError::Truncated(what))?;

    Ok(out)
}

/// Length prefix of a collection, failing if it does not fit in a `u16`
pub(crate) fn write_len(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), WireError> {
    let len16 = u16::try_from(len).map_err(|_| WireError::TooLong { what, len })?;
    write_u16(buf, len16)
}

/// Byte string with a `u16` length prefix
pub(crate) fn write_bytes16(
    buf: &mut Vec<u8>,
    data: &[u8],
    what: &'static str,
) -> Result<(), WireError> {
    write_len(buf, data.len(), what)?;
    buf.extend_from_slice(data);

    Ok(())
}

pub(crate) fn read_bytes16(r: &mut &[u8], what: &'static str) -> Result<Vec<u8>, WireError> {
    let len = usize::from(read_u16(r, what)?);
    if r.len() < len {
        return Err(WireError::Truncated(what));
    }
    let (data, rest) = r.split_at(len);
    *r = rest;

    Ok(data.to_vec())
}

macro_rules! wire_fixed_bytes {
    ($($name:ident => $what:expr),* $(,)?) => {
        $(
            impl Wire for $name {
                fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
                    buf.extend_from_slice(&self.0);
                    Ok(())
                }

                fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
                    read_array(r, $what).map($name)
                }
            }
        )*
    };
}

wire_fixed_bytes!(
    Hash => "hash",
    TransactionId => "transaction id",
    Color => "color",
    RequestId => "request id",
);

impl Wire for AgentId {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        buf.extend_from_slice(&self.0);
        Ok(())
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        read_array::<AGENT_ID_LENGTH>(r, "agent id").map(AgentId)
    }
}

/// `u16` count followed by the encoded items
pub(crate) fn write_vec<T: Wire>(
    buf: &mut Vec<u8>,
    items: &[T],
    what: &'static str,
) -> Result<(), WireError> {
    write_len(buf, items.len(), what)?;
    for item in items {
        item.write_to(buf)?;
    }

    Ok(())
}

pub(crate) fn read_vec<T: Wire>(r: &mut &[u8], what: &'static str) -> Result<Vec<T>, WireError> {
    let count = read_u16(r, what)?;
    (0..count).map(|_| T::read_from(r)).collect()
}

impl Wire for Balance {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        self.color.write_to(buf)?;
        write_i64(buf, self.value)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Balance {
            color: Color::read_from(r)?,
            value: read_i64(r, "balance value")?,
        })
    }
}

pub(crate) fn write_balances(buf: &mut Vec<u8>, balances: &Balances) -> Result<(), WireError> {
    write_len(buf, balances.len(), "balances")?;
    for (txid, bals) in balances {
        txid.write_to(buf)?;
        write_vec(buf, bals, "colored balances")?;
    }

    Ok(())
}

pub(crate) fn read_balances(r: &mut &[u8]) -> Result<Balances, WireError> {
    let count = read_u16(r, "balances")?;
    let mut balances = Balances::new();
    for _ in 0..count {
        let txid = TransactionId::read_from(r)?;
        let bals = read_vec(r, "colored balances")?;
        balances.insert(txid, bals);
    }

    Ok(balances)
}
