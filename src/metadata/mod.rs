//! Bytecode metadata-trailer decoding.
//!
//! Solidity appends a CBOR-encoded map to deployed bytecode, followed by a
//! two-byte big-endian length of that map. The map points at the off-chain
//! source material (`ipfs`, `bzzr0`/`bzzr1`) and usually carries the
//! compiler version (`solc`). This module extracts the pointer; fetching
//! and interpreting the content behind it is the source fetcher's job.

use alloy::primitives::hex;
use ciborium::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("bytecode too short for a metadata trailer")]
    TooShort,
    #[error("metadata trailer length {length} exceeds bytecode size {size}")]
    LengthOutOfRange { length: usize, size: usize },
    #[error("metadata trailer is not valid CBOR: {0}")]
    Cbor(String),
    #[error("metadata carries no source pointer")]
    NoSourcePointer,
}

/// Where the source material lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Ipfs,
    /// Swarm, `bzzr1` scheme.
    Bzzr1,
    /// Swarm, legacy `bzzr0` scheme.
    Bzzr0,
}

impl SourceOrigin {
    fn scheme(self) -> &'static str {
        match self {
            Self::Ipfs => "ipfs",
            Self::Bzzr1 => "bzzr1",
            Self::Bzzr0 => "bzzr0",
        }
    }
}

/// Content-addressed location of a contract's source material, decoded
/// from the bytecode trailer. Opaque to the monitors; consumed by the
/// source fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress {
    pub origin: SourceOrigin,
    /// Raw multihash / swarm hash bytes as they appear in the trailer.
    pub hash: Vec<u8>,
    /// Compiler version from the `solc` entry, when present.
    pub compiler_version: Option<String>,
}

impl std::fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.origin.scheme(), hex::encode(&self.hash))
    }
}

/// Decode the trailing metadata of `bytecode` into a [`SourceAddress`].
///
/// When several pointers are present, `ipfs` wins over `bzzr1` over
/// `bzzr0`, matching compiler emission history.
pub fn decode_source_address(bytecode: &[u8]) -> Result<SourceAddress, MetadataError> {
    let trailer = trailer_bytes(bytecode)?;

    let value: Value = ciborium::de::from_reader(trailer)
        .map_err(|e| MetadataError::Cbor(e.to_string()))?;
    let Value::Map(entries) = value else {
        return Err(MetadataError::Cbor("trailer is not a CBOR map".to_string()));
    };

    let mut ipfs = None;
    let mut bzzr1 = None;
    let mut bzzr0 = None;
    let mut compiler_version = None;

    for (key, value) in entries {
        let Value::Text(key) = key else { continue };
        match (key.as_str(), value) {
            ("ipfs", Value::Bytes(bytes)) => ipfs = Some(bytes),
            ("bzzr1", Value::Bytes(bytes)) => bzzr1 = Some(bytes),
            ("bzzr0", Value::Bytes(bytes)) => bzzr0 = Some(bytes),
            ("solc", Value::Bytes(bytes)) if bytes.len() == 3 => {
                compiler_version = Some(format!("{}.{}.{}", bytes[0], bytes[1], bytes[2]));
            }
            ("solc", Value::Text(text)) => compiler_version = Some(text),
            _ => {}
        }
    }

    let (origin, hash) = if let Some(hash) = ipfs {
        (SourceOrigin::Ipfs, hash)
    } else if let Some(hash) = bzzr1 {
        (SourceOrigin::Bzzr1, hash)
    } else if let Some(hash) = bzzr0 {
        (SourceOrigin::Bzzr0, hash)
    } else {
        return Err(MetadataError::NoSourcePointer);
    };

    Ok(SourceAddress {
        origin,
        hash,
        compiler_version,
    })
}

fn trailer_bytes(bytecode: &[u8]) -> Result<&[u8], MetadataError> {
    if bytecode.len() < 2 {
        return Err(MetadataError::TooShort);
    }
    let length = u16::from_be_bytes([bytecode[bytecode.len() - 2], bytecode[bytecode.len() - 1]])
        as usize;
    if length == 0 || length + 2 > bytecode.len() {
        return Err(MetadataError::LengthOutOfRange {
            length,
            size: bytecode.len(),
        });
    }
    let end = bytecode.len() - 2;
    Ok(&bytecode[end - length..end])
}
