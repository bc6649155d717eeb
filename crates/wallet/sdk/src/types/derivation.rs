//! Hierarchical-deterministic derivation paths

use std::{fmt, str::FromStr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::tlv::{Tag, TlvDecode, TlvEncode, TlvError, TlvValueType};

/// Bit set on hardened indices in the binary form
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Errors raised while parsing a derivation path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationPathError {
    /// The path does not start with `m`
    #[error("Derivation path must start with 'm'")]
    MissingMaster,
    /// A node is not a valid index
    #[error("Invalid derivation node '{0}'")]
    InvalidNode(String),
    /// A node index does not fit below the hardened offset
    #[error("Derivation index {0} out of range")]
    IndexOutOfRange(u32),
    /// Binary form is not a multiple of four bytes
    #[error("Derivation path must be a multiple of 4 bytes, got {0}")]
    InvalidLength(usize),
}

/// One step of a derivation path
///
/// Indices are below [`HARDENED_OFFSET`]; use [`Self::new`] to check this.
/// Bits above the index range are dropped when the node is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DerivationNode {
    /// Hardened child
    Hardened(u32),
    /// Normal child
    NonHardened(u32),
}

impl DerivationNode {
    /// Node at `index`, rejecting indices that collide with the hardened bit
    pub const fn new(index: u32, hardened: bool) -> Result<Self, DerivationPathError> {
        if index >= HARDENED_OFFSET {
            return Err(DerivationPathError::IndexOutOfRange(index));
        }
        Ok(if hardened { Self::Hardened(index) } else { Self::NonHardened(index) })
    }

    const fn raw_index(&self) -> u32 {
        match self {
            Self::Hardened(i) | Self::NonHardened(i) => *i,
        }
    }

    /// Index without the hardened bit
    pub const fn index(&self) -> u32 {
        self.raw_index() & !HARDENED_OFFSET
    }

    /// Whether this node is hardened
    pub const fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }

    /// 32-bit wire value, hardened bit included
    pub const fn to_u32(&self) -> u32 {
        match self {
            Self::Hardened(_) => self.index() | HARDENED_OFFSET,
            Self::NonHardened(_) => self.index(),
        }
    }

    /// Decode from the 32-bit wire value
    pub const fn from_u32(value: u32) -> Self {
        if value & HARDENED_OFFSET != 0 {
            Self::Hardened(value & !HARDENED_OFFSET)
        } else {
            Self::NonHardened(value)
        }
    }
}

impl fmt::Display for DerivationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardened(_) => write!(f, "{}'", self.index()),
            Self::NonHardened(_) => write!(f, "{}", self.index()),
        }
    }
}

/// Ordered list of derivation nodes below the master key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivationPath {
    nodes: Vec<DerivationNode>,
}

impl DerivationPath {
    /// Create a path from nodes
    ///
    /// Fails on the first node whose index does not fit below the hardened
    /// offset.
    pub fn new(nodes: Vec<DerivationNode>) -> Result<Self, DerivationPathError> {
        if let Some(node) = nodes.iter().find(|n| n.raw_index() >= HARDENED_OFFSET) {
            return Err(DerivationPathError::IndexOutOfRange(node.raw_index()));
        }
        Ok(Self { nodes })
    }

    /// Path nodes, outermost first
    pub fn nodes(&self) -> &[DerivationNode] {
        &self.nodes
    }

    /// Whether every node is hardened
    pub fn is_fully_hardened(&self) -> bool {
        self.nodes.iter().all(DerivationNode::is_hardened)
    }

    /// Binary form, 4 bytes per node big-endian
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.nodes.len() * 4);
        for node in &self.nodes {
            buf.put_u32(node.to_u32());
        }
        buf.freeze()
    }

    /// Parse the binary form
    pub fn from_bytes(data: &[u8]) -> Result<Self, DerivationPathError> {
        if data.len() % 4 != 0 {
            return Err(DerivationPathError::InvalidLength(data.len()));
        }
        let nodes = data
            .chunks_exact(4)
            .map(|c| DerivationNode::from_u32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        Ok(Self { nodes })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for node in &self.nodes {
            write!(f, "/{node}")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        if !matches!(parts.next(), Some("m" | "M")) {
            return Err(DerivationPathError::MissingMaster);
        }

        let nodes = parts
            .map(|part| {
                let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                    Some(digits) => (digits, true),
                    None => (part, false),
                };
                let index: u32 = digits
                    .parse()
                    .map_err(|_| DerivationPathError::InvalidNode(part.to_owned()))?;
                DerivationNode::new(index, hardened)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { nodes })
    }
}

impl TlvEncode for DerivationPath {
    fn to_tlv_value(&self) -> Bytes {
        self.to_bytes()
    }
}

impl TlvDecode for DerivationPath {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::DerivationPath];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        Self::from_bytes(value)
            .map_err(|_| TlvError::mismatch(tag, "multiple of 4 bytes", value.len()))
    }
}
