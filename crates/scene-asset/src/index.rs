use std::fmt::{self, Display, Formatter, LowerHex, UpperHex};

/// Content hash identifying the file a scene was imported from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleIndex(pub [u8; 32]);

impl BundleIndex {
    fn write_hex(&self, f: &mut Formatter<'_>, upper: bool) -> fmt::Result {
        for byte in self.0 {
            if upper {
                write!(f, "{:02X}", byte)?;
            } else {
                write!(f, "{:02x}", byte)?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "digest")]
    pub fn digest_from_buffer(buffer: &[u8]) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(buffer);
        Self(hasher.finalize().into())
    }
}

impl LowerHex for BundleIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.write_hex(f, false)
    }
}

impl UpperHex for BundleIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.write_hex(f, true)
    }
}

impl From<[u8; 32]> for BundleIndex {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Display for BundleIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

/// Location of a node inside a scene tree, as child indices from the root.
///
/// Paths stay valid while subtrees are only appended, which is the only
/// mutation performed when scenes are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for index in &self.0 {
            write!(f, "/{}", index)?;
        }
        Ok(())
    }
}

/// Handle of a deferred load request registered in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "request #{}", self.0)
    }
}
