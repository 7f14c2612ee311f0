/// Content digest capability: maps a serialized value to its key.
pub trait Digest: Send + Sync {
    /// Hash `data` into a printable key.
    fn digest(&self, data: &[u8]) -> String;
}

impl<F> Digest for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn digest(&self, data: &[u8]) -> String {
        self(data)
    }
}

/// Domain-separated BLAKE3 digest with hex output.
///
/// The domain tag is prepended to every computation so that two stores
/// configured with different domains never share keys for identical bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Blake3Digest {
    domain: &'static str,
}

impl Blake3Digest {
    /// Default digest for stored objects.
    pub const OBJECT: Self = Self {
        domain: "twin-object-v1",
    };

    /// Create a digest with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Raw 32-byte hash with domain separation.
    pub fn hash_bytes(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Verify that `data` hashes to `expected`.
    pub fn verify(&self, data: &[u8], expected: &str) -> bool {
        self.digest(data) == expected
    }

    /// The domain tag used by this digest.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for Blake3Digest {
    fn default() -> Self {
        Self::OBJECT
    }
}

impl Digest for Blake3Digest {
    fn digest(&self, data: &[u8]) -> String {
        hex::encode(self.hash_bytes(data))
    }
}
