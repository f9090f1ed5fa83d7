use sha2::{Digest, Sha256};

/// Lookup payload stored in the cache together with its SHA-256 digest.
///
/// Entries whose digest no longer matches are treated as a miss, so a
/// corrupted entry costs one provider call instead of feeding bad address
/// data into a save.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// Provider payload as JSON text.
    pub data: String,
    /// Hex-encoded SHA-256 of `data`.
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Storage form: the entry itself as JSON.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the payload of a stored entry, or `None` when it cannot be
    /// parsed or its digest does not match.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Discarding lookup cache entry: checksum mismatch ({} bytes)",
                entry.data.len()
            );
            None
        }
    }
}
