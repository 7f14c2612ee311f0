use serde::{Deserialize, Serialize};

/// Outcome of a keyed load.
///
/// A missing key is an expected outcome, not a failure, so it gets its own
/// variant instead of an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// The key exists; carries the stored value.
    Found(Vec<u8>),
    /// The key does not exist in the searched bucket(s).
    NotFound,
}

impl Lookup {
    /// Returns `true` for [`Lookup::Found`].
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Borrow the value, if found.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Take the value, if found.
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }
}

impl From<Option<Vec<u8>>> for Lookup {
    fn from(value: Option<Vec<u8>>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::NotFound,
        }
    }
}

/// Entry and byte counts for one bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Number of stored values.
    pub entries: u64,
    /// Total bytes across stored values.
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_exposes_value() {
        let hit = Lookup::Found(b"v1".to_vec());
        assert!(hit.is_found());
        assert_eq!(hit.value(), Some(&b"v1"[..]));
        assert_eq!(hit.into_value(), Some(b"v1".to_vec()));
    }

    #[test]
    fn not_found_has_no_value() {
        let miss = Lookup::NotFound;
        assert!(!miss.is_found());
        assert!(miss.value().is_none());
    }

    #[test]
    fn from_option() {
        assert_eq!(Lookup::from(None), Lookup::NotFound);
        assert_eq!(Lookup::from(Some(vec![1])), Lookup::Found(vec![1]));
    }

    #[test]
    fn empty_value_is_still_found() {
        assert!(Lookup::from(Some(Vec::new())).is_found());
    }
}
