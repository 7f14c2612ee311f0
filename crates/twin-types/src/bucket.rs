use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One of the two mutually exclusive storage partitions.
///
/// Buckets implement generational reclamation: new objects go to the active
/// bucket while the other one still holds the previous generation. The
/// boolean encoding (`true` = primary) matches the flag handed to drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Primary,
    Secondary,
}

impl Bucket {
    /// Both buckets, primary first.
    pub const ALL: [Bucket; 2] = [Bucket::Primary, Bucket::Secondary];

    /// Decode the boolean discriminator (`true` = primary).
    pub const fn from_flag(flag: bool) -> Self {
        if flag {
            Self::Primary
        } else {
            Self::Secondary
        }
    }

    /// Encode as the boolean discriminator.
    pub const fn as_flag(self) -> bool {
        matches!(self, Self::Primary)
    }

    /// The opposite bucket.
    pub const fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    /// Stable index (0 = primary, 1 = secondary) for per-bucket arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for Bucket {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "a" => Ok(Self::Primary),
            "secondary" | "b" => Ok(Self::Secondary),
            _ => Err(TypeError::UnknownBucket(s.to_string())),
        }
    }
}

/// Shared cell naming the currently active bucket.
///
/// The orchestrator owns the flag and is the only writer. Everything else
/// reads it per call through a shared reference and never caches the
/// result across calls.
#[derive(Debug)]
pub struct BucketFlag {
    primary: AtomicBool,
}

impl BucketFlag {
    /// Create a flag with `active` as the current bucket.
    pub fn new(active: Bucket) -> Self {
        Self {
            primary: AtomicBool::new(active.as_flag()),
        }
    }

    /// The currently active bucket.
    pub fn current(&self) -> Bucket {
        Bucket::from_flag(self.primary.load(Ordering::SeqCst))
    }

    /// Atomically swap the active bucket and return the new one.
    pub fn flip(&self) -> Bucket {
        let previous = self.primary.fetch_xor(true, Ordering::SeqCst);
        Bucket::from_flag(!previous)
    }

    /// Force the active bucket (used when restoring orchestrator state).
    pub fn set(&self, bucket: Bucket) {
        self.primary.store(bucket.as_flag(), Ordering::SeqCst);
    }
}

impl Default for BucketFlag {
    fn default() -> Self {
        Self::new(Bucket::Primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn flag_encoding_matches_driver_convention() {
        assert_eq!(Bucket::from_flag(true), Bucket::Primary);
        assert_eq!(Bucket::from_flag(false), Bucket::Secondary);
        assert!(Bucket::Primary.as_flag());
        assert!(!Bucket::Secondary.as_flag());
    }

    #[test]
    fn other_is_an_involution() {
        for bucket in Bucket::ALL {
            assert_ne!(bucket, bucket.other());
            assert_eq!(bucket, bucket.other().other());
        }
    }

    #[test]
    fn indices_are_distinct() {
        assert_eq!(Bucket::Primary.index(), 0);
        assert_eq!(Bucket::Secondary.index(), 1);
    }

    #[test]
    fn display_and_parse() {
        assert_eq!(Bucket::Primary.to_string(), "primary");
        assert_eq!("Secondary".parse::<Bucket>().unwrap(), Bucket::Secondary);
        assert_eq!("a".parse::<Bucket>().unwrap(), Bucket::Primary);
        assert_eq!(
            "tertiary".parse::<Bucket>().unwrap_err(),
            TypeError::UnknownBucket("tertiary".into())
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Bucket::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
        let parsed: Bucket = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(parsed, Bucket::Primary);
    }

    #[test]
    fn flip_alternates() {
        let flag = BucketFlag::default();
        assert_eq!(flag.current(), Bucket::Primary);
        assert_eq!(flag.flip(), Bucket::Secondary);
        assert_eq!(flag.current(), Bucket::Secondary);
        assert_eq!(flag.flip(), Bucket::Primary);
    }

    #[test]
    fn set_overrides_current() {
        let flag = BucketFlag::new(Bucket::Primary);
        flag.set(Bucket::Secondary);
        assert_eq!(flag.current(), Bucket::Secondary);
    }

    #[test]
    fn concurrent_flips_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let flag = Arc::new(BucketFlag::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flag = Arc::clone(&flag);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        flag.flip();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        // 8000 flips is even.
        assert_eq!(flag.current(), Bucket::Primary);
    }

    proptest! {
        #[test]
        fn flip_count_parity(flips in 0usize..64) {
            let flag = BucketFlag::new(Bucket::Secondary);
            for _ in 0..flips {
                flag.flip();
            }
            let expected = if flips % 2 == 0 { Bucket::Secondary } else { Bucket::Primary };
            prop_assert_eq!(flag.current(), expected);
        }
    }
}
