use rand::RngCore;

/// Randomness capability used for ephemeral names.
pub trait RandomSource: Send + Sync {
    /// A fresh name, safe to use as a single path component.
    fn random_name(&self) -> String;
}

impl<F> RandomSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn random_name(&self) -> String {
        self()
    }
}

/// Thread-local OS-seeded generator producing 128-bit hex names.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn random_name(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
