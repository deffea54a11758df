//! Unix timestamp helper shared across task, batch, and nonce bookkeeping.

use std::fmt::{Display, Formatter};
use std::time::{SystemTime, SystemTimeError};

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, serde::Serialize, serde::Deserialize)]
pub struct UnixTimestamp(pub u64);

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UnixTimestamp {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok(Self(now))
    }

    pub fn elapsed_secs(&self, now: UnixTimestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_secs_saturates_instead_of_underflowing() {
        let earlier = UnixTimestamp(100);
        let later = UnixTimestamp(150);
        assert_eq!(earlier.elapsed_secs(later), 50);
        assert_eq!(later.elapsed_secs(earlier), 0);
    }
}
