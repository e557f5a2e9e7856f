use std::fmt;
use std::num::NonZeroU64;

/// Identifier of a transaction issuing lock requests.
///
/// Zero is reserved as "no transaction" in diagnostics and shared-state
/// sentinels, so it is not representable here.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TxnId(NonZeroU64);

impl TxnId {
    /// Construct a `TxnId` if `raw` is non-zero.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Get the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.get())
    }
}

/// Error returned when attempting to construct a zero `TxnId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTxnId;

impl fmt::Display for InvalidTxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("transaction id must be non-zero")
    }
}

impl std::error::Error for InvalidTxnId {}

impl TryFrom<u64> for TxnId {
    type Error = InvalidTxnId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidTxnId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(TxnId::new(0), None);
        assert_eq!(TxnId::try_from(0_u64), Err(InvalidTxnId));
    }

    #[test]
    fn display_includes_raw_value() {
        let txn = TxnId::new(42).unwrap();
        assert_eq!(txn.to_string(), "txn#42");
        assert_eq!(txn.get(), 42);
    }
}
