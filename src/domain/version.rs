//! Opaque row version assigned by storage on every committed write.

use std::fmt;

/// Storage-assigned version of a row.
///
/// Application code never constructs a token from user input and never orders
/// tokens; the only meaningful question is whether two tokens are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(Vec<u8>);

impl VersionToken {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Token for a value drawn from a monotonically increasing storage sequence.
    pub fn from_sequence(value: i64) -> Self {
        Self(value.to_be_bytes().to_vec())
    }

    /// Inverse of [`VersionToken::from_sequence`]; `None` for tokens of any other shape.
    pub fn to_sequence(&self) -> Option<i64> {
        let bytes: [u8; 8] = self.0.as_slice().try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VersionToken(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_tokens_are_eight_bytes_big_endian() {
        let token = VersionToken::from_sequence(0x0102);
        assert_eq!(token.as_bytes(), &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(token.to_sequence(), Some(0x0102));
    }

    #[test]
    fn equality_is_bytewise() {
        assert_eq!(VersionToken::from_sequence(7), VersionToken::from_sequence(7));
        assert_ne!(VersionToken::from_sequence(7), VersionToken::from_sequence(8));
        assert_ne!(
            VersionToken::from_bytes(vec![7]),
            VersionToken::from_sequence(7)
        );
    }

    #[test]
    fn foreign_shapes_have_no_sequence() {
        assert!(VersionToken::from_bytes(Vec::new()).is_empty());
        assert_eq!(VersionToken::from_bytes(vec![1, 2, 3]).to_sequence(), None);
    }
}
