//! Shared-secret token checked by every server command.

use std::fmt;

use uuid::Uuid;

use super::CommandError;

/// Token generated at daemon start and expected on every request.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenVerifier {
    expected: String,
}

impl TokenVerifier {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().simple().to_string())
    }

    /// Expects the given token.
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// Token clients must present.
    pub fn token(&self) -> &str {
        &self.expected
    }

    /// Checks a presented token.
    ///
    /// The comparison visits every byte so its duration does not reveal the
    /// length of a matching prefix.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidToken` on mismatch.
    pub fn verify(&self, presented: &str) -> Result<(), CommandError> {
        let expected = self.expected.as_bytes();
        let presented = presented.as_bytes();
        let difference = expected
            .iter()
            .zip(presented)
            .fold(expected.len() ^ presented.len(), |acc, (a, b)| {
                acc | usize::from(a ^ b)
            });
        if difference == 0 {
            Ok(())
        } else {
            Err(CommandError::InvalidToken)
        }
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("TokenVerifier(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::wrong("tok124")]
    #[case::prefix("tok12")]
    #[case::longer("tok1234")]
    #[case::empty("")]
    fn rejects_other_tokens(#[case] presented: &str) {
        let verifier = TokenVerifier::new("tok123");
        assert!(matches!(
            verifier.verify(presented),
            Err(CommandError::InvalidToken)
        ));
    }

    #[test]
    fn accepts_expected_token() {
        let verifier = TokenVerifier::new("tok123");
        verifier.verify("tok123").expect("token should match");
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let first = TokenVerifier::generate();
        let second = TokenVerifier::generate();
        assert_eq!(first.token().len(), 32);
        assert_ne!(first.token(), second.token());
    }

    #[test]
    fn debug_output_hides_token() {
        let verifier = TokenVerifier::new("secret");
        assert!(!format!("{verifier:?}").contains("secret"));
    }
}
