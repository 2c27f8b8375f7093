//! Value matchers.
//!
//! A matcher decides, per command, whether the live value of an entry is
//! compatible with the previous value the command pinned on its first
//! execution. A match means the function runs against the pinned value,
//! which is what makes redelivered commands idempotent.

use serde::{Deserialize, Serialize};

/// Matching policy between the live value and the pinned previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMatcher {
    /// Always matches.
    #[default]
    Always,
    /// Live value equals the pinned value (both absent counts as equal).
    Expected,
    /// Live value is absent or equals the pinned value.
    ExpectedOrNew,
    /// Live value is present.
    NonNull,
    /// Never matches; the command is not applied at all.
    Never,
}

impl ValueMatcher {
    /// Evaluate the matcher against the live and pinned values.
    pub fn matches<V: PartialEq>(self, live: Option<&V>, pinned: Option<&V>) -> bool {
        match self {
            Self::Always => true,
            Self::Expected => live == pinned,
            Self::ExpectedOrNew => live.is_none() || live == pinned,
            Self::NonNull => live.is_some(),
            Self::Never => false,
        }
    }

    /// Matcher to use when the command is redelivered after a topology change.
    pub fn matcher_for_retry(self) -> Self {
        match self {
            Self::Expected => Self::ExpectedOrNew,
            Self::NonNull => Self::Always,
            other => other,
        }
    }

    /// Stable name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Expected => "expected",
            Self::ExpectedOrNew => "expected_or_new",
            Self::NonNull => "non_null",
            Self::Never => "never",
        }
    }
}
