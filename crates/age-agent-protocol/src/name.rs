//! Plugin name validation.
//!
//! Names travel over the socket and are later spliced into a binary name that
//! is looked up on the search path, so the accepted alphabet is deliberately
//! narrow: ASCII letters, digits, and hyphens, at most
//! [`MAX_PLUGIN_NAME_LENGTH`] characters.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Maximum number of characters accepted in a plugin name.
pub const MAX_PLUGIN_NAME_LENGTH: usize = 64;

/// Prefix shared by every age plugin executable.
pub const PLUGIN_BINARY_PREFIX: &str = "age-plugin-";

/// A syntactically valid plugin name such as `yubikey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginName(String);

impl PluginName {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginNameError`] describing the first rule the name
    /// violates.
    ///
    /// # Examples
    ///
    /// ```
    /// use age_agent_protocol::PluginName;
    ///
    /// let name = PluginName::parse("yubikey").expect("valid name");
    /// assert_eq!(name.binary_name(), "age-plugin-yubikey");
    /// assert!(PluginName::parse("../passwd").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, PluginNameError> {
        if name.is_empty() {
            return Err(PluginNameError::Empty);
        }
        let length = name.chars().count();
        if length > MAX_PLUGIN_NAME_LENGTH {
            return Err(PluginNameError::TooLong { length });
        }
        if let Some(character) = name.chars().find(|character| !is_name_character(*character)) {
            return Err(PluginNameError::InvalidCharacter { character });
        }
        Ok(Self(name.to_owned()))
    }

    /// Borrows the validated name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Executable name searched for on the plugin search path.
    #[must_use]
    pub fn binary_name(&self) -> String {
        format!("{PLUGIN_BINARY_PREFIX}{}", self.0)
    }
}

const fn is_name_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '-'
}

impl fmt::Display for PluginName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for PluginName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PluginName {
    type Err = PluginNameError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Reasons a plugin name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginNameError {
    /// The name was empty.
    #[error("plugin name cannot be empty")]
    Empty,
    /// The name exceeded [`MAX_PLUGIN_NAME_LENGTH`].
    #[error("plugin name exceeds maximum length of {MAX_PLUGIN_NAME_LENGTH} characters (got {length})")]
    TooLong {
        /// Length of the rejected name in characters.
        length: usize,
    },
    /// The name contained a character outside `[A-Za-z0-9-]`.
    #[error(
        "plugin name contains invalid character {character:?} (only alphanumeric and hyphens allowed)"
    )]
    InvalidCharacter {
        /// First offending character.
        character: char,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("yubikey")]
    #[case("yubikey-1")]
    #[case("Test-Plugin-123")]
    #[case("-")]
    #[case("a")]
    #[case("0123456789")]
    fn accepts_valid_names(#[case] name: &str) {
        let parsed = PluginName::parse(name).expect("name should validate");
        assert_eq!(parsed.as_str(), name);
    }

    #[rstest]
    fn accepts_maximum_length() {
        let name = "a".repeat(MAX_PLUGIN_NAME_LENGTH);
        assert!(PluginName::parse(&name).is_ok());
    }

    #[rstest]
    fn accepts_every_allowed_character() {
        let alphabet: String = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(std::iter::once('-'))
            .collect();
        for chunk in alphabet.as_bytes().chunks(MAX_PLUGIN_NAME_LENGTH) {
            let name = std::str::from_utf8(chunk).expect("ascii chunk");
            assert!(PluginName::parse(name).is_ok(), "{name} should validate");
        }
    }

    #[rstest]
    fn rejects_empty_name() {
        assert_eq!(PluginName::parse(""), Err(PluginNameError::Empty));
    }

    #[rstest]
    fn rejects_overlong_name() {
        let name = "a".repeat(MAX_PLUGIN_NAME_LENGTH + 1);
        assert_eq!(
            PluginName::parse(&name),
            Err(PluginNameError::TooLong { length: 65 })
        );
    }

    #[rstest]
    #[case("../passwd", '.')]
    #[case("plugin/name", '/')]
    #[case("plugin.name", '.')]
    #[case("plugin_name", '_')]
    #[case("plugin name", ' ')]
    #[case("plugin\nname", '\n')]
    #[case("plügin", 'ü')]
    fn rejects_invalid_characters(#[case] name: &str, #[case] character: char) {
        assert_eq!(
            PluginName::parse(name),
            Err(PluginNameError::InvalidCharacter { character })
        );
    }

    #[rstest]
    fn binary_name_carries_prefix() {
        let name: PluginName = "fido2-hmac".parse().expect("valid name");
        assert_eq!(name.binary_name(), "age-plugin-fido2-hmac");
    }
}
