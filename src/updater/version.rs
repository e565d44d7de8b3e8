//! Update version identifiers.
//!
//! Versions are `(major, fork, minor, patch)` where patch is a single ASCII
//! character compared by its code. The derived ordering is lexicographic over
//! the four fields, which is exactly the order manifest entries sort in.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateVersion {
    #[serde(rename = "majorVersion")]
    pub major: u8,
    #[serde(rename = "forkVersion")]
    pub fork: u8,
    #[serde(rename = "minorVersion")]
    pub minor: u8,
    /// Byte value of the patch character ('a' = 97).
    #[serde(rename = "patchVersion")]
    pub patch: u8,
}

impl UpdateVersion {
    pub const fn new(major: u8, fork: u8, minor: u8, patch: char) -> Self {
        Self {
            major,
            fork,
            minor,
            patch: patch as u8,
        }
    }

    /// The probe version used when searching the manifest for the next
    /// applicable update: same major/fork, next minor, minimum patch.
    pub fn succ_minor(&self) -> Self {
        Self {
            major: self.major,
            fork: self.fork,
            minor: self.minor.saturating_add(1),
            patch: 0,
        }
    }

    pub fn patch_char(&self) -> char {
        self.patch as char
    }

    /// Parse a release string of the form `major.fork.minor-patch`, e.g.
    /// `0.4.16-a`. The patch suffix is optional and defaults to 'a'.
    pub fn from_release_string(text: &str) -> Option<Self> {
        let (numbers, patch) = match text.split_once('-') {
            Some((numbers, patch)) => {
                let mut chars = patch.chars();
                let c = chars.next()?;
                if chars.next().is_some() || !c.is_ascii_lowercase() {
                    return None;
                }
                (numbers, c)
            }
            None => (text, 'a'),
        };

        let mut parts = numbers.split('.');
        let major = parts.next()?.parse().ok()?;
        let fork = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, fork, minor, patch))
    }
}

impl fmt::Display for UpdateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}-{}",
            self.major,
            self.fork,
            self.minor,
            self.patch_char()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = UpdateVersion::new(0, 4, 16, 'a');
        let b = UpdateVersion::new(0, 4, 16, 'b');
        let c = UpdateVersion::new(0, 4, 17, 'a');
        let d = UpdateVersion::new(0, 5, 0, 'a');
        let e = UpdateVersion::new(1, 0, 0, 'a');

        assert!(a < b && b < c && c < d && d < e);
        // Transitivity along the chain
        assert!(a < c && a < d && a < e && b < e);
    }

    #[test]
    fn test_equality_requires_all_fields() {
        assert_eq!(UpdateVersion::new(0, 4, 16, 'a'), UpdateVersion::new(0, 4, 16, 'a'));
        assert_ne!(UpdateVersion::new(0, 4, 16, 'a'), UpdateVersion::new(0, 4, 16, 'b'));
        assert_ne!(UpdateVersion::new(0, 4, 16, 'a'), UpdateVersion::new(1, 4, 16, 'a'));
    }

    #[test]
    fn test_succ_minor_probe() {
        let probe = UpdateVersion::new(0, 4, 16, 'c').succ_minor();
        assert_eq!((probe.major, probe.fork, probe.minor, probe.patch), (0, 4, 17, 0));
        // The probe sorts after every patch of the current minor and before
        // every patch of the next one.
        assert!(probe > UpdateVersion::new(0, 4, 16, 'z'));
        assert!(probe < UpdateVersion::new(0, 4, 17, 'a'));
    }

    #[test]
    fn test_release_string_parsing() {
        assert_eq!(
            UpdateVersion::from_release_string("0.4.16-c"),
            Some(UpdateVersion::new(0, 4, 16, 'c'))
        );
        assert_eq!(
            UpdateVersion::from_release_string("0.4.16"),
            Some(UpdateVersion::new(0, 4, 16, 'a'))
        );
        assert_eq!(UpdateVersion::from_release_string("0.4"), None);
        assert_eq!(UpdateVersion::from_release_string("0.4.16-ab"), None);
        assert_eq!(UpdateVersion::from_release_string("0.4.sixteen"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(UpdateVersion::new(0, 4, 16, 'a').to_string(), "0.4.16-a");
    }

    #[test]
    fn test_serde_field_names() {
        let json = serde_json::to_value(UpdateVersion::new(0, 4, 16, 'a')).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "majorVersion": 0,
                "forkVersion": 4,
                "minorVersion": 16,
                "patchVersion": 97,
            })
        );
    }
}
