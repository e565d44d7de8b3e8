//! Update manifest structures and the canonical signable form.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::keys::CompactSignature;
use crate::updater::version::UpdateVersion;

/// One entry in the update manifest. Ordering and equality are by version
/// only, which makes a manifest a set unique by version identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetails {
    #[serde(flatten)]
    pub version: UpdateVersion,

    /// Signatures over the signable hash of this entry. Authorization needs
    /// at least the policy threshold of distinct trusted signers among them.
    pub signatures: BTreeSet<CompactSignature>,

    /// Human-readable description: changelog, known issues, etc.
    #[serde(rename = "releaseNotes")]
    pub release_notes: String,

    /// Full URL to the update package.
    #[serde(rename = "updatePackageUrl")]
    pub update_package_url: String,

    /// Seconds since epoch. Entries older than the running build are never
    /// accepted.
    pub timestamp: u64,
}

impl UpdateDetails {
    /// An entry carrying only a version, used as a search probe against the
    /// manifest set.
    pub(crate) fn probe(version: UpdateVersion) -> Self {
        Self {
            version,
            signatures: BTreeSet::new(),
            release_notes: String::new(),
            update_package_url: String::new(),
            timestamp: 0,
        }
    }

    /// The canonical signable form: this entry with its signature set
    /// cleared, serialized to JSON. Field order is declaration order, so the
    /// same entry always reproduces the exact bytes that were signed.
    pub fn signable_string(&self) -> String {
        let mut cleared = self.clone();
        cleared.signatures.clear();
        // Serialization of a signature-free entry cannot fail.
        serde_json::to_string(&cleared).unwrap_or_default()
    }
}

impl PartialEq for UpdateDetails {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for UpdateDetails {}

impl PartialOrd for UpdateDetails {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UpdateDetails {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

/// The signed directory of available updates, sorted ascending and unique by
/// version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub updates: BTreeSet<UpdateDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: UpdateVersion) -> UpdateDetails {
        UpdateDetails {
            version,
            signatures: BTreeSet::new(),
            release_notes: "notes".into(),
            update_package_url: "https://example.org/web.pak".into(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_signable_string_excludes_signatures() {
        let mut signed = entry(UpdateVersion::new(0, 4, 16, 'b'));
        let unsigned = signed.clone();
        signed.signatures.insert(CompactSignature([1u8; 65]));

        assert_eq!(signed.signable_string(), unsigned.signable_string());
        assert!(!signed.signable_string().contains(&hex::encode([1u8; 65])));
    }

    #[test]
    fn test_signable_string_is_stable() {
        let e = entry(UpdateVersion::new(0, 4, 16, 'b'));
        assert_eq!(e.signable_string(), e.signable_string());
    }

    #[test]
    fn test_manifest_json_field_names() {
        let manifest = UpdateManifest {
            updates: [entry(UpdateVersion::new(0, 4, 16, 'b'))].into(),
        };
        let json = serde_json::to_value(&manifest).unwrap();
        let first = &json["updates"][0];
        assert_eq!(first["majorVersion"], 0);
        assert_eq!(first["patchVersion"], b'b');
        assert_eq!(first["releaseNotes"], "notes");
        assert_eq!(first["updatePackageUrl"], "https://example.org/web.pak");
        assert_eq!(first["timestamp"], 1_700_000_000);

        let parsed: UpdateManifest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.updates.len(), 1);
    }

    #[test]
    fn test_manifest_sorted_and_unique_by_version() {
        let mut manifest = UpdateManifest::default();
        manifest.updates.insert(entry(UpdateVersion::new(0, 4, 16, 'c')));
        manifest.updates.insert(entry(UpdateVersion::new(0, 4, 16, 'b')));
        // Same version, different notes: stays a single entry.
        let mut duplicate = entry(UpdateVersion::new(0, 4, 16, 'b'));
        duplicate.release_notes = "other".into();
        manifest.updates.insert(duplicate);

        let versions: Vec<_> = manifest.updates.iter().map(|e| e.version).collect();
        assert_eq!(
            versions,
            vec![UpdateVersion::new(0, 4, 16, 'b'), UpdateVersion::new(0, 4, 16, 'c')]
        );
    }
}
