//! Selection of the next applicable update from a manifest.
//!
//! Updates are delivered at patch level only: a candidate must share the
//! current major, fork and minor versions and carry a strictly greater patch.
//! Crossing a minor or fork boundary goes through the primary installer, not
//! this channel.

use crate::updater::manifest::{UpdateDetails, UpdateManifest};
use crate::updater::version::UpdateVersion;

/// Pick the best applicable update, or `None` if the manifest offers nothing
/// for the current version line. `requirement` is the signature-count
/// structural pre-check; cryptographic verification happens separately.
pub fn select_next<'a>(
    current: UpdateVersion,
    manifest: &'a UpdateManifest,
    requirement: usize,
) -> Option<&'a UpdateDetails> {
    // The greatest entry below the next-minor probe is the newest entry in
    // the current major/fork/minor line, if any exists.
    let probe = UpdateDetails::probe(current.succ_minor());
    let candidate = manifest.updates.range(..probe).next_back()?;

    let v = candidate.version;
    if v.major != current.major
        || v.fork != current.fork
        || v.minor != current.minor
        || v.patch <= current.patch
        || candidate.signatures.len() < requirement
    {
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::keys::CompactSignature;

    fn entry(version: UpdateVersion, signature_count: u8) -> UpdateDetails {
        let mut signatures = BTreeSet::new();
        for i in 0..signature_count {
            signatures.insert(CompactSignature([i; 65]));
        }
        UpdateDetails {
            version,
            signatures,
            release_notes: String::new(),
            update_package_url: String::new(),
            timestamp: 0,
        }
    }

    fn manifest(entries: Vec<UpdateDetails>) -> UpdateManifest {
        UpdateManifest {
            updates: entries.into_iter().collect(),
        }
    }

    const CURRENT: UpdateVersion = UpdateVersion::new(0, 4, 16, 'a');

    #[test]
    fn test_selects_newer_patch_in_same_line() {
        let m = manifest(vec![
            entry(UpdateVersion::new(0, 4, 16, 'a'), 2),
            entry(UpdateVersion::new(0, 4, 16, 'b'), 2),
        ]);
        let selected = select_next(CURRENT, &m, 2).unwrap();
        assert_eq!(selected.version, UpdateVersion::new(0, 4, 16, 'b'));
    }

    #[test]
    fn test_selects_newest_patch_when_several_apply() {
        let m = manifest(vec![
            entry(UpdateVersion::new(0, 4, 16, 'b'), 2),
            entry(UpdateVersion::new(0, 4, 16, 'd'), 2),
            entry(UpdateVersion::new(0, 4, 16, 'c'), 2),
        ]);
        let selected = select_next(CURRENT, &m, 2).unwrap();
        assert_eq!(selected.version, UpdateVersion::new(0, 4, 16, 'd'));
    }

    #[test]
    fn test_same_patch_is_not_an_update() {
        let m = manifest(vec![entry(UpdateVersion::new(0, 4, 16, 'a'), 2)]);
        assert!(select_next(CURRENT, &m, 2).is_none());
    }

    #[test]
    fn test_never_crosses_minor_boundary() {
        let m = manifest(vec![entry(UpdateVersion::new(0, 4, 17, 'a'), 2)]);
        assert!(select_next(CURRENT, &m, 2).is_none());
    }

    #[test]
    fn test_never_crosses_fork_boundary() {
        let m = manifest(vec![entry(UpdateVersion::new(0, 5, 0, 'a'), 2)]);
        assert!(select_next(CURRENT, &m, 2).is_none());
    }

    #[test]
    fn test_ignores_older_lines_and_empty_manifest() {
        assert!(select_next(CURRENT, &manifest(vec![]), 2).is_none());
        let m = manifest(vec![entry(UpdateVersion::new(0, 3, 9, 'z'), 2)]);
        assert!(select_next(CURRENT, &m, 2).is_none());
    }

    #[test]
    fn test_requires_enough_signatures_structurally() {
        let m = manifest(vec![entry(UpdateVersion::new(0, 4, 16, 'b'), 1)]);
        assert!(select_next(CURRENT, &m, 2).is_none());
    }
}
