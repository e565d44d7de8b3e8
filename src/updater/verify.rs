//! Threshold multi-signature verification of update entries and packages.
//!
//! Two independent checks share one counting algorithm: the manifest-entry
//! check binds signatures to the entry's signable form, the package check
//! binds them to the actual downloaded bytes. Both are pure; a rejection is a
//! value, never a panic, and never mutates anything.

use std::collections::BTreeSet;

use secp256k1::{All, Secp256k1};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::SigningPolicy;
use crate::keys::{self, Address};
use crate::updater::manifest::UpdateDetails;

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("Insufficient signatures in manifest: {got} of {required} required")]
    InsufficientSignatures { got: usize, required: usize },
    #[error("Update timestamp {timestamp} predates this build ({build_timestamp})")]
    Stale { timestamp: u64, build_timestamp: u64 },
    #[error("Signature requirement failed: {matched} of {required} trusted signers matched")]
    ThresholdNotMet { matched: usize, required: usize },
}

pub struct UpdateVerifier {
    policy: SigningPolicy,
    secp: Secp256k1<All>,
}

impl UpdateVerifier {
    pub fn new(policy: SigningPolicy) -> Self {
        Self {
            policy,
            secp: Secp256k1::new(),
        }
    }

    pub fn policy(&self) -> &SigningPolicy {
        &self.policy
    }

    /// Verify a manifest entry against the policy: structural signature
    /// count, anti-rollback timestamp, then the distinct-trusted-signer
    /// threshold over the entry's signable hash.
    pub fn verify_entry(&self, entry: &UpdateDetails) -> Result<(), VerifyError> {
        self.precheck(entry)?;
        let hash = keys::sha256(entry.signable_string().as_bytes());
        self.check_threshold(&hash, entry)
    }

    /// Verify downloaded package bytes against a manifest entry. The hash
    /// covers the bytes themselves followed by the entry's signable string,
    /// so a signature here vouches for the content, not just the metadata.
    pub fn verify_package(&self, package: &[u8], entry: &UpdateDetails) -> Result<(), VerifyError> {
        self.precheck(entry)?;
        let mut hasher = Sha256::new();
        hasher.update(package);
        hasher.update(entry.signable_string().as_bytes());
        let hash: [u8; 32] = hasher.finalize().into();
        self.check_threshold(&hash, entry)
    }

    fn precheck(&self, entry: &UpdateDetails) -> Result<(), VerifyError> {
        let required = self.policy.requirement;
        if entry.signatures.len() < required || self.policy.trusted.len() < required {
            warn!(
                got = entry.signatures.len(),
                required, "Rejecting update: insufficient signatures in manifest"
            );
            return Err(VerifyError::InsufficientSignatures {
                got: entry.signatures.len(),
                required,
            });
        }
        if entry.timestamp < self.policy.build_timestamp {
            warn!(
                timestamp = entry.timestamp,
                build_timestamp = self.policy.build_timestamp,
                "Rejecting update: timestamp older than build"
            );
            return Err(VerifyError::Stale {
                timestamp: entry.timestamp,
                build_timestamp: self.policy.build_timestamp,
            });
        }
        Ok(())
    }

    fn check_threshold(&self, hash: &[u8; 32], entry: &UpdateDetails) -> Result<(), VerifyError> {
        let mut matched: BTreeSet<Address> = BTreeSet::new();
        for signature in &entry.signatures {
            let recovered = match keys::recover(&self.secp, signature, hash) {
                Ok(key) => Address::from_public_key(&key),
                Err(e) => {
                    debug!(error = %e, "Skipping unrecoverable signature");
                    continue;
                }
            };
            if self.policy.trusted.contains(&recovered) {
                matched.insert(recovered);
            } else {
                debug!(address = %recovered, "Signature recovers to an untrusted address");
            }
        }

        if matched.len() >= self.policy.requirement {
            Ok(())
        } else {
            warn!(
                matched = matched.len(),
                required = self.policy.requirement,
                version = %entry.version,
                "Rejecting update: signature requirement failed"
            );
            Err(VerifyError::ThresholdNotMet {
                matched: matched.len(),
                required: self.policy.requirement,
            })
        }
    }
}
