//! Signed web-bundle update distribution.
//!
//! Components:
//! - `version` - update version identifiers and their total order
//! - `manifest` - the signed update directory and its canonical signable form
//! - `verify` - threshold multi-signature checks and anti-rollback
//! - `selector` - choosing the next applicable patch-level update
//! - `bundle` - the packed asset container and compression
//! - `store` - the on-disk descriptor/payload pair and the active bundle
//! - `download` - manifest and package fetching
//! - `pipeline` - the single-flight state machine tying it all together

pub mod bundle;
pub mod download;
pub mod manifest;
pub mod pipeline;
pub mod selector;
pub mod store;
pub mod verify;
pub mod version;

pub use bundle::AssetBundle;
pub use manifest::{UpdateDetails, UpdateManifest};
pub use pipeline::{CheckOutcome, PipelineStatus, UpdatePipeline};
pub use store::WebStore;
pub use verify::UpdateVerifier;
pub use version::UpdateVersion;
