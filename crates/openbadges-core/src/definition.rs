use openbadges_canonical::{BadgeId, HttpUrl};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Badge definition supplied by configuration.
///
/// Read-only input to the pipeline. The URLs are published values that end
/// up in the assertion; the two paths point at local files the issuer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    /// Badge identifier (configuration key).
    pub id: BadgeId,
    /// Human-readable badge name.
    pub name: String,
    /// URL of the hosted BadgeClass JSON.
    pub json_url: HttpUrl,
    /// URL of the published badge image.
    pub image_url: HttpUrl,
    /// URL of the issuer's public verification key.
    pub verify_key_url: HttpUrl,
    /// Local carrier image to bake.
    pub local_image: PathBuf,
    /// Local PEM/DER private key used for signing.
    pub private_key: PathBuf,
}
