//! Catalogue of instance configurations.
//!
//! Projects can have custom configs, so an unknown name is not an error;
//! callers use this to warn about likely typos.

/// Public instance configurations.
pub const KNOWN_INSTANCE_CONFIGS: &[&str] = &[
    "eur3",
    "nam-eur-asia1",
    "nam3",
    "nam6",
    "regional-asia-east1",
    "regional-asia-east2",
    "regional-asia-northeast1",
    "regional-asia-northeast2",
    "regional-asia-south1",
    "regional-asia-southeast1",
    "regional-australia-southeast1",
    "regional-europe-north1",
    "regional-europe-west1",
    "regional-europe-west2",
    "regional-europe-west4",
    "regional-europe-west6",
    "regional-northamerica-northeast1",
    "regional-us-central1",
    "regional-us-east1",
    "regional-us-east4",
    "regional-us-west1",
];

/// Whether `config` is one of the public instance configurations.
pub fn is_known(config: &str) -> bool {
    KNOWN_INSTANCE_CONFIGS.contains(&config)
}
