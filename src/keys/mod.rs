//! Key and certificate lifecycle.
//!
//! A [`KeyMaterialStore`] owns the deployment's single RSA key pair and its
//! optional self-signed certificate. It is created by the host application
//! and passed to the signing engine and the validator.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::config::EngineConfig;
//! use pdf_seal::keys::KeyMaterialStore;
//!
//! let store = KeyMaterialStore::open(EngineConfig::from_env())?;
//! store.ensure_keys()?;
//! let cert = store.ensure_certificate()?;
//! println!("{} ({})", cert.info().subject, store.certificate_status());
//! ```

mod certificate;
mod store;

pub use certificate::{Certificate, CertificateInfo, CertificateStatus};
pub use store::{
    KeyMaterial, KeyMaterialStore, PublicKeyInfo, CERTIFICATE_FILE, PRIVATE_KEY_FILE,
    PUBLIC_KEY_FILE,
};
