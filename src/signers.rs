//! Documents that need more than one signer.
//!
//! A [`SignerSet`] tracks the required signers of one document. The set is
//! `Completed` once every required signer has signed and `Cancelled` as soon
//! as any of them declines. The number of signatures can never exceed the
//! number of required signers.

use crate::error::{Error, Result};
use crate::signatures::SignatureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-signer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerStatus {
    Pending,
    Signed,
    Declined,
}

/// State of the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningStatus {
    Pending,
    Completed,
    Cancelled,
}

/// One required signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// Assigned by [`SignerSet::add_signer`]
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: SignerStatus,
    /// Timestamp of the signer's record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    /// Record produced when the signer signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<SignatureRecord>,
}

/// Required signers of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSet {
    total_signers: usize,
    signers: Vec<Signer>,
}

impl SignerSet {
    /// Create a set that requires `total_signers` signatures.
    pub fn new(total_signers: usize) -> Result<Self> {
        if total_signers == 0 {
            return Err(Error::InvalidSigner("a document needs at least one signer".to_string()));
        }
        Ok(Self {
            total_signers,
            signers: Vec::with_capacity(total_signers),
        })
    }

    /// Register a signer and return its id.
    pub fn add_signer(&mut self, name: impl Into<String>, email: Option<String>) -> Result<Uuid> {
        if self.signers.len() >= self.total_signers {
            return Err(Error::InvalidSigner(format!(
                "all {} signer slots are taken",
                self.total_signers
            )));
        }
        let id = Uuid::new_v4();
        self.signers.push(Signer {
            id,
            name: name.into(),
            email,
            status: SignerStatus::Pending,
            signed_at: None,
            record: None,
        });
        Ok(id)
    }

    /// Record a signature from a pending signer.
    pub fn mark_signed(&mut self, id: Uuid, record: SignatureRecord) -> Result<()> {
        let signer = self.pending_signer(id)?;
        signer.status = SignerStatus::Signed;
        signer.signed_at = Some(record.timestamp);
        signer.record = Some(record);
        log::debug!("Signer {} signed ({}/{})", id, self.signed_count(), self.total_signers);
        Ok(())
    }

    /// Record that a pending signer declined; the document is cancelled.
    pub fn mark_declined(&mut self, id: Uuid) -> Result<()> {
        self.pending_signer(id)?.status = SignerStatus::Declined;
        log::info!("Signer {} declined, signing cancelled", id);
        Ok(())
    }

    fn pending_signer(&mut self, id: Uuid) -> Result<&mut Signer> {
        let signer = self
            .signers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::InvalidSigner(format!("unknown signer {}", id)))?;
        if signer.status != SignerStatus::Pending {
            return Err(Error::InvalidSigner(format!(
                "signer {} is already {:?}",
                id, signer.status
            )));
        }
        Ok(signer)
    }

    /// Number of signatures the document needs.
    pub fn total_signers(&self) -> usize {
        self.total_signers
    }

    /// Number of signers who have signed.
    pub fn signed_count(&self) -> usize {
        self.signers
            .iter()
            .filter(|s| s.status == SignerStatus::Signed)
            .count()
    }

    /// Registered signers in registration order.
    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }

    /// Look up a signer by id.
    pub fn signer(&self, id: Uuid) -> Option<&Signer> {
        self.signers.iter().find(|s| s.id == id)
    }

    /// Overall status.
    pub fn status(&self) -> SigningStatus {
        if self.signers.iter().any(|s| s.status == SignerStatus::Declined) {
            SigningStatus::Cancelled
        } else if self.signed_count() == self.total_signers {
            SigningStatus::Completed
        } else {
            SigningStatus::Pending
        }
    }
}
