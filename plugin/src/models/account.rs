//! Cloud account models

use secrecy::{ExposeSecret, SecretString};

/// Handle to one cloud account (subscription plus its management credential)
#[derive(Debug)]
pub struct AccountHandle {
    pub subscription_id: String,
    pub name: String,
    credential: SecretString,
}

impl AccountHandle {
    pub fn new(
        subscription_id: impl Into<String>,
        name: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            name: name.into(),
            credential: SecretString::from(credential.into()),
        }
    }

    /// Raw credential, for the cloud client only
    pub fn credential(&self) -> &str {
        self.credential.expose_secret()
    }
}

/// Subscription as listed by the management service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub name: String,
}

/// Parameters for creating a storage account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccountRequest {
    pub subscription_id: String,
    pub name: String,
    pub label: String,
    pub location: String,
    /// Checked against the subscription before creating, when set
    pub resource_group: Option<String>,
}
