//! Initiator security credentials.
//!
//! Daraja expects the initiator password encrypted with the public key
//! certificate of the active environment, base64 encoded. Certificate storage
//! and the encryption itself live with the caller; requests only need the
//! [`SecurityCredential`] capability.

use crate::payments::error::CredentialError;

pub trait SecurityCredential: Send + Sync {
    /// Encrypt `password` and return it base64 encoded.
    fn encrypt(&self, password: &str) -> Result<String, CredentialError>;
}

/// A credential generated ahead of time, e.g. from the Daraja portal.
#[derive(Clone)]
pub struct PreEncryptedCredential {
    value: String,
}

impl PreEncryptedCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl SecurityCredential for PreEncryptedCredential {
    fn encrypt(&self, _password: &str) -> Result<String, CredentialError> {
        if self.value.trim().is_empty() {
            return Err(CredentialError::Unavailable(
                "pre-encrypted security credential is empty".to_string(),
            ));
        }
        Ok(self.value.clone())
    }
}

impl<F> SecurityCredential for F
where
    F: Fn(&str) -> Result<String, CredentialError> + Send + Sync,
{
    fn encrypt(&self, password: &str) -> Result<String, CredentialError> {
        self(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_encrypted_credential_ignores_password() {
        let credential = PreEncryptedCredential::new("c2VjcmV0");
        assert_eq!(credential.encrypt("anything").unwrap(), "c2VjcmV0");
    }

    #[test]
    fn test_empty_pre_encrypted_credential_is_rejected() {
        assert!(PreEncryptedCredential::new(" ").encrypt("pw").is_err());
    }

    #[test]
    fn test_closures_act_as_credentials() {
        let credential = |password: &str| Ok::<_, CredentialError>(format!("enc({})", password));
        assert_eq!(credential.encrypt("pw").unwrap(), "enc(pw)");
    }
}
