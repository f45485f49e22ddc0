use std::sync::Arc;

use thiserror::Error;

use crate::{
    domain::Account,
    error::{FailureKind, GitifyError},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No account is signed in for {0}")]
    NotFound(String),
}

impl From<RegistryError> for GitifyError {
    fn from(err: RegistryError) -> Self {
        GitifyError::with_message(FailureKind::BadCredentials, err.to_string())
    }
}

/// The authenticated accounts, at most one per hostname, in login order.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Vec<Arc<Account>>,
}

impl AccountRegistry {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        let mut registry = Self::default();
        for account in accounts {
            registry.login(account);
        }
        registry
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn account(&self, hostname: &str) -> Result<&Arc<Account>, RegistryError> {
        self.accounts
            .iter()
            .find(|account| account.hostname == hostname)
            .ok_or_else(|| RegistryError::NotFound(hostname.to_owned()))
    }

    pub fn resolve_token(&self, hostname: &str) -> Result<&str, RegistryError> {
        self.account(hostname).map(|account| account.token.as_str())
    }

    /// Registers an account. Logging in again on a known host replaces the
    /// previous credentials in place, keeping registry order stable.
    pub fn login(&mut self, account: Account) {
        let account = Arc::new(account);
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|entry| entry.hostname == account.hostname)
        {
            *existing = account;
        } else {
            self.accounts.push(account);
        }
    }

    pub fn logout(&mut self, hostname: &str) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|account| account.hostname != hostname);
        self.accounts.len() != before
    }
}
