//! Payment methods
//!
//! Details are validated per type on creation. Ownership mismatches are
//! reported as not-found so a caller cannot discover other users' method ids.

use chrono::Utc;
use ledger_core::{Error, LedgerStore, Metadata, PaymentMethod, PaymentMethodKind, Result, UserId};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Payment method registry over the ledger store
#[derive(Clone)]
pub struct PaymentMethods {
    store: Arc<dyn LedgerStore>,
    auto_verify: bool,
}

impl PaymentMethods {
    /// Create registry
    pub fn new(store: Arc<dyn LedgerStore>, auto_verify: bool) -> Self {
        Self { store, auto_verify }
    }

    /// Validate and store a new method (unverified unless auto-verify is on)
    pub fn add(
        &self,
        user_id: &UserId,
        kind: PaymentMethodKind,
        details: Metadata,
    ) -> Result<PaymentMethod> {
        if user_id.is_blank() {
            return Err(Error::Validation("user_id is required".to_string()));
        }
        let details = validate_details(kind, details)?;

        let now = Utc::now();
        let method = PaymentMethod {
            id: Uuid::now_v7(),
            user_id: user_id.clone(),
            kind,
            details,
            verified: self.auto_verify,
            created_at: now,
            verified_at: self.auto_verify.then_some(now),
        };
        self.store.put_payment_method(&method)?;

        info!(
            user_id = %user_id,
            payment_method_id = %method.id,
            kind = kind.as_str(),
            verified = method.verified,
            "Payment method added"
        );
        Ok(method)
    }

    /// Mark a method verified; verifying twice is a no-op
    pub fn verify(&self, user_id: &UserId, method_id: Uuid) -> Result<PaymentMethod> {
        let mut method = self.get_owned(user_id, method_id)?;
        if method.verified {
            return Ok(method);
        }
        method.verified = true;
        method.verified_at = Some(Utc::now());
        self.store.put_payment_method(&method)?;

        info!(user_id = %user_id, payment_method_id = %method_id, "Payment method verified");
        Ok(method)
    }

    /// Method owned by `user_id`
    pub fn get_owned(&self, user_id: &UserId, method_id: Uuid) -> Result<PaymentMethod> {
        match self.store.get_payment_method(method_id)? {
            Some(method) if &method.user_id == user_id => Ok(method),
            _ => Err(Error::not_found("payment method", method_id)),
        }
    }

    /// A user's methods
    pub fn list(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        self.store.list_payment_methods(user_id)
    }
}

fn required(details: &Metadata, keys: &[&str], kind: PaymentMethodKind) -> Result<String> {
    keys.iter()
        .find_map(|k| details.get(*k))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::Validation(format!("{} requires '{}'", kind.as_str(), keys[0]))
        })
}

fn is_ifsc(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 11
        && bytes[..4].iter().all(u8::is_ascii_alphabetic)
        && bytes[4] == b'0'
        && bytes[5..].iter().all(u8::is_ascii_alphanumeric)
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Check and normalize details for `kind`
pub fn validate_details(kind: PaymentMethodKind, details: Metadata) -> Result<Metadata> {
    let mut normalized = Metadata::new();

    match kind {
        PaymentMethodKind::Upi => {
            let vpa = required(&details, &["vpa", "upi_id"], kind)?.to_ascii_lowercase();
            let valid = vpa
                .split_once('@')
                .map_or(false, |(handle, bank)| !handle.is_empty() && !bank.is_empty());
            if !valid {
                return Err(Error::Validation(format!("invalid UPI address '{}'", vpa)));
            }
            normalized.insert("vpa".to_string(), vpa);
        }
        PaymentMethodKind::BankAccount => {
            let account = required(&details, &["account_number"], kind)?;
            if !(6..=18).contains(&account.len()) || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::Validation(
                    "account_number must be 6 to 18 digits".to_string(),
                ));
            }
            let ifsc = required(&details, &["ifsc", "ifsc_code"], kind)?.to_ascii_uppercase();
            if !is_ifsc(&ifsc) {
                return Err(Error::Validation(format!("invalid IFSC '{}'", ifsc)));
            }
            normalized.insert("account_number".to_string(), account);
            normalized.insert("ifsc".to_string(), ifsc);
            if let Some(holder) = details.get("account_holder") {
                normalized.insert("account_holder".to_string(), holder.trim().to_string());
            }
        }
        PaymentMethodKind::Wallet => {
            let provider = required(&details, &["provider"], kind)?.to_ascii_lowercase();
            let wallet_id = required(&details, &["wallet_id", "phone"], kind)?;
            normalized.insert("provider".to_string(), provider);
            normalized.insert("wallet_id".to_string(), wallet_id);
        }
        PaymentMethodKind::Paypal => {
            let email = required(&details, &["email"], kind)?.to_ascii_lowercase();
            if !is_email(&email) {
                return Err(Error::Validation(format!("invalid PayPal e-mail '{}'", email)));
            }
            normalized.insert("email".to_string(), email);
        }
    }

    Ok(normalized)
}
