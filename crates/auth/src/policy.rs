use serde::{Deserialize, Serialize};

/// Tenant/role policy injected at process start.
///
/// Activation codes gate garage registration; super-admin accounts are
/// provisioned from the email list instead of being event-sourced per garage.
/// Both lists are configuration data, deliberately not embedded constants, so
/// policy can change without redeploying core logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    pub activation_codes: Vec<String>,
    pub super_admin_emails: Vec<String>,
}

impl AuthPolicy {
    pub fn is_valid_activation_code(&self, code: &str) -> bool {
        let code = code.trim();
        !code.is_empty() && self.activation_codes.iter().any(|c| c == code)
    }

    pub fn is_super_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.super_admin_emails
            .iter()
            .any(|e| e.trim().to_lowercase() == email)
    }
}
