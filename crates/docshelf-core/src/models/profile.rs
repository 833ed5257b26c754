use serde::{Deserialize, Serialize};

/// The authenticated user's identity, as returned by the login and
/// profile endpoints. Opaque to the session core beyond display needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "companyName", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

impl Profile {
    /// Display name falling back to the email address for accounts that
    /// never completed onboarding.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}
