use serde::{Deserialize, Serialize};

/// Privilege roles. Managers administer sites and supervisor assignments;
/// supervisors manage materials for their one assigned site.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Supervisor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Supervisor => "supervisor",
        }
    }

    /// Stored role strings map back leniently; anything unrecognised is
    /// treated as the lower-privilege role.
    pub fn parse_or_default(s: &str) -> Role {
        if s.eq_ignore_ascii_case("manager") {
            Role::Manager
        } else {
            Role::Supervisor
        }
    }
}

/// Accounts sign up with a Gmail address carrying a role suffix.
const SIGNUP_DOMAIN_SUFFIX: &str = "@gmail.com";

/// Find the first `+token@` segment in an email, where token is one or
/// more word characters. `a+manager+supervisor@x` skips the `+manager+`
/// run (no `@` directly after it) and yields `supervisor`.
fn plus_token(email: &str) -> Option<&str> {
    for (i, _) in email.match_indices('+') {
        let rest = &email[i + 1..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end > 0 && rest[end..].starts_with('@') {
            return Some(&rest[..end]);
        }
    }
    None
}

/// Extract a role from an email using Gmail plus addressing.
/// Example: john.doe+manager@gmail.com -> Manager
///
/// Total over every input string: no suffix, an unknown token, or even a
/// missing `@` all fall back to the default Supervisor role.
pub fn derive_role(email: &str) -> Role {
    match plus_token(email) {
        Some(token) if token.eq_ignore_ascii_case("manager") => Role::Manager,
        _ => Role::Supervisor,
    }
}

/// Whether an email may create an account: must be a Gmail address whose
/// plus suffix is exactly `manager` or `supervisor` (case-insensitive).
pub fn is_eligible_for_signup(email: &str) -> bool {
    if !email.ends_with(SIGNUP_DOMAIN_SUFFIX) {
        return false;
    }
    match plus_token(email) {
        Some(token) => {
            token.eq_ignore_ascii_case("manager") || token.eq_ignore_ascii_case("supervisor")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_suffix_derives_manager() {
        assert_eq!(derive_role("john.doe+manager@gmail.com"), Role::Manager);
        assert_eq!(derive_role("a+MANAGER@gmail.com"), Role::Manager);
    }

    #[test]
    fn supervisor_or_no_suffix_derives_supervisor() {
        assert_eq!(derive_role("a+supervisor@gmail.com"), Role::Supervisor);
        assert_eq!(derive_role("a@gmail.com"), Role::Supervisor);
        assert_eq!(derive_role("a+builder@gmail.com"), Role::Supervisor);
    }

    #[test]
    fn first_plus_token_match_wins() {
        // "+b@" is never formed here; the first complete +token@ is +manager@
        assert_eq!(derive_role("a+b+manager@gmail.com"), Role::Manager);
        // "+manager+" has no @ directly after the token, so the match
        // lands on +supervisor@
        assert_eq!(derive_role("a+manager+supervisor@gmail.com"), Role::Supervisor);
    }

    #[test]
    fn malformed_addresses_do_not_panic() {
        assert_eq!(derive_role("no-at-sign"), Role::Supervisor);
        assert_eq!(derive_role(""), Role::Supervisor);
        assert_eq!(derive_role("trailing+"), Role::Supervisor);
        assert_eq!(derive_role("+@gmail.com"), Role::Supervisor);
    }

    #[test]
    fn eligibility_requires_gmail_and_known_token() {
        assert!(is_eligible_for_signup("a+manager@gmail.com"));
        assert!(is_eligible_for_signup("a+supervisor@gmail.com"));
        assert!(is_eligible_for_signup("a+SUPERVISOR@gmail.com"));
        assert!(!is_eligible_for_signup("a@yahoo.com"));
        assert!(!is_eligible_for_signup("a+manager@yahoo.com"));
        assert!(!is_eligible_for_signup("a+other@gmail.com"));
        assert!(!is_eligible_for_signup("a@gmail.com"));
    }

    #[test]
    fn role_strings_round_trip() {
        assert_eq!(Role::parse_or_default("manager"), Role::Manager);
        assert_eq!(Role::parse_or_default("supervisor"), Role::Supervisor);
        assert_eq!(Role::parse_or_default("garbage"), Role::Supervisor);
        assert_eq!(Role::Manager.as_str(), "manager");
    }
}
