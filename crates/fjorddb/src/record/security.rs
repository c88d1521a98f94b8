use crate::record::RecordKind;
use thiserror::Error as ThisError;

///
/// SecurityError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SecurityError {
    #[error("write not allowed on {record_type}: {fields:?}")]
    WriteNotAllowed {
        record_type: String,
        fields: Vec<String>,
    },
}

///
/// AuthContext
///
/// Caller identity evaluated against field access rules. Admin contexts
/// satisfy every rule; they are produced only by the database's admin
/// capability, never by request plumbing.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthContext {
    pub principal: String,
    pub roles: Vec<String>,
    admin: bool,
}

impl AuthContext {
    #[must_use]
    pub fn new(principal: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            principal: principal.into(),
            roles: roles.iter().map(ToString::to_string).collect(),
            admin: false,
        }
    }

    #[must_use]
    pub(crate) fn admin() -> Self {
        Self {
            principal: "admin".into(),
            roles: Vec::new(),
            admin: true,
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.admin
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

///
/// AccessLevel
///
/// Pure function of the level and an optional auth context. `Custom`
/// predicates are opaque and compare unequal to everything, themselves
/// included.
///

#[derive(Clone, Copy, Debug)]
pub enum AccessLevel {
    /// Always allowed.
    Public,
    /// Allowed when any auth context is present.
    Authenticated,
    /// Allowed when the auth context holds at least one of the roles.
    Roles(&'static [&'static str]),
    /// Opaque predicate over the auth context.
    Custom(fn(&AuthContext) -> bool),
}

impl AccessLevel {
    #[must_use]
    pub fn evaluate(&self, auth: Option<&AuthContext>) -> bool {
        if auth.is_some_and(AuthContext::is_admin) {
            return true;
        }
        match self {
            Self::Public => true,
            Self::Authenticated => auth.is_some(),
            Self::Roles(required) => auth
                .is_some_and(|a| required.iter().any(|role| a.has_role(role))),
            Self::Custom(predicate) => auth.is_some_and(|a| predicate(a)),
        }
    }
}

impl PartialEq for AccessLevel {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Public, Self::Public) | (Self::Authenticated, Self::Authenticated) => true,
            (Self::Roles(a), Self::Roles(b)) => a == b,
            // Custom predicates are opaque; no two are ever equal.
            _ => false,
        }
    }
}

///
/// FieldAccessModel
///
/// Static per-field access rule captured at type-registration time. Because
/// the metadata lives on the type rather than the instance, masking works
/// identically before and after a decode round-trip.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldAccessModel {
    pub field: &'static str,
    pub read: AccessLevel,
    pub write: AccessLevel,
}

impl FieldAccessModel {
    #[must_use]
    pub const fn new(field: &'static str, read: AccessLevel, write: AccessLevel) -> Self {
        Self { field, read, write }
    }
}

fn rule_for<R: RecordKind>(field: &str) -> Option<&'static FieldAccessModel> {
    R::SECURITY.iter().find(|rule| rule.field == field)
}

/// Unknown fields are unrestricted.
#[must_use]
pub fn can_read<R: RecordKind>(field: &str, auth: Option<&AuthContext>) -> bool {
    rule_for::<R>(field).is_none_or(|rule| rule.read.evaluate(auth))
}

#[must_use]
pub fn can_write<R: RecordKind>(field: &str, auth: Option<&AuthContext>) -> bool {
    rule_for::<R>(field).is_none_or(|rule| rule.write.evaluate(auth))
}

#[must_use]
pub fn unreadable_fields<R: RecordKind>(auth: Option<&AuthContext>) -> Vec<&'static str> {
    R::SECURITY
        .iter()
        .filter(|rule| !rule.read.evaluate(auth))
        .map(|rule| rule.field)
        .collect()
}

#[must_use]
pub fn unwritable_fields<R: RecordKind>(auth: Option<&AuthContext>) -> Vec<&'static str> {
    R::SECURITY
        .iter()
        .filter(|rule| !rule.write.evaluate(auth))
        .map(|rule| rule.field)
        .collect()
}

/// Validate a write against the delta between `old` and `new`.
///
/// The changed set is the fields whose value differs, or the fields with
/// non-default values when there is no prior record. Any changed field whose
/// write access evaluates false fails the whole write.
pub fn validate_write<R: RecordKind>(
    old: Option<&R>,
    new: &R,
    auth: Option<&AuthContext>,
) -> Result<(), SecurityError> {
    let baseline = old.cloned().unwrap_or_default();

    let mut denied = Vec::new();
    for field in R::FIELDS {
        if baseline.field_value(field.name) == new.field_value(field.name) {
            continue;
        }
        if !can_write::<R>(field.name, auth) {
            denied.push(field.name.to_string());
        }
    }

    if denied.is_empty() {
        Ok(())
    } else {
        Err(SecurityError::WriteNotAllowed {
            record_type: R::RECORD_NAME.to_string(),
            fields: denied,
        })
    }
}

/// Clone `record` with every unreadable field reset to its default.
#[must_use]
pub fn mask<R: RecordKind>(record: &R, auth: Option<&AuthContext>) -> R {
    let mut masked = record.clone();
    for rule in R::SECURITY {
        if !rule.read.evaluate(auth) {
            masked.reset_field(rule.field);
        }
    }
    masked
}

/// Batch form of [`mask`].
#[must_use]
pub fn mask_all<R: RecordKind>(records: &[R], auth: Option<&AuthContext>) -> Vec<R> {
    records.iter().map(|r| mask(r, auth)).collect()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::AccessLevel;
    use crate::record::AuthContext;

    #[test]
    fn public_allows_anonymous() {
        assert!(AccessLevel::Public.evaluate(None));
        assert!(AccessLevel::Public.evaluate(Some(&AuthContext::new("u", &[]))));
    }

    #[test]
    fn authenticated_requires_any_auth() {
        assert!(!AccessLevel::Authenticated.evaluate(None));
        assert!(AccessLevel::Authenticated.evaluate(Some(&AuthContext::new("u", &[]))));
    }

    #[test]
    fn roles_require_intersection() {
        let level = AccessLevel::Roles(&["hr", "finance"]);
        assert!(!level.evaluate(None));
        assert!(!level.evaluate(Some(&AuthContext::new("u", &["employee"]))));
        assert!(level.evaluate(Some(&AuthContext::new("u", &["employee", "hr"]))));
    }

    #[test]
    fn custom_is_opaque_and_never_equal() {
        fn always(_: &AuthContext) -> bool {
            true
        }
        let a = AccessLevel::Custom(always);
        let b = AccessLevel::Custom(always);
        assert!(a.evaluate(Some(&AuthContext::new("u", &[]))));
        assert!(!a.evaluate(None));
        assert_ne!(a, b);
    }

    #[test]
    fn admin_satisfies_everything() {
        let admin = AuthContext::admin();
        assert!(AccessLevel::Roles(&["hr"]).evaluate(Some(&admin)));
        assert!(AccessLevel::Custom(|_| false).evaluate(Some(&admin)));
    }
}
