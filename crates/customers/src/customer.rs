use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use khata_core::{CustomerId, DomainError, DomainResult, Entity, Owned, UserId};

/// Longest accepted customer name, in characters.
pub const MAX_NAME_LEN: usize = 255;
/// Longest accepted phone number, in characters.
pub const MAX_PHONE_LEN: usize = 20;

/// A customer kept by one user.
///
/// `owner` is fixed at registration and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    owner: UserId,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Input for registering a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial update of a customer's details.
///
/// `None` keeps the current value. A blank `phone`/`address` clears it; a blank
/// `name` is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Customer {
    /// Register a new customer for `owner`.
    pub fn register(
        id: CustomerId,
        owner: UserId,
        input: NewCustomer,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = validate_name(&input.name)?;
        let phone = validate_phone(input.phone.as_deref())?;

        Ok(Self {
            id,
            owner,
            name,
            phone,
            address: normalize_optional(input.address.as_deref()),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a customer from persisted state (no validation).
    pub fn from_parts(
        id: CustomerId,
        owner: UserId,
        name: String,
        phone: Option<String>,
        address: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            name,
            phone,
            address,
            created_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Ownership gate used by every read and write.
    ///
    /// A customer owned by someone else is reported as `NotFound`, exactly like a
    /// customer that does not exist.
    pub fn ensure_visible_to(&self, user: UserId) -> DomainResult<()> {
        if self.is_owned_by(user) {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    /// Produce the updated customer. Does not mutate `self`.
    pub fn apply_patch(&self, patch: &CustomerPatch, now: DateTime<Utc>) -> DomainResult<Self> {
        patch.validate()?;

        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(phone) = &patch.phone {
            next.phone = normalize_optional(Some(phone));
        }
        if let Some(address) = &patch.address {
            next.address = normalize_optional(Some(address));
        }
        next.updated_at = now;
        Ok(next)
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Customer {
    fn owner(&self) -> UserId {
        self.owner
    }
}

impl CustomerPatch {
    /// Check the patch on its own, independent of the current customer state.
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        validate_phone(self.phone.as_deref())?;
        Ok(())
    }
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_phone(raw: Option<&str>) -> DomainResult<Option<String>> {
    let phone = normalize_optional(raw);
    if let Some(p) = &phone {
        if p.chars().count() > MAX_PHONE_LEN {
            return Err(DomainError::validation(format!(
                "phone must be at most {MAX_PHONE_LEN} characters"
            )));
        }
    }
    Ok(phone)
}

fn normalize_optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn test_owner() -> UserId {
        UserId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn karim(owner: UserId) -> Customer {
        Customer::register(
            CustomerId::new(),
            owner,
            NewCustomer {
                name: "karim dokandar".to_string(),
                phone: Some("01700000001".to_string()),
                address: Some("Dhaka".to_string()),
            },
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn register_sets_owner_and_timestamps() {
        let owner = test_owner();
        let now = test_time();
        let customer = Customer::register(
            CustomerId::new(),
            owner,
            NewCustomer {
                name: "  Rahim  ".to_string(),
                phone: Some("   ".to_string()),
                address: None,
            },
            now,
        )
        .unwrap();

        assert_eq!(customer.owner(), owner);
        assert_eq!(customer.name(), "Rahim");
        assert_eq!(customer.phone(), None);
        assert_eq!(customer.created_at(), now);
        assert_eq!(customer.updated_at(), now);
    }

    #[test]
    fn register_rejects_empty_name() {
        let err = Customer::register(
            CustomerId::new(),
            test_owner(),
            NewCustomer {
                name: "   ".to_string(),
                ..NewCustomer::default()
            },
            test_time(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn register_rejects_overlong_phone() {
        let err = Customer::register(
            CustomerId::new(),
            test_owner(),
            NewCustomer {
                name: "Rahim".to_string(),
                phone: Some("0".repeat(MAX_PHONE_LEN + 1)),
                address: None,
            },
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn foreign_owner_sees_not_found() {
        let owner = test_owner();
        let customer = karim(owner);

        assert!(customer.ensure_visible_to(owner).is_ok());
        assert_eq!(customer.ensure_visible_to(test_owner()), Err(DomainError::NotFound));
    }

    #[test]
    fn apply_patch_updates_given_fields_only() {
        let customer = karim(test_owner());
        let later = customer.created_at() + TimeDelta::minutes(5);

        let updated = customer
            .apply_patch(
                &CustomerPatch {
                    name: Some("New Name".to_string()),
                    phone: Some("01711111111".to_string()),
                    address: None,
                },
                later,
            )
            .unwrap();

        assert_eq!(updated.name(), "New Name");
        assert_eq!(updated.phone(), Some("01711111111"));
        assert_eq!(updated.address(), Some("Dhaka"));
        assert_eq!(updated.owner(), customer.owner());
        assert_eq!(updated.created_at(), customer.created_at());
        assert_eq!(updated.updated_at(), later);
    }

    #[test]
    fn apply_patch_clears_blank_optionals() {
        let customer = karim(test_owner());
        let updated = customer
            .apply_patch(
                &CustomerPatch {
                    address: Some(String::new()),
                    ..CustomerPatch::default()
                },
                test_time(),
            )
            .unwrap();
        assert_eq!(updated.address(), None);
        assert_eq!(updated.phone(), Some("01700000001"));
    }

    #[test]
    fn apply_patch_rejects_blank_name_and_leaves_original_untouched() {
        let customer = karim(test_owner());
        let before = customer.clone();

        let err = customer
            .apply_patch(
                &CustomerPatch {
                    name: Some(" ".to_string()),
                    ..CustomerPatch::default()
                },
                test_time(),
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(customer, before);
    }

    #[test]
    fn new_customer_deserializes_with_optional_fields_missing() {
        let input: NewCustomer = serde_json::from_str(r#"{"name":"karim"}"#).unwrap();
        assert_eq!(input.name, "karim");
        assert_eq!(input.phone, None);
        assert_eq!(input.address, None);
    }
}
