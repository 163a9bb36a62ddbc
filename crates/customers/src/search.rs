//! Free-text customer search.

use khata_core::{DomainError, DomainResult};

use crate::customer::Customer;

/// Shortest accepted search text, in characters, after trimming.
pub const MIN_SEARCH_LEN: usize = 2;

/// A validated, case-insensitive substring query over customer name and phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    folded: String,
}

impl SearchQuery {
    /// Validate raw search text.
    ///
    /// Search must narrow the directory; it is never a way to list everything, so
    /// empty (and one-character) text is rejected.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(DomainError::validation("search text cannot be empty"));
        }
        if text.chars().count() < MIN_SEARCH_LEN {
            return Err(DomainError::validation(format!(
                "at least {MIN_SEARCH_LEN} characters required for search"
            )));
        }

        Ok(Self {
            text: text.to_string(),
            folded: text.to_lowercase(),
        })
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        customer.name().to_lowercase().contains(&self.folded)
            || customer
                .phone()
                .is_some_and(|phone| phone.to_lowercase().contains(&self.folded))
    }

    /// `ILIKE` pattern with the wildcard characters of the text escaped.
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.text.len() + 2);
        pattern.push('%');
        for c in self.text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

/// Directory order: newest first, ties broken by id so the order is total.
pub fn sort_newest_first(customers: &mut [Customer]) {
    customers.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id_typed().cmp(&a.id_typed()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::NewCustomer;
    use chrono::{TimeDelta, Utc};
    use khata_core::{CustomerId, UserId};
    use proptest::prelude::*;

    fn customer(name: &str, phone: Option<&str>) -> Customer {
        Customer::register(
            CustomerId::new(),
            UserId::new(),
            NewCustomer {
                name: name.to_string(),
                phone: phone.map(str::to_string),
                address: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_and_single_character_queries_are_rejected() {
        assert!(matches!(SearchQuery::parse(""), Err(DomainError::Validation(_))));
        assert!(matches!(SearchQuery::parse("   "), Err(DomainError::Validation(_))));
        assert!(matches!(SearchQuery::parse("k"), Err(DomainError::Validation(_))));
        assert!(SearchQuery::parse("ka").is_ok());
    }

    #[test]
    fn matches_name_case_insensitively() {
        let q = SearchQuery::parse("KAR").unwrap();
        assert!(q.matches(&customer("karim", None)));
        assert!(!q.matches(&customer("rahim", None)));
    }

    #[test]
    fn matches_phone_substring() {
        let q = SearchQuery::parse("0170").unwrap();
        assert!(q.matches(&customer("rahim", Some("01700000001"))));
        assert!(!q.matches(&customer("rahim", Some("01811111111"))));
        assert!(!q.matches(&customer("rahim", None)));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        let q = SearchQuery::parse("50%_off").unwrap();
        assert_eq!(q.like_pattern(), "%50\\%\\_off%");
    }

    #[test]
    fn sort_puts_newest_first() {
        let older = customer("older", None);
        let newer = Customer::from_parts(
            CustomerId::new(),
            UserId::new(),
            "newer".to_string(),
            None,
            None,
            older.created_at() + TimeDelta::seconds(1),
            older.created_at() + TimeDelta::seconds(1),
        );
        let mut list = vec![older.clone(), newer.clone()];
        sort_newest_first(&mut list);
        assert_eq!(list[0].name(), "newer");
        assert_eq!(list[1].name(), "older");
    }

    proptest! {
        /// Property: a name containing the query in any letter case is always found.
        #[test]
        fn name_containing_the_query_matches(
            prefix in "[a-z ]{0,8}",
            query in "[a-zA-Z]{2,6}",
            suffix in "[a-z ]{0,8}",
        ) {
            let name = format!("x{prefix}{}{suffix}", query.to_uppercase());
            let q = SearchQuery::parse(&query.to_lowercase()).unwrap();
            prop_assert!(q.matches(&customer(&name, None)));
        }

        /// Property: sorted output never places an older customer before a newer one.
        #[test]
        fn sort_is_newest_first_for_any_input(offsets in prop::collection::vec(0i64..50, 0..20)) {
            let base = Utc::now();
            let mut list: Vec<Customer> = offsets
                .iter()
                .map(|secs| {
                    let at = base + TimeDelta::seconds(*secs);
                    Customer::from_parts(CustomerId::new(), UserId::new(), "c".to_string(), None, None, at, at)
                })
                .collect();
            sort_newest_first(&mut list);
            for pair in list.windows(2) {
                prop_assert!(pair[0].created_at() >= pair[1].created_at());
                if pair[0].created_at() == pair[1].created_at() {
                    prop_assert!(pair[0].id_typed() > pair[1].id_typed());
                }
            }
        }
    }
}
