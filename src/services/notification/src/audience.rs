//! Audience resolution: targeting spec to an ordered, deduplicated recipient list

use crate::error::{NotificationError, Result};
use notify_database::{Filter, RecordStore, TypedCollection};
use notify_shared::{Recipient, TargetPredicate, TargetingSpec, UserProfile};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub const USERS_COLLECTION: &str = "users";

#[derive(Clone)]
pub struct AudienceResolver {
    users: TypedCollection<UserProfile>,
}

impl AudienceResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            users: TypedCollection::new(store, USERS_COLLECTION),
        }
    }

    /// Resolve every user matching all predicates.
    ///
    /// Results keep store insertion order, or the order of the first explicit
    /// id list when one is given. An empty result is not an error here.
    pub async fn resolve(&self, targeting: &TargetingSpec) -> Result<Vec<Recipient>> {
        let (filters, explicit_order) = match targeting {
            TargetingSpec::All => (Vec::new(), None),
            TargetingSpec::Filtered { predicates } => compile(predicates),
        };

        let profiles = self.users.find_all(filters, None).await?;

        let mut seen = HashSet::new();
        let mut recipients: Vec<Recipient> = profiles
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .map(Recipient::from)
            .collect();

        if let Some(order) = explicit_order {
            let rank: HashMap<&str, usize> = order
                .iter()
                .enumerate()
                .rev()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            recipients.sort_by_key(|r| rank.get(r.user_id.as_str()).copied().unwrap_or(usize::MAX));
        }

        debug!(count = recipients.len(), "Audience resolved");
        Ok(recipients)
    }

    /// Resolve a single user for transactional sends.
    pub async fn resolve_one(&self, user_id: &str) -> Result<Recipient> {
        self.users
            .get(user_id)
            .await?
            .map(Recipient::from)
            .ok_or_else(|| NotificationError::not_found(format!("user {}", user_id)))
    }

    /// Add a profile to the `users` collection (seeding, tests).
    pub async fn register_user(&self, profile: &UserProfile) -> Result<()> {
        self.users.insert(&profile.id, profile).await?;
        Ok(())
    }
}

fn compile(predicates: &[TargetPredicate]) -> (Vec<Filter>, Option<Vec<String>>) {
    let mut filters = Vec::with_capacity(predicates.len());
    let mut explicit_order = None;

    for predicate in predicates {
        match predicate {
            TargetPredicate::AuthMethod(method) => filters.push(Filter::eq("auth_method", method)),
            TargetPredicate::OptedInto(flag) => filters.push(Filter::eq(flag.field_path(), true)),
            TargetPredicate::LastActiveSince(since) => {
                filters.push(Filter::gte("last_active_at", since))
            }
            TargetPredicate::RecipientIds(ids) => {
                filters.push(Filter::is_in("id", ids.iter()));
                if explicit_order.is_none() {
                    explicit_order = Some(ids.clone());
                }
            }
        }
    }

    (filters, explicit_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use notify_database::InMemoryStore;
    use notify_shared::{AuthMethod, NotificationPreferences, PreferenceFlag};

    fn profile(id: &str, auth: AuthMethod, marketing: bool, active_days_ago: i64) -> UserProfile {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        UserProfile {
            id: id.to_string(),
            name: Some(format!("User {}", id)),
            email: Some(format!("{}@example.com", id)),
            phone: None,
            push_token: None,
            auth_method: auth,
            preferences: NotificationPreferences {
                marketing,
                ..NotificationPreferences::default()
            },
            is_admin: false,
            last_active_at: Some(base - Duration::days(active_days_ago)),
            created_at: base - Duration::days(365),
        }
    }

    async fn resolver() -> AudienceResolver {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
        let users: TypedCollection<UserProfile> = TypedCollection::new(store.clone(), USERS_COLLECTION);
        for p in [
            profile("a", AuthMethod::Password, true, 1),
            profile("b", AuthMethod::Google, true, 40),
            profile("c", AuthMethod::Google, false, 2),
            profile("d", AuthMethod::PhoneOtp, true, 3),
        ] {
            users.insert(&p.id.clone(), &p).await.unwrap();
        }
        AudienceResolver::new(store)
    }

    fn ids(recipients: &[Recipient]) -> Vec<&str> {
        recipients.iter().map(|r| r.user_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_all_keeps_insertion_order() {
        let resolver = resolver().await;
        let all = resolver.resolve(&TargetingSpec::All).await.unwrap();
        assert_eq!(ids(&all), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_predicates_are_combined() {
        let resolver = resolver().await;
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let spec = TargetingSpec::Filtered {
            predicates: vec![
                TargetPredicate::OptedInto(PreferenceFlag::Marketing),
                TargetPredicate::LastActiveSince(since),
            ],
        };
        assert_eq!(ids(&resolver.resolve(&spec).await.unwrap()), vec!["a", "d"]);

        let spec = TargetingSpec::Filtered {
            predicates: vec![TargetPredicate::AuthMethod(AuthMethod::Google)],
        };
        assert_eq!(ids(&resolver.resolve(&spec).await.unwrap()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_explicit_ids_keep_given_order_and_dedupe() {
        let resolver = resolver().await;
        let spec = TargetingSpec::Filtered {
            predicates: vec![TargetPredicate::RecipientIds(vec![
                "d".to_string(),
                "a".to_string(),
                "d".to_string(),
                "missing".to_string(),
            ])],
        };
        assert_eq!(ids(&resolver.resolve(&spec).await.unwrap()), vec!["d", "a"]);
    }

    #[tokio::test]
    async fn test_empty_result_is_ok() {
        let resolver = resolver().await;
        let spec = TargetingSpec::Filtered {
            predicates: vec![TargetPredicate::AuthMethod(AuthMethod::Guest)],
        };
        assert!(resolver.resolve(&spec).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_one() {
        let resolver = resolver().await;
        assert_eq!(resolver.resolve_one("c").await.unwrap().user_id, "c");
        assert!(matches!(
            resolver.resolve_one("zz").await,
            Err(NotificationError::NotFound { .. })
        ));
    }
}
