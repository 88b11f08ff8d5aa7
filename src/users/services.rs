use std::{future::Future, sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::{
    config::ListLimits,
    error::{DirectoryError, DirectoryResult},
    users::{
        dto::{ListParams, PaginatedResult, PaginationMeta, UserCandidate, UserFilter, UserPatch},
        repo::UserStore,
        repo_types::User,
        validation::{validate_for_create, validate_for_update},
    },
};

/// Query and lifecycle operations over an injected [`UserStore`].
///
/// Holds no mutable state of its own; every store call is bounded by
/// `timeout` and expiry surfaces as [`DirectoryError::Unavailable`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    limits: ListLimits,
    timeout: Duration,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, limits: ListLimits, timeout: Duration) -> Self {
        Self {
            store,
            limits,
            timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> DirectoryResult<T>
    where
        F: Future<Output = DirectoryResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(DirectoryError::Unavailable(format!(
                    "{op} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    // --- queries ---

    #[instrument(skip(self))]
    pub async fn list_users(&self, params: ListParams) -> DirectoryResult<PaginatedResult<User>> {
        let query = params.normalize(self.limits);
        let total = self.bounded("count_live", self.store.count_live(&query.filter)).await?;
        let data = self.bounded("list_live", self.store.list_live(&query)).await?;
        Ok(PaginatedResult {
            data,
            meta: PaginationMeta::new(query.page, query.per_page, total),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i64) -> DirectoryResult<User> {
        self.bounded("find_live", self.store.find_live(id))
            .await?
            .ok_or(DirectoryError::NotFound(id))
    }

    /// Live user count. Storage failures are returned, never reported as zero.
    #[instrument(skip(self))]
    pub async fn get_user_count(&self) -> DirectoryResult<i64> {
        self.bounded("count_live", self.store.count_live(&UserFilter::default()))
            .await
    }

    // --- lifecycle ---

    #[instrument(skip(self, candidate), fields(account = %candidate.account))]
    pub async fn create_user(&self, candidate: UserCandidate) -> DirectoryResult<User> {
        let new_user = validate_for_create(candidate)?;
        let user = self.bounded("insert", self.store.insert(new_user)).await?;
        info!(
            user_id = user.id,
            account = %user.account,
            user_type = %user.user_type,
            "user created"
        );
        Ok(user)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_user(&self, id: i64, patch: UserPatch) -> DirectoryResult<User> {
        let mut user = self.get_user_by_id(id).await?;
        let validated = validate_for_update(patch)?;
        validated.apply_to(&mut user)?;

        let updated = self
            .bounded("update_live", self.store.update_live(&user))
            .await?
            // deleted between the read and the write
            .ok_or(DirectoryError::NotFound(id))?;
        info!(user_id = updated.id, "user updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: i64) -> DirectoryResult<()> {
        let deleted = self.bounded("soft_delete", self.store.soft_delete(id)).await?;
        if !deleted {
            return Err(DirectoryError::NotFound(id));
        }
        info!(user_id = id, "user soft-deleted");
        Ok(())
    }

    /// Resolves a live account and checks its password.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, account: &str, password: &str) -> DirectoryResult<User> {
        let user = self
            .bounded("find_live_by_account", self.store.find_live_by_account(account))
            .await?
            .ok_or(DirectoryError::InvalidCredentials)?;
        if !user.check_password(password) {
            warn!(user_id = user.id, "login invalid password");
            return Err(DirectoryError::InvalidCredentials);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::ValidationError,
        users::{
            dto::PageQuery,
            memory::InMemoryUserStore,
            repo_types::{NewUser, UserType},
        },
    };

    const LIMITS: ListLimits = ListLimits {
        default_per_page: 10,
        max_per_page: 100,
    };

    fn service_with(store: Arc<dyn UserStore>) -> UserService {
        UserService::new(store, LIMITS, Duration::from_secs(5))
    }

    fn service() -> (UserService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        (service_with(store.clone()), store)
    }

    fn candidate(name: &str, account: &str, user_type: &str) -> UserCandidate {
        UserCandidate {
            name: name.into(),
            account: account.into(),
            password: "secret123".into(),
            status: true,
            user_type: user_type.into(),
        }
    }

    /// Store whose every call fails or hangs.
    struct BrokenStore {
        hang: bool,
    }

    impl BrokenStore {
        async fn fail<T: Send>(&self) -> DirectoryResult<T> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Err(DirectoryError::Internal("disk on fire".into()))
        }
    }

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn insert(&self, _user: NewUser) -> DirectoryResult<User> {
            self.fail().await
        }
        async fn find_live(&self, _id: i64) -> DirectoryResult<Option<User>> {
            self.fail().await
        }
        async fn find_live_by_account(&self, _account: &str) -> DirectoryResult<Option<User>> {
            self.fail().await
        }
        async fn update_live(&self, _user: &User) -> DirectoryResult<Option<User>> {
            self.fail().await
        }
        async fn soft_delete(&self, _id: i64) -> DirectoryResult<bool> {
            self.fail().await
        }
        async fn list_live(&self, _query: &PageQuery) -> DirectoryResult<Vec<User>> {
            self.fail().await
        }
        async fn count_live(&self, _filter: &UserFilter) -> DirectoryResult<i64> {
            self.fail().await
        }
    }

    #[tokio::test]
    async fn invalid_type_is_rejected_and_nothing_persisted() {
        let (svc, store) = service();
        for bad in ["", "admin", "root"] {
            let err = svc.create_user(candidate("Ada", "ada", bad)).await.unwrap_err();
            assert!(matches!(
                err,
                DirectoryError::Validation(ValidationError::InvalidUserType(_))
            ));
        }
        assert_eq!(store.count_live(&UserFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overlong_fields_never_reach_storage() {
        let (svc, store) = service();
        let long = "x".repeat(101);
        let err = svc.create_user(candidate(&long, "ada", "panel")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(ValidationError::NameTooLong)));
        let err = svc.create_user(candidate("Ada", &long, "panel")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(ValidationError::AccountTooLong)));
        assert_eq!(store.count_live(&UserFilter::default()).await.unwrap(), 0);

        let user = svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();
        let patch = UserPatch {
            name: Some(long),
            ..Default::default()
        };
        let err = svc.update_user(user.id, patch).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(ValidationError::NameTooLong)));
        assert_eq!(store.raw(user.id).await.unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn empty_password_is_rejected() {
        let (svc, store) = service();
        let mut c = candidate("Ada", "ada", "panel");
        c.password = String::new();
        let err = svc.create_user(c).await.unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::Validation(ValidationError::EmptyPassword)
        ));
        assert_eq!(store.count_live(&UserFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn created_user_checks_only_original_password() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "system")).await.unwrap();
        assert!(user.check_password("secret123"));
        assert!(!user.check_password("secret1234"));
        assert!(!user.check_password("Secret123"));
    }

    #[tokio::test]
    async fn concurrent_duplicate_accounts_only_one_wins() {
        let (svc, store) = service();
        let (a, b) = tokio::join!(
            svc.create_user(candidate("Ada", "ada", "panel")),
            svc.create_user(candidate("Ada Two", "ada", "system")),
        );
        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(DirectoryError::DuplicateAccount(acc)) if acc == "ada"))
            .count();
        assert_eq!((ok, dup), (1, 1));
        assert_eq!(store.count_live(&UserFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicates_across_tasks() {
        let (svc, _) = service();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.create_user(candidate(&format!("user {i}"), "shared", "panel"))
                        .await
                })
            })
            .collect();
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DirectoryError::DuplicateAccount(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn update_without_type_keeps_type() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "system")).await.unwrap();

        let updated = svc
            .update_user(
                user.id,
                UserPatch {
                    name: Some("Ada L.".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.user_type, UserType::System);
        assert_eq!(updated.name, "Ada L.");

        let blank_type = svc
            .update_user(
                user.id,
                UserPatch {
                    user_type: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(blank_type.user_type, UserType::System);
    }

    #[tokio::test]
    async fn update_rejects_unknown_type_without_writing() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();
        let err = svc
            .update_user(
                user.id,
                UserPatch {
                    name: Some("Changed".into()),
                    user_type: Some("superuser".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));
        assert_eq!(svc.get_user_by_id(user.id).await.unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn update_password_rehashes_and_absent_password_keeps_hash() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();

        let same = svc
            .update_user(
                user.id,
                UserPatch {
                    status: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.password_hash, user.password_hash);

        let changed = svc
            .update_user(
                user.id,
                UserPatch {
                    password: Some("fresh-pass".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(changed.check_password("fresh-pass"));
        assert!(!changed.check_password("secret123"));
    }

    #[tokio::test]
    async fn update_to_taken_account_is_duplicate() {
        let (svc, _) = service();
        svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();
        let bob = svc.create_user(candidate("Bob", "bob", "panel")).await.unwrap();
        let err = svc
            .update_user(
                bob.id,
                UserPatch {
                    account: Some("ada".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateAccount(_)));
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let (svc, _) = service();
        let err = svc.update_user(99, UserPatch::default()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(99)));
    }

    #[tokio::test]
    async fn delete_then_lookup_and_second_delete_are_not_found() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();

        svc.delete_user(user.id).await.unwrap();
        assert!(matches!(
            svc.get_user_by_id(user.id).await,
            Err(DirectoryError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete_user(user.id).await,
            Err(DirectoryError::NotFound(_))
        ));
        assert!(matches!(
            svc.update_user(user.id, UserPatch::default()).await,
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn oversized_page_clamps_to_default() {
        let (svc, _) = service();
        for i in 0..25 {
            svc.create_user(candidate(&format!("U{i}"), &format!("u{i}"), "panel"))
                .await
                .unwrap();
        }
        let page = svc
            .list_users(ListParams {
                page: Some(1),
                per_page: Some(1_000_000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.meta.per_page, LIMITS.default_per_page);
        assert_eq!(page.data.len(), LIMITS.default_per_page as usize);
        assert_eq!(page.meta.total_items, 25);
        assert_eq!(page.meta.total_pages, 3);
    }

    #[tokio::test]
    async fn pages_concatenate_to_full_live_set() {
        let (svc, _) = service();
        let mut ids = Vec::new();
        // Repeated names force tie-breaks on id.
        for i in 0..23 {
            let u = svc
                .create_user(candidate(&format!("N{}", i % 4), &format!("acc{i}"), "panel"))
                .await
                .unwrap();
            ids.push(u.id);
        }
        svc.delete_user(ids[5]).await.unwrap();
        svc.delete_user(ids[17]).await.unwrap();

        let orders = [("name", "asc"), ("name", "desc"), ("id", "desc"), ("bogus", "asc")];
        for (sort_by, order_by) in orders {
            let per_page = 4;
            let first = svc
                .list_users(ListParams {
                    page: Some(1),
                    per_page: Some(per_page),
                    sort_by: Some(sort_by.into()),
                    order_by: Some(order_by.into()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(first.meta.total_items, 21);
            assert_eq!(
                first.meta.total_pages,
                (first.meta.total_items + per_page - 1) / per_page
            );

            let mut seen = Vec::new();
            for page in 1..=first.meta.total_pages {
                let res = svc
                    .list_users(ListParams {
                        page: Some(page),
                        per_page: Some(per_page),
                        sort_by: Some(sort_by.into()),
                        order_by: Some(order_by.into()),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                seen.extend(res.data.into_iter().map(|u| u.id));
            }
            let unique: HashSet<_> = seen.iter().copied().collect();
            assert_eq!(seen.len(), 21, "sort {sort_by} {order_by}");
            assert_eq!(unique.len(), 21);
            assert!(!unique.contains(&ids[5]));
            assert!(!unique.contains(&ids[17]));
        }
    }

    #[tokio::test]
    async fn equal_sort_keys_are_ordered_by_id() {
        let (svc, _) = service();
        for i in 0..5 {
            svc.create_user(candidate("Same", &format!("s{i}"), "panel"))
                .await
                .unwrap();
        }
        let res = svc
            .list_users(ListParams {
                sort_by: Some("name".into()),
                order_by: Some("desc".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = res.data.iter().map(|u| u.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn list_filters_by_type_and_status() {
        let (svc, _) = service();
        svc.create_user(candidate("A", "a", "system")).await.unwrap();
        svc.create_user(candidate("B", "b", "panel")).await.unwrap();
        let mut inactive = candidate("C", "c", "panel");
        inactive.status = false;
        svc.create_user(inactive).await.unwrap();

        let panel = svc
            .list_users(ListParams {
                user_type: Some(UserType::Panel),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(panel.meta.total_items, 2);

        let active_panel = svc
            .list_users(ListParams {
                user_type: Some(UserType::Panel),
                status: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active_panel.meta.total_items, 1);
        assert_eq!(active_panel.data[0].account, "b");
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let (svc, _) = service();
        svc.create_user(candidate("A", "a", "panel")).await.unwrap();
        let res = svc
            .list_users(ListParams {
                page: Some(9),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(res.data.is_empty());
        assert_eq!(res.meta.current_page, 9);
        assert_eq!(res.meta.total_pages, 1);
    }

    #[tokio::test]
    async fn count_failure_is_an_error_not_zero() {
        let svc = service_with(Arc::new(BrokenStore { hang: false }));
        assert!(matches!(
            svc.get_user_count().await,
            Err(DirectoryError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn hanging_store_times_out_as_unavailable() {
        let svc = UserService::new(
            Arc::new(BrokenStore { hang: true }),
            LIMITS,
            Duration::from_millis(20),
        );
        let err = svc.get_user_by_id(1).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_liveness() {
        let (svc, _) = service();
        let user = svc.create_user(candidate("Ada", "ada", "panel")).await.unwrap();

        assert_eq!(svc.authenticate("ada", "secret123").await.unwrap().id, user.id);
        assert!(matches!(
            svc.authenticate("ada", "nope").await,
            Err(DirectoryError::InvalidCredentials)
        ));
        svc.delete_user(user.id).await.unwrap();
        assert!(matches!(
            svc.authenticate("ada", "secret123").await,
            Err(DirectoryError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn ada_scenario() {
        let (svc, _) = service();
        let ada = svc
            .create_user(UserCandidate {
                name: "Ada".into(),
                account: "ada".into(),
                password: "secret123".into(),
                status: true,
                user_type: "panel".into(),
            })
            .await
            .unwrap();
        assert!(!ada.password_hash.is_empty());
        assert_ne!(ada.password_hash, "secret123");
        assert_eq!(ada.user_type, UserType::Panel);
        assert!(ada.status);
        let before = svc.get_user_count().await.unwrap();

        let updated = svc
            .update_user(
                ada.id,
                UserPatch {
                    status: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.status);
        assert_eq!(updated.account, "ada");

        svc.delete_user(ada.id).await.unwrap();
        assert!(matches!(
            svc.get_user_by_id(ada.id).await,
            Err(DirectoryError::NotFound(_))
        ));
        assert_eq!(svc.get_user_count().await.unwrap(), before - 1);
    }
}
