//! In-process `UserStore` used by handler tests.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::{
    password::PasswordHasher,
    repo::{hash_blocking, StoreError, UserStore},
    repo_types::{canonical_email, NewUser, User},
};

#[derive(Default)]
struct Rows {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

pub struct MemoryUserStore {
    hasher: PasswordHasher,
    rows: Mutex<Rows>,
}

impl MemoryUserStore {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            rows: Mutex::new(Rows::default()),
        }
    }

    /// Stores `user` as-is, stored hash included.
    pub fn put_raw(&self, user: User) {
        let mut rows = self.rows();
        rows.next_id = rows.next_id.max(user.id);
        rows.users.insert(user.id, user);
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn duplicate_email() -> StoreError {
    StoreError::Storage(
        "duplicate key value violates unique constraint \"users_email_key\"".into(),
    )
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_all(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.rows().users.values().cloned().collect();
        users.sort_by(|a, b| a.last_name.cmp(&b.last_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = canonical_email(email);
        self.rows()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.rows().users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert(&self, new_user: NewUser) -> Result<i64, StoreError> {
        let hash = hash_blocking(&self.hasher, &new_user.password).await?;
        let email = canonical_email(&new_user.email);
        let mut rows = self.rows();
        if rows.users.values().any(|u| u.email == email) {
            return Err(duplicate_email());
        }
        rows.next_id += 1;
        let id = rows.next_id;
        let now = OffsetDateTime::now_utc();
        rows.users.insert(
            id,
            User {
                id,
                email,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                password: hash,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let email = canonical_email(&user.email);
        let mut rows = self.rows();
        if rows
            .users
            .values()
            .any(|u| u.email == email && u.id != user.id)
        {
            return Err(duplicate_email());
        }
        let row = rows.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        row.email = email;
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.updated_at = row.updated_at.max(OffsetDateTime::now_utc());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.rows().users.remove(&id);
        Ok(())
    }

    async fn reset_password(&self, id: i64, new_password: &str) -> Result<(), StoreError> {
        let exists = self.rows().users.contains_key(&id);
        if !exists {
            return Err(StoreError::NotFound);
        }
        let hash = hash_blocking(&self.hasher, new_password).await?;
        let mut rows = self.rows();
        let row = rows.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.password = hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryUserStore {
        MemoryUserStore::new(PasswordHasher::new())
    }

    fn candidate(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password: password.into(),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn insert_then_get_by_email_verifies_password() {
        let store = store();
        let hasher = PasswordHasher::new();
        let id = store.insert(candidate("a@x.com", "secret123")).await.unwrap();
        assert_eq!(id, 1);

        let user = store.get_by_email("a@x.com").await.unwrap();
        assert_eq!(user.id, id);
        assert_ne!(user.password, "secret123");
        assert!(hasher.verify(&user.password, "secret123").unwrap());
        assert!(!hasher.verify(&user.password, "secret123x").unwrap());
        assert!(!hasher.verify(&user.password, "wrong").unwrap());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = store();
        let id = store.insert(candidate(" A@X.com", "secret123")).await.unwrap();
        let user = store.get_by_email("a@x.COM").await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn unknown_email_and_id_are_not_found() {
        let store = store();
        assert!(matches!(
            store.get_by_email("ghost@x.com").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(store.get_by_id(42).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_email_is_storage_error() {
        let store = store();
        store.insert(candidate("a@x.com", "secret123")).await.unwrap();
        let err = store.insert(candidate("A@x.com", "other-pass")).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn get_all_is_empty_then_ordered() {
        let store = store();
        assert!(store.get_all().await.unwrap().is_empty());

        for (email, last) in [("c@x.com", "Zed"), ("a@x.com", "Adams"), ("b@x.com", "Adams")] {
            let mut new_user = candidate(email, "secret123");
            new_user.last_name = last.into();
            store.insert(new_user).await.unwrap();
        }
        let ids: Vec<i64> = store.get_all().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn reset_password_swaps_matching_password() {
        let store = store();
        let hasher = PasswordHasher::new();
        let id = store.insert(candidate("a@x.com", "old-password")).await.unwrap();
        store.reset_password(id, "new-password").await.unwrap();

        let user = store.get_by_id(id).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "a@x.com");
        assert!(!hasher.verify(&user.password, "old-password").unwrap());
        assert!(hasher.verify(&user.password, "new-password").unwrap());
    }

    #[tokio::test]
    async fn update_refreshes_timestamp_and_requires_row() {
        let store = store();
        let id = store.insert(candidate("a@x.com", "secret123")).await.unwrap();
        let mut user = store.get_by_id(id).await.unwrap();
        let before = user.updated_at;
        user.first_name = "Ada".into();
        store.update(&user).await.unwrap();

        let stored = store.get_by_id(id).await.unwrap();
        assert_eq!(stored.first_name, "Ada");
        assert!(stored.updated_at >= before);
        assert!(stored.updated_at >= stored.created_at);
        assert_eq!(stored.password, user.password);

        store.delete(id).await.unwrap();
        assert!(matches!(store.update(&user).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.reset_password(id, "whatever1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        let id = store.insert(candidate("a@x.com", "secret123")).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(999).await.unwrap();
        assert!(matches!(store.get_by_id(id).await, Err(StoreError::NotFound)));
    }
}
