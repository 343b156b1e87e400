use surrealdb::{Surreal, engine::any::{self, Any}, opt::auth::Root};
use serde::Serialize;
use uuid::Uuid;
use anyhow::{Result, anyhow};

use crate::config::DatabaseConfig;
use crate::models::{
    subscription::{Subscription, SubscriptionStatus},
    user::User,
};

#[derive(Debug, thiserror::Error)]
#[error("User with email {0} already exists")]
pub struct DuplicateEmail(pub String);

const SUBSCRIPTIONS: &str = "subscriptions";
const USERS: &str = "users";

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Any>,
}

/// Record body without `id`; the id lives in the record key and is read back
/// through `meta::id(id)`.
fn document<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    let mut content = serde_json::to_value(value)?;
    match content.as_object_mut() {
        Some(object) => {
            object.remove("id");
            Ok(content)
        }
        None => Err(anyhow!("Record must serialize to an object")),
    }
}

impl DatabaseService {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db = any::connect(config.url.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns("subtrack").use_db("main").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        log::info!("Connected to database at {}", config.url);
        Ok(service)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig {
            url: "mem://".to_string(),
            username: None,
            password: None,
        })
        .await
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db.query("
            DEFINE TABLE users SCHEMALESS;
            DEFINE INDEX unique_email ON users COLUMNS email UNIQUE;
            DEFINE TABLE subscriptions SCHEMALESS;
            DEFINE INDEX subscription_owner ON subscriptions COLUMNS owner;
            DEFINE INDEX subscription_status ON subscriptions COLUMNS status;
        ").await?.check()?;

        log::info!("Database schema initialized successfully");
        Ok(())
    }

    async fn put<T: Serialize>(&self, table: &str, id: &Uuid, value: &T) -> Result<()> {
        self.db
            .query("UPDATE type::thing($table, $id) CONTENT $content RETURN NONE")
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("content", document(value)?))
            .await?
            .check()?;
        Ok(())
    }

    // User operations
    pub async fn create_user(&self, user: &User) -> Result<User> {
        if self.get_user_by_email(&user.email).await?.is_some() {
            return Err(DuplicateEmail(user.email.clone()).into());
        }

        let created = self.db
            .query("CREATE type::thing($table, $id) CONTENT $content RETURN NONE")
            .bind(("table", USERS.to_string()))
            .bind(("id", user.id.to_string()))
            .bind(("content", document(user)?))
            .await
            .and_then(|response| response.check());

        // A concurrent sign-up can win the unique_email index between the
        // lookup above and the insert.
        if let Err(e) = created {
            if self.get_user_by_email(&user.email).await?.is_some() {
                return Err(DuplicateEmail(user.email.clone()).into());
            }
            return Err(e.into());
        }

        self.get_user(&user.id)
            .await?
            .ok_or_else(|| anyhow!("Failed to create user"))
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let user: Option<User> = self.db
            .query("SELECT *, meta::id(id) AS id FROM type::thing($table, $id)")
            .bind(("table", USERS.to_string()))
            .bind(("id", user_id.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user: Option<User> = self.db
            .query("SELECT *, meta::id(id) AS id FROM users WHERE email = $email LIMIT 1")
            .bind(("email", email.trim().to_lowercase()))
            .await?
            .take(0)?;
        Ok(user)
    }

    // Subscription operations
    pub async fn create_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.db
            .query("CREATE type::thing($table, $id) CONTENT $content RETURN NONE")
            .bind(("table", SUBSCRIPTIONS.to_string()))
            .bind(("id", subscription.id.to_string()))
            .bind(("content", document(subscription)?))
            .await?
            .check()?;

        self.get_subscription(&subscription.id)
            .await?
            .ok_or_else(|| anyhow!("Failed to create subscription"))
    }

    pub async fn get_subscription(&self, subscription_id: &Uuid) -> Result<Option<Subscription>> {
        let subscription: Option<Subscription> = self.db
            .query("SELECT *, meta::id(id) AS id FROM type::thing($table, $id)")
            .bind(("table", SUBSCRIPTIONS.to_string()))
            .bind(("id", subscription_id.to_string()))
            .await?
            .take(0)?;
        Ok(subscription)
    }

    /// Newest first.
    pub async fn get_subscriptions_by_owner(&self, owner: &Uuid) -> Result<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self.db
            .query("SELECT *, meta::id(id) AS id FROM subscriptions WHERE owner = $owner")
            .bind(("owner", owner.to_string()))
            .await?
            .take(0)?;
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subscriptions)
    }

    pub async fn get_active_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subscriptions: Vec<Subscription> = self.db
            .query("SELECT *, meta::id(id) AS id FROM subscriptions WHERE status = $status")
            .bind(("status", SubscriptionStatus::Active.to_string()))
            .await?
            .take(0)?;
        Ok(subscriptions)
    }

    pub async fn update_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.put(SUBSCRIPTIONS, &subscription.id, subscription).await?;
        self.get_subscription(&subscription.id)
            .await?
            .ok_or_else(|| anyhow!("Failed to update subscription"))
    }

    pub async fn delete_subscription(&self, subscription_id: &Uuid) -> Result<()> {
        self.db
            .query("DELETE type::thing($table, $id)")
            .bind(("table", SUBSCRIPTIONS.to_string()))
            .bind(("id", subscription_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    // Utility methods
    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_user_operations() {
        let db = DatabaseService::in_memory().await.unwrap();

        let user = User::new("John Doe".to_string(), "john@example.com".to_string(), "hash".to_string());
        let created = db.create_user(&user).await.unwrap();
        assert_eq!(created.id, user.id);
        assert_eq!(created.email, "john@example.com");

        let by_email = db.get_user_by_email("JOHN@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        let duplicate = User::new("Other".to_string(), "john@example.com".to_string(), "hash".to_string());
        let err = db.create_user(&duplicate).await.unwrap_err();
        assert!(err.is::<DuplicateEmail>());

        assert!(db.get_user(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscription_operations() {
        let db = DatabaseService::in_memory().await.unwrap();
        let owner = Uuid::new_v4();

        let mut subscription = Subscription::test_fixture(owner);
        subscription.price = Decimal::from(10);
        let created = db.create_subscription(&subscription).await.unwrap();
        assert_eq!(created.id, subscription.id);
        assert_eq!(created.owner, owner);
        assert_eq!(created.price, Decimal::from(10));
        assert_eq!(created.renewal_date, subscription.renewal_date);

        let mut newer = Subscription::test_fixture(owner);
        newer.name = "Disney+".to_string();
        newer.created_at = subscription.created_at + Duration::seconds(5);
        db.create_subscription(&newer).await.unwrap();
        db.create_subscription(&Subscription::test_fixture(Uuid::new_v4())).await.unwrap();

        let owned = db.get_subscriptions_by_owner(&owner).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].name, "Disney+");

        subscription.cancel().unwrap();
        let updated = db.update_subscription(&subscription).await.unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Cancelled);

        let active = db.get_active_subscriptions().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.id != subscription.id));

        db.delete_subscription(&subscription.id).await.unwrap();
        assert!(db.get_subscription(&subscription.id).await.unwrap().is_none());
    }
}
