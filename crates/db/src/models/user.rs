use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::user;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("User with email {0} already exists")]
    EmailTaken(String),
}

/// Public view of an account. The password hash never leaves this module
/// except through [`User::find_credentials_by_email`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Profile fields a user may change about themselves. `None` leaves the
/// stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none()
    }
}

/// Emails are compared case-insensitively by storing them lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    fn from_model(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Returns the account together with its stored password hash.
    pub async fn find_credentials_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> Result<Option<(Self, String)>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(db)
            .await?;
        Ok(record.map(|model| {
            let hash = model.password_hash.clone();
            (Self::from_model(model), hash)
        }))
    }

    pub async fn create<C: ConnectionTrait>(db: &C, data: &CreateUser) -> Result<Self, UserError> {
        let email = normalize_email(&data.email);
        if Self::find_by_email(db, &email).await?.is_some() {
            return Err(UserError::EmailTaken(email));
        }

        let now = Utc::now();
        let active = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            password_hash: Set(data.password_hash.clone()),
            first_name: Set(data.first_name.clone()),
            last_name: Set(data.last_name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match active.insert(db).await {
            Ok(model) => Ok(Self::from_model(model)),
            // Lost a race against a concurrent registration.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(UserError::EmailTaken(email))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns `None` when the account no longer exists.
    pub async fn update_profile<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateProfile,
    ) -> Result<Option<Self>, DbErr> {
        let Some(record) = user::Entity::find_by_id(id).one(db).await? else {
            return Ok(None);
        };
        let mut active: user::ActiveModel = record.into();
        if let Some(first_name) = &data.first_name {
            active.first_name = Set(Some(first_name.clone()));
        }
        if let Some(last_name) = &data.last_name {
            active.last_name = Set(Some(last_name.clone()));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        Ok(Some(Self::from_model(updated)))
    }
}
