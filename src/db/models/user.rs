//! User and role-assignment models (the credential store).

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

/// Roles a user can hold. Franchisee assignments are scoped to a franchise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Diner,
    Admin,
    Franchisee,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Diner => write!(f, "diner"),
            Role::Admin => write!(f, "admin"),
            Role::Franchisee => write!(f, "franchisee"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "diner" => Ok(Role::Diner),
            "admin" => Ok(Role::Admin),
            "franchisee" => Ok(Role::Franchisee),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A role held by a user, optionally scoped to an object (a franchise id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: Role,
    #[serde(
        rename = "objectId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_id: Option<i64>,
}

impl RoleAssignment {
    pub fn diner() -> Self {
        Self {
            role: Role::Diner,
            object_id: None,
        }
    }

    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            object_id: None,
        }
    }

    pub fn franchisee(franchise_id: i64) -> Self {
        Self {
            role: Role::Franchisee,
            object_id: Some(franchise_id),
        }
    }

    /// Storage form of `object_id`; unscoped roles are stored as 0.
    fn stored_object_id(&self) -> i64 {
        self.object_id.unwrap_or(0)
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Clone, FromRow)]
struct RoleRow {
    role: String,
    object_id: i64,
}

impl RoleRow {
    fn into_assignment(self) -> Option<RoleAssignment> {
        match self.role.parse::<Role>() {
            Ok(role) => Some(RoleAssignment {
                role,
                object_id: (self.object_id != 0).then_some(self.object_id),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unknown role assignment");
                None
            }
        }
    }
}

/// A user as exposed to clients. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleAssignment>,
}

/// A user together with its stored password hash, for credential checks only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Insert a user and its role assignments as one unit.
pub async fn add_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
    roles: &[RoleAssignment],
) -> Result<User, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query("INSERT INTO user (name, email, password) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for assignment in roles {
        add_role(&mut tx, id, assignment).await?;
    }

    tx.commit().await?;

    Ok(User {
        id,
        name: name.to_string(),
        email: email.to_string(),
        roles: roles.to_vec(),
    })
}

/// Grant a role assignment to a user.
pub async fn add_role(
    conn: &mut SqliteConnection,
    user_id: i64,
    assignment: &RoleAssignment,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO user_role (user_id, role, object_id) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(assignment.role.to_string())
        .bind(assignment.stored_object_id())
        .execute(conn)
        .await?;
    Ok(())
}

/// Role assignments of a user in insertion order.
pub async fn user_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<RoleAssignment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RoleRow>(
        "SELECT role, object_id FROM user_role WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().filter_map(RoleRow::into_assignment).collect())
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserCredentials>, sqlx::Error> {
    let mut conn = pool.acquire().await?;

    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, email, password FROM user WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let roles = user_roles(&mut conn, row.id).await?;
    Ok(Some(UserCredentials {
        user: User {
            id: row.id,
            name: row.name,
            email: row.email,
            roles,
        },
        password_hash: row.password,
    }))
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    let mut conn = pool.acquire().await?;

    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, email, password FROM user WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let roles = user_roles(&mut conn, row.id).await?;
    Ok(Some(User {
        id: row.id,
        name: row.name,
        email: row.email,
        roles,
    }))
}

/// Ids of the users registered under the given emails, in the same order.
/// Unknown emails map to `None`.
pub async fn find_user_ids_by_email(
    pool: &SqlitePool,
    emails: &[String],
) -> Result<Vec<(String, Option<i64>)>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mut found = Vec::with_capacity(emails.len());
    for email in emails {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM user WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await?;
        found.push((email.clone(), id));
    }
    Ok(found)
}

/// Update email and/or password hash. `None` leaves the column untouched.
/// Returns false when no such user exists.
pub async fn update_user(
    pool: &SqlitePool,
    id: i64,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE user SET
            email = COALESCE(?, email),
            password = COALESCE(?, password)
        WHERE id = ?
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
