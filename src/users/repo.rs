use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::users::repo_types::{NewUser, User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("email already in use")]
    DuplicateEmail,
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // idx_user_email is the only unique index besides the primary key
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::DuplicateEmail,
            _ => RepoError::Database(e),
        }
    }
}

/// `%term%` pattern for ILIKE with the wildcard characters of `term` escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// One page of users, newest first, plus the number of rows matching `search`.
pub async fn list(
    db: &PgPool,
    limit: i64,
    offset: i64,
    search: Option<&str>,
) -> Result<(Vec<User>, i64), RepoError> {
    let pattern = search.map(contains_pattern);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
          FROM users
         WHERE $1::text IS NULL
            OR name ILIKE $1 ESCAPE '\'
            OR email ILIKE $1 ESCAPE '\'
        "#,
    )
    .bind(pattern.as_deref())
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, status, created_at, updated_at
          FROM users
         WHERE $1::text IS NULL
            OR name ILIKE $1 ESCAPE '\'
            OR email ILIKE $1 ESCAPE '\'
         ORDER BY created_at DESC, id DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(pattern.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok((rows, total))
}

/// Works against the pool for plain reads and against `&mut **tx` inside a unit of work.
pub async fn get_by_id<'e, E>(exec: E, id: i64) -> Result<Option<User>, RepoError>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, status, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;
    Ok(user)
}

/// Load and row-lock a user for the rest of the transaction, so a concurrent
/// update or delete of the same id waits for this one to finish.
pub async fn get_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<Option<User>, RepoError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, status, created_at, updated_at
          FROM users
         WHERE id = $1
           FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(user)
}

/// Find a user by normalized email, optionally ignoring the row `exclude_id`.
pub async fn find_by_email<'e, E>(
    exec: E,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<Option<User>, RepoError>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, status, created_at, updated_at
          FROM users
         WHERE email = $1
           AND ($2::bigint IS NULL OR id <> $2)
        "#,
    )
    .bind(email)
    .bind(exclude_id)
    .fetch_optional(exec)
    .await?;
    Ok(user)
}

/// Insert a new user within a transaction.
pub async fn create(tx: &mut Transaction<'_, Postgres>, new: &NewUser) -> Result<User, RepoError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, status)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, status, created_at, updated_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(new.status)
    .fetch_one(&mut **tx)
    .await?;
    Ok(user)
}

/// Apply `changes` to `user` and rewrite the whole row.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    user: &User,
    changes: UserChanges,
) -> Result<User, RepoError> {
    let next = changes.apply_to(user);
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
           SET name = $2, email = $3, status = $4, updated_at = now()
         WHERE id = $1
        RETURNING id, name, email, status, created_at, updated_at
        "#,
    )
    .bind(next.id)
    .bind(&next.name)
    .bind(&next.email)
    .bind(next.status)
    .fetch_one(&mut **tx)
    .await?;
    Ok(user)
}

pub async fn delete(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<(), RepoError> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
