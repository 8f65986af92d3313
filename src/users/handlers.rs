use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::{
    error::AppError,
    state::AppState,
    users::{
        dto::{
            CreateUserRequest, DataResponse, ListQuery, PaginationMeta, UpdateUserRequest,
            UserListResponse,
        },
        repo::{self, RepoError},
        repo_types::User,
        services::{total_pages, validate_changes, validate_new_user, PageRequest},
    },
};

const USER_NOT_FOUND: &str = "User not found";
const EMAIL_IN_USE: &str = "Email already in use";
const EMAIL_IN_USE_BY_OTHER: &str = "Email already in use by another user";

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Ids that are not integers cannot name an existing row.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::NotFound(USER_NOT_FOUND))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    query: Option<Query<ListQuery>>,
) -> Result<Json<UserListResponse>, AppError> {
    let req = PageRequest::from(query.map(|Query(q)| q).unwrap_or_default());

    let (users, total) =
        repo::list(&state.db, req.limit, req.offset(), req.search.as_deref()).await?;

    Ok(Json(UserListResponse {
        success: true,
        data: users,
        pagination: PaginationMeta {
            total,
            page: req.page,
            total_pages: total_pages(total, req.limit),
        },
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<User>>, AppError> {
    let id = parse_id(&id)?;
    let user = repo::get_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(USER_NOT_FOUND))?;
    Ok(Json(DataResponse::new(user)))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<User>>), AppError> {
    let Json(payload) = payload?;
    let new_user = validate_new_user(payload)?;
    info!(email = %new_user.email, "create user attempt");

    let mut tx = state.db.begin().await?;

    if repo::find_by_email(&mut *tx, &new_user.email, None)
        .await?
        .is_some()
    {
        warn!(email = %new_user.email, "email already in use");
        tx.rollback().await?;
        return Err(AppError::DuplicateEmail(EMAIL_IN_USE));
    }

    // A concurrent insert of the same email surfaces here as a unique violation.
    let user = repo::create(&mut tx, &new_user).await?;
    tx.commit().await.map_err(RepoError::from)?;

    info!(user_id = user.id, email = %user.email, "user created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(user))))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<DataResponse<User>>, AppError> {
    let id = parse_id(&id)?;
    info!(user_id = id, "update user attempt");

    let mut tx = state.db.begin().await?;

    let Some(user) = repo::get_by_id_for_update(&mut tx, id).await? else {
        warn!(user_id = id, "user not found");
        tx.rollback().await?;
        return Err(AppError::NotFound(USER_NOT_FOUND));
    };

    let changes = match payload
        .map_err(AppError::from)
        .and_then(|Json(payload)| validate_changes(payload))
    {
        Ok(changes) => changes,
        Err(e) => {
            warn!(user_id = id, error = %e, "invalid update payload");
            tx.rollback().await?;
            return Err(e);
        }
    };

    if let Some(email) = changes.email.as_deref() {
        if email != user.email
            && repo::find_by_email(&mut *tx, email, Some(user.id))
                .await?
                .is_some()
        {
            warn!(user_id = id, email = %email, "email already in use by another user");
            tx.rollback().await?;
            return Err(AppError::DuplicateEmail(EMAIL_IN_USE_BY_OTHER));
        }
    }

    let user = repo::update(&mut tx, &user, changes)
        .await
        .map_err(taken_by_other)?;
    tx.commit()
        .await
        .map_err(|e| taken_by_other(RepoError::from(e)))?;

    info!(user_id = user.id, "user updated");
    Ok(Json(DataResponse::new(user)))
}

fn taken_by_other(e: RepoError) -> AppError {
    match e {
        RepoError::DuplicateEmail => AppError::DuplicateEmail(EMAIL_IN_USE_BY_OTHER),
        other => other.into(),
    }
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    info!(user_id = id, "attempting to delete user");

    match delete_in_tx(&state.db, id).await {
        Ok(Some(_)) => {
            info!(user_id = id, "user deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(None) => {
            warn!(user_id = id, "user not found");
            Err(AppError::NotFound(USER_NOT_FOUND))
        }
        Err(e) => Err(AppError::internal("Failed to delete user", e)),
    }
}

/// `Ok(None)` when the row does not exist; nothing is written in that case.
async fn delete_in_tx(db: &PgPool, id: i64) -> Result<Option<User>, RepoError> {
    let mut tx = db.begin().await?;

    let Some(user) = repo::get_by_id_for_update(&mut tx, id).await? else {
        tx.rollback().await?;
        return Ok(None);
    };

    info!(user_id = user.id, name = %user.name, email = %user.email, "deleting user");
    repo::delete(&mut tx, &user).await?;
    tx.commit().await?;
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_integers_only() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id(" 7 ").unwrap(), 7);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound(USER_NOT_FOUND))));
        assert!(matches!(parse_id("1.5"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn duplicate_on_update_names_the_other_user() {
        assert!(matches!(
            taken_by_other(RepoError::DuplicateEmail),
            AppError::DuplicateEmail(EMAIL_IN_USE_BY_OTHER)
        ));
        assert!(matches!(
            taken_by_other(RepoError::Database(sqlx::Error::PoolTimedOut)),
            AppError::Internal { .. }
        ));
    }
}
