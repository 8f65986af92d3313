use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;
use crate::users::dto::{CreateUserRequest, ListQuery, UpdateUserRequest};
use crate::users::repo_types::{NewUser, UserChanges, UserStatus};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 100;
const EMAIL_MAX_CHARS: usize = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_string()
}

fn check_name(name: &str, errors: &mut Vec<String>) {
    if name.is_empty() {
        errors.push("Name cannot be empty".into());
        return;
    }
    let len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        errors.push("Name must be between 2 and 100 characters".into());
    }
}

fn check_email(email: &str, errors: &mut Vec<String>) {
    if email.is_empty() {
        errors.push("Email cannot be empty".into());
    } else if !is_valid_email(email) {
        errors.push("Please provide a valid email address".into());
    } else if email.chars().count() > EMAIL_MAX_CHARS {
        errors.push("Email must be at most 100 characters".into());
    }
}

/// Normalize and validate a create payload. New users always start `active`.
pub fn validate_new_user(req: CreateUserRequest) -> Result<NewUser, AppError> {
    let mut errors = Vec::new();

    let name = match req.name.as_deref() {
        Some(raw) => {
            let name = normalize_name(raw);
            check_name(&name, &mut errors);
            name
        }
        None => {
            errors.push("Name is required".into());
            String::new()
        }
    };
    let email = match req.email.as_deref() {
        Some(raw) => {
            let email = normalize_email(raw);
            check_email(&email, &mut errors);
            email
        }
        None => {
            errors.push("Email is required".into());
            String::new()
        }
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(NewUser {
        name,
        email,
        status: UserStatus::Active,
    })
}

/// Normalize and validate the supplied fields of an update payload.
pub fn validate_changes(req: UpdateUserRequest) -> Result<UserChanges, AppError> {
    let mut errors = Vec::new();

    let name = req.name.as_deref().map(normalize_name);
    if let Some(name) = &name {
        check_name(name, &mut errors);
    }
    let email = req.email.as_deref().map(normalize_email);
    if let Some(email) = &email {
        check_email(email, &mut errors);
    }
    let status = match req.status.as_deref() {
        Some(raw) => {
            let parsed = UserStatus::parse(raw);
            if parsed.is_none() {
                errors.push("Invalid status value".into());
            }
            parsed
        }
        None => None,
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(UserChanges {
        name,
        email,
        status,
    })
}

/// Resolved pagination window of a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl From<ListQuery> for PageRequest {
    fn from(q: ListQuery) -> Self {
        let page = parse_number(q.page.as_deref())
            .unwrap_or(DEFAULT_PAGE)
            .max(1);
        let limit = parse_number(q.limit.as_deref())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let search = q
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { page, limit, search }
    }
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 || limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>, search: Option<&str>) -> ListQuery {
        ListQuery {
            page: page.map(String::from),
            limit: limit.map(String::from),
            search: search.map(String::from),
        }
    }

    fn errors_of(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email(" Foo@Bar.com "), "foo@bar.com");
        assert_eq!(normalize_email("FOO@BAR.COM"), normalize_email(" Foo@Bar.com "));
    }

    #[test]
    fn email_regex() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("@x.com"));
    }

    #[test]
    fn new_user_is_normalized_and_active() {
        let user = validate_new_user(CreateUserRequest {
            name: Some("  Alice Smith ".into()),
            email: Some(" Alice@Smith.COM ".into()),
        })
        .unwrap();
        assert_eq!(user.name, "Alice Smith");
        assert_eq!(user.email, "alice@smith.com");
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let errors = errors_of(validate_new_user(CreateUserRequest::default()).unwrap_err());
        assert_eq!(errors, vec!["Name is required", "Email is required"]);
    }

    #[test]
    fn name_length_counts_trimmed_chars() {
        let errors = errors_of(
            validate_new_user(CreateUserRequest {
                name: Some(" A ".into()),
                email: Some("a@x.com".into()),
            })
            .unwrap_err(),
        );
        assert_eq!(errors, vec!["Name must be between 2 and 100 characters"]);

        let long = "é".repeat(100);
        assert!(validate_new_user(CreateUserRequest {
            name: Some(long),
            email: Some("a@x.com".into()),
        })
        .is_ok());
    }

    #[test]
    fn overlong_email_is_rejected() {
        let email = format!("{}@x.com", "a".repeat(95));
        let errors = errors_of(
            validate_new_user(CreateUserRequest {
                name: Some("Al".into()),
                email: Some(email),
            })
            .unwrap_err(),
        );
        assert_eq!(errors, vec!["Email must be at most 100 characters"]);
    }

    #[test]
    fn changes_keep_only_supplied_fields() {
        let changes = validate_changes(UpdateUserRequest {
            status: Some("suspended".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(changes.name.is_none());
        assert!(changes.email.is_none());
        assert_eq!(changes.status, Some(UserStatus::Suspended));
    }

    #[test]
    fn changes_reject_bad_status_and_blank_name() {
        let errors = errors_of(
            validate_changes(UpdateUserRequest {
                name: Some("   ".into()),
                status: Some("deleted".into()),
                ..Default::default()
            })
            .unwrap_err(),
        );
        assert_eq!(errors, vec!["Name cannot be empty", "Invalid status value"]);
    }

    #[test]
    fn list_query_defaults() {
        let req = PageRequest::from(ListQuery::default());
        assert_eq!(
            req,
            PageRequest {
                page: 1,
                limit: 10,
                search: None
            }
        );
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let req = PageRequest::from(query(Some("abc"), Some("NaN"), Some("   ")));
        assert_eq!(req.page, DEFAULT_PAGE);
        assert_eq!(req.limit, DEFAULT_LIMIT);
        assert_eq!(req.search, None);

        let req = PageRequest::from(query(Some("-4"), Some("0"), None));
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, 1);

        let req = PageRequest::from(query(None, Some("5000"), None));
        assert_eq!(req.limit, MAX_LIMIT);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let req = PageRequest::from(query(Some(&i64::MAX.to_string()), Some("100"), None));
        assert_eq!(req.offset(), i64::MAX);
    }

    #[test]
    fn pagination_math() {
        let req = PageRequest::from(query(Some("3"), Some("10"), Some(" alice ")));
        assert_eq!(req.offset(), 20);
        assert_eq!(req.search.as_deref(), Some("alice"));
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
        assert_eq!(total_pages(0, 10), 0);
    }
}
