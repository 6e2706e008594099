use crate::server::response::ApiError;
use crate::types::{Role, Scope, Visibility};

const MAX_TITLE_LEN: usize = 200;
const MAX_FOLDER_NAME_LEN: usize = 100;
const MAX_TAG_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::validation("Title cannot be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(ApiError::validation(format!(
            "Title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_folder_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("Folder name cannot be empty"));
    }
    if name.len() > MAX_FOLDER_NAME_LEN {
        return Err(ApiError::validation(format!(
            "Folder name cannot exceed {MAX_FOLDER_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Cleans a tag list: trims entries, drops empties, rejects oversized or
/// quote-bearing tags (tags are matched inside a JSON column).
pub fn validate_tags(tags: Vec<String>) -> Result<Vec<String>, ApiError> {
    let mut cleaned = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(ApiError::validation(format!(
                "Tag '{tag}' exceeds {MAX_TAG_LEN} characters"
            )));
        }
        if tag.contains('"') || tag.contains('\\') {
            return Err(ApiError::validation(format!(
                "Tag '{tag}' contains invalid characters"
            )));
        }
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    Ok(cleaned)
}

pub fn parse_visibility(raw: Option<&str>) -> Result<Option<Visibility>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => Visibility::parse(s).map(Some).ok_or_else(|| {
            ApiError::validation(format!("Unknown visibility '{s}'"))
                .with_hint("Valid values: private, team, public")
        }),
    }
}

pub fn parse_role(raw: Option<&str>) -> Result<Option<Role>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => Role::parse(s).map(Some).ok_or_else(|| {
            ApiError::validation(format!("Unknown role '{s}'"))
                .with_hint("Valid values: admin, editor, viewer")
        }),
    }
}

pub fn parse_scopes(raw: &[String]) -> Result<Scope, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::validation("At least one scope is required")
            .with_hint("Valid scopes: documents:read, documents:write, versions:read, search:read, audit:read"));
    }
    Scope::parse_many(raw).ok_or_else(|| {
        ApiError::validation("Unknown scope in list").with_hint(
            "Valid scopes: documents:read, documents:write, versions:read, search:read, audit:read",
        )
    })
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::validation("Username cannot be empty"));
    }
    if username.contains(char::is_whitespace) {
        return Err(ApiError::validation("Username cannot contain whitespace"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ApiError::validation(
            "Username can only contain alphanumeric characters, hyphens, underscores, and periods",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tags_cleans_and_dedups() {
        let tags = validate_tags(vec![
            " rust ".to_string(),
            String::new(),
            "rust".to_string(),
            "notes".to_string(),
        ])
        .unwrap();
        assert_eq!(tags, vec!["rust".to_string(), "notes".to_string()]);
    }

    #[test]
    fn test_validate_tags_rejects_quotes() {
        assert!(validate_tags(vec!["bad\"tag".to_string()]).is_err());
    }

    #[test]
    fn test_parse_scopes_requires_known_values() {
        assert!(parse_scopes(&[]).is_err());
        assert!(parse_scopes(&["documents:write".to_string()]).is_ok());
        assert!(parse_scopes(&["documents:write".to_string(), "nope".to_string()]).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice.dev").is_ok());
        assert!(validate_username("bad user").is_err());
        assert!(validate_username("").is_err());
    }
}
