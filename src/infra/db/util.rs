use crate::application::repos::RepoError;

/// Unique indexes guarding `key_name` on the two cache tables. The
/// creation paths resolve races on these with conflict-then-fetch, so
/// a violation surfacing here means a caller bypassed that path.
pub const KEY_NAME_INDEXES: &[&str] = &["cache_points_key_name_idx", "cache_items_key_name_idx"];

/// Translate driver errors into the repository error vocabulary.
/// Unique violations keep their constraint name so callers can tell a
/// `key_name` collision from any other duplicate.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let constraint = db.constraint().unwrap_or("unknown");
            if KEY_NAME_INDEXES.contains(&constraint) {
                // A concurrent writer won the key_name race; the
                // creation paths refetch the winning row on this.
                RepoError::Duplicate {
                    constraint: constraint.to_string(),
                }
            } else {
                RepoError::Integrity {
                    message: db.message().to_string(),
                }
            }
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::InvalidInput {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db) if db.is_check_violation() => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db) if db.message().contains("canceling statement") => {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn unclassified_errors_fall_back_to_persistence() {
        let err = sqlx::Error::Protocol("unexpected frame".to_string());
        assert!(matches!(map_sqlx_error(err), RepoError::Persistence(_)));
    }
}
