//! Repository utilities.

use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind};

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Whether an error is a UNIQUE constraint violation.
pub fn is_unique_violation(e: &diesel::result::Error) -> bool {
    matches!(
        e,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

/// Strip Czech diacritics and lowercase.
///
/// Covers the letters that appear in Czech place names; anything else is
/// lowercased unchanged.
pub fn fold_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'č' | 'Č' => 'c',
            'ď' | 'Ď' => 'd',
            'é' | 'É' | 'ě' | 'Ě' => 'e',
            'í' | 'Í' => 'i',
            'ň' | 'Ň' => 'n',
            'ó' | 'Ó' | 'ö' | 'Ö' => 'o',
            'ř' | 'Ř' => 'r',
            'š' | 'Š' => 's',
            'ť' | 'Ť' => 't',
            'ú' | 'Ú' | 'ů' | 'Ů' | 'ü' | 'Ü' => 'u',
            'ý' | 'Ý' => 'y',
            'ž' | 'Ž' => 'z',
            'ä' | 'Ä' => 'a',
            'ľ' | 'Ľ' | 'ĺ' | 'Ĺ' => 'l',
            'ŕ' | 'Ŕ' => 'r',
            'ô' | 'Ô' => 'o',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_diacritics() {
        assert_eq!(fold_diacritics("Žižkov"), "zizkov");
        assert_eq!(fold_diacritics("Staré Město"), "stare mesto");
        assert_eq!(fold_diacritics("Hradčany"), "hradcany");
        assert_eq!(fold_diacritics("Ústí nad Labem"), "usti nad labem");
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(!is_unique_violation(&to_diesel_error("boom")));
        assert!(!is_unique_violation(&diesel::result::Error::NotFound));
    }
}
