//! SQL dialect and server version.

use crate::models::DatabaseKind;
use serde::{Deserialize, Serialize};

/// Server version (major.minor.patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first dotted version number from a server banner.
    ///
    /// ```
    /// use rdba::models::Version;
    /// let v = Version::parse("PostgreSQL 16.2 on x86_64-pc-linux-gnu").unwrap();
    /// assert_eq!(v, Version::new(16, 2, 0));
    /// ```
    pub fn parse(banner: &str) -> Option<Self> {
        let token = banner
            .split(|c: char| c.is_whitespace() || c == '-' || c == ',')
            .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))?;

        let mut parts = token.split('.').map(|p| {
            let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        });
        let major = parts.next().flatten()?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parameter placeholder style of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...`
    Dollar,
    /// `?`
    Question,
    /// `:1, :2, ...`
    Colon,
}

/// The SQL dialect of a facade.
///
/// Before the first connect this is the default dialect of the kind; after it
/// carries the server version and is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    kind: DatabaseKind,
    version: Option<Version>,
}

impl SqlDialect {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            version: None,
        }
    }

    pub fn with_version(kind: DatabaseKind, version: Version) -> Self {
        Self {
            kind,
            version: Some(version),
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn name(&self) -> String {
        match self.version {
            Some(v) => format!("{} {}.{}", self.kind, v.major, v.minor),
            None => self.kind.to_string(),
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self.kind {
            DatabaseKind::PostgreSQL => PlaceholderStyle::Dollar,
            DatabaseKind::MySQL | DatabaseKind::SQLite => PlaceholderStyle::Question,
            DatabaseKind::Oracle => PlaceholderStyle::Colon,
        }
    }

    /// Placeholder text for the one-based parameter `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Dollar => format!("${}", n),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Colon => format!(":{}", n),
        }
    }

    /// Statement that opens an explicit transaction. Oracle opens one
    /// implicitly with the first statement.
    pub fn begin_statement(&self) -> Option<&'static str> {
        match self.kind {
            DatabaseKind::PostgreSQL | DatabaseKind::SQLite => Some("BEGIN"),
            DatabaseKind::MySQL => Some("START TRANSACTION"),
            DatabaseKind::Oracle => None,
        }
    }

    /// Query returning the server version banner.
    pub fn version_query(&self) -> &'static str {
        match self.kind {
            DatabaseKind::PostgreSQL | DatabaseKind::MySQL => "SELECT version()",
            DatabaseKind::SQLite => "SELECT sqlite_version()",
            DatabaseKind::Oracle => "SELECT banner FROM v$version WHERE ROWNUM = 1",
        }
    }

    /// Whether `INSERT ... RETURNING` is available.
    pub fn supports_returning(&self) -> bool {
        match self.kind {
            DatabaseKind::PostgreSQL | DatabaseKind::Oracle => true,
            DatabaseKind::SQLite => self
                .version
                .is_some_and(|v| v >= Version::new(3, 35, 0)),
            DatabaseKind::MySQL => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_banners() {
        assert_eq!(Version::parse("8.0.36"), Some(Version::new(8, 0, 36)));
        assert_eq!(
            Version::parse("10.11.6-MariaDB-1:10.11.6+maria~ubu2204"),
            Some(Version::new(10, 11, 6))
        );
        assert_eq!(Version::parse("3.45.1"), Some(Version::new(3, 45, 1)));
        assert_eq!(
            Version::parse("Oracle Database 19c Enterprise Edition Release 19.0.0.0.0"),
            Some(Version::new(19, 0, 0))
        );
        assert_eq!(Version::parse("no digits here"), None);
    }

    #[test]
    fn test_placeholders() {
        let pg = SqlDialect::new(DatabaseKind::PostgreSQL);
        assert_eq!(pg.placeholder(2), "$2");
        let my = SqlDialect::new(DatabaseKind::MySQL);
        assert_eq!(my.placeholder(2), "?");
        let ora = SqlDialect::new(DatabaseKind::Oracle);
        assert_eq!(ora.placeholder(1), ":1");
    }

    #[test]
    fn test_supports_returning_depends_on_version() {
        let old = SqlDialect::with_version(DatabaseKind::SQLite, Version::new(3, 31, 1));
        let new = SqlDialect::with_version(DatabaseKind::SQLite, Version::new(3, 45, 0));
        assert!(!old.supports_returning());
        assert!(new.supports_returning());
        assert!(!SqlDialect::new(DatabaseKind::SQLite).supports_returning());
    }

    #[test]
    fn test_dialect_name() {
        let d = SqlDialect::with_version(DatabaseKind::PostgreSQL, Version::new(16, 2, 0));
        assert_eq!(d.name(), "PostgreSQL 16.2");
        assert_eq!(SqlDialect::new(DatabaseKind::MySQL).name(), "MySQL");
    }
}
