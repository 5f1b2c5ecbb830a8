//! Protected path patterns.
//!
//! Only requests whose path matches one of these patterns reach the access
//! gate. Patterns are literal paths with an optional wildcard tail:
//!
//! - `/student-dashboard` matches exactly that path
//! - `/student-dashboard/*` matches anything below it
//! - `/student-dashboard/:path*` matches the root and anything below it

use regex::RegexSet;

use crate::error::{Result, TutorlyError};

/// Patterns protected when no override is configured.
pub const DEFAULT_PROTECTED_PATHS: [&str; 7] = [
    "/student-dashboard",
    "/student-dashboard/*",
    "/tutor-dashboard",
    "/tutor-dashboard/*",
    "/admin-dashboard",
    "/admin-dashboard/*",
    "/logout",
];

/// Compiled set of protected path patterns.
#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ProtectedPaths {
    /// Compile a list of patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let regexes = patterns
            .iter()
            .map(|p| pattern_to_regex(p))
            .collect::<Result<Vec<_>>>()?;

        let set = RegexSet::new(&regexes).map_err(|e| {
            TutorlyError::Config(format!("Invalid protected path pattern: {}", e))
        })?;

        Ok(Self { patterns, set })
    }

    /// Whether the gate must evaluate a request for `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    /// The source patterns, as configured.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        let patterns: Vec<String> = DEFAULT_PROTECTED_PATHS
            .iter()
            .map(|p| p.to_string())
            .collect();
        let regexes: Vec<String> = patterns
            .iter()
            .filter_map(|p| pattern_to_regex(p).ok())
            .collect();
        // The built-in list is known to compile.
        let set = RegexSet::new(&regexes).unwrap_or_else(|_| RegexSet::empty());
        Self { patterns, set }
    }
}

fn pattern_to_regex(pattern: &str) -> Result<String> {
    if !pattern.starts_with('/') {
        return Err(TutorlyError::Config(format!(
            "Protected path must start with '/': {}",
            pattern
        )));
    }

    let (base, tail) = if let Some(base) = pattern.strip_suffix("/:path*") {
        (base, "(?:/.*)?")
    } else if let Some(base) = pattern.strip_suffix("/*") {
        (base, "/.*")
    } else {
        (pattern, "")
    };

    if base.contains('*') || base.contains(':') {
        return Err(TutorlyError::Config(format!(
            "Unsupported wildcard in protected path: {}",
            pattern
        )));
    }

    Ok(format!("^{}{}$", regex::escape(base), tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_covers_dashboards_and_logout() {
        let paths = ProtectedPaths::default();
        assert_eq!(paths.patterns().len(), 7);
        assert!(paths.matches("/student-dashboard"));
        assert!(paths.matches("/student-dashboard/MyBookings"));
        assert!(paths.matches("/tutor-dashboard/MyBooking"));
        assert!(paths.matches("/admin-dashboard"));
        assert!(paths.matches("/admin-dashboard/users/abc"));
        assert!(paths.matches("/logout"));
    }

    #[test]
    fn unprotected_paths_bypass() {
        let paths = ProtectedPaths::default();
        assert!(!paths.matches("/"));
        assert!(!paths.matches("/login"));
        assert!(!paths.matches("/tutors"));
        assert!(!paths.matches("/logout/now"));
        assert!(!paths.matches("/student-dashboardx"));
        assert!(!paths.matches("/api/student-dashboard"));
    }

    #[test]
    fn path_star_includes_root() {
        let paths = ProtectedPaths::new(["/reports/:path*"]).unwrap();
        assert!(paths.matches("/reports"));
        assert!(paths.matches("/reports/2024/q1"));
        assert!(!paths.matches("/reportsx"));
    }

    #[test]
    fn slash_star_excludes_root() {
        let paths = ProtectedPaths::new(["/reports/*"]).unwrap();
        assert!(!paths.matches("/reports"));
        assert!(paths.matches("/reports/1"));
    }

    #[test]
    fn literal_dots_are_escaped() {
        let paths = ProtectedPaths::new(["/a.b"]).unwrap();
        assert!(paths.matches("/a.b"));
        assert!(!paths.matches("/axb"));
    }

    #[test]
    fn rejects_relative_pattern() {
        let err = ProtectedPaths::new(["dashboard"]).unwrap_err();
        assert!(matches!(err, TutorlyError::Config(_)));
    }

    #[test]
    fn rejects_inner_wildcard() {
        assert!(ProtectedPaths::new(["/a/*/b"]).is_err());
        assert!(ProtectedPaths::new(["/a/:id/b"]).is_err());
    }

    #[test]
    fn blank_entries_are_ignored() {
        let paths = ProtectedPaths::new(["", "  ", "/logout"]).unwrap();
        assert_eq!(paths.patterns(), &["/logout".to_string()]);
    }
}
