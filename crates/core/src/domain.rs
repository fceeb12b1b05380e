//! Semantic task domains and the pairwise compatibility rule.

use serde::{Deserialize, Serialize};

/// Semantic category assigned to a task by the classifier.
///
/// Domains exist for one purpose: deciding which tasks are safe to run
/// in parallel against the same codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// UI, components, styling
    Frontend,
    /// Server-side application logic
    Backend,
    /// Schema, migrations, queries
    Database,
    /// Test suites and fixtures
    Testing,
    /// Docs, guides, comments
    Documentation,
    /// CI, deployment, tooling
    Infrastructure,
    /// Auth, validation, hardening
    Security,
    /// Could not be classified
    Unknown,
}

impl Domain {
    /// Whether two tasks from these domains may run concurrently.
    ///
    /// Unknown never runs alongside anything (an unclassifiable task must
    /// run alone). Identical domains are assumed to share files. Database
    /// work is globally disruptive and runs strictly alone.
    pub fn is_compatible_with(self, other: Domain) -> bool {
        if self == Domain::Unknown || other == Domain::Unknown {
            return false;
        }
        if self == Domain::Database || other == Domain::Database {
            return false;
        }
        self != other
    }

    /// All domains, most specific first - the order the keyword cascade
    /// checks them in.
    pub const ALL: [Domain; 8] = [
        Domain::Security,
        Domain::Database,
        Domain::Documentation,
        Domain::Testing,
        Domain::Infrastructure,
        Domain::Backend,
        Domain::Frontend,
        Domain::Unknown,
    ];
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Domain::Frontend => "frontend",
            Domain::Backend => "backend",
            Domain::Database => "database",
            Domain::Testing => "testing",
            Domain::Documentation => "documentation",
            Domain::Infrastructure => "infrastructure",
            Domain::Security => "security",
            Domain::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_is_symmetric() {
        for a in Domain::ALL {
            for b in Domain::ALL {
                assert_eq!(
                    a.is_compatible_with(b),
                    b.is_compatible_with(a),
                    "asymmetric for {a}/{b}",
                );
            }
        }
    }

    #[test]
    fn unknown_is_incompatible_with_everything() {
        for d in Domain::ALL {
            assert!(!Domain::Unknown.is_compatible_with(d));
            assert!(!d.is_compatible_with(Domain::Unknown));
        }
    }

    #[test]
    fn database_runs_alone() {
        for d in Domain::ALL {
            assert!(!Domain::Database.is_compatible_with(d));
        }
    }

    #[test]
    fn identical_domains_conflict() {
        assert!(!Domain::Backend.is_compatible_with(Domain::Backend));
        assert!(!Domain::Frontend.is_compatible_with(Domain::Frontend));
    }

    #[test]
    fn distinct_non_database_domains_are_compatible() {
        assert!(Domain::Backend.is_compatible_with(Domain::Frontend));
        assert!(Domain::Testing.is_compatible_with(Domain::Documentation));
        assert!(Domain::Security.is_compatible_with(Domain::Infrastructure));
    }
}
