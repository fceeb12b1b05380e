//! Domain classification via a rule cascade.
//!
//! Classification feeds exactly one consumer: the scheduler's
//! domain-compatibility check. The cascade tries signals from strongest to
//! weakest - explicit title tag, labels, path fragments, broad keywords -
//! and the first hit wins.

use armada_core::Domain;

/// Outcome of classifying a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The assigned domain
    pub domain: Domain,
    /// Confidence in the assignment, 0.0 to 1.0
    pub confidence: f32,
    /// Human-readable trail of which rule fired
    pub reasons: Vec<String>,
}

/// Keyword table shared by the title-tag, label, and keyword rules.
///
/// Checked in `Domain::ALL` order (most specific first) so that a generic
/// term appearing in a specific context does not win - "api docs" must
/// classify as documentation before backend gets a chance at "api".
fn keywords_for(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Security => &[
            "security", "auth", "authentication", "authorization", "vulnerability",
            "xss", "csrf", "encryption", "sanitize", "permission",
        ],
        Domain::Database => &[
            "database", "db", "schema", "migration", "sql", "query", "postgres",
            "sqlite", "index",
        ],
        Domain::Documentation => &[
            "documentation", "docs", "readme", "changelog", "guide", "tutorial",
            "typo", "comment",
        ],
        Domain::Testing => &[
            "test", "tests", "testing", "spec", "coverage", "e2e", "flaky",
            "regression", "fixture",
        ],
        Domain::Infrastructure => &[
            "ci", "cd", "docker", "deploy", "deployment", "pipeline", "infra",
            "infrastructure", "kubernetes", "terraform", "build",
        ],
        Domain::Backend => &[
            "backend", "api", "endpoint", "server", "service", "handler", "route",
            "controller", "middleware",
        ],
        Domain::Frontend => &[
            "frontend", "ui", "ux", "component", "css", "style", "styling",
            "layout", "react", "page", "modal", "button",
        ],
        Domain::Unknown => &[],
    }
}

/// Path fragments characteristic of a domain, for rule three.
fn path_markers_for(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Security => &["auth/", "security/"],
        Domain::Database => &["migrations/", ".sql", "schema/"],
        Domain::Documentation => &["docs/", ".md"],
        Domain::Testing => &["tests/", "test/", ".test.", ".spec.", "_test."],
        Domain::Infrastructure => &[".github/workflows", "dockerfile", "ci/", ".yml", ".yaml"],
        Domain::Backend => &["api/", "server/", "controllers/", "services/", "handlers/"],
        Domain::Frontend => &["components/", "pages/", "styles/", ".css", ".tsx", ".jsx"],
        Domain::Unknown => &[],
    }
}

fn match_keyword(text: &str) -> Option<(Domain, &'static str)> {
    for domain in Domain::ALL {
        for kw in keywords_for(domain) {
            if contains_word(text, kw) {
                return Some((domain, kw));
            }
        }
    }
    None
}

/// Whole-word containment, so "ui" does not fire inside "build".
fn contains_word(text: &str, word: &str) -> bool {
    for (start, _) in text.match_indices(word) {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        let boundary_before = before.map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = after.map_or(true, |c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
    }
    false
}

/// Classify a task from its title, body, and labels.
///
/// Pure and side-effect free; first matching rule wins.
pub fn classify_domain(title: &str, body: &str, labels: &[String]) -> Classification {
    // Rule 1: explicit bracketed tag in the title, e.g. "[Backend] add retry".
    if let Some(tag) = title_tag(title) {
        let tag_lower = tag.to_lowercase();
        if let Some((domain, kw)) = match_keyword(&tag_lower) {
            return Classification {
                domain,
                confidence: 1.0,
                reasons: vec![format!("title tag [{tag}] matched '{kw}'")],
            };
        }
    }

    // Rule 2: label text against the same keyword table.
    for label in labels {
        let label_lower = label.to_lowercase();
        if let Some((domain, kw)) = match_keyword(&label_lower) {
            return Classification {
                domain,
                confidence: 0.9,
                reasons: vec![format!("label '{label}' matched '{kw}'")],
            };
        }
    }

    let combined = format!("{} {}", title, body).to_lowercase();

    // Rule 3: characteristic path fragments in the combined text.
    for domain in Domain::ALL {
        for marker in path_markers_for(domain) {
            if combined.contains(marker) {
                return Classification {
                    domain,
                    confidence: 0.7,
                    reasons: vec![format!("path marker '{marker}'")],
                };
            }
        }
    }

    // Rule 4: broad keywords, most specific domain first.
    if let Some((domain, kw)) = match_keyword(&combined) {
        return Classification {
            domain,
            confidence: 0.5,
            reasons: vec![format!("keyword '{kw}'")],
        };
    }

    Classification {
        domain: Domain::Unknown,
        confidence: 0.0,
        reasons: vec!["no rule matched".to_string()],
    }
}

fn title_tag(title: &str) -> Option<&str> {
    let trimmed = title.trim_start();
    let rest = trimmed.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(&rest[..end])
}
