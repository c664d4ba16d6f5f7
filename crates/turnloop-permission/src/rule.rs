//! The canonical permission rule grammar and the session/project/global
//! rule lists (spec §4.3 step 3, §6.5).
//!
//! A canonical pattern has the shape `ToolName(arg:value, …)` where each
//! `value` may contain `*`/`**` globs (spec §6.5). The tool itself is
//! responsible for producing the canonical pattern for a given call (its
//! `permission_rule_abstractor`, spec §6.2); this module only matches
//! already-canonicalized strings against configured rules.

use globset::Glob;
use serde::{Deserialize, Serialize};

/// Where a configured rule came from, in the order they are checked
/// (spec §4.3: "session > project > global; the first matching rule
/// wins").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Granted during this session only (via `allow_always`, or loaded
    /// from a session-scoped config layer).
    Session,
    /// Configured in the project's `.turnloop` config.
    Project,
    /// Configured in the user's global config.
    Global,
}

/// One configured allow/deny rule: a glob-capable canonical pattern
/// string plus the scope it was declared in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    /// The pattern, e.g. `Bash(command:git *)`.
    pub pattern: String,
    /// Where this rule came from.
    pub scope: RuleScope,
}

impl PermissionRule {
    /// Build a rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, scope: RuleScope) -> Self {
        Self {
            pattern: pattern.into(),
            scope,
        }
    }

    /// Check whether this rule's pattern matches a canonicalized call
    /// pattern. `*`/`**` in the rule are treated as globs; everything
    /// else is a literal character match.
    #[must_use]
    pub fn matches(&self, canonical_pattern: &str) -> bool {
        Glob::new(&self.pattern)
            .ok()
            .is_some_and(|glob| glob.compile_matcher().is_match(canonical_pattern))
    }
}

/// The union of allow rules across all three scopes, plus the deny list.
///
/// Matching order is fixed: session, then project, then global (spec
/// §4.3 "Deterministic tie-break").
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Rules that permit a call when matched.
    pub allow: Vec<PermissionRule>,
    /// Rules that forbid a call when matched, checked before `allow`.
    pub deny: Vec<PermissionRule>,
}

/// Outcome of checking a canonical pattern against a [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    /// No deny or allow rule matched.
    NoMatch,
    /// An allow rule matched, in the given scope.
    Allowed(RuleScope),
    /// A deny rule matched, in the given scope.
    Denied(RuleScope),
}

impl RuleSet {
    /// Add an allow rule.
    pub fn allow(&mut self, pattern: impl Into<String>, scope: RuleScope) {
        self.allow.push(PermissionRule::new(pattern, scope));
    }

    /// Add a deny rule.
    pub fn deny(&mut self, pattern: impl Into<String>, scope: RuleScope) {
        self.deny.push(PermissionRule::new(pattern, scope));
    }

    /// Check a canonical pattern against the deny list, then the allow
    /// list, each ordered session > project > global.
    #[must_use]
    pub fn check(&self, canonical_pattern: &str) -> RuleMatch {
        if let Some(scope) = Self::first_match(&self.deny, canonical_pattern) {
            return RuleMatch::Denied(scope);
        }
        if let Some(scope) = Self::first_match(&self.allow, canonical_pattern) {
            return RuleMatch::Allowed(scope);
        }
        RuleMatch::NoMatch
    }

    fn first_match(rules: &[PermissionRule], canonical_pattern: &str) -> Option<RuleScope> {
        for scope in [RuleScope::Session, RuleScope::Project, RuleScope::Global] {
            if rules
                .iter()
                .any(|rule| rule.scope == scope && rule.matches(canonical_pattern))
            {
                return Some(scope);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches() {
        let rule = PermissionRule::new("Bash(command:git status)", RuleScope::Session);
        assert!(rule.matches("Bash(command:git status)"));
        assert!(!rule.matches("Bash(command:git push)"));
    }

    #[test]
    fn glob_pattern_matches() {
        let rule = PermissionRule::new("Bash(command:git *)", RuleScope::Global);
        assert!(rule.matches("Bash(command:git status)"));
        assert!(rule.matches("Bash(command:git push)"));
        assert!(!rule.matches("Bash(command:ls -la)"));
    }

    #[test]
    fn session_beats_project_beats_global() {
        let mut rules = RuleSet::default();
        rules.deny("Edit(path:**/*.env)", RuleScope::Global);
        rules.allow("Edit(path:**/*.env)", RuleScope::Session);

        // session allow is checked before global deny when determining
        // scope precedence for *within-category* matches, but deny is
        // always checked before allow regardless of scope.
        assert_eq!(
            rules.check("Edit(path:config/.env)"),
            RuleMatch::Denied(RuleScope::Global)
        );
    }

    #[test]
    fn first_matching_scope_wins_among_allow_rules() {
        let mut rules = RuleSet::default();
        rules.allow("Bash(command:git *)", RuleScope::Global);
        rules.allow("Bash(command:git *)", RuleScope::Session);

        assert_eq!(
            rules.check("Bash(command:git status)"),
            RuleMatch::Allowed(RuleScope::Session)
        );
    }

    #[test]
    fn no_match_when_nothing_applies() {
        let rules = RuleSet::default();
        assert_eq!(rules.check("Bash(command:ls)"), RuleMatch::NoMatch);
    }
}
