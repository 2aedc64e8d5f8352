//! Classifier chain: maps raw function names to test-engine roles.
//!
//! Rules are tried in registration order and the first match wins, so the
//! order of the default chain encodes precedence: `test_setup` is a test
//! named `setup`, not a setup fixture.

use crate::model::Role;
use crate::result::{EnsayoError, EnsayoResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Result of classifying one function name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A rule matched
    Matched {
        /// Role assigned by the rule
        role: Role,
        /// First capture group, used as the leaf segment for tests
        captured: Option<String>,
    },
    /// No rule matched; the function is an ordinary helper
    Unmatched,
}

impl Classification {
    /// Role, if matched
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Matched { role, .. } => Some(*role),
            Self::Unmatched => None,
        }
    }
}

/// One compiled classifier rule
#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pattern: Regex,
    case_sensitive: bool,
    role: Role,
}

impl ClassifierRule {
    /// Compile a rule
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::InvalidPattern`] if the pattern does not compile.
    pub fn new(pattern: &str, case_sensitive: bool, role: Role) -> EnsayoResult<Self> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| EnsayoError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            pattern: compiled,
            case_sensitive,
            role,
        })
    }

    /// Try this rule against a function name
    #[must_use]
    pub fn classify(&self, name: &str) -> Classification {
        match self.pattern.captures(name) {
            Some(caps) => Classification::Matched {
                role: self.role,
                captured: caps.get(1).map(|m| m.as_str().to_string()),
            },
            None => Classification::Unmatched,
        }
    }

    /// Pattern source
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether matching is case-sensitive
    #[must_use]
    pub const fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Role this rule yields
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

/// Rule description as found in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression
    pub pattern: String,
    /// Case-sensitive matching
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    /// Role the rule yields
    pub role: Role,
}

const fn default_case_sensitive() -> bool {
    true
}

/// Default rules, in precedence order
pub const DEFAULT_RULES: &[(&str, Role)] = &[
    ("^test_([a-z0-9].*)", Role::Test),
    ("^[tT]est([A-Z].*)", Role::Test),
    ("^[sS]etup$", Role::Before),
    ("^set_up$", Role::Before),
    ("^[iI]nit$", Role::Before),
    ("^[tT]ear[dD]own$", Role::After),
    ("^tear_down$", Role::After),
    ("^[cC]leanup$", Role::After),
];

/// Ordered list of classifier rules
#[derive(Debug, Clone, Default)]
pub struct ClassifierChain {
    rules: Vec<ClassifierRule>,
}

impl ClassifierChain {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with the default naming conventions, matched case-insensitively
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut chain = Self::new();
        for (pattern, role) in DEFAULT_RULES {
            // the built-in patterns are known to compile
            if let Err(e) = chain.add_rule(pattern, false, *role) {
                tracing::warn!(error = %e, "dropping built-in classifier rule");
            }
        }
        chain
    }

    /// Append a rule at the lowest precedence
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::InvalidPattern`]; the chain is left unchanged.
    pub fn add_rule(&mut self, pattern: &str, case_sensitive: bool, role: Role) -> EnsayoResult<()> {
        let rule = ClassifierRule::new(pattern, case_sensitive, role)?;
        self.rules.push(rule);
        Ok(())
    }

    /// Append configured rules, skipping (and logging) malformed ones.
    ///
    /// Returns the number of rules added.
    pub fn extend_lenient(&mut self, rules: &[RuleConfig]) -> usize {
        let mut added = 0;
        for rule in rules {
            match self.add_rule(&rule.pattern, rule.case_sensitive, rule.role) {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!(error = %e, "classifier rule disabled"),
            }
        }
        added
    }

    /// Classify a function name; first matching rule wins
    #[must_use]
    pub fn classify(&self, name: &str) -> Classification {
        self.rules
            .iter()
            .map(|rule| rule.classify(name))
            .find(|c| *c != Classification::Unmatched)
            .unwrap_or(Classification::Unmatched)
    }

    /// Registered rules in precedence order
    #[must_use]
    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the chain has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matched(role: Role, captured: Option<&str>) -> Classification {
        Classification::Matched {
            role,
            captured: captured.map(str::to_string),
        }
    }

    mod default_chain_tests {
        use super::*;

        #[test]
        fn test_default_rule_count() {
            assert_eq!(ClassifierChain::with_defaults().len(), 8);
        }

        #[test]
        fn test_snake_case_test() {
            let chain = ClassifierChain::with_defaults();
            assert_eq!(chain.classify("test_one"), matched(Role::Test, Some("one")));
        }

        #[test]
        fn test_camel_case_test() {
            let chain = ClassifierChain::with_defaults();
            assert_eq!(
                chain.classify("TestParser"),
                matched(Role::Test, Some("Parser"))
            );
        }

        #[test]
        fn test_fixture_names() {
            let chain = ClassifierChain::with_defaults();
            for name in ["setup", "Setup", "set_up", "init", "Init"] {
                assert_eq!(chain.classify(name).role(), Some(Role::Before), "{name}");
            }
            for name in ["teardown", "Teardown", "TearDown", "tear_down", "cleanup", "Cleanup"] {
                assert_eq!(chain.classify(name).role(), Some(Role::After), "{name}");
            }
        }

        #[test]
        fn test_first_match_wins() {
            let chain = ClassifierChain::with_defaults();
            assert_eq!(
                chain.classify("test_setup"),
                matched(Role::Test, Some("setup"))
            );
        }

        #[test]
        fn test_helpers_unmatched() {
            let chain = ClassifierChain::with_defaults();
            for name in ["main", "helper", "setup_db", "test_", "_test_x", "mytest_x"] {
                assert_eq!(chain.classify(name), Classification::Unmatched, "{name}");
            }
        }

        #[test]
        fn test_defaults_ignore_case() {
            let chain = ClassifierChain::with_defaults();
            assert!(chain.rules().iter().all(|r| !r.case_sensitive()));
            assert_eq!(chain.classify("SETUP").role(), Some(Role::Before));
            assert_eq!(chain.classify("CLEANUP").role(), Some(Role::After));
            assert_eq!(chain.classify("test_Foo"), matched(Role::Test, Some("Foo")));
            assert_eq!(chain.classify("TEST_io"), matched(Role::Test, Some("io")));
            assert_eq!(chain.classify("testing"), matched(Role::Test, Some("ing")));
        }
    }

    mod rule_tests {
        use super::*;

        #[test]
        fn test_invalid_pattern_rejected() {
            let mut chain = ClassifierChain::new();
            let err = chain.add_rule("^test_(", true, Role::Test).unwrap_err();
            assert!(matches!(err, EnsayoError::InvalidPattern { .. }));
            assert!(chain.is_empty());
        }

        #[test]
        fn test_case_insensitive_rule() {
            let rule = ClassifierRule::new("^check_(.*)", false, Role::Test).unwrap();
            assert!(!rule.case_sensitive());
            assert_eq!(rule.classify("CHECK_io"), matched(Role::Test, Some("io")));
        }

        #[test]
        fn test_rule_without_group() {
            let rule = ClassifierRule::new("^prepare$", true, Role::Before).unwrap();
            assert_eq!(rule.classify("prepare"), matched(Role::Before, None));
        }

        #[test]
        fn test_extend_lenient_skips_bad_rules() {
            let mut chain = ClassifierChain::with_defaults();
            let added = chain.extend_lenient(&[
                RuleConfig {
                    pattern: "^spec_(.*)".to_string(),
                    case_sensitive: true,
                    role: Role::Test,
                },
                RuleConfig {
                    pattern: "([".to_string(),
                    case_sensitive: true,
                    role: Role::Test,
                },
            ]);
            assert_eq!(added, 1);
            assert_eq!(chain.len(), 9);
            assert_eq!(chain.classify("spec_io"), matched(Role::Test, Some("io")));
        }

        #[test]
        fn test_appended_rules_have_lowest_precedence() {
            let mut chain = ClassifierChain::with_defaults();
            chain.add_rule("^setup$", true, Role::After).unwrap();
            assert_eq!(chain.classify("setup").role(), Some(Role::Before));
        }

        #[test]
        fn test_rule_config_default_case() {
            let rule: RuleConfig =
                serde_json::from_str(r#"{"pattern":"^x$","role":"after"}"#).unwrap();
            assert!(rule.case_sensitive);
            assert_eq!(rule.role, Role::After);
        }
    }

    proptest! {
        /// Any `test_` name with a valid first character is a test whose
        /// captured name is the rest, regardless of later rules.
        #[test]
        fn prop_test_prefix_always_test(rest in "[a-z0-9][a-zA-Z0-9_]{0,20}") {
            let chain = ClassifierChain::with_defaults();
            let name = format!("test_{rest}");
            prop_assert_eq!(chain.classify(&name), matched(Role::Test, Some(&rest)));
        }

        /// Classification equals the role of the first rule that matches.
        #[test]
        fn prop_first_matching_rule(name in "[a-zA-Z_]{1,16}") {
            let chain = ClassifierChain::with_defaults();
            let expected = chain
                .rules()
                .iter()
                .find(|r| r.classify(&name) != Classification::Unmatched)
                .map(ClassifierRule::role);
            prop_assert_eq!(chain.classify(&name).role(), expected);
        }
    }
}
