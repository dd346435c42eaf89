use regex::{Regex, RegexBuilder};
use std::borrow::Cow;

use reclass_core::Rule;

/// Compile check for user-supplied regex patterns, run at rule
/// create/update time and exposed as a standalone pre-check. Returns the
/// compiler's message on failure.
pub fn validate_regex(pattern: &str) -> Result<(), String> {
    Regex::new(pattern).map(|_| ()).map_err(|e| e.to_string())
}

/// A rule pattern in matchable form. Literal patterns are escaped and
/// compiled like regexes, so both modes are case-insensitive and report
/// byte spans that index the caller's string (lowercasing a copy would
/// shift offsets whenever case folding changes byte length).
#[derive(Debug)]
struct Pattern(Regex);

impl Pattern {
    fn compile(pattern: &str, is_regex: bool) -> Result<Pattern, regex::Error> {
        let source = if is_regex {
            Cow::Borrowed(pattern)
        } else {
            Cow::Owned(regex::escape(pattern))
        };
        RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map(Pattern)
    }

    /// Byte span of the first match, for highlighting.
    fn find(&self, description: &str) -> Option<(usize, usize)> {
        self.0.find(description).map(|m| (m.start(), m.end()))
    }
}

/// Whether `rule` matches the description. Empty or missing descriptions
/// never match. Literal mode is case-insensitive substring containment;
/// regex mode is a case-insensitive search anywhere in the description.
pub fn matches(rule: &Rule, description: Option<&str>) -> bool {
    match_span(rule, description).is_some()
}

/// Start/end of the match within the description, or `None` if the rule
/// does not match. A pattern that fails to compile at match time is
/// logged and treated as non-matching, never raised.
pub fn match_span(rule: &Rule, description: Option<&str>) -> Option<(usize, usize)> {
    let description = description.filter(|d| !d.is_empty())?;
    match Pattern::compile(&rule.pattern, rule.is_regex) {
        Ok(pattern) => pattern.find(description),
        Err(e) => {
            tracing::warn!(rule = rule.id, pattern = %rule.pattern, error = %e, "invalid pattern at match time");
            None
        }
    }
}

/// A standalone compiled pattern for the rule-test operation, where no
/// stored rule exists yet.
pub struct PatternProbe {
    pattern: Pattern,
}

impl PatternProbe {
    pub fn new(pattern: &str, is_regex: bool) -> Result<Self, regex::Error> {
        Pattern::compile(pattern, is_regex).map(|pattern| PatternProbe { pattern })
    }

    pub fn find(&self, description: &str) -> Option<(usize, usize)> {
        if description.is_empty() {
            return None;
        }
        self.pattern.find(description)
    }
}

struct CompiledRule {
    rule: Rule,
    /// `None` when the stored pattern no longer compiles; such a rule can
    /// never match but must not poison the rest of the set.
    pattern: Option<Pattern>,
}

/// The active rule set of one realm, precompiled and ordered by
/// `sort_order` ascending. Both preview and apply evaluate through this
/// so their matching semantics cannot drift apart.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

pub struct RuleHit<'a> {
    pub rule: &'a Rule,
    pub span: (usize, usize),
}

impl RuleSet {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.sort_order);
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = match Pattern::compile(&rule.pattern, rule.is_regex) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::warn!(rule = rule.id, pattern = %rule.pattern, error = %e, "skipping rule with invalid pattern");
                        None
                    }
                };
                CompiledRule { rule, pattern }
            })
            .collect();
        RuleSet { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First active rule whose source account matches the line's account
    /// and whose pattern matches the description. Later rules are not
    /// consulted once one hits.
    pub fn first_match(&self, account_id: &str, description: Option<&str>) -> Option<RuleHit<'_>> {
        let description = description.filter(|d| !d.is_empty())?;
        self.rules.iter().find_map(|cr| {
            if !cr.rule.is_active || cr.rule.from_account_id != account_id {
                return None;
            }
            let span = cr.pattern.as_ref()?.find(description)?;
            Some(RuleHit {
                rule: &cr.rule,
                span,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, pattern: &str, is_regex: bool, from: &str, to: &str, sort: i64) -> Rule {
        Rule {
            id,
            realm_id: "9130350000".to_string(),
            pattern: pattern.to_string(),
            is_regex,
            from_account_id: from.to_string(),
            from_account_name: None,
            to_account_id: to.to_string(),
            to_account_name: None,
            is_active: true,
            category: None,
            sort_order: sort,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn literal_match_is_case_insensitive_substring() {
        let r = rule(1, "amazon", false, "60", "62", 0);
        assert!(matches(&r, Some("AMAZON WEB SERVICES INVOICE")));
        assert!(matches(&r, Some("payment to Amazon marketplace")));
        assert!(!matches(&r, Some("STRIPE PAYOUT")));
    }

    #[test]
    fn literal_span_is_first_occurrence() {
        let r = rule(1, "AMAZON", false, "60", "62", 0);
        assert_eq!(match_span(&r, Some("AMAZON WEB SERVICES INVOICE")), Some((0, 6)));
        assert_eq!(match_span(&r, Some("to amazon, via amazon")), Some((3, 9)));
    }

    #[test]
    fn literal_span_indexes_the_original_string() {
        // Multibyte characters whose lowercase form has a different byte
        // length must not shift the reported span.
        let r = rule(1, "amazon", false, "60", "62", 0);
        let desc = "CAFÉ İSTANBUL AMAZON";
        let (start, end) = match_span(&r, Some(desc)).unwrap();
        assert_eq!(&desc[start..end], "AMAZON");
        assert_eq!((start, end), (16, 22));
    }

    #[test]
    fn literal_metacharacters_are_matched_verbatim() {
        let r = rule(1, "a.b", false, "60", "62", 0);
        assert!(matches(&r, Some("A.B CORP")));
        assert!(!matches(&r, Some("AXB CORP")));
    }

    #[test]
    fn empty_or_missing_description_never_matches() {
        let r = rule(1, "AMAZON", false, "60", "62", 0);
        assert!(!matches(&r, None));
        assert!(!matches(&r, Some("")));
        assert_eq!(match_span(&r, None), None);

        let re = rule(2, ".*", true, "60", "62", 0);
        assert!(!matches(&re, Some("")));
    }

    #[test]
    fn regex_searches_anywhere_case_insensitive() {
        let r = rule(1, r"inv-\d+", true, "60", "63", 0);
        assert!(matches(&r, Some("REF INV-4471 JULY")));
        assert_eq!(match_span(&r, Some("REF INV-4471 JULY")), Some((4, 12)));
    }

    #[test]
    fn anchored_regex_rejects_embedded_match() {
        let r = rule(1, r"^INV-\d+$", true, "60", "63", 0);
        assert!(matches(&r, Some("INV-4471")));
        assert!(!matches(&r, Some("REF INV-4471")));
    }

    #[test]
    fn invalid_regex_at_match_time_is_non_match_not_panic() {
        let r = rule(1, "INV-[", true, "60", "63", 0);
        assert!(!matches(&r, Some("INV-4471")));
        assert_eq!(match_span(&r, Some("INV-4471")), None);
    }

    #[test]
    fn validate_regex_reports_compiler_message() {
        assert!(validate_regex(r"^INV-\d+$").is_ok());
        let err = validate_regex("INV-[").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn first_match_wins_in_sort_order() {
        let set = RuleSet::new(vec![
            rule(2, "AMAZON", false, "60", "63", 5),
            rule(1, "AMAZON WEB", false, "60", "62", 1),
        ]);
        let hit = set
            .first_match("60", Some("AMAZON WEB SERVICES INVOICE"))
            .unwrap();
        assert_eq!(hit.rule.id, 1);
        assert_eq!(hit.rule.to_account_id, "62");
    }

    #[test]
    fn first_match_requires_matching_source_account() {
        let set = RuleSet::new(vec![rule(1, "AMAZON", false, "60", "62", 0)]);
        assert!(set.first_match("70", Some("AMAZON")).is_none());
        assert!(set.first_match("60", Some("AMAZON")).is_some());
    }

    #[test]
    fn inactive_rules_never_hit() {
        let mut inactive = rule(1, "AMAZON", false, "60", "62", 0);
        inactive.is_active = false;
        let set = RuleSet::new(vec![inactive]);
        assert!(set.first_match("60", Some("AMAZON")).is_none());
    }

    #[test]
    fn uncompilable_rule_is_skipped_without_blocking_later_rules() {
        let set = RuleSet::new(vec![
            rule(1, "INV-[", true, "60", "62", 0),
            rule(2, "INV-", false, "60", "63", 1),
        ]);
        let hit = set.first_match("60", Some("INV-4471")).unwrap();
        assert_eq!(hit.rule.id, 2);
    }

    #[test]
    fn probe_matches_like_a_rule_would() {
        let probe = PatternProbe::new("amazon", false).unwrap();
        assert_eq!(probe.find("AMAZON WEB SERVICES INVOICE"), Some((0, 6)));
        assert_eq!(probe.find(""), None);

        assert!(PatternProbe::new("INV-[", true).is_err());
    }
}
