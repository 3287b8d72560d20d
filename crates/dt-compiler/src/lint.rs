//! Static checks over a built ruleset.
//!
//! Removes exact duplicate actions inside a rule and reports constructs that
//! can never take effect. Nothing here changes what a ruleset does.

use std::collections::{BTreeSet, HashSet};

use dt_core::{Rule, RuleSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub matches: usize,
    pub rules: usize,
    pub actions_before: usize,
    pub actions_after: usize,
    pub deduped: usize,
    pub warnings: Vec<String>,
}

pub fn lint_ruleset(ruleset: &mut RuleSet) -> LintReport {
    let actions_before = ruleset.rules.iter().map(|r| r.actions.len()).sum();
    let mut deduped = 0usize;
    for rule in &mut ruleset.rules {
        let mut seen: HashSet<String> = HashSet::new();
        rule.actions.retain(|action| {
            if seen.insert(action.to_string()) {
                true
            } else {
                deduped += 1;
                false
            }
        });
    }
    let actions_after = ruleset.rules.iter().map(|r| r.actions.len()).sum();

    let mut warnings = Vec::new();
    if ruleset.theme.is_none() && ruleset.rules.iter().all(|r| r.theme.is_none()) {
        warnings.push("no <theme> is defined; a default theme must come from the configuration".to_string());
    }

    let produced: BTreeSet<&str> = ruleset
        .matches
        .iter()
        .flat_map(|m| m.classes.iter().map(String::as_str))
        .collect();
    let any_hooks = ruleset.matches.iter().any(|m| m.hook.is_some());
    let consumed: BTreeSet<&str> = ruleset.rules_by_class.keys().map(String::as_str).collect();

    for rule in &ruleset.rules {
        if rule.actions.is_empty() {
            warnings.push(format!("{} has no actions{}", rule, at(rule)));
        }
    }
    if !any_hooks {
        for class in consumed.difference(&produced) {
            if *class != Rule::DEFAULT_CLASS {
                warnings.push(format!(
                    "rules for class {class:?} only run when a page-class header or environ supplies it; no <match> yields it"
                ));
            }
        }
    }
    for class in produced.difference(&consumed) {
        warnings.push(format!("<match> yields class {class:?} but no <rule> uses it"));
    }

    LintReport {
        matches: ruleset.matches.len(),
        rules: ruleset.rules.len(),
        actions_before,
        actions_after,
        deduped,
        warnings,
    }
}

fn at(rule: &Rule) -> String {
    rule.location
        .as_ref()
        .map(|l| format!(" (at {l})"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_ruleset;

    #[test]
    fn test_duplicate_actions_removed() {
        let mut rs = compile_ruleset(
            r##"<ruleset><theme href="/t.html"/><rule>
                <replace content="#a" theme="#b"/>
                <replace content="#a" theme="#b"/>
                <replace content="#a" theme="#b" move="0"/>
            </rule></ruleset>"##,
            "lint.xml",
        )
        .unwrap();
        let report = lint_ruleset(&mut rs);
        assert_eq!(report.actions_before, 3);
        assert_eq!(report.actions_after, 2);
        assert_eq!(report.deduped, 1);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_class_mismatch_warnings() {
        let mut rs = compile_ruleset(
            r##"<ruleset>
                <match path="/a" class="alpha"/>
                <rule class="beta"><drop theme="#x"/></rule>
                <rule class="gamma"/>
            </ruleset>"##,
            "lint.xml",
        )
        .unwrap();
        let report = lint_ruleset(&mut rs);
        assert_eq!(report.matches, 1);
        assert_eq!(report.rules, 2);
        let joined = report.warnings.join("\n");
        assert!(joined.contains("no <theme>"));
        assert!(joined.contains("\"beta\""));
        assert!(joined.contains("\"alpha\""));
        assert!(joined.contains("no actions (at lint.xml:4)"));
    }
}
