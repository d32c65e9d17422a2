use xsltc_xpath::ast::NodeTest;
use xsltc_xpath::pattern::{Pattern, PatternRoot};

use super::PatternEntry;
use crate::typecheck::TExpr;

/// Whether a pattern matches every node of its group, so that only its
/// kernel needs testing.
pub(crate) fn is_unconditional(pattern: &Pattern<TExpr>) -> bool {
    let Pattern::LocationPath(path) = pattern else {
        return false;
    };
    if path.is_root() {
        return true;
    }
    match path.steps.as_slice() {
        [step] => {
            path.root == PatternRoot::Relative
                && step.predicates.is_empty()
                && !matches!(step.node_test, NodeTest::ProcessingInstruction(Some(_)))
        }
        _ => false,
    }
}

/// The patterns a node of one type is tested against, strongest first.
/// Nothing after an unconditional pattern can ever be selected.
#[derive(Debug, Clone)]
pub(crate) struct TestSeq<'s> {
    pub(crate) entries: Vec<PatternEntry<'s>>,
    /// Set when the last entry is unconditional, so the built-in rule is
    /// never reached.
    pub(crate) complete: bool,
}

impl<'s> TestSeq<'s> {
    /// Drop the entries shadowed by an unconditional one.
    pub(crate) fn reduce(completed: Vec<PatternEntry<'s>>) -> Self {
        let mut entries = Vec::with_capacity(completed.len());
        let mut complete = false;
        for entry in completed {
            let unconditional = is_unconditional(entry.pattern);
            entries.push(entry);
            if unconditional {
                complete = true;
                break;
            }
        }
        TestSeq { entries, complete }
    }

    /// Templates this sequence can select, in order.
    pub(crate) fn templates(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|entry| entry.template)
    }

    /// Identity of the sequence, for sharing its code between types.
    pub(crate) fn key(&self) -> Vec<(usize, usize)> {
        self.entries.iter().map(PatternEntry::identity).collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use xsltc_name::Namespaces;
    use xsltc_xpath::parse_pattern;

    use super::*;

    fn pattern(text: &str) -> Pattern<TExpr> {
        parse_pattern(text, &Namespaces::default())
            .unwrap()
            .try_map(&mut |_| -> Result<TExpr, ()> { Ok(TExpr::boolean(true)) })
            .unwrap()
    }

    fn entry(pattern: &Pattern<TExpr>, template: usize, priority: Decimal) -> PatternEntry {
        PatternEntry {
            template,
            alternative: 0,
            pattern,
            priority,
            precedence: 1,
            position: template,
        }
    }

    #[test]
    fn test_unconditional_patterns() {
        assert!(is_unconditional(&pattern("a")));
        assert!(is_unconditional(&pattern("*")));
        assert!(is_unconditional(&pattern("/")));
        assert!(is_unconditional(&pattern("processing-instruction()")));
        assert!(!is_unconditional(&pattern("processing-instruction('x')")));
        assert!(!is_unconditional(&pattern("a[1]")));
        assert!(!is_unconditional(&pattern("b/a")));
        assert!(!is_unconditional(&pattern("/a")));
        assert!(!is_unconditional(&pattern("id('x')")));
    }

    #[test]
    fn test_entries_after_unconditional_are_dropped() {
        let conditional = pattern("b/a");
        let plain = pattern("a");
        let wildcard = pattern("*");
        let seq = TestSeq::reduce(vec![
            entry(&conditional, 3, dec!(0.5)),
            entry(&plain, 2, dec!(0)),
            entry(&plain, 1, dec!(0)),
            entry(&wildcard, 0, dec!(-0.5)),
        ]);
        assert_eq!(seq.templates().collect::<Vec<_>>(), vec![3, 2]);
        assert!(seq.complete);
    }

    #[test]
    fn test_conditional_only_sequence_is_incomplete() {
        let conditional = pattern("a[@x]");
        let seq = TestSeq::reduce(vec![entry(&conditional, 0, dec!(0.5))]);
        assert!(!seq.complete);
        assert_eq!(seq.key(), vec![(0, 0)]);
    }
}
