// default priorities as in https://www.w3.org/TR/xslt#conflict
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use xsltc_xpath::ast::NodeTest;
use xsltc_xpath::pattern::{LocationPathPattern, Pattern, PatternRoot, Separator};

/// Default priority of a pattern that is not a union.
pub(crate) fn default_priority<E>(pattern: &Pattern<E>) -> Decimal {
    match pattern {
        Pattern::LocationPath(path) => default_priority_path(path),
        Pattern::IdKey(_) => dec!(0.5),
        // only reached for a union that was not split
        Pattern::Alternative(left, right) => {
            default_priority(left.as_ref()).max(default_priority(right.as_ref()))
        }
    }
}

fn default_priority_path<E>(path: &LocationPathPattern<E>) -> Decimal {
    let default = dec!(0.5);
    if path.is_root() {
        return dec!(-0.5);
    }
    if path.root != PatternRoot::Relative || path.steps.len() != 1 {
        return default;
    }
    let step = &path.steps[0];
    if !step.predicates.is_empty() || step.separator != Separator::Parent {
        return default;
    }
    match &step.node_test {
        NodeTest::Name(_) | NodeTest::ProcessingInstruction(Some(_)) => dec!(0),
        NodeTest::NamespaceWildcard(_) => dec!(-0.25),
        NodeTest::Wildcard
        | NodeTest::Node
        | NodeTest::Text
        | NodeTest::Comment
        | NodeTest::ProcessingInstruction(None) => dec!(-0.5),
    }
}

/// Split a match pattern into its alternatives, each with the priority it
/// is grouped under.
pub(crate) fn alternative_priorities<E>(
    pattern: &Pattern<E>,
    explicit: Option<Decimal>,
) -> Vec<(&Pattern<E>, Decimal)> {
    pattern
        .alternatives()
        .into_iter()
        .map(|alternative| {
            let priority = explicit.unwrap_or_else(|| default_priority(alternative));
            (alternative, priority)
        })
        .collect()
}
