use std::cmp::Ordering;

use xot::Node;
use xsltc_bytecode::SortLevel;

/// One extracted sort key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SortKey {
    Text(String),
    Number(f64),
}

/// Text order: case-insensitive first, then case decides, lower case
/// first unless `upper_first`.
fn compare_text(a: &str, b: &str, upper_first: bool) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    for (x, y) in a.chars().zip(b.chars()) {
        if x == y {
            continue;
        }
        let ordering = match (x.is_uppercase(), y.is_uppercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => x.cmp(&y),
        };
        return if upper_first {
            ordering
        } else {
            ordering.reverse()
        };
    }
    a.len().cmp(&b.len())
}

/// NaN sorts before every number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn compare_keys(a: &SortKey, b: &SortKey, level: &SortLevel) -> Ordering {
    let ordering = match (a, b) {
        (SortKey::Number(a), SortKey::Number(b)) => compare_numbers(*a, *b),
        (SortKey::Text(a), SortKey::Text(b)) => {
            compare_text(a, b, level.upper_first.unwrap_or(false))
        }
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    };
    if level.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Stable sort of `nodes` by `keys`, one row of keys per node and one
/// key per level.
pub(crate) fn sort_nodes(nodes: &[Node], keys: &[Vec<SortKey>], levels: &[SortLevel]) -> Vec<Node> {
    let mut order = (0..nodes.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        for (index, level) in levels.iter().enumerate() {
            let (Some(x), Some(y)) = (keys[a].get(index), keys[b].get(index)) else {
                continue;
            };
            let ordering = compare_keys(x, y, level);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    order.into_iter().map(|index| nodes[index]).collect()
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::SortDataType;

    use super::*;

    fn level(data_type: SortDataType, descending: bool) -> SortLevel {
        SortLevel {
            data_type,
            descending,
            upper_first: None,
            lang: None,
        }
    }

    #[test]
    fn test_text_case_order() {
        assert_eq!(compare_text("a", "B", false), Ordering::Less);
        assert_eq!(compare_text("a", "A", false), Ordering::Less);
        assert_eq!(compare_text("a", "A", true), Ordering::Greater);
    }

    #[test]
    fn test_nan_sorts_first_ascending() {
        let level = level(SortDataType::Number, false);
        let nan = SortKey::Number(f64::NAN);
        let one = SortKey::Number(1.0);
        assert_eq!(compare_keys(&nan, &one, &level), Ordering::Less);
        let descending = SortLevel {
            descending: true,
            ..level
        };
        assert_eq!(compare_keys(&nan, &one, &descending), Ordering::Greater);
    }

    #[test]
    fn test_sort_is_stable_across_levels() {
        let dom = crate::dom::Dom::parse("<a><b/><c/><d/></a>").unwrap();
        let a = dom.axis(xsltc_bytecode::Axis::Child, dom.root())[0];
        let nodes = dom.axis(xsltc_bytecode::Axis::Child, a);
        let keys = vec![
            vec![SortKey::Number(2.0), SortKey::Text("x".into())],
            vec![SortKey::Number(1.0), SortKey::Text("y".into())],
            vec![SortKey::Number(2.0), SortKey::Text("x".into())],
        ];
        let levels = [
            level(SortDataType::Number, false),
            level(SortDataType::Text, false),
        ];
        let sorted = sort_nodes(&nodes, &keys, &levels);
        assert_eq!(sorted, vec![nodes[1], nodes[0], nodes[2]]);
    }
}
