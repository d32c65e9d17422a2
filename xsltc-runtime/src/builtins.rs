//! The XPath and XSLT functions generated code calls with `CallBuiltin`.

use xsltc_bytecode::Builtin;
use xsltc_name::XSLT_NAMESPACE;

use crate::dom::Dom;
use crate::error::Result;
use crate::keys::KeyIndex;
use crate::number::format_decimal;
use crate::value::{parse_number, Value};

/// The string values a lookup in `id()` or `key()` uses: one per node of
/// a node-set, otherwise the string value itself.
pub(crate) fn lookup_values(dom: &Dom, value: &Value) -> Vec<String> {
    match value {
        Value::Node(_) | Value::NodeSet(_) => match value.to_node_set() {
            Ok(nodes) => nodes.iter().map(|node| dom.string_value(*node)).collect(),
            Err(_) => Vec::new(),
        },
        value => vec![value.to_string_value(dom)],
    }
}

/// The tokens `id()` looks up.
pub(crate) fn id_tokens(dom: &Dom, value: &Value) -> Vec<String> {
    lookup_values(dom, value)
        .iter()
        .flat_map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect()
}

fn substring(text: &str, start: f64, length: Option<f64>) -> String {
    let first = (start + 0.5).floor();
    let last = match length {
        Some(length) => first + (length + 0.5).floor(),
        None => f64::INFINITY,
    };
    text.chars()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= first && position < last
        })
        .map(|(_, c)| c)
        .collect()
}

fn translate(text: &str, from: &str, to: &str) -> String {
    let from = from.chars().collect::<Vec<_>>();
    let to = to.chars().collect::<Vec<_>>();
    text.chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect()
}

fn round(number: f64) -> f64 {
    if number.is_nan() || number.is_infinite() || number == 0.0 {
        return number;
    }
    // -0.5 rounds to negative zero
    if number < 0.0 && number >= -0.5 {
        return -0.0;
    }
    (number + 0.5).floor()
}

fn system_property(name: &str) -> String {
    let local = match name.strip_prefix(&format!("Q{{{}}}", XSLT_NAMESPACE)) {
        Some(local) => local,
        None => match name.split_once(':') {
            Some((_, local)) => local,
            None => return String::new(),
        },
    };
    match local {
        "version" => "1.0".to_string(),
        "vendor" => "The Xsltc Project".to_string(),
        "vendor-url" => "https://github.com/xsltc/xsltc".to_string(),
        _ => String::new(),
    }
}

fn language_matches(language: Option<&str>, wanted: &str) -> bool {
    let Some(language) = language else {
        return false;
    };
    let language = language.to_ascii_lowercase();
    let wanted = wanted.to_ascii_lowercase();
    language == wanted
        || language
            .strip_prefix(&wanted)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Call `builtin` with its arguments in the order they were pushed.
pub(crate) fn call(dom: &Dom, keys: &KeyIndex, builtin: Builtin, arguments: &[Value]) -> Result<Value> {
    let string = |index: usize| -> String {
        arguments
            .get(index)
            .map(|value| value.to_string_value(dom))
            .unwrap_or_default()
    };
    let number = |index: usize| -> f64 {
        arguments
            .get(index)
            .map(|value| value.to_number(dom))
            .unwrap_or(f64::NAN)
    };
    let node = |index: usize| -> Result<Option<xot::Node>> {
        match arguments.get(index) {
            Some(value) => value.to_node(),
            None => Ok(None),
        }
    };
    let value = match builtin {
        Builtin::Count => {
            let nodes = arguments
                .first()
                .map(|value| value.to_node_set())
                .transpose()?;
            Value::Number(nodes.map_or(0, |nodes| nodes.len()) as f64)
        }
        Builtin::Sum => {
            let nodes = arguments
                .first()
                .map(|value| value.to_node_set())
                .transpose()?
                .unwrap_or_default();
            Value::Number(
                nodes
                    .iter()
                    .map(|node| parse_number(&dom.string_value(*node)))
                    .sum(),
            )
        }
        Builtin::Id => {
            let tokens = arguments
                .first()
                .map(|value| id_tokens(dom, value))
                .unwrap_or_default();
            let mut nodes = tokens
                .iter()
                .filter_map(|token| dom.element_by_id(token))
                .collect::<Vec<_>>();
            dom.sort(&mut nodes);
            Value::node_set(nodes)
        }
        Builtin::Key => {
            let name = string(0);
            let values = arguments
                .get(1)
                .map(|value| lookup_values(dom, value))
                .unwrap_or_default();
            Value::node_set(keys.lookup(dom, &name, values.iter().map(String::as_str)))
        }
        Builtin::LocalName => Value::from(node(0)?.map_or("", |node| dom.local_name(node))),
        Builtin::NamespaceUri => {
            Value::from(node(0)?.map_or("", |node| dom.namespace_uri(node)))
        }
        Builtin::Name => Value::String(
            node(0)?
                .map(|node| dom.qualified_name(node))
                .unwrap_or_default(),
        ),
        Builtin::GenerateId => Value::String(
            node(0)?
                .map(|node| dom.generate_id(node))
                .unwrap_or_default(),
        ),
        Builtin::StartsWith => Value::Boolean(string(0).starts_with(&string(1))),
        Builtin::Contains => Value::Boolean(string(0).contains(&string(1))),
        Builtin::SubstringBefore => {
            let (text, pattern) = (string(0), string(1));
            Value::String(
                text.find(&pattern)
                    .map(|index| text[..index].to_string())
                    .unwrap_or_default(),
            )
        }
        Builtin::SubstringAfter => {
            let (text, pattern) = (string(0), string(1));
            Value::String(
                text.find(&pattern)
                    .map(|index| text[index + pattern.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        Builtin::Substring2 => Value::String(substring(&string(0), number(1), None)),
        Builtin::Substring3 => Value::String(substring(&string(0), number(1), Some(number(2)))),
        Builtin::StringLength => Value::Number(string(0).chars().count() as f64),
        Builtin::NormalizeSpace => {
            Value::String(string(0).split_whitespace().collect::<Vec<_>>().join(" "))
        }
        Builtin::Translate => Value::String(translate(&string(0), &string(1), &string(2))),
        Builtin::Lang => {
            let language = node(1)?.and_then(|node| dom.language(node));
            Value::Boolean(language_matches(language, &string(0)))
        }
        Builtin::Floor => Value::Number(number(0).floor()),
        Builtin::Ceiling => Value::Number(number(0).ceil()),
        Builtin::Round => Value::Number(round(number(0))),
        Builtin::FormatNumber => Value::String(format_decimal(number(0), &string(1))),
        Builtin::SystemProperty => Value::String(system_property(&string(0))),
        Builtin::UnparsedEntityUri => Value::String(String::new()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::Axis;

    use super::*;

    fn call_strings(builtin: Builtin, arguments: &[&str]) -> Value {
        let dom = Dom::parse("<a/>").unwrap();
        let arguments = arguments.iter().map(|s| Value::from(*s)).collect::<Vec<_>>();
        call(&dom, &KeyIndex::new(), builtin, &arguments).unwrap()
    }

    fn as_string(value: Value) -> String {
        match value {
            Value::String(s) => s,
            other => panic!("expected a string, got {:?}", other),
        }
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(as_string(call_strings(Builtin::SubstringBefore, &["1999/04/01", "/"])), "1999");
        assert_eq!(as_string(call_strings(Builtin::SubstringAfter, &["1999/04/01", "/"])), "04/01");
        assert_eq!(as_string(call_strings(Builtin::NormalizeSpace, &["  a \n b  "])), "a b");
        assert_eq!(as_string(call_strings(Builtin::Translate, &["--aaa--", "abc-", "ABC"])), "AAA");
    }

    #[test]
    fn test_substring_rounding() {
        assert_eq!(substring("12345", 1.5, Some(2.6)), "234");
        assert_eq!(substring("12345", 0.0, Some(3.0)), "12");
        assert_eq!(substring("12345", f64::NAN, Some(3.0)), "");
        assert_eq!(substring("12345", -42.0, Some(f64::INFINITY)), "12345");
        assert_eq!(substring("12345", 2.0, None), "2345");
    }

    #[test]
    fn test_round() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert!(round(-0.2).is_sign_negative());
        assert!(round(f64::NAN).is_nan());
    }

    #[test]
    fn test_system_property() {
        assert_eq!(system_property("xsl:version"), "1.0");
        assert_eq!(
            system_property("Q{http://www.w3.org/1999/XSL/Transform}vendor"),
            "The Xsltc Project"
        );
        assert_eq!(system_property("version"), "");
    }

    #[test]
    fn test_node_functions() {
        let dom = Dom::parse(r#"<p:a xmlns:p="urn:p" xml:lang="en-GB" id="x"/>"#).unwrap();
        let a = dom.axis(Axis::Child, dom.root())[0];
        let keys = KeyIndex::new();
        let node = [Value::Node(a)];
        let name = call(&dom, &keys, Builtin::Name, &node).unwrap();
        assert_eq!(as_string(name), "p:a");
        let uri = call(&dom, &keys, Builtin::NamespaceUri, &node).unwrap();
        assert_eq!(as_string(uri), "urn:p");
        let lang = call(&dom, &keys, Builtin::Lang, &[Value::from("en"), Value::Node(a)]).unwrap();
        assert!(lang.to_boolean());
        let id = call(&dom, &keys, Builtin::Id, &[Value::from(" y x ")]).unwrap();
        assert_eq!(id.to_node_set().unwrap().as_slice(), &[a]);
        let count = call(&dom, &keys, Builtin::Count, &[Value::node_set(vec![a, a])]).unwrap();
        assert_eq!(count.to_number(&dom), 2.0);
    }
}
