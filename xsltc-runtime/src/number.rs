//! `xsl:number` and `format-number()`.

use xot::Node;
use xsltc_bytecode::dom::ATTRIBUTE_NODE;
use xsltc_bytecode::{Axis, NumberLevel, NumberSpec};

use crate::dom::Dom;
use crate::error::Result;

/// The counting half of a counter helper: does a node match the `count`
/// or the `from` pattern.
pub(crate) trait Counter {
    fn matches_count(&mut self, node: Node) -> Result<bool>;
    fn matches_from(&mut self, node: Node) -> Result<bool>;
}

/// Counting without patterns: nodes of the same kind and name as the
/// numbered node, and no `from` boundary.
pub(crate) struct SameName<'a> {
    dom: &'a Dom,
    kind: i32,
    name: Option<(String, String)>,
}

impl<'a> SameName<'a> {
    pub(crate) fn new(dom: &'a Dom, node: Node) -> Self {
        SameName {
            dom,
            kind: dom.kind(node),
            name: dom
                .name_parts(node)
                .map(|(local, uri)| (local.to_string(), uri.to_string())),
        }
    }

    fn same(&self, node: Node) -> bool {
        self.dom.kind(node) == self.kind
            && self
                .dom
                .name_parts(node)
                .map(|(local, uri)| (local.to_string(), uri.to_string()))
                == self.name
    }
}

impl Counter for SameName<'_> {
    fn matches_count(&mut self, node: Node) -> Result<bool> {
        Ok(self.same(node))
    }

    fn matches_from(&mut self, _node: Node) -> Result<bool> {
        Ok(false)
    }
}

fn sibling_position(dom: &Dom, counter: &mut dyn Counter, node: Node) -> Result<u64> {
    let mut position = 1;
    for sibling in dom.axis(Axis::PrecedingSibling, node) {
        if counter.matches_count(sibling)? {
            position += 1;
        }
    }
    Ok(position)
}

/// The ancestors-or-self of `node` below the nearest `from` ancestor,
/// innermost first.
fn counted_ancestors(dom: &Dom, counter: &mut dyn Counter, node: Node) -> Result<Vec<Node>> {
    let mut ancestors = Vec::new();
    for ancestor in dom.axis(Axis::AncestorOrSelf, node) {
        if ancestor != node && counter.matches_from(ancestor)? {
            break;
        }
        ancestors.push(ancestor);
    }
    Ok(ancestors)
}

/// The numbers `xsl:number` formats for `node`.
pub(crate) fn count(
    dom: &Dom,
    level: NumberLevel,
    node: Node,
    counter: &mut dyn Counter,
) -> Result<Vec<u64>> {
    match level {
        NumberLevel::Single => {
            for ancestor in counted_ancestors(dom, counter, node)? {
                if counter.matches_count(ancestor)? {
                    return Ok(vec![sibling_position(dom, counter, ancestor)?]);
                }
            }
            Ok(Vec::new())
        }
        NumberLevel::Multiple => {
            let mut numbers = Vec::new();
            for ancestor in counted_ancestors(dom, counter, node)? {
                if counter.matches_count(ancestor)? {
                    numbers.push(sibling_position(dom, counter, ancestor)?);
                }
            }
            numbers.reverse();
            Ok(numbers)
        }
        NumberLevel::Any => {
            let mut number = 0;
            let limit = dom.order(node);
            for candidate in dom.nodes() {
                if dom.order(candidate) > limit {
                    break;
                }
                // attributes are not on the preceding or ancestor axes
                if candidate != node && dom.kind(candidate) == ATTRIBUTE_NODE {
                    continue;
                }
                if candidate != node && counter.matches_from(candidate)? {
                    number = 0;
                }
                if counter.matches_count(candidate)? {
                    number += 1;
                }
            }
            Ok(if number == 0 { Vec::new() } else { vec![number] })
        }
    }
}

/// A format string split into its numbering tokens and the separators
/// around them.
#[derive(Debug, PartialEq, Eq)]
struct FormatTokens {
    prefix: String,
    /// Each token with the separator that precedes it; the first token's
    /// separator is unused.
    tokens: Vec<(String, String)>,
    suffix: String,
}

fn parse_format(format: &str) -> FormatTokens {
    let mut prefix = String::new();
    let mut tokens: Vec<(String, String)> = Vec::new();
    let mut separator = String::new();
    let mut token = String::new();
    for c in format.chars() {
        if c.is_alphanumeric() {
            token.push(c);
            continue;
        }
        if !token.is_empty() {
            tokens.push((std::mem::take(&mut separator), std::mem::take(&mut token)));
        }
        if tokens.is_empty() {
            prefix.push(c);
        } else {
            separator.push(c);
        }
    }
    if !token.is_empty() {
        tokens.push((std::mem::take(&mut separator), token));
    }
    if tokens.is_empty() {
        tokens.push((String::new(), "1".to_string()));
    }
    FormatTokens {
        prefix,
        tokens: tokens
            .into_iter()
            .map(|(separator, token)| (token, separator))
            .collect(),
        suffix: separator,
    }
}

/// Format the numbers of an `xsl:number` with its format and grouping.
pub(crate) fn format_numbers(numbers: &[u64], spec: &NumberSpec) -> String {
    let format = parse_format(&spec.format);
    let mut result = String::new();
    if numbers.is_empty() {
        return result;
    }
    result.push_str(&format.prefix);
    for (index, number) in numbers.iter().enumerate() {
        let (token, separator) = format
            .tokens
            .get(index)
            .or_else(|| format.tokens.last())
            .map(|(token, separator)| (token.as_str(), separator.as_str()))
            .unwrap_or(("1", "."));
        if index > 0 {
            let separator = if index < format.tokens.len() {
                separator
            } else if format.tokens.len() > 1 {
                format.tokens[format.tokens.len() - 1].1.as_str()
            } else {
                "."
            };
            result.push_str(separator);
        }
        result.push_str(&format_token(*number, token, spec));
    }
    result.push_str(&format.suffix);
    result
}

fn format_token(number: u64, token: &str, spec: &NumberSpec) -> String {
    match token {
        "a" | "A" if number > 0 => return alphabetic(number, token == "A"),
        "i" | "I" if number > 0 => {
            let roman = roman(number);
            return if token == "i" { roman.to_lowercase() } else { roman };
        }
        _ => {}
    }
    let width = if token.chars().all(|c| c.is_ascii_digit()) && token.ends_with('1') {
        token.len()
    } else {
        1
    };
    let digits = format!("{:0width$}", number, width = width);
    match (&spec.grouping_separator, spec.grouping_size) {
        (Some(separator), Some(size)) if size > 0 => group(&digits, separator, size as usize),
        _ => digits,
    }
}

fn group(digits: &str, separator: &str, size: usize) -> String {
    let chars = digits.chars().collect::<Vec<_>>();
    let mut result = String::new();
    for (index, c) in chars.iter().enumerate() {
        if index > 0 && (chars.len() - index) % size == 0 {
            result.push_str(separator);
        }
        result.push(*c);
    }
    result
}

fn alphabetic(mut number: u64, upper: bool) -> String {
    let base = if upper { b'A' } else { b'a' };
    let mut letters = Vec::new();
    while number > 0 {
        number -= 1;
        letters.push((base + (number % 26) as u8) as char);
        number /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(number: u64) -> String {
    const NUMERALS: [(u64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    if number > 3999 {
        return number.to_string();
    }
    let mut rest = number;
    let mut result = String::new();
    for (value, numeral) in NUMERALS {
        while rest >= value {
            result.push_str(numeral);
            rest -= value;
        }
    }
    result
}

/// The number an `xsl:number value=".."` formats: rounded, and never
/// below zero.
pub(crate) fn value_number(value: f64) -> Option<u64> {
    if value.is_nan() || value.is_infinite() || value < 0.5 {
        return None;
    }
    Some((value + 0.5).floor() as u64)
}

#[derive(Debug, Default)]
struct Picture {
    prefix: String,
    suffix: String,
    min_integer: usize,
    min_fraction: usize,
    max_fraction: usize,
    grouping: Option<usize>,
    percent: bool,
    per_mille: bool,
}

fn parse_picture(pattern: &str) -> Picture {
    let mut picture = Picture::default();
    let mut in_number = false;
    let mut seen_number = false;
    let mut in_fraction = false;
    let mut group_size: Option<usize> = None;
    for c in pattern.chars() {
        let is_number_char = matches!(c, '#' | '0' | ',' | '.');
        if is_number_char && (!seen_number || in_number) {
            in_number = true;
            seen_number = true;
            match c {
                '.' => {
                    in_fraction = true;
                    picture.grouping = group_size.filter(|size| *size > 0);
                }
                ',' if !in_fraction => group_size = Some(0),
                '0' if in_fraction => {
                    picture.min_fraction += 1;
                    picture.max_fraction += 1;
                }
                '#' if in_fraction => picture.max_fraction += 1,
                '0' | '#' => {
                    if c == '0' {
                        picture.min_integer += 1;
                    }
                    if let Some(size) = &mut group_size {
                        *size += 1;
                    }
                }
                _ => {}
            }
            continue;
        }
        if in_number {
            in_number = false;
        }
        match c {
            '%' => picture.percent = true,
            '\u{2030}' => picture.per_mille = true,
            _ => {}
        }
        if seen_number {
            picture.suffix.push(c);
        } else {
            picture.prefix.push(c);
        }
    }
    if !in_fraction {
        picture.grouping = group_size.filter(|size| *size > 0);
    }
    picture
}

/// `format-number()` with the default decimal format.
pub fn format_decimal(value: f64, pattern: &str) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    let (positive, negative) = match pattern.split_once(';') {
        Some((positive, negative)) => (positive, Some(negative)),
        None => (pattern, None),
    };
    let picture = parse_picture(positive);
    let negative_value = value < 0.0;
    let (prefix, suffix) = match (negative_value, negative) {
        (true, Some(negative)) => {
            let negative = parse_picture(negative);
            (negative.prefix, negative.suffix)
        }
        (true, None) => (format!("-{}", picture.prefix), picture.suffix.clone()),
        (false, _) => (picture.prefix.clone(), picture.suffix.clone()),
    };
    if value.is_infinite() {
        return format!("{}Infinity{}", prefix, suffix);
    }
    let mut magnitude = value.abs();
    if picture.percent {
        magnitude *= 100.0;
    } else if picture.per_mille {
        magnitude *= 1000.0;
    }
    let text = format!("{:.*}", picture.max_fraction, magnitude);
    let (integer, fraction) = match text.split_once('.') {
        Some((integer, fraction)) => (integer.to_string(), fraction.to_string()),
        None => (text, String::new()),
    };
    let mut fraction = fraction;
    while fraction.len() > picture.min_fraction && fraction.ends_with('0') {
        fraction.pop();
    }
    let mut integer = integer.trim_start_matches('0').to_string();
    while integer.len() < picture.min_integer {
        integer.insert(0, '0');
    }
    if integer.is_empty() && fraction.is_empty() {
        integer.push('0');
    }
    if let Some(size) = picture.grouping {
        integer = group(&integer, ",", size);
    }
    let mut result = prefix;
    result.push_str(&integer);
    if !fraction.is_empty() {
        result.push('.');
        result.push_str(&fraction);
    }
    result.push_str(&suffix);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(format: &str) -> NumberSpec {
        NumberSpec {
            level: NumberLevel::Single,
            has_count: false,
            has_from: false,
            format: format.to_string(),
            grouping_separator: None,
            grouping_size: None,
        }
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_numbers(&[3], &spec("1")), "3");
        assert_eq!(format_numbers(&[3], &spec("01")), "03");
        assert_eq!(format_numbers(&[28], &spec("a")), "ab");
        assert_eq!(format_numbers(&[14], &spec("I")), "XIV");
        assert_eq!(format_numbers(&[4], &spec("i")), "iv");
        assert_eq!(format_numbers(&[1, 2, 3], &spec("1.a")), "1.b.c");
        assert_eq!(format_numbers(&[2, 5], &spec("(1) ")), "(2.5) ");
        assert_eq!(format_numbers(&[2, 5], &spec("[1-1]")), "[2-5]");
        assert_eq!(format_numbers(&[], &spec("1")), "");
    }

    #[test]
    fn test_grouping() {
        let mut grouped = spec("1");
        grouped.grouping_separator = Some(",".to_string());
        grouped.grouping_size = Some(3);
        assert_eq!(format_numbers(&[1234567], &grouped), "1,234,567");
    }

    #[test]
    fn test_value_number_rounds() {
        assert_eq!(value_number(2.5), Some(3));
        assert_eq!(value_number(0.2), None);
        assert_eq!(value_number(f64::NAN), None);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(format_decimal(0.5, "#.##"), ".5");
        assert_eq!(format_decimal(0.25, "0%"), "25%");
        assert_eq!(format_decimal(-3.0, "0"), "-3");
        assert_eq!(format_decimal(-3.0, "0;(0)"), "(3)");
        assert_eq!(format_decimal(7.0, "$000"), "$007");
        assert_eq!(format_decimal(f64::NAN, "0"), "NaN");
    }

    #[test]
    fn test_count_levels() {
        let dom = Dom::parse("<r><s><p/><p/></s><s><p/></s></r>").unwrap();
        let r = dom.axis(Axis::Child, dom.root())[0];
        let sections = dom.axis(Axis::Child, r);
        let last = dom.axis(Axis::Child, sections[1])[0];
        let mut counter = SameName::new(&dom, last);
        assert_eq!(count(&dom, NumberLevel::Single, last, &mut counter).unwrap(), vec![1]);
        assert_eq!(count(&dom, NumberLevel::Any, last, &mut counter).unwrap(), vec![3]);
        assert_eq!(count(&dom, NumberLevel::Multiple, last, &mut counter).unwrap(), vec![1]);
    }
}
