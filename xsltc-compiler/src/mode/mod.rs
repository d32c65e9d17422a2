//! Template rules of one mode, grouped by the kind of node their patterns
//! can match.
//!
//! Every alternative of every match pattern becomes a [`PatternEntry`].
//! Entries are routed by the node test of their last step (the kernel)
//! into groups; a group is then completed with the generic entries that
//! can also match its nodes, so that each group lists, strongest first,
//! every pattern that can match a node of that type.

mod dispatch;
mod test_seq;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use xsltc_bytecode::dom::{
    ATTRIBUTE_NODE, COMMENT_NODE, ELEMENT_NODE, NTYPES, PROCESSING_INSTRUCTION_NODE, TEXT_NODE,
};
use xsltc_bytecode::NameKind;
use xsltc_name::QName;
use xsltc_xpath::ast::NodeTest;
use xsltc_xpath::pattern::{Pattern, PatternAxis, PatternRoot};

use crate::context::CompilationContext;
use crate::error::ErrorCode;
use crate::loader::Stylesheet;
use crate::priority::alternative_priorities;
use crate::syntax::Template;
use crate::typecheck::TExpr;

pub(crate) use dispatch::dispatch_method;
pub(crate) use test_seq::TestSeq;

/// One alternative of a template's match pattern.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatternEntry<'s> {
    pub(crate) template: usize,
    /// Index of the alternative within the template's pattern.
    pub(crate) alternative: usize,
    pub(crate) pattern: &'s Pattern<TExpr>,
    pub(crate) priority: Decimal,
    pub(crate) precedence: u32,
    pub(crate) position: usize,
}

impl PatternEntry<'_> {
    /// Import precedence first, then priority, then declaration order:
    /// the later of two otherwise equal rules wins.
    pub(crate) fn strength_cmp(&self, other: &PatternEntry) -> Ordering {
        self.precedence
            .cmp(&other.precedence)
            .then(self.priority.cmp(&other.priority))
            .then(self.position.cmp(&other.position))
    }

    pub(crate) fn stronger_than(&self, other: &PatternEntry) -> bool {
        self.strength_cmp(other) == Ordering::Greater
    }

    pub(crate) fn identity(&self) -> (usize, usize) {
        (self.template, self.alternative)
    }
}

/// Order entries strongest first by exchanging around a pivot.
pub(crate) fn sort_by_strength(entries: &mut [PatternEntry]) {
    if entries.len() < 2 {
        return;
    }
    let pivot = partition(entries);
    let (stronger, rest) = entries.split_at_mut(pivot);
    sort_by_strength(stronger);
    sort_by_strength(&mut rest[1..]);
}

fn partition(entries: &mut [PatternEntry]) -> usize {
    let last = entries.len() - 1;
    let mut store = 0;
    for i in 0..last {
        if entries[i].stronger_than(&entries[last]) {
            entries.swap(i, store);
            store += 1;
        }
    }
    entries.swap(store, last);
    store
}

/// What the last step of a pattern tests, the key its entry is grouped
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    IdKey,
    /// `/`
    Root,
    /// `node()` on the child axis.
    ChildNode,
    /// `@*` or `@node()`.
    AttributeNode,
    /// A fixed node kind or a registered name.
    Type(i32),
    /// A test no node on the axis passes, such as `@text()`.
    Never,
    /// A union that was not split into its alternatives.
    Unclassified,
}

pub(crate) fn kernel(pattern: &Pattern<TExpr>, context: &mut CompilationContext) -> Kernel {
    let path = match pattern {
        Pattern::IdKey(_) => return Kernel::IdKey,
        Pattern::LocationPath(path) => path,
        Pattern::Alternative(..) => return Kernel::Unclassified,
    };
    let Some(step) = path.kernel() else {
        return match path.root {
            PatternRoot::IdKey(_) => Kernel::IdKey,
            _ => Kernel::Root,
        };
    };
    match step.axis {
        PatternAxis::Attribute => match &step.node_test {
            NodeTest::Name(name) => Kernel::Type(context.register_attribute(name)),
            NodeTest::NamespaceWildcard(uri) => {
                Kernel::Type(context.register_namespace_wildcard(uri, true))
            }
            NodeTest::Wildcard | NodeTest::Node => Kernel::AttributeNode,
            NodeTest::Text | NodeTest::Comment | NodeTest::ProcessingInstruction(_) => {
                Kernel::Never
            }
        },
        PatternAxis::Child => match &step.node_test {
            NodeTest::Name(name) => Kernel::Type(context.register_element(name)),
            NodeTest::NamespaceWildcard(uri) => {
                Kernel::Type(context.register_namespace_wildcard(uri, false))
            }
            NodeTest::Wildcard => Kernel::Type(ELEMENT_NODE),
            NodeTest::Node => Kernel::ChildNode,
            NodeTest::Text => Kernel::Type(TEXT_NODE),
            NodeTest::Comment => Kernel::Type(COMMENT_NODE),
            NodeTest::ProcessingInstruction(_) => Kernel::Type(PROCESSING_INSTRUCTION_NODE),
        },
    }
}

/// Type id of the `ns:*` (or `@ns:*`) test covering names of `kind` in
/// namespace `uri`.
fn namespace_wildcard(context: &CompilationContext, kind: NameKind, uri: &str) -> Option<i32> {
    let wildcard = match kind {
        NameKind::Element | NameKind::NamespaceWildcard => NameKind::NamespaceWildcard,
        NameKind::Attribute | NameKind::AttributeNamespaceWildcard => {
            NameKind::AttributeNamespaceWildcard
        }
    };
    context
        .name_entries()
        .iter()
        .position(|entry| entry.kind == wildcard && entry.namespace.as_deref() == Some(uri))
        .map(|index| NTYPES + index as i32)
}

/// The entries of a mode routed by kernel.
#[derive(Debug, Default)]
pub(crate) struct Groups<'s> {
    pub(crate) id_key: Vec<PatternEntry<'s>>,
    pub(crate) root: Option<PatternEntry<'s>>,
    pub(crate) child_node: Vec<PatternEntry<'s>>,
    pub(crate) attribute_node: Vec<PatternEntry<'s>>,
    pub(crate) types: BTreeMap<i32, Vec<PatternEntry<'s>>>,
}

impl<'s> Groups<'s> {
    fn group(&self, type_id: i32) -> &[PatternEntry<'s>] {
        self.types.get(&type_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every entry that can match a node whose type is `type_id`,
    /// strongest first.
    pub(crate) fn completed(
        &self,
        type_id: i32,
        context: &CompilationContext,
    ) -> Vec<PatternEntry<'s>> {
        let mut entries = self.group(type_id).to_vec();
        match type_id {
            ELEMENT_NODE | TEXT_NODE | COMMENT_NODE | PROCESSING_INSTRUCTION_NODE => {
                entries.extend_from_slice(&self.child_node);
            }
            ATTRIBUTE_NODE => entries.extend_from_slice(&self.attribute_node),
            _ => {
                if let Some(entry) = context.name_entry(type_id) {
                    let wildcard = entry
                        .namespace
                        .as_deref()
                        .and_then(|uri| namespace_wildcard(context, entry.kind, uri));
                    match entry.kind {
                        NameKind::Element | NameKind::NamespaceWildcard => {
                            entries.extend_from_slice(self.group(ELEMENT_NODE));
                            entries.extend_from_slice(&self.child_node);
                        }
                        NameKind::Attribute | NameKind::AttributeNamespaceWildcard => {
                            entries.extend_from_slice(&self.attribute_node);
                        }
                    }
                    if let Some(wildcard) = wildcard.filter(|wildcard| *wildcard != type_id) {
                        entries.extend_from_slice(self.group(wildcard));
                    }
                }
            }
        }
        sort_by_strength(&mut entries);
        entries
    }

    /// Namespace wildcard groups of elements or attributes, by namespace
    /// id.
    pub(crate) fn namespace_wildcards(
        &self,
        attribute: bool,
        context: &CompilationContext,
    ) -> Vec<(i32, i32)> {
        let kind = if attribute {
            NameKind::AttributeNamespaceWildcard
        } else {
            NameKind::NamespaceWildcard
        };
        self.types
            .keys()
            .filter_map(|type_id| {
                let entry = context.name_entry(*type_id)?;
                if entry.kind != kind {
                    return None;
                }
                let namespace = context.namespace_id(entry.namespace.as_deref()?)?;
                Some((namespace, *type_id))
            })
            .collect()
    }
}

/// The template rules of one mode, or of the part of it an
/// `apply-imports` selects from.
#[derive(Debug)]
pub(crate) struct Mode<'s> {
    pub(crate) name: Option<QName>,
    entries: Vec<PatternEntry<'s>>,
}

impl<'s> Mode<'s> {
    pub(crate) fn new(name: Option<QName>) -> Self {
        Mode {
            name,
            entries: Vec::new(),
        }
    }

    /// Collect the rules of mode `name`, restricted to import precedences
    /// in `window` when given.
    pub(crate) fn collect(
        stylesheet: &'s Stylesheet<TExpr>,
        name: Option<&QName>,
        window: Option<(u32, u32)>,
    ) -> Self {
        let mut mode = Mode::new(name.cloned());
        for (index, template) in stylesheet.templates.iter().enumerate() {
            if template.mode.as_ref() != name {
                continue;
            }
            if let Some((min, max)) = window {
                if template.precedence < min || template.precedence >= max {
                    continue;
                }
            }
            mode.add_template(index, template);
        }
        mode
    }

    pub(crate) fn add_template(&mut self, index: usize, template: &'s Template<TExpr>) {
        let Some(pattern) = &template.pattern else {
            return;
        };
        for (alternative, (pattern, priority)) in
            alternative_priorities(pattern, template.priority).into_iter().enumerate()
        {
            self.entries.push(PatternEntry {
                template: index,
                alternative,
                pattern,
                priority,
                precedence: template.precedence,
                position: template.position,
            });
        }
    }

    /// Sort the entries and route them into groups.
    pub(crate) fn process_patterns(&self, context: &mut CompilationContext) -> Groups<'s> {
        let mut entries = self.entries.clone();
        sort_by_strength(&mut entries);
        let mut groups = Groups::default();
        for entry in entries {
            let kernel = kernel(entry.pattern, context);
            log::trace!(
                "template {} alternative {} goes to {:?}",
                entry.template,
                entry.alternative,
                kernel
            );
            match kernel {
                Kernel::IdKey => groups.id_key.push(entry),
                Kernel::Root => {
                    if groups.root.is_none() {
                        groups.root = Some(entry);
                    }
                }
                Kernel::ChildNode => groups.child_node.push(entry),
                Kernel::AttributeNode => groups.attribute_node.push(entry),
                Kernel::Type(type_id) => groups.types.entry(type_id).or_default().push(entry),
                Kernel::Never => {}
                Kernel::Unclassified => context.report(
                    ErrorCode::Internal,
                    format!(
                        "pattern {} of template {} has no kernel",
                        entry.alternative, entry.template
                    ),
                    None,
                ),
            }
        }
        log::debug!(
            "mode {:?}: {} patterns in {} type groups",
            self.name,
            self.entries.len(),
            groups.types.len()
        );
        groups
    }
}
