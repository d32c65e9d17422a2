//! The dispatch method of a mode: a loop over the nodes of an iterator
//! that switches on each node's type and jumps into the test sequence for
//! that type.

use std::collections::BTreeMap;

use ahash::HashMap;
use xsltc_bytecode::dom::{
    ATTRIBUTE_NODE, COMMENT_NODE, DOCUMENT_NODE, ELEMENT_NODE, ITERATOR_SLOT, NTYPES,
    PROCESSING_INSTRUCTION_NODE, ROOT_NODE, TEXT_NODE, THIS_SLOT,
};
use xsltc_bytecode::{
    Axis, Instruction, JumpCondition, Label, MethodBuilder, MethodGen, NameKind, StepSpec,
    StepTest,
};

use super::test_seq::is_unconditional;
use super::{Groups, Mode, PatternEntry, TestSeq};
use crate::symbols::mode_method_name;
use crate::translate::{
    CodegenResult, Frame, MethodCompiler, ParamSource, Position, TransletAccess, Translation,
};

/// What happens to a node no template rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BuiltIn {
    /// Process the children.
    Recurse,
    /// Output the string value.
    Text,
    /// Nothing.
    Skip,
}

fn built_in(type_id: i32, kind: Option<NameKind>) -> BuiltIn {
    match (type_id, kind) {
        (ROOT_NODE | DOCUMENT_NODE | ELEMENT_NODE, _) => BuiltIn::Recurse,
        (TEXT_NODE | ATTRIBUTE_NODE, _) => BuiltIn::Text,
        (_, Some(NameKind::Element | NameKind::NamespaceWildcard)) => BuiltIn::Recurse,
        (_, Some(NameKind::Attribute | NameKind::AttributeNamespaceWildcard)) => BuiltIn::Text,
        _ => BuiltIn::Skip,
    }
}

/// Where the switch sends one type.
#[derive(Debug, Clone, Copy)]
enum Target {
    Sequence(usize),
    BuiltIn(BuiltIn),
    /// The secondary switch on namespace of elements or attributes.
    Namespaces(bool),
}

/// Test sequences of a mode, shared between the types they serve.
#[derive(Debug, Default)]
struct Plan<'s> {
    sequences: Vec<(TestSeq<'s>, BuiltIn)>,
    shared: HashMap<(Vec<(usize, usize)>, BuiltIn), usize>,
    targets: BTreeMap<i32, Target>,
    /// Namespace id to target, for elements and for attributes.
    namespaces: [Vec<(i32, Target)>; 2],
}

impl<'s> Plan<'s> {
    fn target(&mut self, completed: Vec<PatternEntry<'s>>, fallback: BuiltIn) -> Target {
        if completed.is_empty() {
            return Target::BuiltIn(fallback);
        }
        let seq = TestSeq::reduce(completed);
        let key = (seq.key(), fallback);
        if let Some(index) = self.shared.get(&key) {
            return Target::Sequence(*index);
        }
        self.sequences.push((seq, fallback));
        let index = self.sequences.len() - 1;
        self.shared.insert(key, index);
        Target::Sequence(index)
    }

    fn new(groups: &Groups<'s>, translation: &Translation) -> Self {
        let context = &*translation.context;
        let mut plan = Plan::default();
        let root = groups.root.into_iter().collect::<Vec<_>>();
        let root = plan.target(root, BuiltIn::Recurse);
        plan.targets.insert(ROOT_NODE, root);
        plan.targets.insert(DOCUMENT_NODE, root);
        for (attribute, kind) in [(false, ELEMENT_NODE), (true, ATTRIBUTE_NODE)] {
            let fallback = built_in(kind, None);
            let generic = plan.target(groups.completed(kind, context), fallback);
            let mut by_namespace = Vec::new();
            for (namespace, wildcard) in groups.namespace_wildcards(attribute, context) {
                let target = plan.target(groups.completed(wildcard, context), fallback);
                by_namespace.push((namespace, target));
            }
            if by_namespace.is_empty() {
                plan.targets.insert(kind, generic);
            } else {
                by_namespace.push((-1, generic));
                plan.namespaces[usize::from(attribute)] = by_namespace;
                plan.targets.insert(kind, Target::Namespaces(attribute));
            }
        }
        for kind in [TEXT_NODE, COMMENT_NODE, PROCESSING_INSTRUCTION_NODE] {
            let target = plan.target(groups.completed(kind, context), built_in(kind, None));
            plan.targets.insert(kind, target);
        }
        for (index, entry) in context.name_entries().iter().enumerate() {
            if matches!(
                entry.kind,
                NameKind::NamespaceWildcard | NameKind::AttributeNamespaceWildcard
            ) {
                continue;
            }
            let type_id = NTYPES + index as i32;
            let fallback = built_in(type_id, Some(entry.kind));
            let target = plan.target(groups.completed(type_id, context), fallback);
            plan.targets.insert(type_id, target);
        }
        plan
    }

    /// Templates some sequence can select, in declaration order.
    fn needed(&self, groups: &Groups) -> Vec<usize> {
        let mut needed = self
            .sequences
            .iter()
            .flat_map(|(seq, _)| seq.templates())
            .chain(groups.id_key.iter().map(|entry| entry.template))
            .collect::<Vec<_>>();
        needed.sort_unstable();
        needed.dedup();
        needed
    }
}

/// Labels of the shared parts of a dispatch method.
struct Labels {
    top: Label,
    recurse: Label,
    text: Label,
}

impl Labels {
    fn built_in(&self, built_in: BuiltIn) -> Label {
        match built_in {
            BuiltIn::Recurse => self.recurse,
            BuiltIn::Text => self.text,
            BuiltIn::Skip => self.top,
        }
    }
}

/// Compile the dispatch method `name` for `mode`. Its only argument is
/// the iterator over the nodes to process.
pub(crate) fn dispatch_method(
    t: &mut Translation,
    mode: &Mode,
    name: String,
) -> CodegenResult<MethodGen> {
    let groups = mode.process_patterns(t.context);
    let plan = Plan::new(&groups, t);
    let needed = plan.needed(&groups);
    log::debug!(
        "{}: {} test sequences select {} templates",
        name,
        plan.sequences.len(),
        needed.len()
    );

    let mut builder = MethodBuilder::new(name, vec!["iterator".to_string()]);
    let node = builder.allocate_local("node")?;
    let frame = Frame::new(node, Position::Iterator(ITERATOR_SLOT), TransletAccess::This);
    let mut compiler = MethodCompiler::new(t, builder, frame);
    let labels = Labels {
        top: compiler.builder.new_label(),
        recurse: compiler.builder.new_label(),
        text: compiler.builder.new_label(),
    };
    let templates = needed
        .iter()
        .map(|index| (*index, compiler.builder.new_label()))
        .collect::<BTreeMap<_, _>>();
    let sequences = plan
        .sequences
        .iter()
        .map(|_| compiler.builder.new_label())
        .collect::<Vec<_>>();
    let namespace_switches = [compiler.builder.new_label(), compiler.builder.new_label()];
    let kinds = compiler.builder.new_label();
    let label_of = |target: Target| match target {
        Target::Sequence(index) => sequences[index],
        Target::BuiltIn(built_in) => labels.built_in(built_in),
        Target::Namespaces(attribute) => namespace_switches[usize::from(attribute)],
    };

    compiler.builder.place_label(labels.top);
    compiler.emit(Instruction::IterNext(ITERATOR_SLOT, node));
    let exit = compiler.builder.emit_jump_forward(JumpCondition::False);

    // id and key patterns are tried before the type of the node
    for entry in &groups.id_key {
        let lists = compiler.match_pattern(entry.pattern, node, false)?;
        let template = templates[&entry.template];
        compiler.patch_to(lists.true_list, template);
        compiler.builder.emit_jump(JumpCondition::Always, template);
        compiler.patch_here(lists.false_list);
    }

    compiler.emit(Instruction::Load(node));
    compiler.emit(Instruction::NodeType);
    let type_count = compiler.t.context.type_count();
    let switch = compiler
        .builder
        .emit_switch((0..type_count).collect(), kinds);
    for (type_id, target) in &plan.targets {
        compiler
            .builder
            .set_switch_target(switch, *type_id, label_of(*target));
    }

    // names registered after this method are dispatched by their kind
    compiler.builder.place_label(kinds);
    for kind in [ELEMENT_NODE, ATTRIBUTE_NODE] {
        let Some(target) = plan.targets.get(&kind) else {
            continue;
        };
        compiler.emit(Instruction::Load(node));
        compiler.emit(Instruction::NodeKind);
        compiler.push_number(kind as f64)?;
        compiler.emit(Instruction::Eq);
        compiler
            .builder
            .emit_jump(JumpCondition::True, label_of(*target));
    }
    compiler.builder.emit_jump(JumpCondition::Always, labels.top);

    for (attribute, cases) in plan.namespaces.iter().enumerate() {
        if cases.is_empty() {
            continue;
        }
        compiler.builder.place_label(namespace_switches[attribute]);
        compiler.emit(Instruction::Load(node));
        compiler.emit(Instruction::NamespaceType);
        let (default, specific): (Vec<(i32, Target)>, Vec<(i32, Target)>) =
            cases.iter().copied().partition(|(namespace, _)| *namespace < 0);
        let default = default
            .first()
            .map(|(_, target)| label_of(*target))
            .unwrap_or(labels.top);
        let switch = compiler.builder.emit_switch(
            specific.iter().map(|(namespace, _)| *namespace).collect(),
            default,
        );
        for (namespace, target) in specific {
            compiler
                .builder
                .set_switch_target(switch, namespace, label_of(target));
        }
    }

    for ((seq, fallback), label) in plan.sequences.iter().zip(&sequences) {
        compiler.builder.place_label(*label);
        for entry in &seq.entries {
            let template = templates[&entry.template];
            if is_unconditional(entry.pattern) {
                compiler.builder.emit_jump(JumpCondition::Always, template);
                continue;
            }
            let lists = compiler.match_pattern(entry.pattern, node, true)?;
            compiler.patch_to(lists.true_list, template);
            compiler.builder.emit_jump(JumpCondition::Always, template);
            compiler.patch_here(lists.false_list);
        }
        if !seq.complete {
            compiler
                .builder
                .emit_jump(JumpCondition::Always, labels.built_in(*fallback));
        }
    }

    for (index, label) in &templates {
        compiler.builder.place_label(*label);
        compiler.template(*index, ParamSource::Frame)?;
        compiler.builder.emit_jump(JumpCondition::Always, labels.top);
    }

    compiler.builder.set_line(None);
    compiler.builder.place_label(labels.recurse);
    let mode_method = mode_method_name(mode.name.as_ref());
    let translet = compiler.t.translet_name();
    compiler.emit(Instruction::PushParamFrame);
    compiler.emit(Instruction::Load(THIS_SLOT));
    compiler.step_from(
        node,
        StepSpec {
            axis: Axis::Child,
            test: StepTest::Node,
        },
    )?;
    compiler.emit(Instruction::Iterate);
    compiler.invoke(&translet, &mode_method, 1)?;
    compiler.emit(Instruction::Pop);
    compiler.emit(Instruction::PopParamFrame);
    compiler.builder.emit_jump(JumpCondition::Always, labels.top);

    compiler.builder.place_label(labels.text);
    compiler.emit(Instruction::Load(node));
    compiler.emit(Instruction::ToString);
    compiler.emit(Instruction::Characters);
    compiler.builder.emit_jump(JumpCondition::Always, labels.top);

    compiler.builder.patch_jump_here(exit);
    compiler.emit(Instruction::Return);
    compiler.finish()
}
