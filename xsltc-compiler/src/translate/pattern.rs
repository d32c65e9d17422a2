//! Match patterns as conditions on a node held in a local slot.
//!
//! Steps are tested right to left. After a step matches, the walk moves
//! to the parent (for `/`) or loops over the ancestors (for `//`); a
//! failure left of a `//` retries with the next ancestor.

use xsltc_bytecode::dom::{
    ATTRIBUTE_NODE, COMMENT_NODE, DOCUMENT_NODE, ELEMENT_NODE, PROCESSING_INSTRUCTION_NODE,
    TEXT_NODE,
};
use xsltc_bytecode::{Builtin, Constant, Instruction, JumpCondition, Label};
use xsltc_xpath::ast::NodeTest;
use xsltc_xpath::pattern::{
    IdKeyPattern, LocationPathPattern, Pattern, PatternAxis, PatternRoot, Separator, StepPattern,
};

use super::{BranchLists, CodegenResult, MethodCompiler};
use crate::typecheck::{pattern_step_spec, TExpr};

#[derive(Debug, Clone, Copy)]
enum FailTarget {
    /// Add failing branches to the false list.
    NoMatch,
    /// Try the next ancestor.
    Retry(Label),
}

impl MethodCompiler<'_, '_> {
    /// Test whether the node in `subject` matches `pattern`. With
    /// `kernel_known` the caller has already established the node test of
    /// the last step.
    pub(crate) fn match_pattern(
        &mut self,
        pattern: &Pattern<TExpr>,
        subject: u16,
        kernel_known: bool,
    ) -> CodegenResult<BranchLists> {
        match pattern {
            Pattern::Alternative(left, right) => {
                let mut lists = BranchLists::default();
                let left = self.match_pattern(left, subject, false)?;
                lists.true_list.extend(left.true_list);
                let jump = self.builder.emit_jump_forward(JumpCondition::Always);
                lists.true_list.push(jump);
                self.patch_here(left.false_list);
                lists.extend(self.match_pattern(right, subject, false)?);
                Ok(lists)
            }
            Pattern::IdKey(id_key) => {
                let mut lists = BranchLists::default();
                self.id_key_test(id_key, subject, FailTarget::NoMatch, &mut lists)?;
                Ok(lists)
            }
            Pattern::LocationPath(path) => self.match_path(path, subject, kernel_known),
        }
    }

    fn fail_if(&mut self, condition: JumpCondition, target: FailTarget, lists: &mut BranchLists) {
        match target {
            FailTarget::NoMatch => {
                let jump = self.builder.emit_jump_forward(condition);
                lists.false_list.push(jump);
            }
            FailTarget::Retry(label) => self.builder.emit_jump(condition, label),
        }
    }

    fn match_path(
        &mut self,
        path: &LocationPathPattern<TExpr>,
        subject: u16,
        kernel_known: bool,
    ) -> CodegenResult<BranchLists> {
        let mut lists = BranchLists::default();
        let mut allocated = Vec::new();
        let mut node = subject;
        let mut target = FailTarget::NoMatch;
        for (index, step) in path.steps.iter().enumerate().rev() {
            let is_kernel = index + 1 == path.steps.len();
            let skip_test = is_kernel
                && kernel_known
                && !matches!(step.node_test, NodeTest::ProcessingInstruction(Some(_)));
            if !skip_test {
                self.node_test(step.axis, &step.node_test, node, target, &mut lists)?;
            }
            if !step.predicates.is_empty() {
                self.step_membership(step, node, target, &mut lists)?;
            }
            if index == 0 && path.root == PatternRoot::Relative {
                break;
            }
            let next = self.builder.allocate_local("pattern node")?;
            allocated.push(next);
            self.emit(Instruction::Load(node));
            match step.separator {
                Separator::Parent => {
                    self.emit(Instruction::Parent);
                    self.emit(Instruction::Store(next));
                    self.emit(Instruction::Load(next));
                    self.emit(Instruction::IsNull);
                    self.fail_if(JumpCondition::True, target, &mut lists);
                }
                Separator::Ancestor => {
                    self.emit(Instruction::Store(next));
                    let retry = self.builder.label_here();
                    self.emit(Instruction::Load(next));
                    self.emit(Instruction::Parent);
                    self.emit(Instruction::Store(next));
                    self.emit(Instruction::Load(next));
                    self.emit(Instruction::IsNull);
                    self.fail_if(JumpCondition::True, target, &mut lists);
                    target = FailTarget::Retry(retry);
                }
            }
            node = next;
        }
        match &path.root {
            PatternRoot::Relative => {}
            PatternRoot::Root => self.kind_test(node, DOCUMENT_NODE, target, &mut lists)?,
            PatternRoot::IdKey(id_key) => self.id_key_test(id_key, node, target, &mut lists)?,
        }
        for slot in allocated.into_iter().rev() {
            self.builder.release_local(slot);
        }
        Ok(lists)
    }

    fn kind_test(
        &mut self,
        node: u16,
        kind: i32,
        target: FailTarget,
        lists: &mut BranchLists,
    ) -> CodegenResult<()> {
        self.emit(Instruction::Load(node));
        self.emit(Instruction::NodeKind);
        self.push_number(kind as f64)?;
        self.emit(Instruction::Eq);
        self.fail_if(JumpCondition::False, target, lists);
        Ok(())
    }

    fn node_test(
        &mut self,
        axis: PatternAxis,
        test: &NodeTest,
        node: u16,
        target: FailTarget,
        lists: &mut BranchLists,
    ) -> CodegenResult<()> {
        let attribute = axis == PatternAxis::Attribute;
        let principal = if attribute { ATTRIBUTE_NODE } else { ELEMENT_NODE };
        match test {
            NodeTest::Name(name) => {
                let type_id = if attribute {
                    self.t.context.register_attribute(name)
                } else {
                    self.t.context.register_element(name)
                };
                self.emit(Instruction::Load(node));
                self.emit(Instruction::NodeType);
                self.push_number(type_id as f64)?;
                self.emit(Instruction::Eq);
                self.fail_if(JumpCondition::False, target, lists);
            }
            NodeTest::NamespaceWildcard(uri) => {
                self.kind_test(node, principal, target, lists)?;
                let namespace = self.t.context.register_namespace(uri);
                self.emit(Instruction::Load(node));
                self.emit(Instruction::NamespaceType);
                self.push_number(namespace as f64)?;
                self.emit(Instruction::Eq);
                self.fail_if(JumpCondition::False, target, lists);
            }
            NodeTest::Wildcard => self.kind_test(node, principal, target, lists)?,
            NodeTest::Node if attribute => self.kind_test(node, ATTRIBUTE_NODE, target, lists)?,
            NodeTest::Node => {
                // any node that can be a child
                for excluded in [ATTRIBUTE_NODE, DOCUMENT_NODE] {
                    self.emit(Instruction::Load(node));
                    self.emit(Instruction::NodeKind);
                    self.push_number(excluded as f64)?;
                    self.emit(Instruction::Ne);
                    self.fail_if(JumpCondition::False, target, lists);
                }
            }
            NodeTest::Text => self.kind_test(node, TEXT_NODE, target, lists)?,
            NodeTest::Comment => self.kind_test(node, COMMENT_NODE, target, lists)?,
            NodeTest::ProcessingInstruction(literal) => {
                self.kind_test(node, PROCESSING_INSTRUCTION_NODE, target, lists)?;
                if let Some(literal) = literal {
                    self.emit(Instruction::Load(node));
                    self.emit(Instruction::CallBuiltin(Builtin::Name.id()));
                    self.push_string(literal)?;
                    self.emit(Instruction::Eq);
                    self.fail_if(JumpCondition::False, target, lists);
                }
            }
        }
        Ok(())
    }

    /// A step with predicates matches when the node is among the nodes
    /// the step selects from the node's parent.
    fn step_membership(
        &mut self,
        step: &StepPattern<TExpr>,
        node: u16,
        target: FailTarget,
        lists: &mut BranchLists,
    ) -> CodegenResult<()> {
        let spec = self.constant(Constant::Step(pattern_step_spec(step.axis, &step.node_test)))?;
        self.emit(Instruction::Load(node));
        self.emit(Instruction::Parent);
        self.emit(Instruction::AxisStep(spec));
        for predicate in &step.predicates {
            self.filter(predicate)?;
        }
        let iterator = self.builder.allocate_local("siblings")?;
        let sibling = self.builder.allocate_local("sibling")?;
        self.emit(Instruction::Iterate);
        self.emit(Instruction::Store(iterator));
        let top = self.builder.label_here();
        self.emit(Instruction::IterNext(iterator, sibling));
        self.fail_if(JumpCondition::False, target, lists);
        self.emit(Instruction::Load(sibling));
        self.emit(Instruction::Load(node));
        self.emit(Instruction::NodeEq);
        self.builder.emit_jump(JumpCondition::False, top);
        self.builder.release_local(sibling);
        self.builder.release_local(iterator);
        Ok(())
    }

    fn id_key_test(
        &mut self,
        id_key: &IdKeyPattern,
        node: u16,
        target: FailTarget,
        lists: &mut BranchLists,
    ) -> CodegenResult<()> {
        self.emit(Instruction::Load(node));
        match id_key {
            IdKeyPattern::Id(value) => {
                self.push_string(value)?;
                self.emit(Instruction::IdMatches);
            }
            IdKeyPattern::Key(name, value) => {
                self.push_string(value)?;
                let name = self.constant(Constant::String(name.to_string()))?;
                self.emit(Instruction::KeyMatches(name));
            }
        }
        self.fail_if(JumpCondition::False, target, lists);
        Ok(())
    }
}
