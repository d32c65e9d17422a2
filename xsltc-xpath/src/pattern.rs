use xsltc_name::QName;

use crate::ast::NodeTest;

/// An XSLT 1.0 match pattern, with predicates of type `E`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern<E> {
    /// `left | right`
    Alternative(Box<Pattern<E>>, Box<Pattern<E>>),
    /// A bare `id(...)` or `key(...)`.
    IdKey(IdKeyPattern),
    LocationPath(LocationPathPattern<E>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKeyPattern {
    Id(String),
    Key(QName, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternRoot {
    Relative,
    /// Leading `/`: the leftmost step's parent must be the root.
    Root,
    /// Leading `id(...)`/`key(...)`.
    IdKey(IdKeyPattern),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternAxis {
    Child,
    Attribute,
}

/// How a step relates to whatever is on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Separator {
    /// `/`
    Parent,
    /// `//`
    Ancestor,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepPattern<E> {
    pub axis: PatternAxis,
    pub node_test: NodeTest,
    pub predicates: Vec<E>,
    pub separator: Separator,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationPathPattern<E> {
    pub root: PatternRoot,
    /// Leftmost step first.
    pub steps: Vec<StepPattern<E>>,
}

impl<E> LocationPathPattern<E> {
    /// The last step, whose node test selects the dispatch group. The root
    /// pattern `/` has none.
    pub fn kernel(&self) -> Option<&StepPattern<E>> {
        self.steps.last()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty() && matches!(self.root, PatternRoot::Root)
    }
}

impl<E> StepPattern<E> {
    pub fn new(axis: PatternAxis, node_test: NodeTest, separator: Separator) -> Self {
        StepPattern {
            axis,
            node_test,
            predicates: Vec::new(),
            separator,
        }
    }
}

impl<E> Pattern<E> {
    /// Split a pattern into its alternatives, left to right.
    pub fn alternatives(&self) -> Vec<&Pattern<E>> {
        match self {
            Pattern::Alternative(left, right) => {
                let mut alternatives = left.alternatives();
                alternatives.extend(right.alternatives());
                alternatives
            }
            other => vec![other],
        }
    }

    /// Rebuild the pattern with every predicate transformed by `f`.
    pub fn try_map<F, Err>(
        &self,
        f: &mut impl FnMut(&E) -> Result<F, Err>,
    ) -> Result<Pattern<F>, Err> {
        Ok(match self {
            Pattern::Alternative(left, right) => {
                Pattern::Alternative(Box::new(left.try_map(f)?), Box::new(right.try_map(f)?))
            }
            Pattern::IdKey(id_key) => Pattern::IdKey(id_key.clone()),
            Pattern::LocationPath(path) => Pattern::LocationPath(path.try_map(f)?),
        })
    }

    pub fn predicates(&self) -> Vec<&E> {
        match self {
            Pattern::Alternative(left, right) => {
                let mut predicates = left.predicates();
                predicates.extend(right.predicates());
                predicates
            }
            Pattern::IdKey(_) => Vec::new(),
            Pattern::LocationPath(path) => path
                .steps
                .iter()
                .flat_map(|step| step.predicates.iter())
                .collect(),
        }
    }
}

impl<E> LocationPathPattern<E> {
    pub fn try_map<F, Err>(
        &self,
        f: &mut impl FnMut(&E) -> Result<F, Err>,
    ) -> Result<LocationPathPattern<F>, Err> {
        let steps = self
            .steps
            .iter()
            .map(|step| -> Result<StepPattern<F>, Err> {
                Ok(StepPattern {
                    axis: step.axis,
                    node_test: step.node_test.clone(),
                    predicates: step
                        .predicates
                        .iter()
                        .map(&mut *f)
                        .collect::<Result<Vec<_>, Err>>()?,
                    separator: step.separator,
                })
            })
            .collect::<Result<Vec<_>, Err>>()?;
        Ok(LocationPathPattern {
            root: self.root.clone(),
            steps,
        })
    }
}
