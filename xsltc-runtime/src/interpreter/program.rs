use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::{ClassGen, MethodGen, MethodRef, Translet};

use crate::error::{Error, Result};

/// A translet with its units and methods indexed by name.
#[derive(Debug)]
pub(crate) struct Program<'a> {
    translet: &'a Translet,
    classes: HashMap<&'a str, usize>,
    methods: Vec<HashMap<&'a str, usize>>,
}

impl<'a> Program<'a> {
    pub(crate) fn new(translet: &'a Translet) -> Self {
        let mut classes = HashMap::new();
        let mut methods = Vec::with_capacity(translet.classes.len());
        for (index, class) in translet.classes.iter().enumerate() {
            classes.insert(class.name.as_str(), index);
            let mut by_name = HashMap::new();
            for (index, method) in class.methods.iter().enumerate() {
                by_name.entry(method.name.as_str()).or_insert(index);
            }
            methods.push(by_name);
        }
        Program {
            translet,
            classes,
            methods,
        }
    }

    pub(crate) fn translet(&self) -> &'a Translet {
        self.translet
    }

    pub(crate) fn class_index(&self, name: &str) -> Result<usize> {
        self.classes
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    pub(crate) fn class(&self, index: usize) -> Result<&'a ClassGen> {
        self.translet
            .classes
            .get(index)
            .ok_or_else(|| Error::UnknownClass(format!("#{}", index)))
    }

    pub(crate) fn method_index(&self, class: usize, name: &str) -> Result<usize> {
        self.methods
            .get(class)
            .and_then(|methods| methods.get(name))
            .copied()
            .ok_or_else(|| {
                let class = self
                    .translet
                    .classes
                    .get(class)
                    .map_or(String::new(), |class| class.name.clone());
                Error::UnknownMethod(class, name.to_string())
            })
    }

    pub(crate) fn method(&self, class: usize, method: usize) -> Result<&'a MethodGen> {
        self.class(class)?.methods.get(method).ok_or_else(|| {
            Error::UnknownMethod(self.translet.classes[class].name.clone(), format!("#{}", method))
        })
    }

    pub(crate) fn resolve(&self, reference: &MethodRef) -> Result<(usize, usize)> {
        let class = self.class_index(&reference.class)?;
        let method = self.method_index(class, &reference.name)?;
        Ok((class, method))
    }
}
