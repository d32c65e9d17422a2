use ahash::{HashMap, HashMapExt};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XALAN_JAVA_NAMESPACE: &str = "http://xml.apache.org/xalan/java";

/// Prefix bindings in scope at some point of a stylesheet.
#[derive(Debug, Clone)]
pub struct Namespaces {
    namespaces: HashMap<String, String>,
    pub default_element_namespace: Option<String>,
}

impl Namespaces {
    pub fn new(namespaces: HashMap<String, String>, default_element_namespace: Option<String>) -> Self {
        Self {
            namespaces,
            default_element_namespace,
        }
    }

    pub fn default_namespaces() -> HashMap<String, String> {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_NAMESPACE.to_string());
        namespaces
    }

    /// Declare a prefix. The empty prefix sets the default element namespace.
    pub fn add(&mut self, prefix: &str, uri: &str) {
        if prefix.is_empty() {
            self.default_element_namespace = if uri.is_empty() {
                None
            } else {
                Some(uri.to_string())
            };
        } else {
            self.namespaces.insert(prefix.to_string(), uri.to_string());
        }
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .filter(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
            .min()
    }

    pub fn default_element_namespace(&self) -> Option<&str> {
        self.default_element_namespace.as_deref()
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new(Self::default_namespaces(), None)
    }
}

pub trait NamespaceLookup {
    fn by_prefix(&self, prefix: &str) -> Option<&str>;
}

impl NamespaceLookup for Namespaces {
    fn by_prefix(&self, prefix: &str) -> Option<&str> {
        Namespaces::by_prefix(self, prefix)
    }
}

impl<T: NamespaceLookup> NamespaceLookup for &T {
    fn by_prefix(&self, prefix: &str) -> Option<&str> {
        (**self).by_prefix(prefix)
    }
}
