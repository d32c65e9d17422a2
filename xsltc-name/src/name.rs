use std::fmt;

use xot::Xot;

use crate::namespaces::NamespaceLookup;

/// A namespace-qualified name.
///
/// The prefix is carried along for diagnostics and output, but it takes no
/// part in equality or hashing.
#[derive(Debug, Clone, Eq)]
pub struct QName {
    local: String,
    prefix: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    MissingPrefix(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingPrefix(prefix) => write!(f, "undeclared namespace prefix '{}'", prefix),
        }
    }
}

impl std::error::Error for Error {}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.namespace.hash(state);
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }
}

impl QName {
    pub fn new(local: String, namespace: Option<String>, prefix: Option<String>) -> Self {
        QName {
            local,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn unprefixed(local: &str) -> Self {
        QName {
            local: local.to_string(),
            namespace: None,
            prefix: None,
        }
    }

    pub fn uri_qualified(uri: &str, local: &str) -> Self {
        QName::new(local.to_string(), Some(uri.to_string()), None)
    }

    pub fn prefixed(prefix: &str, local: &str, namespaces: impl NamespaceLookup) -> Option<Self> {
        let namespace = namespaces.by_prefix(prefix)?;
        Some(QName {
            local: local.to_string(),
            namespace: Some(namespace.to_string()),
            prefix: Some(prefix.to_string()),
        })
    }

    /// Parse a lexical `prefix:local` or `local` name. Unprefixed names are
    /// in no namespace, as XPath 1.0 and XSLT 1.0 require for names in
    /// expressions and in most attributes.
    pub fn parse(lexical: &str, namespaces: impl NamespaceLookup) -> Result<Self, Error> {
        match lexical.split_once(':') {
            Some((prefix, local)) => QName::prefixed(prefix, local, namespaces)
                .ok_or_else(|| Error::MissingPrefix(prefix.to_string())),
            None => Ok(QName::unprefixed(lexical)),
        }
    }

    pub fn from_xot(name: xot::NameId, xot: &Xot) -> Self {
        let (local, namespace) = xot.name_ns_str(name);
        QName::new(local.to_string(), Some(namespace.to_string()), None)
    }

    /// Like [`QName::from_xot`], but recovers the prefix in scope at
    /// `context` as well.
    pub fn from_xot_with_prefix(name: xot::NameId, context: xot::Node, xot: &Xot) -> Self {
        let namespace = xot.namespace_for_name(name);
        let local = xot.local_name_str(name).to_string();
        if namespace == xot.no_namespace() {
            return QName::unprefixed(&local);
        }
        let prefix = xot
            .prefix_for_namespace(context, namespace)
            .map(|prefix| xot.prefix_str(prefix).to_string());
        QName::new(local, Some(xot.namespace_str(namespace).to_string()), prefix)
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn with_local_name(&self, local: &str) -> Self {
        QName {
            local: local.to_string(),
            namespace: self.namespace.clone(),
            prefix: self.prefix.clone(),
        }
    }

    /// The name as it would be written, `prefix:local`.
    pub fn to_lexical(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "Q{{{}}}{}", namespace, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}
