mod name;
mod namespaces;
mod table;

pub use name::{Error, QName};
pub use namespaces::{
    NamespaceLookup, Namespaces, XALAN_JAVA_NAMESPACE, XML_NAMESPACE, XSLT_NAMESPACE,
};
pub use table::{QNameId, QNameTable};
