//! The runtime half of xsltc: a tree model of the source document, and an
//! interpreter that runs compiled translets over it.
//!
//! A translet is produced by `xsltc-compiler`. Running one walks the
//! generated `transform` method, which in turn dispatches to template
//! methods through `applyTemplates`. Everything written by the templates
//! is recorded as [`OutputEvent`]s and serialized according to the
//! translet's `xsl:output` properties.
//!
//! ```ignore
//! let options = TransformOptions::new().param("title", "Report");
//! let html = transform(&translet, "<doc/>", &options)?;
//! ```
mod builtins;
mod dom;
mod error;
mod foreign;
mod interpreter;
mod keys;
mod number;
mod options;
mod output;
mod sort;
mod transform;
mod value;

pub use dom::{Dom, TypeTable};
pub use error::{Error, Result, SpannedError, SpannedResult};
pub use foreign::{ForeignBindings, ForeignResult, FunctionBindings, NoBindings};
pub use keys::KeyIndex;
pub use number::format_decimal;
pub use options::TransformOptions;
pub use output::{serialize, OutputEvent, OutputHandler, Recorder, XmlSerializer};
pub use transform::{transform, transform_dom, transform_events};
pub use value::{NodeIterator, Object, Value};
