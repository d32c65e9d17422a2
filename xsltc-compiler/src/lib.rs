//! Compiles XSLT 1.0 stylesheets into translets: a main unit whose
//! methods dispatch nodes to template rules, plus helper units for sort
//! keys and node counters.
//!
//! ```rust
//! use xsltc_compiler::{compile_str, CompilerOptions};
//!
//! let output = compile_str(
//!     r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
//!          <xsl:template match="/">hello</xsl:template>
//!        </xsl:stylesheet>"#,
//!     &CompilerOptions::new(),
//! );
//! assert!(output.errors.is_empty());
//! assert_eq!(output.units()[0].name, "GregorSamsa");
//! ```

mod closure;
mod context;
mod dependency;
mod driver;
mod error;
mod extension;
mod functions;
mod loader;
mod mode;
mod options;
mod priority;
mod source;
mod symbols;
mod syntax;
mod translate;
mod typecheck;
mod types;

pub use closure::{
    EXTRACT_VALUE, MATCHES_COUNT, MATCHES_FROM, NODE_COUNTER_CLASS, SORT_RECORD_CLASS,
};
pub use context::CompilationContext;
pub use driver::{compile, compile_str, CompileOutput, TRANSFORM_METHOD, TRANSLET_CLASS};
pub use error::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use extension::{ExtensionRegistry, ForeignClass, ForeignMethod};
pub use options::{CompilerOptions, DEFAULT_TRANSLET_NAME};
pub use source::{
    MemoryResolver, SourceError, SourceEvent, StylesheetResolver, StylesheetSource, XotSource,
};
pub use types::Type;
