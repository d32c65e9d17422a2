//! Compile an XSLT 1.0 stylesheet once, then transform documents with it.
//!
//! ```rust
//! let output = xsltc::evaluate(
//!     "<doc><p>hello</p></doc>",
//!     r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
//!          <xsl:template match="p"><b><xsl:value-of select="."/></b></xsl:template>
//!        </xsl:stylesheet>"#,
//! )
//! .unwrap();
//! assert_eq!(output, "<b>hello</b>");
//! ```
use std::fmt;

use xsltc_bytecode::Translet;
use xsltc_compiler::{compile_str, CompilerOptions, Diagnostic};
use xsltc_runtime::{transform, SpannedError, TransformOptions};

pub use xsltc_bytecode as bytecode;
pub use xsltc_compiler as compiler;
pub use xsltc_runtime as runtime;

/// Why a stylesheet could not be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The stylesheet did not compile.
    #[error("stylesheet has errors: {}", Errors(.0))]
    Compile(Vec<Diagnostic>),
    #[error(transparent)]
    Runtime(#[from] SpannedError),
}

struct Errors<'a>(&'a [Diagnostic]);

impl fmt::Display for Errors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// A compiled stylesheet.
#[derive(Debug, Clone)]
pub struct Transformer {
    translet: Translet,
    warnings: Vec<Diagnostic>,
}

impl Transformer {
    pub fn new(xslt: &str) -> Result<Self, Error> {
        Self::with_options(xslt, &CompilerOptions::new())
    }

    pub fn with_options(xslt: &str, options: &CompilerOptions) -> Result<Self, Error> {
        let output = compile_str(xslt, options);
        for warning in &output.warnings {
            log::warn!("{}", warning);
        }
        match output.translet {
            Some(translet) => Ok(Transformer {
                translet,
                warnings: output.warnings,
            }),
            None => Err(Error::Compile(output.errors)),
        }
    }

    pub fn translet(&self) -> &Translet {
        &self.translet
    }

    /// Warnings reported while compiling.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn transform(&self, xml: &str) -> Result<String, Error> {
        self.transform_with(xml, &TransformOptions::new())
    }

    pub fn transform_with(&self, xml: &str, options: &TransformOptions) -> Result<String, Error> {
        Ok(transform(&self.translet, xml, options)?)
    }
}

/// Compile `xslt` and transform `xml` with it.
pub fn evaluate(xml: &str, xslt: &str) -> Result<String, Error> {
    Transformer::new(xslt)?.transform(xml)
}
