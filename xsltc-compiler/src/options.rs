use std::fmt;
use std::rc::Rc;

use crate::extension::ExtensionRegistry;
use crate::source::StylesheetResolver;

/// Name of the main unit when none is given.
pub const DEFAULT_TRANSLET_NAME: &str = "GregorSamsa";

/// Settings for one compilation.
#[derive(Clone)]
pub struct CompilerOptions {
    pub translet_name: String,
    pub resolver: Option<Rc<dyn StylesheetResolver>>,
    pub extensions: ExtensionRegistry,
    /// Keep local variable tables in the emitted methods.
    pub debug: bool,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translet_name(mut self, name: impl Into<String>) -> Self {
        self.translet_name = name.into();
        self
    }

    pub fn resolver(mut self, resolver: impl StylesheetResolver + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            translet_name: DEFAULT_TRANSLET_NAME.to_string(),
            resolver: None,
            extensions: ExtensionRegistry::new(),
            debug: false,
        }
    }
}

impl fmt::Debug for CompilerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerOptions")
            .field("translet_name", &self.translet_name)
            .field("resolver", &self.resolver.is_some())
            .field("extensions", &self.extensions)
            .field("debug", &self.debug)
            .finish()
    }
}
