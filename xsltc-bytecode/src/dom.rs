//! Node type constants shared by generated code and the tree runtime.
//!
//! Kinds below `NTYPES` are fixed; names registered by a translet get
//! expanded type ids from `NTYPES` upward.

pub const ROOT_NODE: i32 = 0;
pub const ELEMENT_NODE: i32 = 1;
pub const ATTRIBUTE_NODE: i32 = 2;
pub const TEXT_NODE: i32 = 3;
pub const CDATA_SECTION_NODE: i32 = 4;
pub const ENTITY_REFERENCE_NODE: i32 = 5;
pub const ENTITY_NODE: i32 = 6;
pub const PROCESSING_INSTRUCTION_NODE: i32 = 7;
pub const COMMENT_NODE: i32 = 8;
pub const DOCUMENT_NODE: i32 = 9;
pub const DOCUMENT_TYPE_NODE: i32 = 10;
pub const DOCUMENT_FRAGMENT_NODE: i32 = 11;
pub const NOTATION_NODE: i32 = 12;
pub const NAMESPACE_NODE: i32 = 13;

pub const NTYPES: i32 = 14;
pub const NO_TYPE: i32 = -1;

/// Namespace id for nodes in no namespace, or in one the translet never
/// registered.
pub const NO_NAMESPACE: i32 = 0;

/// Fixed local slots: the receiver, and the first parameter, which is the
/// driving iterator for dispatch methods and the root for `transform`.
pub const THIS_SLOT: u16 = 0;
pub const ITERATOR_SLOT: u16 = 1;
