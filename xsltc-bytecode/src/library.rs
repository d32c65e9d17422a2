/// Core library functions the runtime implements directly. Context
/// dependent functions (`position()`, `last()`, `current()`) compile to
/// iterator and local access instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToPrimitive, FromPrimitive)]
pub enum Builtin {
    Count,
    Sum,
    Id,
    Key,
    LocalName,
    NamespaceUri,
    Name,
    GenerateId,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring2,
    Substring3,
    StringLength,
    NormalizeSpace,
    Translate,
    Lang,
    Floor,
    Ceiling,
    Round,
    FormatNumber,
    SystemProperty,
    UnparsedEntityUri,
}

impl Builtin {
    pub fn arity(self) -> usize {
        match self {
            Builtin::Count
            | Builtin::Sum
            | Builtin::Id
            | Builtin::LocalName
            | Builtin::NamespaceUri
            | Builtin::Name
            | Builtin::GenerateId
            | Builtin::StringLength
            | Builtin::NormalizeSpace
            | Builtin::Floor
            | Builtin::Ceiling
            | Builtin::Round
            | Builtin::SystemProperty
            | Builtin::UnparsedEntityUri => 1,
            Builtin::Key
            | Builtin::StartsWith
            | Builtin::Contains
            | Builtin::SubstringBefore
            | Builtin::SubstringAfter
            | Builtin::Substring2
            | Builtin::Lang
            | Builtin::FormatNumber => 2,
            Builtin::Substring3 | Builtin::Translate => 3,
        }
    }

    pub fn id(self) -> u16 {
        num_traits::ToPrimitive::to_u16(&self).unwrap_or(u16::MAX)
    }

    pub fn from_id(id: u16) -> Option<Builtin> {
        num_traits::FromPrimitive::from_u16(id)
    }
}
