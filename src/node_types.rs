//! Node-tree content types shared with guest code.
//!
//! Guest code identifies nodes by ordinal, so the order of [`ContentType::ALL`] is a
//! compatibility contract with the document tree: append new types, never reorder.

/// The kind of content held by a node in the document tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    Word,
    Whitespace,
    Call,
    Content,
    Dash,
    Glue,
    Verbatim,
}

impl ContentType {
    /// Every content type, in ordinal order.
    pub const ALL: [ContentType; 7] = [
        ContentType::Word,
        ContentType::Whitespace,
        ContentType::Call,
        ContentType::Content,
        ContentType::Dash,
        ContentType::Glue,
        ContentType::Verbatim,
    ];

    /// Name under which guest code sees this type.
    pub fn name(self) -> &'static str {
        match self {
            ContentType::Word => "WORD",
            ContentType::Whitespace => "WHITESPACE",
            ContentType::Call => "CALL",
            ContentType::Content => "CONTENT",
            ContentType::Dash => "DASH",
            ContentType::Glue => "GLUE",
            ContentType::Verbatim => "VERBATIM",
        }
    }

    /// Position in [`ContentType::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The content type at `ordinal`, if any.
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// The content type with the given uppercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}
