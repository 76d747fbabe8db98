//! Token kinds and source locations produced by the [`super::Lexer`].

use std::fmt;

/// A `(line, column)` position, both zero-based, plus the byte offset they
/// were derived from. Cheap to carry around on every token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Integer literal base, kept only to let diagnostics and the formatter
/// round-trip `0x` spellings; semantically every integer literal is `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBase {
    Decimal,
    Hex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // literals
    Integer { value: u64, base: IntBase },
    StringLiteral(String),
    CharLiteral(char),
    Identifier(String),

    // keywords
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
    Float128,
    BuiltinVaList,
    Struct,
    Union,
    Enum,
    Typedef,
    Const,
    Volatile,
    Restrict,
    Extern,
    Static,
    Auto,
    Register,
    ThreadLocal,
    Inline,
    Sizeof,
    Alignof,
    If,
    Else,
    While,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    StaticAssert,
    True,
    False,
    PrettyFunction,
    Asm,
    Attribute,
    Extension,

    // punctuation / operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Colon,
    Dot,
    Ellipsis,
    Arrow,
    Question,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,

    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    Slash,
    Percent,
    Bang,
    NotEqual,
    Equal,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Tilde,
    Lt,
    Le,
    Shl,
    Gt,
    Ge,
    Shr,

    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, location: Location) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            location,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.lexeme)
    }
}

/// The fixed keyword table, including the GCC spellings from spec.md §4.1.
/// Built once behind a `Lazy` rather than re-matched per lookup, since the
/// table never changes after startup.
static KEYWORDS: once_cell::sync::Lazy<std::collections::HashMap<&'static str, TokenKind>> =
    once_cell::sync::Lazy::new(|| {
        use TokenKind::*;
        std::collections::HashMap::from([
            ("void", Void),
            ("char", Char),
            ("short", Short),
            ("int", Int),
            ("long", Long),
            ("float", Float),
            ("double", Double),
            ("signed", Signed),
            ("unsigned", Unsigned),
            ("_Bool", Bool),
            ("_Complex", Complex),
            ("__float128", Float128),
            ("__builtin_va_list", BuiltinVaList),
            ("struct", Struct),
            ("union", Union),
            ("enum", Enum),
            ("typedef", Typedef),
            ("const", Const),
            ("volatile", Volatile),
            ("restrict", Restrict),
            ("__restrict", Restrict),
            ("extern", Extern),
            ("static", Static),
            ("auto", Auto),
            ("register", Register),
            ("_Thread_local", ThreadLocal),
            ("inline", Inline),
            ("__inline", Inline),
            ("sizeof", Sizeof),
            ("_Alignof", Alignof),
            ("alignof", Alignof),
            ("if", If),
            ("else", Else),
            ("while", While),
            ("for", For),
            ("switch", Switch),
            ("case", Case),
            ("default", Default),
            ("break", Break),
            ("continue", Continue),
            ("return", Return),
            ("_Static_assert", StaticAssert),
            ("static_assert", StaticAssert),
            ("true", True),
            ("false", False),
            ("__PRETTY_FUNCTION__", PrettyFunction),
            ("__asm__", Asm),
            ("asm", Asm),
            ("__attribute__", Attribute),
            ("__extension__", Extension),
        ])
    });

pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    KEYWORDS.get(ident).cloned()
}
