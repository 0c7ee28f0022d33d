/// Try to get a keyword from a string, ignoring string casing.
pub fn keyword_from_str(s: &str) -> Option<Keyword> {
    let s = unicase::Ascii::new(s);
    let idx = match KEYWORD_STRINGS.binary_search(&s) {
        Ok(idx) => idx,
        Err(_) => return None,
    };
    Some(ALL_KEYWORDS[idx])
}

/// Generate an enum of keywords.
///
/// Keywords must be provided in sorted order.
macro_rules! define_keywords {
    ($($ident:ident),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($ident),*
        }

        pub const ALL_KEYWORDS: &[Keyword] = &[
            $(Keyword::$ident),*
        ];

        pub const KEYWORD_STRINGS: &[unicase::Ascii<&'static str>] = &[
            $(unicase::Ascii::new(stringify!($ident)),)*
        ];
    };
}

#[rustfmt::skip]
define_keywords!(
    ALL,
    AND,
    AS,
    ASC,
    BY,
    CAST,
    CONTINUOUS,
    CREATE,
    CUBE,
    DESC,
    DISTINCT,
    FALSE,
    FILTER,
    FIRST,
    FROM,
    GROUP,
    GROUPING,
    HAVING,
    INTERVAL,
    IS,
    LAST,
    LIMIT,
    NOT,
    NULL,
    NULLS,
    OFFSET,
    ON,
    OR,
    ORDER,
    OVER,
    PARTITION,
    ROLLUP,
    SELECT,
    SETS,
    TIMESTAMP,
    TRUE,
    VIEW,
    WHERE,
    WITH,
    WITHIN
);

/// Keywords that cannot start an expression when encountered as a bare word.
pub const RESERVED_KEYWORDS: &[Keyword] = &[
    Keyword::ALL,
    Keyword::AND,
    Keyword::AS,
    Keyword::ASC,
    Keyword::BY,
    Keyword::CREATE,
    Keyword::DESC,
    Keyword::DISTINCT,
    Keyword::FROM,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::IS,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::ON,
    Keyword::OR,
    Keyword::ORDER,
    Keyword::SELECT,
    Keyword::WHERE,
    Keyword::WITH,
];

/// Keywords that cannot be used as an implicit column alias.
pub const RESERVED_FOR_COLUMN_ALIAS: &[Keyword] = &[
    Keyword::AND,
    Keyword::AS,
    Keyword::ASC,
    Keyword::BY,
    Keyword::DESC,
    Keyword::FILTER,
    Keyword::FROM,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::IS,
    Keyword::LIMIT,
    Keyword::NOT,
    Keyword::NULLS,
    Keyword::OFFSET,
    Keyword::ON,
    Keyword::OR,
    Keyword::ORDER,
    Keyword::OVER,
    Keyword::SELECT,
    Keyword::WHERE,
    Keyword::WITH,
    Keyword::WITHIN,
];

/// Keywords that cannot be used as an implicit table alias.
pub const RESERVED_FOR_TABLE_ALIAS: &[Keyword] = RESERVED_FOR_COLUMN_ALIAS;
