/// A per-client predicate tested against each published notification payload.
///
/// A notification payload always has the shape `"ACTION ARG"`; the three variants each test a
/// different part of that shape. See the trait impl below for the exact semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// The whole payload must equal this string exactly.
    Match(String),
    /// This string must be a literal prefix of the payload, of exactly its own length — used to
    /// match the leading action token regardless of what follows it.
    Action(String),
    /// Same as `Action`, but the matched prefix must additionally be followed by a space (i.e.
    /// it matches the action token only, never a token that merely starts with it).
    Prefix(String),
}

/// Wire-level filter type tag, used in `NOTIFY ADD_FILTER <type> <body>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Match = 1,
    Action = 2,
    Prefix = 3,
}

impl FilterType {
    pub fn from_u8(v: u8) -> Option<FilterType> {
        match v {
            1 => Some(FilterType::Match),
            2 => Some(FilterType::Action),
            3 => Some(FilterType::Prefix),
            _ => None,
        }
    }
}

impl Filter {
    pub fn new(kind: FilterType, body: impl Into<String>) -> Filter {
        let body = body.into();
        match kind {
            FilterType::Match => Filter::Match(body),
            FilterType::Action => Filter::Action(body),
            FilterType::Prefix => Filter::Prefix(body),
        }
    }

    /// Test this filter against a notification payload of the form `"ACTION ARG"`.
    pub fn matches(&self, payload: &str) -> bool {
        match self {
            Filter::Match(body) => payload == body,
            Filter::Action(body) => payload.as_bytes().starts_with(body.as_bytes()),
            Filter::Prefix(body) => {
                payload.as_bytes().starts_with(body.as_bytes())
                    && payload.as_bytes().get(body.len()) == Some(&b' ')
            }
        }
    }
}

/// Tests `filters` against `payload`; a client with no filters at all matches nothing.
pub fn any_matches(filters: &[Filter], payload: &str) -> bool {
    filters.iter().any(|f| f.matches(payload))
}
