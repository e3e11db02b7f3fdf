/// The first component of every message: which subsystem handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Comm,
    Notify,
    Var,
    Watch,
    Log,
}

impl Namespace {
    pub fn parse(s: &str) -> Option<Namespace> {
        match s {
            "COMM" => Some(Namespace::Comm),
            "NOTIFY" => Some(Namespace::Notify),
            "VAR" => Some(Namespace::Var),
            "WATCH" => Some(Namespace::Watch),
            "LOG" => Some(Namespace::Log),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Comm => "COMM",
            Namespace::Notify => "NOTIFY",
            Namespace::Var => "VAR",
            Namespace::Watch => "WATCH",
            Namespace::Log => "LOG",
        }
    }
}

/// Well-known verbs, grouped loosely by namespace. Not exhaustive of every string the
/// dispatcher recognizes (e.g. reply verbs `SUCCESS`/`FAILURE`/`VALUE` live only as string
/// literals at the call site), just the ones worth naming to avoid typos in multiple places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Auth,
    Shutdown,
    Out,
    AddFilter,
    ClearFilters,
    Get,
    Set,
    Add,
    Del,
}

impl Verb {
    pub fn parse(s: &str) -> Option<Verb> {
        match s {
            "AUTH" => Some(Verb::Auth),
            "SHUTDOWN" => Some(Verb::Shutdown),
            "OUT" => Some(Verb::Out),
            "ADD_FILTER" => Some(Verb::AddFilter),
            "CLEAR_FILTERS" => Some(Verb::ClearFilters),
            "GET" => Some(Verb::Get),
            "SET" => Some(Verb::Set),
            "ADD" => Some(Verb::Add),
            "DEL" => Some(Verb::Del),
            _ => None,
        }
    }
}
