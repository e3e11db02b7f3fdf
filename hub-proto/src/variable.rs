use std::fmt;
use std::str::FromStr;

/// One declared variable, as read from the schema file: its name, default value, and the two
/// flags that never change after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub default: f64,
    pub persistent: bool,
    pub read_only: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, default: f64, persistent: bool, read_only: bool) -> Self {
        Variable {
            name: name.into(),
            default,
            persistent,
            read_only,
        }
    }
}

/// The full set of variables a hub instance knows about, as declared at startup.
///
/// The schema is fixed for the lifetime of the process: no variable is ever added or removed
/// after the hub finishes starting up.
#[derive(Debug, Clone, Default)]
pub struct VariableSchema {
    pub entries: Vec<Variable>,
}

impl VariableSchema {
    pub fn parse(text: &str) -> Result<VariableSchema, SchemaParseError> {
        let mut entries = Vec::new();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let entry = parse_entry(line).map_err(|reason| SchemaParseError {
                line: lineno + 1,
                reason,
            })?;
            entries.push(entry);
        }

        Ok(VariableSchema { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.entries.iter().find(|v| v.name == name)
    }
}

fn parse_entry(line: &str) -> Result<Variable, String> {
    let (name, rest) = line
        .split_once('=')
        .ok_or_else(|| "expected `name = default, persistent, readonly`".to_owned())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("variable name is empty".to_owned());
    }

    let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(format!(
            "expected 3 comma-separated fields after `=`, found {}",
            fields.len()
        ));
    }

    let default = f64::from_str(fields[0]).map_err(|_| format!("bad default `{}`", fields[0]))?;
    let persistent = parse_bool_flag(fields[1])?;
    let read_only = parse_bool_flag(fields[2])?;

    Ok(Variable::new(name, default, persistent, read_only))
}

fn parse_bool_flag(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("expected 0 or 1, found `{}`", other)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaParseError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for SchemaParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for SchemaParseError {}
