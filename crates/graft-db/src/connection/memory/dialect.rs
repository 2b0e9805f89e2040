//! Recognizer for the statement dialect graft emits.
//!
//! The in-memory engine does not implement SQL or Cypher. It understands the
//! fixed statement shapes produced by the staging layout and the statement
//! generator, one clause per line inside the `cypher()` body:
//!
//! ```text
//! SELECT * FROM cypher('g', $$
//! UNWIND s.f('key') AS row
//! CREATE (v:Label {p: row.p})
//! RETURN count(v)
//! $$) AS (created agtype)
//! ```
//!
//! Anything else is rejected as unsupported.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DbError, DbResult};

// ============================================================================
// Commands
// ============================================================================

/// A recognized statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
    /// `LOAD 'age'`, `SET search_path ...`
    SessionSetup,
    CreateSchema(String),
    CreateTable(String),
    CreateFunction { function: String, table: String },
    StagePut { table: String },
    StageGet { table: String },
    StageDelete { table: String },
    StageDeletePrefix { table: String },
    Cypher(CypherQuery),
}

/// A recognized `cypher()` call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CypherQuery {
    pub graph: String,
    /// Qualified retrieval function.
    pub function: String,
    pub key: String,
    pub action: CypherAction,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CypherAction {
    CreateVertices {
        label: String,
        properties: Vec<PropertyBinding>,
    },
    CreateEdges {
        from: EndpointMatch,
        to: EndpointMatch,
        label: String,
        properties: Vec<PropertyBinding>,
    },
    ProbeEndpoints {
        from: EndpointMatch,
        to: EndpointMatch,
    },
}

/// `(a:Label {id: row.from})`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EndpointMatch {
    pub label: Option<String>,
    pub id_property: String,
}

/// `name: row.path.to.value`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PropertyBinding {
    pub target: String,
    pub path: Vec<String>,
}

// ============================================================================
// Patterns
// ============================================================================

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            CELL.get_or_init(|| Regex::new($re).expect("Invalid regex"))
        }
    };
}

pattern!(savepoint_re, r"^SAVEPOINT (\w+)$");
pattern!(release_re, r"^RELEASE SAVEPOINT (\w+)$");
pattern!(rollback_to_re, r"^ROLLBACK TO SAVEPOINT (\w+)$");
pattern!(create_schema_re, r"^CREATE SCHEMA IF NOT EXISTS (\w+)$");
pattern!(create_table_re, r"^CREATE TABLE IF NOT EXISTS (\w+\.\w+) \(");
pattern!(
    create_function_re,
    r"(?s)^CREATE OR REPLACE FUNCTION (\w+\.\w+)\(.*\bFROM (\w+\.\w+) WHERE"
);
pattern!(
    stage_put_re,
    r"^INSERT INTO (\w+\.\w+) \(key, value\) VALUES \(\$1, \$2\) ON CONFLICT \(key\) DO UPDATE SET value = EXCLUDED\.value$"
);
pattern!(stage_get_re, r"^SELECT value FROM (\w+\.\w+) WHERE key = \$1$");
pattern!(
    stage_delete_re,
    r"^DELETE FROM (\w+\.\w+) WHERE key = \$1 RETURNING key$"
);
pattern!(
    stage_delete_prefix_re,
    r"^DELETE FROM (\w+\.\w+) WHERE starts_with\(key, \$1\) RETURNING key$"
);
pattern!(
    cypher_re,
    r"(?s)^SELECT \* FROM cypher\('(\w+)', \$\$(.*)\$\$\) AS \(.*\)$"
);
pattern!(
    unwind_re,
    r"^UNWIND (\w+\.\w+)\('([A-Za-z0-9_-]+)'\) AS row$"
);
pattern!(create_vertex_re, r"^CREATE \(v:(\w+)(?: \{(.*)\})?\)$");
pattern!(
    match_pair_re,
    r"^MATCH \(a(?::(\w+))? \{(.+?): row\.from\}\), \(b(?::(\w+))? \{(.+?): row\.to\}\)$"
);
pattern!(
    optional_from_re,
    r"^OPTIONAL MATCH \(a(?::(\w+))? \{(.+?): row\.from\}\)$"
);
pattern!(
    optional_to_re,
    r"^OPTIONAL MATCH \(b(?::(\w+))? \{(.+?): row\.to\}\)$"
);
pattern!(create_edge_re, r"^CREATE \(a\)-\[e:(\w+)(?: \{(.*)\})?\]->\(b\)$");

// ============================================================================
// Parsing
// ============================================================================

/// Recognize a statement.
pub(crate) fn parse(text: &str) -> DbResult<Command> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();

    match upper.as_str() {
        "BEGIN" | "START TRANSACTION" => return Ok(Command::Begin),
        "COMMIT" => return Ok(Command::Commit),
        "ROLLBACK" => return Ok(Command::Rollback),
        _ => {}
    }
    if upper == "LOAD 'AGE'" || upper.starts_with("SET SEARCH_PATH") {
        return Ok(Command::SessionSetup);
    }

    if let Some(c) = savepoint_re().captures(text) {
        return Ok(Command::Savepoint(c[1].to_string()));
    }
    if let Some(c) = release_re().captures(text) {
        return Ok(Command::ReleaseSavepoint(c[1].to_string()));
    }
    if let Some(c) = rollback_to_re().captures(text) {
        return Ok(Command::RollbackToSavepoint(c[1].to_string()));
    }
    if let Some(c) = create_schema_re().captures(text) {
        return Ok(Command::CreateSchema(c[1].to_string()));
    }
    if let Some(c) = create_table_re().captures(text) {
        return Ok(Command::CreateTable(c[1].to_string()));
    }
    if let Some(c) = create_function_re().captures(text) {
        return Ok(Command::CreateFunction {
            function: c[1].to_string(),
            table: c[2].to_string(),
        });
    }
    if let Some(c) = stage_put_re().captures(text) {
        return Ok(Command::StagePut {
            table: c[1].to_string(),
        });
    }
    if let Some(c) = stage_get_re().captures(text) {
        return Ok(Command::StageGet {
            table: c[1].to_string(),
        });
    }
    if let Some(c) = stage_delete_re().captures(text) {
        return Ok(Command::StageDelete {
            table: c[1].to_string(),
        });
    }
    if let Some(c) = stage_delete_prefix_re().captures(text) {
        return Ok(Command::StageDeletePrefix {
            table: c[1].to_string(),
        });
    }
    if let Some(c) = cypher_re().captures(text) {
        return parse_cypher(&c[1], &c[2], text).map(Command::Cypher);
    }

    Err(DbError::unsupported(text))
}

fn parse_cypher(graph: &str, body: &str, text: &str) -> DbResult<CypherQuery> {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let unsupported = || DbError::unsupported(text);

    let unwind = lines
        .first()
        .and_then(|line| unwind_re().captures(line))
        .ok_or_else(unsupported)?;
    let function = unwind[1].to_string();
    let key = unwind[2].to_string();

    let action = match &lines[1..] {
        [create, ret] if *ret == "RETURN count(v)" => {
            let c = create_vertex_re().captures(create).ok_or_else(unsupported)?;
            CypherAction::CreateVertices {
                label: c[1].to_string(),
                properties: parse_property_map(c.get(2).map_or("", |m| m.as_str()))?,
            }
        }
        [matched, create, ret] if *ret == "RETURN count(e)" => {
            let m = match_pair_re().captures(matched).ok_or_else(unsupported)?;
            let c = create_edge_re().captures(create).ok_or_else(unsupported)?;
            CypherAction::CreateEdges {
                from: EndpointMatch {
                    label: m.get(1).map(|l| l.as_str().to_string()),
                    id_property: unquote(&m[2]),
                },
                to: EndpointMatch {
                    label: m.get(3).map(|l| l.as_str().to_string()),
                    id_property: unquote(&m[4]),
                },
                label: c[1].to_string(),
                properties: parse_property_map(c.get(2).map_or("", |m| m.as_str()))?,
            }
        }
        [from, to, with, filter, ret]
            if *with == "WITH row, a, b"
                && *filter == "WHERE a IS NULL OR b IS NULL"
                && *ret == "RETURN row.from, row.to, a IS NULL, b IS NULL" =>
        {
            let f = optional_from_re().captures(from).ok_or_else(unsupported)?;
            let t = optional_to_re().captures(to).ok_or_else(unsupported)?;
            CypherAction::ProbeEndpoints {
                from: EndpointMatch {
                    label: f.get(1).map(|l| l.as_str().to_string()),
                    id_property: unquote(&f[2]),
                },
                to: EndpointMatch {
                    label: t.get(1).map(|l| l.as_str().to_string()),
                    id_property: unquote(&t[2]),
                },
            }
        }
        _ => return Err(unsupported()),
    };

    Ok(CypherQuery {
        graph: graph.to_string(),
        function,
        key,
        action,
    })
}

/// Parse `a: row.a, `b c`: row.props.`b c`` into bindings.
fn parse_property_map(map: &str) -> DbResult<Vec<PropertyBinding>> {
    let map = map.trim();
    if map.is_empty() {
        return Ok(Vec::new());
    }

    split_outside_backticks(map, ',')
        .into_iter()
        .map(|entry| {
            let parts = split_outside_backticks(entry.trim(), ':');
            let [name, expr] = parts.as_slice() else {
                return Err(DbError::unsupported(entry));
            };
            let segments = split_outside_backticks(expr.trim(), '.');
            match segments.split_first() {
                Some((head, rest)) if *head == "row" && !rest.is_empty() => Ok(PropertyBinding {
                    target: unquote(name.trim()),
                    path: rest.iter().map(|s| unquote(s)).collect(),
                }),
                _ => Err(DbError::unsupported(entry)),
            }
        })
        .collect()
}

fn split_outside_backticks(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        if c == '`' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Strip back-tick quoting, collapsing doubled back-ticks.
fn unquote(name: &str) -> String {
    let name = name.trim();
    if name.len() >= 2 && name.starts_with('`') && name.ends_with('`') {
        name[1..name.len() - 1].replace("``", "`")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction_control() {
        assert_eq!(parse("BEGIN").unwrap(), Command::Begin);
        assert_eq!(parse("commit").unwrap(), Command::Commit);
        assert_eq!(
            parse("SAVEPOINT graft_batch").unwrap(),
            Command::Savepoint("graft_batch".to_string())
        );
        assert_eq!(
            parse("ROLLBACK TO SAVEPOINT graft_batch").unwrap(),
            Command::RollbackToSavepoint("graft_batch".to_string())
        );
    }

    #[test]
    fn test_parse_vertex_create() {
        let text = "SELECT * FROM cypher('social', $$\n\
                    UNWIND graft_staging.get_staged_data('graft_x_Person_0') AS row\n\
                    CREATE (v:Person {id: row.id, `full name`: row.`full name`})\n\
                    RETURN count(v)\n\
                    $$) AS (created agtype)";
        let Command::Cypher(query) = parse(text).unwrap() else {
            panic!("expected cypher");
        };
        assert_eq!(query.graph, "social");
        assert_eq!(query.function, "graft_staging.get_staged_data");
        assert_eq!(query.key, "graft_x_Person_0");
        let CypherAction::CreateVertices { label, properties } = query.action else {
            panic!("expected vertex create");
        };
        assert_eq!(label, "Person");
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[1].target, "full name");
        assert_eq!(properties[1].path, vec!["full name".to_string()]);
    }

    #[test]
    fn test_parse_edge_create_without_labels() {
        let text = "SELECT * FROM cypher('g', $$\n\
                    UNWIND s.f('k') AS row\n\
                    MATCH (a {id: row.from}), (b {id: row.to})\n\
                    CREATE (a)-[e:KNOWS {since: row.props.since}]->(b)\n\
                    RETURN count(e)\n\
                    $$) AS (created agtype)";
        let Command::Cypher(query) = parse(text).unwrap() else {
            panic!("expected cypher");
        };
        let CypherAction::CreateEdges {
            from, label, properties, ..
        } = query.action
        else {
            panic!("expected edge create");
        };
        assert_eq!(from.label, None);
        assert_eq!(from.id_property, "id");
        assert_eq!(label, "KNOWS");
        assert_eq!(properties[0].path, vec!["props", "since"]);
    }

    #[test]
    fn test_unknown_statement_is_unsupported() {
        assert!(matches!(
            parse("DROP TABLE users"),
            Err(DbError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_split_respects_backticks() {
        assert_eq!(
            split_outside_backticks("a: row.a, `b, c`: row.`b, c`", ','),
            vec!["a: row.a", " `b, c`: row.`b, c`"]
        );
        assert_eq!(unquote("`we``ird`"), "we`ird");
    }
}
