//! The in-container driver script and its line protocol.
//!
//! `ping` opens the database file, runs `SELECT 1` and exits; the readiness probe
//! uses it. `serve` keeps one DuckDB connection open and answers one JSON request
//! per stdin line with one JSON reply per stdout line. A failed statement replies
//! `{"error": "..."}` and the session stays usable.

use serde::{Deserialize, Serialize};

pub(crate) const PYTHON: &str = "python";

/// NULL marker in CSV sent with `copy`.
pub(crate) const NULL_MARKER: &str = "\\N";

pub(crate) const DRIVER_SCRIPT: &str = r#"
import json
import os
import sys
import tempfile

import duckdb


def copy(con, req):
    for statement in req["prelude"]:
        con.execute(statement)
    with tempfile.NamedTemporaryFile("w", suffix=".csv", delete=False) as f:
        f.write(req["csv"])
        csv_path = f.name
    try:
        con.execute(
            f"COPY {req['table']} FROM '{csv_path}' "
            "(FORMAT CSV, HEADER false, NULLSTR '\\N', ALLOW_QUOTED_NULLS false)"
        )
    finally:
        os.unlink(csv_path)
    return {"count": int(con.execute(f"SELECT COUNT(*) FROM {req['table']}").fetchone()[0])}


def handle(con, req):
    op = req["op"]
    if op == "exec":
        con.execute(req["sql"])
        return {"ok": True}
    if op == "query":
        cur = con.execute(req["sql"])
        rows = cur.fetchall() if cur.description else []
        size = sum(len(str(v)) for row in rows for v in row if v is not None)
        sample = [["NULL" if v is None else str(v) for v in row] for row in rows[: req["sample"]]]
        return {"rows": len(rows), "size_bytes": size, "sample": sample}
    if op == "count":
        return {"count": int(con.execute(req["sql"]).fetchone()[0])}
    if op == "copy":
        return copy(con, req)
    raise ValueError(f"unknown op {op}")


def serve(path):
    con = duckdb.connect(path)
    try:
        while True:
            line = sys.stdin.readline()
            if not line:
                break
            try:
                out = handle(con, json.loads(line))
            except Exception as e:
                out = {"error": f"{type(e).__name__}: {e}"}
            sys.stdout.write(json.dumps(out) + "\n")
            sys.stdout.flush()
    finally:
        con.close()


def ping(path):
    con = duckdb.connect(path)
    try:
        con.execute("SELECT 1").fetchall()
    finally:
        con.close()


try:
    mode, path = sys.argv[1], sys.argv[2]
    if mode == "serve":
        serve(path)
    elif mode == "ping":
        ping(path)
    else:
        raise ValueError(f"unknown mode {mode}")
except Exception as e:
    print(f"{type(e).__name__}: {e}", file=sys.stderr)
    sys.exit(1)
"#;

/// Driver process modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Ping,
    Serve,
}

impl DriverMode {
    /// Full `exec` argv against the database file at `path`.
    pub fn argv(self, path: &str) -> Vec<String> {
        let mode = match self {
            DriverMode::Ping => "ping",
            DriverMode::Serve => "serve",
        };
        vec![
            PYTHON.to_string(),
            "-c".to_string(),
            DRIVER_SCRIPT.to_string(),
            mode.to_string(),
            path.to_string(),
        ]
    }
}

/// One request line of a `serve` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request<'a> {
    Exec {
        sql: &'a str,
    },
    Query {
        sql: &'a str,
        sample: usize,
    },
    Count {
        sql: &'a str,
    },
    /// Run `prelude`, then `COPY` the headerless `csv` into `table`.
    Copy {
        table: &'a str,
        prelude: Vec<String>,
        csv: &'a str,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryOutput {
    pub rows: u64,
    pub size_bytes: u64,
    #[serde(default)]
    pub sample: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountOutput {
    pub count: u64,
}
