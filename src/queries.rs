//! Query-set provider: splits a SQL file into individual queries.

use anyhow::Context;
use bench_core::Query;
use std::path::Path;
use tracing::info;

pub const QUERY_START: &str = "-- QUERY_START";
pub const QUERY_END: &str = "-- QUERY_END";

pub fn load_queries(path: &Path) -> anyhow::Result<Vec<Query>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file: {path:?}"))?;
    let queries = parse_queries(&text);
    if queries.is_empty() {
        anyhow::bail!("No queries found in {path:?}");
    }
    info!("Loaded {} queries from {:?}", queries.len(), path);
    Ok(queries)
}

/// Split `text` into queries, by marker blocks when present, otherwise on `;`.
pub fn parse_queries(text: &str) -> Vec<Query> {
    let raw = if text.lines().any(|l| l.trim() == QUERY_START) {
        split_marked(text)
    } else {
        split_statements(text)
    };
    raw.into_iter()
        .filter(|q| !is_blank(q))
        .map(Query::new)
        .collect()
}

/// Blocks between `-- QUERY_START` and `-- QUERY_END` lines; text outside is ignored.
fn split_marked(text: &str) -> Vec<String> {
    let mut queries = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in text.lines() {
        match line.trim() {
            QUERY_START => current = Some(Vec::new()),
            QUERY_END => {
                if let Some(lines) = current.take() {
                    queries.push(lines.join("\n"));
                }
            }
            _ => {
                if let Some(lines) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }
    if let Some(lines) = current {
        queries.push(lines.join("\n"));
    }
    queries
}

/// Split on `;` outside quotes and comments. Each piece keeps its semicolon.
fn split_statements(text: &str) -> Vec<String> {
    let mut queries = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut line_comment = false;
    let mut block_comment = false;

    while let Some(c) = chars.next() {
        current.push(c);
        if line_comment {
            if c == '\n' {
                line_comment = false;
            }
        } else if block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                current.push('/');
                chars.next();
                block_comment = false;
            }
        } else if let Some(q) = quote {
            if c == q {
                // Doubled quote is an escaped quote
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
        } else {
            match c {
                '\'' | '"' | '`' => quote = Some(c),
                '-' if chars.peek() == Some(&'-') => line_comment = true,
                '/' if chars.peek() == Some(&'*') => block_comment = true,
                ';' => queries.push(std::mem::take(&mut current)),
                _ => {}
            }
        }
    }
    queries.push(current);
    queries
}

/// Only whitespace, semicolons and comments.
fn is_blank(query: &str) -> bool {
    strip_comments(query)
        .chars()
        .all(|c| c.is_whitespace() || c == ';')
}

fn strip_comments(query: &str) -> String {
    let mut out = String::new();
    let mut chars = query.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}
