//! Navigation request handlers. Each runs on a task thread and turns a
//! cursor (or query string) into grep results, then into protocol payloads.

use std::path::{Path, PathBuf};

use lsp_types::{
    Hover, HoverContents, Location, MarkupContent, MarkupKind, Position, Range, SymbolKind, Url,
};
use serde_json::Value;
use tracing::debug;

use crate::heuristics;
use crate::rank::{self, RankedMatch, STRONG_DEFINITION_SCORE};
use crate::search::{CancelHandle, GrepMatch, SearchInvocation, SearchScope, TextSearch};
use crate::uri;

// Caps keep worst-case latency bounded on common identifiers. Hover only
// needs the best hit; references tolerate the largest sweep.
const MAX_HOVER_RESULTS: usize = 20;
const MAX_DEFINITION_RESULTS: usize = 50;
const MAX_REFERENCE_RESULTS: usize = 100;
const MAX_WORKSPACE_SYMBOL_RESULTS: usize = 50;

/// Snapshot of the cursor taken on the main thread, self-contained so the
/// task thread needs no access to server state.
pub(super) struct CursorQuery {
    pub uri: Url,
    pub text: String,
    pub line0: u32,
    pub ch0: u32,
}

pub(super) enum TaskKind {
    Hover(CursorQuery),
    Definition(CursorQuery),
    References(CursorQuery),
    WorkspaceSymbol { query: String },
}

impl TaskKind {
    pub(super) fn label(&self) -> &'static str {
        match self {
            Self::Hover(_) => "hover",
            Self::Definition(_) => "definition",
            Self::References(_) => "references",
            Self::WorkspaceSymbol { .. } => "symbol",
        }
    }
}

/// Where to point grep, fixed at spawn time.
#[derive(Clone)]
pub(super) struct ScopeConfig {
    pub root: Option<PathBuf>,
    pub serve_files: Vec<PathBuf>,
}

impl ScopeConfig {
    fn invocation(&self, needle: &str, max_results: usize) -> Option<SearchInvocation> {
        let scope = if self.serve_files.is_empty() {
            SearchScope::Directory(self.root.clone()?)
        } else {
            SearchScope::Files(self.serve_files.clone())
        };
        Some(SearchInvocation {
            needle: needle.to_string(),
            scope,
            max_results,
        })
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => uri::absolutize(root, path),
            None => uri::normalize(path),
        }
    }
}

pub(super) fn execute(
    kind: &TaskKind,
    scope: &ScopeConfig,
    search: &dyn TextSearch,
    cancel: &CancelHandle,
) -> Value {
    match kind {
        TaskKind::Hover(q) => hover(q, scope, search, cancel),
        TaskKind::Definition(q) => definition(q, scope, search, cancel),
        TaskKind::References(q) => references(q, scope, search, cancel),
        TaskKind::WorkspaceSymbol { query } => workspace_symbol(query, scope, search, cancel),
    }
}

/// The identifier under the cursor, unless it sits in a comment or is a
/// keyword not worth searching for.
fn cursor_symbol(q: &CursorQuery) -> Option<&str> {
    if heuristics::is_in_line_comment(&q.text, q.line0, q.ch0) {
        return None;
    }
    let sym = heuristics::word_at(&q.text, q.line0, q.ch0)?;
    if heuristics::is_stop_word(sym) {
        return None;
    }
    Some(sym)
}

fn run_search(
    needle: &str,
    max_results: usize,
    scope: &ScopeConfig,
    search: &dyn TextSearch,
    cancel: &CancelHandle,
) -> Vec<GrepMatch> {
    let Some(invocation) = scope.invocation(needle, max_results) else {
        debug!("no search scope configured");
        return Vec::new();
    };
    search.search(&invocation, cancel)
}

fn cursor_path(q: &CursorQuery) -> Option<PathBuf> {
    uri::uri_to_path(&q.uri).map(|p| uri::normalize(&p))
}

fn hover(q: &CursorQuery, scope: &ScopeConfig, search: &dyn TextSearch, cancel: &CancelHandle) -> Value {
    let Some(sym) = cursor_symbol(q) else {
        return Value::Null;
    };
    let cur_path = cursor_path(q);
    let matches = run_search(sym, MAX_HOVER_RESULTS, scope, search, cancel);
    let current = cur_path.as_deref().map(|p| (p, q.line0 + 1));
    let ranked = rank::rank_and_filter(matches, sym, current, cur_path.as_deref(), |p| {
        scope.absolutize(p)
    });
    let Some(best) = ranked.first() else {
        return Value::Null;
    };

    let value = format!(
        "**{}** (grep)\n\nFound `{}:{}`\n\n```cpp\n{}\n```",
        super::SERVER_NAME,
        best.abs_path.display(),
        best.m.line,
        best.m.text
    );
    let cursor = Position::new(q.line0, q.ch0);
    let hover = Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(Range::new(cursor, cursor)),
    };
    serde_json::to_value(hover).unwrap_or(Value::Null)
}

fn definition(
    q: &CursorQuery,
    scope: &ScopeConfig,
    search: &dyn TextSearch,
    cancel: &CancelHandle,
) -> Value {
    let Some(sym) = cursor_symbol(q) else {
        return Value::Null;
    };
    let cur_path = cursor_path(q);
    let matches = run_search(sym, MAX_DEFINITION_RESULTS, scope, search, cancel);
    let current = cur_path.as_deref().map(|p| (p, q.line0 + 1));
    let ranked = rank::rank_and_filter(matches, sym, current, cur_path.as_deref(), |p| {
        scope.absolutize(p)
    });
    if ranked.is_empty() {
        return Value::Null;
    }

    // One confident hit collapses to a single jump target; otherwise the
    // client gets the full ranked list to choose from.
    let strong: Vec<&RankedMatch> = ranked
        .iter()
        .filter(|r| r.score >= STRONG_DEFINITION_SCORE)
        .collect();
    let locations: Vec<Location> = if strong.len() == 1 {
        strong.into_iter().filter_map(|r| location(r, sym)).collect()
    } else {
        ranked.iter().filter_map(|r| location(r, sym)).collect()
    };
    serde_json::to_value(locations).unwrap_or(Value::Null)
}

fn references(
    q: &CursorQuery,
    scope: &ScopeConfig,
    search: &dyn TextSearch,
    cancel: &CancelHandle,
) -> Value {
    let Some(sym) = cursor_symbol(q) else {
        return Value::Array(Vec::new());
    };
    let cur_path = cursor_path(q);
    let matches = run_search(sym, MAX_REFERENCE_RESULTS, scope, search, cancel);
    let current = cur_path.as_deref().map(|p| (p, q.line0 + 1));
    let ranked = rank::rank_and_filter(matches, sym, current, cur_path.as_deref(), |p| {
        scope.absolutize(p)
    });
    let locations: Vec<Location> = ranked.iter().filter_map(|r| location(r, sym)).collect();
    serde_json::to_value(locations).unwrap_or(Value::Null)
}

fn workspace_symbol(
    query: &str,
    scope: &ScopeConfig,
    search: &dyn TextSearch,
    cancel: &CancelHandle,
) -> Value {
    if query.is_empty() {
        return Value::Array(Vec::new());
    }
    let matches = run_search(query, MAX_WORKSPACE_SYMBOL_RESULTS, scope, search, cancel);
    let ranked = rank::rank_and_filter(matches, query, None, None, |p| scope.absolutize(p));

    let symbols: Vec<lsp_types::SymbolInformation> = ranked
        .iter()
        .filter_map(|r| {
            let location = location(r, query)?;
            #[allow(deprecated)]
            let sym = lsp_types::SymbolInformation {
                name: query.to_string(),
                kind: SymbolKind::VARIABLE,
                tags: None,
                deprecated: None,
                location,
                container_name: Some(r.abs_path.display().to_string()),
            };
            Some(sym)
        })
        .collect();
    serde_json::to_value(symbols).unwrap_or(Value::Null)
}

fn location(r: &RankedMatch, needle: &str) -> Option<Location> {
    let uri = uri::path_to_uri(&r.abs_path)?;
    let line0 = r.m.line.saturating_sub(1);
    let column = r.m.column.unwrap_or(0);
    Some(Location {
        uri,
        range: Range::new(
            Position::new(line0, column),
            Position::new(line0, column + needle.len() as u32),
        ),
    })
}
