//! Lifecycle handshake and document synchronization.
//!
//! Sync is full-text: every didChange carries the whole document, so state
//! is one string per open URI.

use std::path::PathBuf;

use lsp_server::{RequestId, Response};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    ExecuteCommandOptions, HoverProviderCapability, InitializeParams, OneOf, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind, Url,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{cast, invalid_params, Server, SERVER_NAME};
use crate::uri;

const FILE_STATUS_METHOD: &str = "textDocument/clangd.fileStatus";

#[allow(deprecated)] // rootUri and rootPath both still arrive from clients
pub(super) fn on_initialize(server: &mut Server, id: RequestId, params: Value) {
    let Some(params) = cast::<InitializeParams>(params) else {
        server.respond(invalid_params(id));
        return;
    };

    server.root = params
        .root_uri
        .as_ref()
        .and_then(uri::uri_to_path)
        .or_else(|| params.root_path.clone().map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .map(|p| uri::normalize(&p));

    server.file_status = params
        .initialization_options
        .as_ref()
        .and_then(|opts| opts.get("clangdFileStatus"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let capabilities = ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        references_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: Vec::new(),
            work_done_progress_options: Default::default(),
        }),
        ..Default::default()
    };
    let result = json!({
        "capabilities": capabilities,
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
    });

    info!(
        root = ?server.root,
        file_status = server.file_status,
        files = server.config.serve_files.len(),
        "initialized"
    );
    server.respond(Response::new_ok(id, result));
}

pub(super) fn on_did_open(server: &mut Server, params: Value) {
    let Some(params) = cast::<DidOpenTextDocumentParams>(params) else {
        return;
    };
    let uri = params.text_document.uri;
    debug!(uri = %uri, len = params.text_document.text.len(), "did open");
    server.docs.insert(uri.clone(), params.text_document.text);
    notify_file_status(server, &uri);
}

pub(super) fn on_did_change(server: &mut Server, params: Value) {
    let Some(params) = cast::<DidChangeTextDocumentParams>(params) else {
        return;
    };
    let uri = params.text_document.uri;
    // Full sync: the last change event carries the complete new text.
    let Some(change) = params.content_changes.into_iter().next_back() else {
        return;
    };
    debug!(uri = %uri, len = change.text.len(), "did change");
    server.docs.insert(uri.clone(), change.text);
    notify_file_status(server, &uri);
}

pub(super) fn on_did_close(server: &mut Server, params: Value) {
    let Some(params) = cast::<DidCloseTextDocumentParams>(params) else {
        return;
    };
    debug!(uri = %params.text_document.uri, "did close");
    server.docs.remove(&params.text_document.uri);
}

/// There is no real indexing pipeline, so every file is reported Idle the
/// moment the client touches it. vscode-clangd uses this to clear its
/// activity spinner.
fn notify_file_status(server: &Server, uri: &Url) {
    if !server.file_status {
        return;
    }
    server.notify(FILE_STATUS_METHOD, json!({ "uri": uri, "state": "Idle" }));
}
