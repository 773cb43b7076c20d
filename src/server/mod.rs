//! The protocol loop: stdio transport, dispatch and cancellation.
//!
//! The main thread owns the read side and all mutable state. Every
//! navigation request runs on its own named thread so a slow grep never
//! blocks `$/cancelRequest` or document sync; responses funnel through one
//! writer channel.

mod requests;
mod sync;

use std::io::{self, BufRead, BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use lsp_server::{ErrorCode, Message, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    Cancel, DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument,
    DidOpenTextDocument, Exit, Initialized, Notification as _,
};
use lsp_types::request::{
    ExecuteCommand, GotoDefinition, HoverRequest, Initialize, References, Request as _, Shutdown,
    WorkspaceSymbolRequest,
};
use lsp_types::{NumberOrString, TextDocumentPositionParams, Url, WorkspaceSymbolParams};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::search::{CancelHandle, TextSearch};
use crate::uri;
use requests::{CursorQuery, ScopeConfig, TaskKind};

pub const SERVER_NAME: &str = "gclangd";

/// Custom methods without `lsp_types` constants.
const SWITCH_SOURCE_HEADER_METHOD: &str = "textDocument/switchSourceHeader";
const SET_TRACE_METHOD: &str = "$/setTrace";

pub struct ServerConfig {
    /// Explicit file list from the command line; empty means the workspace
    /// root is scanned recursively instead.
    pub serve_files: Vec<PathBuf>,
}

pub struct Server {
    config: ServerConfig,
    search: Arc<dyn TextSearch>,
    sender: mpsc::Sender<Message>,
    /// Open documents, newest full text per URI.
    docs: FxHashMap<Url, String>,
    /// Requests currently running on task threads.
    inflight: Arc<Mutex<FxHashMap<RequestId, Arc<CancelHandle>>>>,
    root: Option<PathBuf>,
    file_status: bool,
    shutdown_received: bool,
    exit_requested: bool,
}

/// Drains the response channel onto the transport. Runs on its own thread
/// so task threads never block on stdout.
pub fn writer_loop(rx: mpsc::Receiver<Message>, out: impl Write) {
    let mut writer = BufWriter::new(out);
    while let Ok(msg) = rx.recv() {
        if msg.write(&mut writer).is_err() {
            break;
        }
    }
}

impl Server {
    pub fn new(
        config: ServerConfig,
        search: Arc<dyn TextSearch>,
        sender: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            config,
            search,
            sender,
            docs: FxHashMap::default(),
            inflight: Arc::new(Mutex::new(FxHashMap::default())),
            root: None,
            file_status: false,
            shutdown_received: false,
            exit_requested: false,
        }
    }

    /// Reads messages until `exit` or the stream ends. The exit code is 0
    /// only when `shutdown` was received first, per the protocol.
    pub fn run(&mut self, reader: &mut impl BufRead) -> i32 {
        loop {
            let msg = match Message::read(reader) {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    warn!("client closed the stream without exit");
                    break;
                }
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    warn!(error = %err, "skipping malformed message");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "transport read failed");
                    break;
                }
            };
            self.handle_message(msg);
            if self.exit_requested {
                break;
            }
        }
        if self.shutdown_received {
            0
        } else {
            1
        }
    }

    pub fn handle_message(&mut self, msg: Message) {
        match msg {
            Message::Request(req) => self.handle_request(req),
            Message::Notification(not) => self.handle_notification(not),
            Message::Response(resp) => {
                debug!(id = ?resp.id, "ignoring response from client");
            }
        }
    }

    fn handle_request(&mut self, req: Request) {
        debug!(method = %req.method, id = ?req.id, "request");
        if self.shutdown_received {
            self.respond(Response::new_err(
                req.id,
                ErrorCode::InvalidRequest as i32,
                "shutdown already received".to_string(),
            ));
            return;
        }

        match req.method.as_str() {
            m if m == Initialize::METHOD => sync::on_initialize(self, req.id, req.params),
            m if m == Shutdown::METHOD => {
                self.shutdown_received = true;
                self.respond(Response::new_ok(req.id, Value::Null));
            }
            m if m == HoverRequest::METHOD => self.spawn_cursor_task(req, TaskKind::Hover),
            m if m == GotoDefinition::METHOD => self.spawn_cursor_task(req, TaskKind::Definition),
            m if m == References::METHOD => self.spawn_cursor_task(req, TaskKind::References),
            m if m == WorkspaceSymbolRequest::METHOD => {
                let Some(params) = cast::<WorkspaceSymbolParams>(req.params) else {
                    self.respond(invalid_params(req.id));
                    return;
                };
                self.spawn_task(req.id, TaskKind::WorkspaceSymbol {
                    query: params.query,
                });
            }
            // Answered honestly with "nothing": there is no compiler to
            // run commands against and no index of paired headers.
            m if m == ExecuteCommand::METHOD || m == SWITCH_SOURCE_HEADER_METHOD => {
                self.respond(Response::new_ok(req.id, Value::Null));
            }
            other => {
                debug!(method = %other, "unsupported method");
                self.respond(Response::new_err(
                    req.id,
                    ErrorCode::MethodNotFound as i32,
                    format!("method not found: {other}"),
                ));
            }
        }
    }

    fn handle_notification(&mut self, not: Notification) {
        debug!(method = %not.method, "notification");
        match not.method.as_str() {
            m if m == DidOpenTextDocument::METHOD => sync::on_did_open(self, not.params),
            m if m == DidChangeTextDocument::METHOD => sync::on_did_change(self, not.params),
            m if m == DidCloseTextDocument::METHOD => sync::on_did_close(self, not.params),
            m if m == Cancel::METHOD => self.on_cancel(not.params),
            m if m == Exit::METHOD => {
                info!(clean = self.shutdown_received, "exit requested");
                // Unblock any task thread still waiting on a child process.
                if let Ok(map) = self.inflight.lock() {
                    for handle in map.values() {
                        handle.cancel();
                    }
                }
                self.exit_requested = true;
            }
            m if m == Initialized::METHOD
                || m == DidChangeConfiguration::METHOD
                || m == SET_TRACE_METHOD => {}
            other => debug!(method = %other, "ignoring notification"),
        }
    }

    fn on_cancel(&mut self, params: Value) {
        let Some(params) = cast::<lsp_types::CancelParams>(params) else {
            return;
        };
        let id = match params.id {
            NumberOrString::Number(n) => RequestId::from(n),
            NumberOrString::String(s) => RequestId::from(s),
        };
        let handle = self
            .inflight
            .lock()
            .ok()
            .and_then(|map| map.get(&id).cloned());
        if let Some(handle) = handle {
            info!(id = ?id, "cancelling request");
            handle.cancel();
        } else {
            debug!(id = ?id, "cancel for unknown or finished request");
        }
    }

    /// Parses the cursor position, snapshots the document text and hands
    /// both to a task thread.
    fn spawn_cursor_task(&mut self, req: Request, make: fn(CursorQuery) -> TaskKind) {
        let Some(params) = cast::<TextDocumentPositionParams>(req.params) else {
            self.respond(invalid_params(req.id));
            return;
        };
        let uri = params.text_document.uri;
        let Some(text) = self.document_text(&uri) else {
            debug!(uri = %uri, "no document content available");
            self.respond(Response::new_ok(req.id, Value::Null));
            return;
        };
        self.spawn_task(
            req.id,
            make(CursorQuery {
                uri,
                text,
                line0: params.position.line,
                ch0: params.position.character,
            }),
        );
    }

    /// Open-document text wins over the file on disk; the client's buffer
    /// may be unsaved.
    fn document_text(&self, uri: &Url) -> Option<String> {
        if let Some(text) = self.docs.get(uri) {
            return Some(text.clone());
        }
        let path = uri::uri_to_path(uri)?;
        std::fs::read_to_string(path).ok()
    }

    fn spawn_task(&mut self, id: RequestId, kind: TaskKind) {
        let cancel = Arc::new(CancelHandle::new());
        if let Ok(mut map) = self.inflight.lock() {
            map.insert(id.clone(), Arc::clone(&cancel));
        }

        let scope = ScopeConfig {
            root: self.root.clone(),
            serve_files: self.config.serve_files.clone(),
        };
        let search = Arc::clone(&self.search);
        let sender = self.sender.clone();
        let inflight = Arc::clone(&self.inflight);
        let task_id = id.clone();

        let spawned = thread::Builder::new()
            .name(format!("gclangd-{}", kind.label()))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    requests::execute(&kind, &scope, search.as_ref(), &cancel)
                }));
                if let Ok(mut map) = inflight.lock() {
                    map.remove(&task_id);
                }
                let resp = if cancel.is_cancelled() {
                    Response::new_err(
                        task_id,
                        ErrorCode::RequestCanceled as i32,
                        "request cancelled".to_string(),
                    )
                } else {
                    match result {
                        Ok(value) => Response::new_ok(task_id, value),
                        Err(_) => Response::new_err(
                            task_id,
                            ErrorCode::InternalError as i32,
                            "request handler panicked".to_string(),
                        ),
                    }
                };
                let _ = sender.send(Message::Response(resp));
            });

        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn request thread");
            if let Ok(mut map) = self.inflight.lock() {
                map.remove(&id);
            }
            self.respond(Response::new_err(
                id,
                ErrorCode::InternalError as i32,
                "failed to spawn request thread".to_string(),
            ));
        }
    }

    fn respond(&self, resp: Response) {
        if self.sender.send(Message::Response(resp)).is_err() {
            warn!("writer channel closed");
        }
    }

    fn notify(&self, method: &str, params: Value) {
        let not = Notification::new(method.to_string(), params);
        let _ = self.sender.send(Message::Notification(not));
    }
}

fn cast<T: serde::de::DeserializeOwned>(params: Value) -> Option<T> {
    serde_json::from_value(params).ok()
}

fn invalid_params(id: RequestId) -> Response {
    Response::new_err(
        id,
        ErrorCode::InvalidParams as i32,
        "invalid params".to_string(),
    )
}
