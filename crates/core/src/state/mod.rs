//! Persistence of layer parameters.
//!
//! Stores never fail towards their callers: a missing or corrupt entry loads
//! as an empty map and a failed write is logged and forgotten. Saving never
//! touches the disk on the caller's thread.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::{Map, Value};

use crate::{ParamMap, Result};

/// Key/value store for per-layer parameter maps.
pub trait StateStore {
    /// Returns whatever is stored for `layer_id`, or an empty map.
    fn load(&self, layer_id: &str) -> ParamMap;

    /// Records the full parameter map of a layer. Fire-and-forget: never
    /// blocks on storage and never reports failure.
    fn save(&mut self, layer_id: &str, params: &ParamMap);

    /// Blocks until earlier saves have reached storage.
    fn flush(&mut self) {}
}

/// In-memory store holding the serialized JSON text of each entry, the way
/// a browser-style storage backend would.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry with raw text, valid JSON or not.
    pub fn insert_raw(&mut self, layer_id: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(layer_id.into(), text.into());
    }

    pub fn raw(&self, layer_id: &str) -> Option<&str> {
        self.entries.get(layer_id).map(String::as_str)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, layer_id: &str) -> ParamMap {
        let Some(text) = self.entries.get(layer_id) else {
            return ParamMap::new();
        };
        match serde_json::from_str::<Value>(text) {
            Ok(value) => ParamMap::from_json(&value),
            Err(err) => {
                tracing::warn!(layer = layer_id, error = %err, "discarding malformed stored state");
                ParamMap::new()
            }
        }
    }

    fn save(&mut self, layer_id: &str, params: &ParamMap) {
        self.entries
            .insert(layer_id.to_string(), params.to_json().to_string());
    }
}

/// Store backed by a single JSON document of the form
/// `{ "<layer id>": { "<key>": <value>, ... }, ... }`.
///
/// The document is read once on open. Saves update the in-memory copy and
/// hand a snapshot to a background writer thread, which rewrites the file.
/// Snapshots that queue up while a write is in progress collapse into the
/// newest one. Dropping the store waits for pending writes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Map<String, Value>,
    writer: Option<StateWriter>,
}

#[derive(Debug)]
struct StateWriter {
    requests: Sender<WriteRequest>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
enum WriteRequest {
    Snapshot(Map<String, Value>),
    Flush(Sender<()>),
}

impl JsonFileStore {
    /// Opens the store. A missing file starts empty; unreadable or
    /// malformed content is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match read_document(&path) {
            Ok(Some(document)) => document,
            Ok(None) => Map::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable state file");
                Map::new()
            }
        };
        let writer = StateWriter::spawn(path.clone());
        Self {
            path,
            document,
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, layer_id: &str) -> ParamMap {
        self.document
            .get(layer_id)
            .map(ParamMap::from_json)
            .unwrap_or_default()
    }

    fn save(&mut self, layer_id: &str, params: &ParamMap) {
        self.document.insert(layer_id.to_string(), params.to_json());
        let snapshot = self.document.clone();
        match &self.writer {
            Some(writer) => {
                if writer.requests.send(WriteRequest::Snapshot(snapshot)).is_err() {
                    tracing::warn!(path = %self.path.display(), "state writer is gone; dropping save");
                }
            }
            None => write_document(&self.path, &snapshot),
        }
    }

    fn flush(&mut self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, finished) = bounded(1);
        if writer.requests.send(WriteRequest::Flush(done)).is_ok() {
            let _ = finished.recv();
        }
    }
}

impl Drop for JsonFileStore {
    fn drop(&mut self) {
        if let Some(StateWriter { requests, handle }) = self.writer.take() {
            drop(requests);
            if handle.join().is_err() {
                tracing::warn!(path = %self.path.display(), "state writer panicked");
            }
        }
    }
}

impl StateWriter {
    /// Starts the writer thread. If the thread can not be spawned the store
    /// falls back to writing on the caller's thread.
    fn spawn(path: PathBuf) -> Option<Self> {
        let (requests, inbox) = unbounded();
        let spawned = thread::Builder::new()
            .name("state-writer".to_string())
            .spawn(move || run_writer(&path, inbox));
        match spawned {
            Ok(handle) => Some(Self { requests, handle }),
            Err(err) => {
                tracing::warn!(error = %err, "could not start state writer; saving inline");
                None
            }
        }
    }
}

fn run_writer(path: &Path, inbox: Receiver<WriteRequest>) {
    while let Ok(request) = inbox.recv() {
        let mut latest = None;
        let mut waiting = Vec::new();
        for request in std::iter::once(request).chain(inbox.try_iter()) {
            match request {
                WriteRequest::Snapshot(document) => latest = Some(document),
                WriteRequest::Flush(done) => waiting.push(done),
            }
        }
        if let Some(document) = latest {
            write_document(path, &document);
        }
        for done in waiting {
            let _ = done.send(());
        }
    }
}

fn write_document(path: &Path, document: &Map<String, Value>) {
    if let Err(err) = try_write_document(path, document) {
        tracing::warn!(path = %path.display(), error = %err, "failed to persist layer state");
    }
}

fn try_write_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let text = serde_json::to_string_pretty(document)?;
    fs::write(path, text)?;
    Ok(())
}

fn read_document(path: &Path) -> Result<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(document) => Ok(Some(document)),
        _ => Err("state file must contain a JSON object".into()),
    }
}
