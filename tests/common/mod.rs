//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use phalanx::config::{AnalysisConfig, UpdateMode, WriterTuning};
use phalanx::document::{Document, FieldValue, Key};
use phalanx::error::{PhalanxError, Result};
use phalanx::index::{CloseableIndex, Index};
use phalanx::operation::Operation;
use phalanx::result::IndexResult;
use phalanx::store::memory::MemoryIndexStore;
use phalanx::store::{IndexStore, StoreReader, StoreWriter};
use phalanx::writer::{Writer, WriterFactory};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn doc(id: &str) -> Document {
    Document::builder()
        .add_text("id", id)
        .add_text("summary", format!("issue {id}"))
        .build()
}

pub fn key(id: &str) -> Key {
    Key::new("id", id)
}

/// Identifiers of the leaf operations of `operation`, in application order.
///
/// Creates contribute their documents' ids, deletes `-id`, updates `~id`.
pub fn leaf_ids(operation: &Operation) -> Vec<String> {
    fn id_of(value: &FieldValue) -> String {
        value.to_string()
    }

    match operation {
        Operation::Create { documents, .. } => documents
            .iter()
            .filter_map(|doc| doc.get_field("id").map(id_of))
            .collect(),
        Operation::Update { key, .. } => vec![format!("~{}", id_of(key.value()))],
        Operation::Delete { key, .. } => vec![format!("-{}", id_of(key.value()))],
        Operation::Optimize { .. } => vec!["optimize".to_string()],
        Operation::Completion { operation, .. } => leaf_ids(operation),
        Operation::Composite(operations) => operations.iter().flat_map(leaf_ids).collect(),
    }
}

/// A latch that blocks callers until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn shut(&self) {
        *self.open.lock() = false;
    }

    pub fn pass(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

/// Delegate index that records every write, optionally holding writes at a
/// gate and failing writes from a given write number on.
pub struct ScriptedIndex {
    delegate: Option<Arc<dyn CloseableIndex>>,
    gate: Gate,
    entered_tx: Sender<usize>,
    entered_rx: Receiver<usize>,
    writes: Mutex<Vec<Vec<String>>>,
    fail_from: Option<usize>,
    closes: AtomicUsize,
}

impl ScriptedIndex {
    /// Records writes without applying them anywhere.
    pub fn recording() -> Self {
        let (entered_tx, entered_rx) = unbounded();
        let gate = Gate::closed();
        gate.open();
        ScriptedIndex {
            delegate: None,
            gate,
            entered_tx,
            entered_rx,
            writes: Mutex::new(Vec::new()),
            fail_from: None,
            closes: AtomicUsize::new(0),
        }
    }

    /// Holds every write until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        let index = Self::recording();
        *index.gate.open.lock() = false;
        index
    }

    /// Apply writes to `delegate` after recording them.
    pub fn in_front_of(mut self, delegate: Arc<dyn CloseableIndex>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Fail write number `n` (0-based) and every later one.
    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_from = Some(n);
        self
    }

    pub fn release(&self) {
        self.gate.open();
    }

    /// Hold writes again until the next [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.shut();
    }

    /// Wait until write number `n` has started.
    pub fn await_write(&self, n: usize) {
        loop {
            match self.entered_rx.recv_timeout(Duration::from_secs(10)) {
                Ok(entered) if entered >= n => return,
                Ok(_) => continue,
                Err(e) => panic!("write {n} never started: {e}"),
            }
        }
    }

    pub fn writes(&self) -> Vec<Vec<String>> {
        self.writes.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Index for ScriptedIndex {
    fn perform(&self, operation: Operation) -> Result<IndexResult> {
        let number = {
            let mut writes = self.writes.lock();
            writes.push(leaf_ids(&operation));
            writes.len() - 1
        };
        let _ = self.entered_tx.send(number);
        self.gate.pass();

        if self.fail_from.is_some_and(|n| number >= n) {
            return Ok(IndexResult::failed(PhalanxError::storage(format!(
                "write {number} rejected"
            ))));
        }
        match &self.delegate {
            Some(delegate) => delegate.perform(operation),
            None => Ok(IndexResult::completed()),
        }
    }
}

impl CloseableIndex for ScriptedIndex {
    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.delegate {
            Some(delegate) => delegate.close(),
            None => Ok(()),
        }
    }
}

type ErrorFn = fn() -> PhalanxError;

/// Builds writers that log every call as `<writer>:<method>` and fail the
/// calls they were told to fail, once each.
#[derive(Clone, Default)]
pub struct WriterScript {
    log: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, ErrorFn>>>,
    created: Arc<AtomicUsize>,
}

impl WriterScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the call `<writer>:<method>` fail once with `error`.
    pub fn fail(&self, call: &str, error: ErrorFn) {
        self.failures.lock().insert(call.to_string(), error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> WriterFactory {
        let script = self.clone();
        Box::new(move |_mode| {
            let id = script.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Box::new(ScriptedWriter {
                id,
                script: script.clone(),
            }) as Box<dyn Writer>)
        })
    }
}

pub struct ScriptedWriter {
    id: usize,
    script: WriterScript,
}

impl std::fmt::Debug for ScriptedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedWriter").field("id", &self.id).finish()
    }
}

impl ScriptedWriter {
    fn call(&self, method: &str) -> Result<()> {
        let call = format!("{}:{method}", self.id);
        self.script.log.lock().push(call.clone());
        match self.script.failures.lock().remove(&call) {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }
}

impl Writer for ScriptedWriter {
    fn add_documents(&mut self, _documents: Vec<Document>) -> Result<()> {
        self.call("add")
    }

    fn update_documents(&mut self, _key: &Key, _documents: Vec<Document>) -> Result<()> {
        self.call("update")
    }

    fn delete_documents(&mut self, _key: &Key) -> Result<()> {
        self.call("delete")
    }

    fn optimize(&mut self) -> Result<()> {
        self.call("optimize")
    }

    fn set_mode(&mut self, _mode: UpdateMode) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.call("commit")
    }

    fn close(&mut self) -> Result<()> {
        self.call("close")
    }
}

/// Wraps the writers of another factory so that document adds wait at a
/// gate while the engine's writer lock is held.
#[derive(Clone)]
pub struct GatedWriters {
    inner: Arc<WriterFactory>,
    gate: Arc<Gate>,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
}

impl GatedWriters {
    pub fn new(inner: WriterFactory) -> Self {
        let (entered_tx, entered_rx) = unbounded();
        GatedWriters {
            inner: Arc::new(inner),
            gate: Arc::new(Gate::closed()),
            entered_tx,
            entered_rx,
        }
    }

    pub fn open(&self) {
        self.gate.open();
    }

    /// Wait until a writer is blocked at the gate.
    pub fn await_entered(&self) {
        if let Err(e) = self.entered_rx.recv_timeout(Duration::from_secs(10)) {
            panic!("no write reached the gate: {e}");
        }
    }

    pub fn factory(&self) -> WriterFactory {
        let writers = self.clone();
        Box::new(move |mode| {
            let inner = (writers.inner)(mode)?;
            Ok(Box::new(GatedWriter {
                inner,
                gate: writers.gate.clone(),
                entered_tx: writers.entered_tx.clone(),
            }) as Box<dyn Writer>)
        })
    }
}

pub struct GatedWriter {
    inner: Box<dyn Writer>,
    gate: Arc<Gate>,
    entered_tx: Sender<()>,
}

impl std::fmt::Debug for GatedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedWriter").field("inner", &self.inner).finish()
    }
}

impl Writer for GatedWriter {
    fn add_documents(&mut self, documents: Vec<Document>) -> Result<()> {
        let _ = self.entered_tx.send(());
        self.gate.pass();
        self.inner.add_documents(documents)
    }

    fn update_documents(&mut self, key: &Key, documents: Vec<Document>) -> Result<()> {
        self.inner.update_documents(key, documents)
    }

    fn delete_documents(&mut self, key: &Key) -> Result<()> {
        self.inner.delete_documents(key)
    }

    fn optimize(&mut self) -> Result<()> {
        self.inner.optimize()
    }

    fn set_mode(&mut self, mode: UpdateMode) -> Result<()> {
        self.inner.set_mode(mode)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// A memory store whose next `open_reader` calls fail.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryIndexStore,
    reader_failures: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryIndexStore) -> Self {
        FaultyStore {
            inner,
            reader_failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` reader opens as if memory ran out.
    pub fn fail_reader_opens(&self, n: usize) {
        self.reader_failures.store(n, Ordering::SeqCst);
    }
}

impl IndexStore for FaultyStore {
    fn open_writer(
        &self,
        analysis: &AnalysisConfig,
        tuning: &WriterTuning,
    ) -> Result<Box<dyn StoreWriter>> {
        self.inner.open_writer(analysis, tuning)
    }

    fn open_reader(&self) -> Result<Box<dyn StoreReader>> {
        let remaining = self.reader_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.reader_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PhalanxError::resource_exhausted("out of memory opening reader"));
        }
        self.inner.open_reader()
    }

    fn clean(&self) -> Result<()> {
        self.inner.clean()
    }

    fn exists(&self) -> bool {
        self.inner.exists()
    }
}
