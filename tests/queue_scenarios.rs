mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;

use phalanx::config::{EngineConfig, IndexConfiguration, QueueConfig, UpdateMode};
use phalanx::engine::IndexEngine;
use phalanx::error::PhalanxError;
use phalanx::index::{CloseableIndex, EngineIndex, Index};
use phalanx::operation::Operation;
use phalanx::queue::QueueingIndex;
use phalanx::result::IndexResult;
use phalanx::store::memory::MemoryIndexStore;

use common::{ScriptedIndex, WriterScript, doc, init_logging, key};

fn engine(store: &MemoryIndexStore) -> Arc<IndexEngine> {
    Arc::new(IndexEngine::new(
        Arc::new(store.clone()),
        Arc::new(IndexConfiguration::default()),
        EngineConfig::default(),
    ))
}

fn create(id: &str) -> Operation {
    Operation::create(doc(id), UpdateMode::Interactive)
}

#[test]
fn test_searcher_does_not_see_queued_delete_until_applied() {
    init_logging();
    let store = MemoryIndexStore::new();
    let engine = engine(&store);
    let scripted = Arc::new(
        ScriptedIndex::recording().in_front_of(Arc::new(EngineIndex::new(engine.clone()))),
    );
    let queue = QueueingIndex::new(scripted.clone(), QueueConfig::default());

    queue.perform(create("HSP-1")).unwrap().wait().unwrap();
    assert_eq!(engine.get_searcher().unwrap().num_docs().unwrap(), 1);

    // Hold the delete inside the delegate.
    scripted.hold();
    let delete = queue
        .perform(Operation::delete(key("HSP-1"), UpdateMode::Interactive))
        .unwrap();
    scripted.await_write(1);

    assert!(!delete.is_done());
    assert_eq!(engine.get_searcher().unwrap().num_docs().unwrap(), 1);

    scripted.release();
    delete.wait().unwrap();
    assert_eq!(engine.get_searcher().unwrap().num_docs().unwrap(), 0);

    queue.close().unwrap();
    assert!(engine.is_closed());
}

#[test]
fn test_operations_queued_behind_slow_write_form_one_batch() {
    let scripted = Arc::new(ScriptedIndex::gated());
    let queue = QueueingIndex::new(scripted.clone(), QueueConfig::default());

    let first = queue.perform(create("A-0")).unwrap();
    scripted.await_write(0);

    let queued: Vec<IndexResult> = ["A-1", "A-2", "A-3"]
        .iter()
        .map(|id| queue.perform(create(id)).unwrap())
        .collect();
    assert_eq!(queue.stats().queue_depth, 3);
    for result in &queued {
        assert!(!result.wait_timeout(Duration::from_millis(10)).unwrap());
    }

    scripted.release();
    first.wait().unwrap();
    for result in &queued {
        result.wait().unwrap();
    }

    assert_eq!(
        scripted.writes(),
        vec![
            vec!["A-0".to_string()],
            vec!["A-1".to_string(), "A-2".to_string(), "A-3".to_string()],
        ]
    );
    let stats = queue.stats();
    assert_eq!(stats.batches_written, 2);
    assert_eq!(stats.queue_depth, 0);
}

#[test]
fn test_sequential_operations_apply_in_order() {
    let scripted = Arc::new(ScriptedIndex::recording());
    let queue = QueueingIndex::new(scripted.clone(), QueueConfig::new("ordered-writer", 8));

    let mut results = Vec::new();
    for i in 0..200 {
        let id = format!("A-{i}");
        let operation = if i % 10 == 9 {
            Operation::delete(key(&id), UpdateMode::Interactive)
        } else {
            create(&id)
        };
        results.push(queue.perform(operation).unwrap());
    }
    IndexResult::composite(results).wait().unwrap();

    let applied: Vec<String> = scripted.writes().into_iter().flatten().collect();
    let expected: Vec<String> = (0..200)
        .map(|i| {
            if i % 10 == 9 {
                format!("-A-{i}")
            } else {
                format!("A-{i}")
            }
        })
        .collect();
    assert_eq!(applied, expected);
}

#[test]
fn test_many_producers() {
    let store = MemoryIndexStore::new();
    let engine = engine(&store);
    let queue = Arc::new(QueueingIndex::new(
        Arc::new(EngineIndex::new(engine.clone())),
        QueueConfig::new("shared-writer", 16),
    ));

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                let results: Vec<IndexResult> = (0..50)
                    .map(|i| queue.perform(create(&format!("P{p}-{i}"))).unwrap())
                    .collect();
                IndexResult::composite(results).wait().unwrap();
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(engine.get_searcher().unwrap().num_docs().unwrap(), 400);
    let stats = queue.stats();
    assert_eq!(stats.operations_enqueued, 400);
    assert!(stats.batches_written <= 400);
    assert_eq!(stats.worker_spawns, 1);
}

#[test]
fn test_full_queue_blocks_producer() {
    let scripted = Arc::new(ScriptedIndex::gated());
    let queue = Arc::new(QueueingIndex::new(
        scripted.clone(),
        QueueConfig::new("tiny-writer", 2),
    ));

    let first = queue.perform(create("A-0")).unwrap();
    scripted.await_write(0);
    let second = queue.perform(create("A-1")).unwrap();
    let third = queue.perform(create("A-2")).unwrap();

    let (done_tx, done_rx) = unbounded();
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let result = queue.perform(create("A-3")).unwrap();
            done_tx.send(()).unwrap();
            result
        })
    };
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    scripted.release();
    done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let fourth = producer.join().unwrap();

    IndexResult::composite(vec![first, second, third, fourth])
        .wait()
        .unwrap();
    let applied: Vec<String> = scripted.writes().into_iter().flatten().collect();
    assert_eq!(applied, vec!["A-0", "A-1", "A-2", "A-3"]);
}

#[test]
fn test_failed_batch_fails_every_operation() {
    let scripted = Arc::new(ScriptedIndex::gated().failing_from(1));
    let queue = QueueingIndex::new(scripted.clone(), QueueConfig::default());

    let first = queue.perform(create("A-0")).unwrap();
    scripted.await_write(0);
    let batch: Vec<IndexResult> = ["A-1", "A-2", "A-3"]
        .iter()
        .map(|id| queue.perform(create(id)).unwrap())
        .collect();
    scripted.release();

    first.wait().unwrap();
    for result in &batch {
        let error = result.wait().unwrap_err();
        assert!(error.is_transient());
        match error {
            PhalanxError::Shared(inner) => match inner.as_ref() {
                PhalanxError::BatchFailed { count, .. } => assert_eq!(*count, 3),
                other => panic!("unexpected error: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(queue.stats().failed_batches, 1);
    assert_eq!(scripted.writes().len(), 2);
}

#[test]
fn test_close_applies_queued_operations_then_closes_delegate() {
    let scripted = Arc::new(ScriptedIndex::gated());
    let queue = Arc::new(QueueingIndex::new(scripted.clone(), QueueConfig::default()));

    let first = queue.perform(create("A-0")).unwrap();
    scripted.await_write(0);
    let rest: Vec<IndexResult> = (1..5)
        .map(|i| queue.perform(create(&format!("A-{i}"))).unwrap())
        .collect();

    let closer = {
        let queue = queue.clone();
        thread::spawn(move || queue.close())
    };
    while !queue.is_closed() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(queue.perform(create("late")).unwrap_err().is_already_closed());
    assert_eq!(scripted.closes(), 0);

    scripted.release();
    closer.join().unwrap().unwrap();
    first.wait().unwrap();
    for result in &rest {
        result.wait().unwrap();
    }
    assert_eq!(scripted.closes(), 1);
    assert_eq!(scripted.writes().into_iter().flatten().count(), 5);

    queue.close().unwrap();
    assert_eq!(scripted.closes(), 1);
}

#[test]
fn test_completion_callbacks_run_after_write() {
    let store = MemoryIndexStore::new();
    let engine = engine(&store);
    let queue = QueueingIndex::new(
        Arc::new(EngineIndex::new(engine.clone())),
        QueueConfig::default(),
    );

    let (tx, rx) = unbounded();
    let result = queue
        .perform(create("HSP-1").with_completion(move || tx.send("indexed").unwrap()))
        .unwrap();
    result.wait().unwrap();
    assert_eq!(rx.try_recv().unwrap(), "indexed");
    assert_eq!(store.committed_documents().len(), 1);
}

#[test]
fn test_completion_not_run_when_its_batch_fails() {
    let script = WriterScript::new();
    script.fail("1:delete", || PhalanxError::storage("disk hiccup"));
    let engine = Arc::new(IndexEngine::with_writer_factory(
        Arc::new(MemoryIndexStore::new()),
        script.factory(),
        EngineConfig::default(),
    ));
    let scripted = Arc::new(ScriptedIndex::gated().in_front_of(Arc::new(EngineIndex::new(engine))));
    let queue = QueueingIndex::new(scripted.clone(), QueueConfig::default());

    let first = queue.perform(create("A-0")).unwrap();
    scripted.await_write(0);

    // Two callers end up in the same drained batch.
    let (tx, rx) = unbounded();
    let indexed = queue
        .perform(create("A-1").with_completion(move || tx.send("A-1").unwrap()))
        .unwrap();
    let rejected = queue
        .perform(Operation::delete(key("A-2"), UpdateMode::Interactive))
        .unwrap();
    scripted.release();

    first.wait().unwrap();
    assert!(indexed.wait().unwrap_err().is_transient());
    assert!(rejected.wait().unwrap_err().is_transient());
    assert!(rx.try_recv().is_err());

    assert_eq!(scripted.writes(), vec![vec!["A-0"], vec!["A-1", "-A-2"]]);
    assert_eq!(script.calls(), vec!["1:add", "1:commit", "1:add", "1:delete"]);
}
