//! Concurrency Dispatcher.
//!
//! Executes one engine call per work item, either strictly in order on the
//! caller's thread or on a fixed pool of OS threads. Results are keyed by
//! work-item id, so the downstream merge is independent of completion
//! order. Progress and cancellation are polled between completed items on
//! the orchestrating thread — never inside a worker, since the engine call
//! is an opaque blocking subprocess invocation. Workers only run OCR; the
//! collection store is never touched from here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::engine::OcrEngine;
use crate::error::OcrError;

/// One unit of engine work: a manifest file (batched mode) or a single
/// image (unbatched mode), keyed by a stable id.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: String,
    pub path: PathBuf,
}

/// Injected progress/cancellation surface, typically backed by the host
/// application's progress dialog.
pub trait ProgressObserver {
    fn update(&self, _completed: usize, _total: usize, _label: &str) {}

    /// Polled after every completed item.
    fn want_cancel(&self) -> bool {
        false
    }

    /// Decision hook: ask the user whether a pending cancellation request
    /// should go through.
    fn confirm_cancel(&self) -> bool {
        true
    }

    /// Un-latch the cancellation request after the user declined it.
    fn clear_cancel(&self) {}
}

/// Run every work item through the engine. Returns raw text keyed by work
/// item id, or the first fatal condition: a confirmed `Cancelled`, or an
/// engine failure (which aborts the whole dispatch rather than skipping the
/// item — one broken invocation means a systemic problem).
pub fn run(
    engine: &dyn OcrEngine,
    items: &[WorkItem],
    threads: usize,
    observer: Option<&dyn ProgressObserver>,
) -> Result<HashMap<String, String>, OcrError> {
    if items.is_empty() {
        return Ok(HashMap::new());
    }
    if threads <= 1 {
        run_sequential(engine, items, observer)
    } else {
        run_pooled(engine, items, threads, observer)
    }
}

fn run_sequential(
    engine: &dyn OcrEngine,
    items: &[WorkItem],
    observer: Option<&dyn ProgressObserver>,
) -> Result<HashMap<String, String>, OcrError> {
    let total = items.len();
    let mut results = HashMap::with_capacity(total);
    for (completed, item) in items.iter().enumerate() {
        let text = engine.recognize(&item.path)?;
        results.insert(item.id.clone(), text);
        report_and_poll(observer, completed + 1, total)?;
    }
    Ok(results)
}

fn run_pooled(
    engine: &dyn OcrEngine,
    items: &[WorkItem],
    threads: usize,
    observer: Option<&dyn ProgressObserver>,
) -> Result<HashMap<String, String>, OcrError> {
    let total = items.len();
    let next = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Result<String, OcrError>)>();
    let mut results = HashMap::with_capacity(total);

    let worker_count = threads.min(total);
    tracing::info!(workers = worker_count, total, "dispatching OCR work");

    thread::scope(|s| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next = &next;
            let cancelled = &cancelled;
            s.spawn(move || loop {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= total {
                    break;
                }
                let result = engine.recognize(&items[idx].path);
                if tx.send((idx, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut completed = 0;
        for (idx, result) in rx.iter() {
            match result {
                Ok(text) => {
                    results.insert(items[idx].id.clone(), text);
                    completed += 1;
                    if let Err(e) = report_and_poll(observer, completed, total) {
                        // Stop handing out new items; in-flight engine
                        // calls finish on their own.
                        cancelled.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                    if completed == total {
                        break;
                    }
                }
                Err(e) => {
                    cancelled.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
        Ok(())
    })?;

    Ok(results)
}

/// Report progress for one completed item, then poll for cancellation.
fn report_and_poll(
    observer: Option<&dyn ProgressObserver>,
    completed: usize,
    total: usize,
) -> Result<(), OcrError> {
    let Some(observer) = observer else {
        return Ok(());
    };
    observer.update(completed, total, &progress_label(completed, total));
    if observer.want_cancel() {
        if observer.confirm_cancel() {
            tracing::info!(completed, total, "OCR dispatch cancelled by user");
            return Err(OcrError::Cancelled);
        }
        observer.clear_cancel();
    }
    Ok(())
}

fn progress_label(completed: usize, total: usize) -> String {
    let percent = (100.0 * completed as f64 / total as f64).round() as i64;
    format!("Running OCR... ({percent} %)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use std::sync::Mutex;

    fn items(count: usize) -> Vec<WorkItem> {
        (0..count)
            .map(|i| WorkItem {
                id: format!("item_{i}"),
                path: PathBuf::from(format!("/img/{i}.png")),
            })
            .collect()
    }

    fn scripted_engine(count: usize) -> MockEngine {
        let mut engine = MockEngine::new();
        for i in 0..count {
            engine = engine.with_response(format!("/img/{i}.png"), format!("text {i}"));
        }
        engine
    }

    /// Records every progress update; optionally latches a cancel request
    /// after a given number of completions.
    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<(usize, usize)>>,
        cancel_after: Option<usize>,
        confirm: bool,
        cleared: AtomicBool,
    }

    impl ProgressObserver for Recorder {
        fn update(&self, completed: usize, total: usize, label: &str) {
            assert!(label.starts_with("Running OCR..."));
            self.updates.lock().unwrap().push((completed, total));
        }

        fn want_cancel(&self) -> bool {
            match self.cancel_after {
                Some(n) => {
                    let done = self.updates.lock().unwrap().len();
                    done > n && !self.cleared.load(Ordering::Relaxed)
                }
                None => false,
            }
        }

        fn confirm_cancel(&self) -> bool {
            self.confirm
        }

        fn clear_cancel(&self) {
            self.cleared.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn pooled_collects_all_results_keyed_by_id() {
        crate::test_support::init_tracing();
        let engine = scripted_engine(10);
        let work = items(10);
        let results = run(&engine, &work, 4, None).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results["item_3"], "text 3");
        assert_eq!(results["item_9"], "text 9");
    }

    #[test]
    fn sequential_collects_all_results() {
        let engine = scripted_engine(5);
        let work = items(5);
        let results = run(&engine, &work, 1, None).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results["item_0"], "text 0");
    }

    #[test]
    fn progress_is_monotonic_and_reaches_total() {
        let engine = scripted_engine(7);
        let work = items(7);
        let recorder = Recorder::default();
        run(&engine, &work, 3, Some(&recorder)).unwrap();
        let updates = recorder.updates.into_inner().unwrap();
        assert_eq!(updates.len(), 7);
        for (i, &(completed, total)) in updates.iter().enumerate() {
            assert_eq!(completed, i + 1);
            assert_eq!(total, 7);
        }
        assert_eq!(updates.last(), Some(&(7, 7)));
    }

    #[test]
    fn confirmed_cancel_aborts_dispatch() {
        let engine = scripted_engine(10);
        let work = items(10);
        let recorder = Recorder {
            cancel_after: Some(1),
            confirm: true,
            ..Recorder::default()
        };
        let err = run(&engine, &work, 2, Some(&recorder)).unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
    }

    #[test]
    fn declined_cancel_clears_flag_and_continues() {
        let engine = scripted_engine(6);
        let work = items(6);
        let recorder = Recorder {
            cancel_after: Some(1),
            confirm: false,
            ..Recorder::default()
        };
        let results = run(&engine, &work, 2, Some(&recorder)).unwrap();
        assert_eq!(results.len(), 6);
        assert!(recorder.cleared.load(Ordering::Relaxed));
    }

    #[test]
    fn sequential_cancel_also_aborts() {
        let engine = scripted_engine(4);
        let work = items(4);
        let recorder = Recorder {
            cancel_after: Some(0),
            confirm: true,
            ..Recorder::default()
        };
        let err = run(&engine, &work, 1, Some(&recorder)).unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
    }

    #[test]
    fn engine_error_aborts_pooled_dispatch() {
        // Only 3 of 4 items have scripted responses.
        let engine = scripted_engine(3);
        let work = items(4);
        let err = run(&engine, &work, 2, None).unwrap_err();
        assert!(matches!(err, OcrError::EngineExecution { .. }));
    }

    #[test]
    fn engine_error_aborts_sequential_dispatch() {
        let engine = MockEngine::new();
        let work = items(2);
        let err = run(&engine, &work, 1, None).unwrap_err();
        assert!(matches!(err, OcrError::EngineExecution { .. }));
    }

    #[test]
    fn empty_work_list_is_trivially_done() {
        let engine = MockEngine::new();
        let recorder = Recorder::default();
        let results = run(&engine, &[], 4, Some(&recorder)).unwrap();
        assert!(results.is_empty());
        assert!(recorder.updates.into_inner().unwrap().is_empty());
    }

    #[test]
    fn worker_count_larger_than_work_is_fine() {
        let engine = scripted_engine(2);
        let work = items(2);
        let results = run(&engine, &work, 16, None).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn progress_label_rounds_percentage() {
        assert_eq!(progress_label(1, 3), "Running OCR... (33 %)");
        assert_eq!(progress_label(2, 3), "Running OCR... (67 %)");
        assert_eq!(progress_label(3, 3), "Running OCR... (100 %)");
    }
}
