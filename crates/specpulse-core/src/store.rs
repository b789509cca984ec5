use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::protocol::{Event, LogLevel, LogRecord, ResultUpdate, SpecStatus};

/// Placeholder shown for a worker slot that has not reported yet.
pub const WAITING_LABEL: &str = "Waiting...";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerState {
    pub passed: u64,
    pub failed: u64,
    pub pending: u64,
    pub percent: f64,
    pub current_file: String,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            passed: 0,
            failed: 0,
            pending: 0,
            percent: 0.0,
            current_file: WAITING_LABEL.to_string(),
        }
    }
}

impl WorkerState {
    pub fn finished(&self) -> bool {
        self.percent >= 1.0
    }

    /// A worker counts toward the aggregate progress average once it has
    /// reported anything at all.
    pub fn active(&self) -> bool {
        self.passed > 0 || self.failed > 0 || self.pending > 0 || self.percent > 0.0
    }
}

/// One deduplicated log message. `count` accumulates across the run;
/// `level`/`stream` track the most recent occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub stream: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    pub passed: u64,
    pub failed: u64,
    pub pending: u64,
    pub active_workers: usize,
    pub avg_progress: f64,
}

#[derive(Debug, Default)]
struct StoreInner {
    workers: HashMap<String, WorkerState>,
    logs: HashMap<String, LogEntry>,
    failed_specs: Vec<String>,
}

/// Aggregate state shared between the event server's connection tasks and
/// the render loop. Every mutation funnels through [`Store::update`], which
/// applies one decoded message atomically; accessors hand back owned
/// snapshots so no caller iterates under the lock.
#[derive(Debug)]
pub struct Store {
    start_time: Instant,
    inner: RwLock<StoreInner>,
}

impl Store {
    /// All declared worker slots are pre-populated zeroed so the dashboard
    /// shows every expected worker from the first frame.
    pub fn new(worker_count: usize) -> Self {
        let workers = (1..=worker_count)
            .map(|id| (id.to_string(), WorkerState::default()))
            .collect();
        Self {
            start_time: Instant::now(),
            inner: RwLock::new(StoreInner {
                workers,
                logs: HashMap::new(),
                failed_specs: Vec::new(),
            }),
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn update(&self, event: Event) {
        let mut inner = self.inner.write().unwrap();
        match event {
            Event::Log(record) => apply_log(&mut inner, record),
            Event::Result(update) => apply_result(&mut inner, update),
        }
    }

    pub fn all_finished(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.workers.values().all(WorkerState::finished)
    }

    pub fn current_workers(&self) -> HashMap<String, WorkerState> {
        self.inner.read().unwrap().workers.clone()
    }

    /// Workers ordered by numeric id (ids are small integers encoded as
    /// strings; anything non-numeric sorts last, lexicographically).
    pub fn sorted_workers(&self) -> Vec<(String, WorkerState)> {
        let mut workers: Vec<_> = self.inner.read().unwrap().workers.clone().into_iter().collect();
        workers.sort_by_key(|(id, _)| (id.parse::<u64>().map_err(|_| id.clone()), id.clone()));
        workers
    }

    pub fn current_logs(&self) -> HashMap<String, LogEntry> {
        self.inner.read().unwrap().logs.clone()
    }

    pub fn failed_specs(&self) -> Vec<String> {
        self.inner.read().unwrap().failed_specs.clone()
    }

    pub fn summary_stats(&self) -> SummaryStats {
        let inner = self.inner.read().unwrap();
        let mut stats = SummaryStats::default();
        let mut total_pct = 0.0;
        for worker in inner.workers.values() {
            stats.passed += worker.passed;
            stats.failed += worker.failed;
            stats.pending += worker.pending;
            if worker.active() {
                total_pct += worker.percent;
                stats.active_workers += 1;
            }
        }
        if stats.active_workers > 0 {
            stats.avg_progress = total_pct / stats.active_workers as f64;
        }
        stats
    }

    /// Info-like messages (levels log/info), most frequent first.
    pub fn info_logs(&self) -> Vec<(String, LogEntry)> {
        let mut logs: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .logs
            .iter()
            .filter(|(_, entry)| entry.level.is_info_like())
            .map(|(text, entry)| (text.clone(), entry.clone()))
            .collect();
        logs.sort_by_key(|(text, entry)| (Reverse(entry.count), text.clone()));
        logs
    }

    /// Diagnostics (levels error/warning/debug), by severity rank then
    /// descending count.
    pub fn diagnostic_logs(&self) -> Vec<(String, LogEntry)> {
        let mut logs: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .logs
            .iter()
            .filter(|(_, entry)| entry.level.is_diagnostic())
            .map(|(text, entry)| (text.clone(), entry.clone()))
            .collect();
        logs.sort_by_key(|(text, entry)| {
            (
                Reverse(entry.level.severity()),
                Reverse(entry.count),
                text.clone(),
            )
        });
        logs
    }
}

fn apply_log(inner: &mut StoreInner, record: LogRecord) {
    let text = record.message.trim().to_string();
    if text.is_empty() {
        return;
    }
    let entry = inner.logs.entry(text).or_insert(LogEntry {
        level: record.level,
        stream: String::new(),
        count: 0,
    });
    entry.count += 1;
    entry.level = record.level;
    entry.stream = record.stream;
}

fn apply_result(inner: &mut StoreInner, update: ResultUpdate) {
    let StoreInner {
        workers,
        failed_specs,
        ..
    } = inner;
    // Unknown worker ids are stray/late producers, not an error.
    let Some(worker) = workers.get_mut(&update.worker) else {
        return;
    };
    match update.status {
        Some(SpecStatus::Passed) => worker.passed += 1,
        Some(SpecStatus::Failed) => {
            worker.failed += 1;
            if let Some(file) = &update.file {
                if !failed_specs.contains(file) {
                    failed_specs.push(file.clone());
                }
            }
        }
        Some(SpecStatus::Pending) => worker.pending += 1,
        None => {}
    }
    worker.percent = update.percent;
    if let Some(file) = update.file {
        worker.current_file = file;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResultUpdate;

    fn result(worker: &str, status: Option<SpecStatus>, percent: f64, file: Option<&str>) -> Event {
        Event::Result(ResultUpdate {
            worker: worker.to_string(),
            status,
            percent,
            file: file.map(str::to_string),
        })
    }

    #[test]
    fn new_store_shows_every_declared_worker_waiting() {
        let store = Store::new(3);
        let workers = store.current_workers();
        assert_eq!(workers.len(), 3);
        for id in ["1", "2", "3"] {
            assert_eq!(workers[id], WorkerState::default());
            assert_eq!(workers[id].current_file, WAITING_LABEL);
        }
        assert!(!store.all_finished());
    }

    #[test]
    fn all_finished_requires_every_worker_at_full_progress() {
        let store = Store::new(2);
        store.update(result("1", Some(SpecStatus::Passed), 1.0, Some("a_spec.rb")));
        assert!(!store.all_finished());
        store.update(result("2", Some(SpecStatus::Failed), 1.0, Some("b_spec.rb")));
        assert!(store.all_finished());
    }

    #[test]
    fn finish_predicate_tracks_last_reported_percent_regardless_of_order() {
        let store = Store::new(2);
        store.update(result("2", None, 1.0, None));
        store.update(result("1", None, 1.0, None));
        // A later report can move a worker back below the threshold.
        store.update(result("1", None, 0.9, None));
        assert!(!store.all_finished());
        store.update(result("1", None, 1.0, None));
        assert!(store.all_finished());
    }

    #[test]
    fn failed_file_is_recorded_once() {
        let store = Store::new(1);
        store.update(result("1", Some(SpecStatus::Failed), 0.5, Some("x_spec.rb")));
        store.update(result("1", Some(SpecStatus::Failed), 0.6, Some("x_spec.rb")));
        assert_eq!(store.failed_specs(), vec!["x_spec.rb".to_string()]);
        let workers = store.current_workers();
        assert_eq!(workers["1"].failed, 2);
    }

    #[test]
    fn failed_specs_keep_insertion_order() {
        let store = Store::new(1);
        for file in ["c_spec.rb", "a_spec.rb", "b_spec.rb"] {
            store.update(result("1", Some(SpecStatus::Failed), 0.1, Some(file)));
        }
        assert_eq!(
            store.failed_specs(),
            vec!["c_spec.rb", "a_spec.rb", "b_spec.rb"]
        );
    }

    #[test]
    fn failed_without_file_bumps_counter_only() {
        let store = Store::new(1);
        store.update(result("1", Some(SpecStatus::Failed), 0.2, None));
        assert!(store.failed_specs().is_empty());
        assert_eq!(store.current_workers()["1"].failed, 1);
    }

    #[test]
    fn unknown_worker_is_a_no_op() {
        let store = Store::new(2);
        store.update(result("9", Some(SpecStatus::Passed), 1.0, Some("ghost_spec.rb")));
        let workers = store.current_workers();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers["1"], WorkerState::default());
        assert_eq!(workers["2"], WorkerState::default());
        assert!(store.failed_specs().is_empty());
    }

    #[test]
    fn unknown_status_updates_progress_without_counters() {
        let store = Store::new(1);
        store.update(result("1", None, 0.4, Some("odd_spec.rb")));
        let worker = &store.current_workers()["1"];
        assert_eq!((worker.passed, worker.failed, worker.pending), (0, 0, 0));
        assert_eq!(worker.percent, 0.4);
        assert_eq!(worker.current_file, "odd_spec.rb");
    }

    #[test]
    fn result_without_file_keeps_previous_label() {
        let store = Store::new(1);
        store.update(result("1", Some(SpecStatus::Passed), 0.3, Some("kept_spec.rb")));
        store.update(result("1", Some(SpecStatus::Passed), 0.6, None));
        assert_eq!(store.current_workers()["1"].current_file, "kept_spec.rb");
    }

    #[test]
    fn repeated_log_text_dedups_with_latest_level_and_stream() {
        let store = Store::new(1);
        for stream in ["stdout", "stderr", "stdout", "stderr", "worker-3"] {
            store.update(Event::log(LogLevel::Log, stream, "  retrying connection  "));
        }
        store.update(Event::log(LogLevel::Warning, "stderr", "retrying connection"));
        let logs = store.current_logs();
        assert_eq!(logs.len(), 1);
        let entry = &logs["retrying connection"];
        assert_eq!(entry.count, 6);
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.stream, "stderr");
    }

    #[test]
    fn blank_log_messages_are_dropped() {
        let store = Store::new(1);
        store.update(Event::log(LogLevel::Log, "stdout", "   "));
        assert!(store.current_logs().is_empty());
    }

    #[test]
    fn summary_average_excludes_never_started_workers() {
        let store = Store::new(4);
        store.update(result("1", Some(SpecStatus::Passed), 0.5, None));
        store.update(result("2", None, 0.7, None));
        let stats = store.summary_stats();
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.active_workers, 2);
        assert!((stats.avg_progress - 0.6).abs() < 1e-9);
    }

    #[test]
    fn summary_with_no_active_workers_reports_zero_progress() {
        let store = Store::new(3);
        let stats = store.summary_stats();
        assert_eq!(stats.active_workers, 0);
        assert_eq!(stats.avg_progress, 0.0);
    }

    #[test]
    fn two_worker_end_to_end_totals() {
        let store = Store::new(2);
        store.update(result("1", Some(SpecStatus::Passed), 1.0, Some("a_spec.rb")));
        store.update(result("2", Some(SpecStatus::Failed), 1.0, Some("b_spec.rb")));
        assert!(store.all_finished());
        assert_eq!(store.failed_specs(), vec!["b_spec.rb".to_string()]);
        let stats = store.summary_stats();
        assert_eq!((stats.passed, stats.failed, stats.pending), (1, 1, 0));
    }

    #[test]
    fn info_view_orders_by_descending_count() {
        let store = Store::new(1);
        for _ in 0..3 {
            store.update(Event::log(LogLevel::Log, "stdout", "common"));
        }
        store.update(Event::log(LogLevel::Info, "stdout", "rare"));
        store.update(Event::log(LogLevel::Error, "stderr", "broken pipe"));
        let info = store.info_logs();
        assert_eq!(
            info.iter().map(|(text, _)| text.as_str()).collect::<Vec<_>>(),
            vec!["common", "rare"]
        );
    }

    #[test]
    fn diagnostic_view_ranks_severity_before_count() {
        let store = Store::new(1);
        for _ in 0..5 {
            store.update(Event::log(LogLevel::Warning, "stderr", "slow query"));
        }
        store.update(Event::log(LogLevel::Error, "stderr", "connection refused"));
        store.update(Event::log(LogLevel::Debug, "stdout", "cache miss"));
        store.update(Event::log(LogLevel::Log, "stdout", "starting suite"));
        let diagnostics = store.diagnostic_logs();
        assert_eq!(
            diagnostics
                .iter()
                .map(|(text, _)| text.as_str())
                .collect::<Vec<_>>(),
            vec!["connection refused", "slow query", "cache miss"]
        );
    }

    #[test]
    fn sorted_workers_orders_ids_numerically() {
        let store = Store::new(12);
        let ids: Vec<String> = store
            .sorted_workers()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids[0], "1");
        assert_eq!(ids[1], "2");
        assert_eq!(ids[9], "10");
        assert_eq!(ids[11], "12");
    }

    #[test]
    fn concurrent_updates_from_many_threads_lose_nothing() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(Store::new(8));
        let per_thread = 50;
        let handles: Vec<_> = (1..=8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for step in 1..=per_thread {
                        store.update(result(
                            &worker.to_string(),
                            Some(SpecStatus::Passed),
                            step as f64 / per_thread as f64,
                            Some("spec.rb"),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        let stats = store.summary_stats();
        assert_eq!(stats.passed, 8 * per_thread as u64);
        assert!(store.all_finished());
        for (_, worker) in store.sorted_workers() {
            assert_eq!(worker.passed, per_thread as u64);
            assert_eq!(worker.percent, 1.0);
        }
    }
}
