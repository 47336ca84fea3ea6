use super::*;
use pretty_assertions::assert_eq;
use tokio::time;

const WINDOW: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct Recorder {
    start: Option<Instant>,
    fired: Arc<Mutex<Vec<(String, Duration)>>>,
}

#[async_trait::async_trait]
impl Dispatch for Recorder {
    async fn dispatch(&self, key: String) {
        if key == "panic" {
            panic!("dispatch failed");
        }
        let elapsed = self.start.map(|t| t.elapsed()).unwrap_or_default();
        self.fired.lock().push((key, elapsed));
    }
}

impl Recorder {
    fn started() -> Self {
        Self {
            start: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn fired(&self) -> Vec<(String, Duration)> {
        self.fired.lock().clone()
    }

    fn keys(&self) -> Vec<String> {
        self.fired().into_iter().map(|(k, _)| k).collect()
    }
}

fn debouncer(recorder: &Recorder) -> Debouncer<Recorder> {
    Debouncer::new(WINDOW, recorder.clone(), DebounceMetrics::default())
}

#[tokio::test(start_paused = true)]
async fn fires_once_after_quiet_window() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("pod:default:web".to_string());
    assert_eq!(debouncer.pending(), 1);

    time::sleep(WINDOW - Duration::from_millis(1)).await;
    assert!(recorder.fired().is_empty());

    time::sleep(Duration::from_millis(2)).await;
    assert_eq!(
        recorder.fired(),
        vec![("pod:default:web".to_string(), WINDOW)]
    );
    assert_eq!(debouncer.pending(), 0);

    time::sleep(WINDOW * 3).await;
    assert_eq!(recorder.fired().len(), 1, "must not fire twice");
}

#[tokio::test(start_paused = true)]
async fn adds_within_window_coalesce() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    for _ in 0..4 {
        debouncer.add("deployment:default:web".to_string());
        time::sleep(Duration::from_secs(3)).await;
    }
    // The last add happened at 9s.
    assert!(recorder.fired().is_empty());

    time::sleep(WINDOW).await;
    assert_eq!(
        recorder.fired(),
        vec![("deployment:default:web".to_string(), Duration::from_secs(19))]
    );
    assert_eq!(debouncer.inner.metrics.adds.get(), 4);
    assert_eq!(debouncer.inner.metrics.fires.get(), 1);
    assert_eq!(debouncer.inner.metrics.forced_fires.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_fire_independently() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("pod:a:web".to_string());
    time::sleep(Duration::from_secs(4)).await;
    debouncer.add("pod:b:web".to_string());
    assert_eq!(debouncer.pending(), 2);

    time::sleep(WINDOW * 2).await;
    assert_eq!(
        recorder.fired(),
        vec![
            ("pod:a:web".to_string(), WINDOW),
            ("pod:b:web".to_string(), WINDOW + Duration::from_secs(4)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn add_after_fire_starts_a_new_cycle() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("job:default:migrate".to_string());
    time::sleep(WINDOW + Duration::from_secs(1)).await;
    debouncer.add("job:default:migrate".to_string());
    time::sleep(WINDOW + Duration::from_secs(1)).await;

    assert_eq!(
        recorder.fired(),
        vec![
            ("job:default:migrate".to_string(), WINDOW),
            (
                "job:default:migrate".to_string(),
                WINDOW * 2 + Duration::from_secs(1)
            ),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn sustained_churn_fires_at_max_delay() {
    let recorder = Recorder::started();
    let debouncer = Debouncer::with_max_delay(
        WINDOW,
        WINDOW * 5,
        recorder.clone(),
        DebounceMetrics::default(),
    );

    // Touch the key every half window for well beyond the maximum delay.
    for _ in 0..12 {
        debouncer.add("pod:default:flappy".to_string());
        time::sleep(WINDOW / 2).await;
    }

    let fired = recorder.fired();
    assert_eq!(
        fired.first(),
        Some(&("pod:default:flappy".to_string(), WINDOW * 5))
    );
    assert_eq!(fired.len(), 1);
    assert_eq!(debouncer.inner.metrics.forced_fires.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn max_delay_is_never_shorter_than_window() {
    let recorder = Recorder::started();
    let debouncer = Debouncer::with_max_delay(
        WINDOW,
        Duration::from_secs(1),
        recorder.clone(),
        DebounceMetrics::default(),
    );

    debouncer.add("pod:default:web".to_string());
    time::sleep(WINDOW / 2).await;
    assert!(recorder.fired().is_empty());

    time::sleep(WINDOW).await;
    assert_eq!(recorder.keys(), vec!["pod:default:web".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_and_ignores_later_adds() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("pod:default:a".to_string());
    debouncer.add("pod:default:b".to_string());
    time::sleep(WINDOW / 2).await;

    debouncer.close();
    assert_eq!(debouncer.pending(), 0);
    debouncer.add("pod:default:c".to_string());
    assert_eq!(debouncer.pending(), 0);

    time::sleep(WINDOW * 3).await;
    assert!(recorder.fired().is_empty());
    assert_eq!(debouncer.inner.metrics.pending.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_dispatch_does_not_affect_other_keys() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("panic".to_string());
    debouncer.add("pod:default:web".to_string());
    time::sleep(WINDOW * 2).await;

    assert_eq!(recorder.keys(), vec!["pod:default:web".to_string()]);
    assert_eq!(debouncer.inner.metrics.panics.get(), 1);
    assert_eq!(debouncer.inner.metrics.fires.get(), 2);

    // The debouncer keeps working after a panic.
    debouncer.add("pod:default:api".to_string());
    time::sleep(WINDOW * 2).await;
    assert_eq!(recorder.fired().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn closes_on_shutdown_signal() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);
    let (signal, watch) = drain::channel();
    let closed = debouncer.close_on(watch);

    debouncer.add("pod:default:web".to_string());
    signal.drain().await;
    closed.await.expect("close task must not fail");

    time::sleep(WINDOW * 2).await;
    assert!(recorder.fired().is_empty());
    debouncer.add("pod:default:web".to_string());
    assert_eq!(debouncer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn churn_on_one_key_does_not_delay_another() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);

    debouncer.add("pod:default:steady".to_string());
    for _ in 0..5 {
        debouncer.add("pod:default:churning".to_string());
        time::sleep(Duration::from_secs(3)).await;
    }

    // The churning key was last touched at 12s and is still pending.
    assert_eq!(
        recorder.fired(),
        vec![("pod:default:steady".to_string(), WINDOW)]
    );
    assert_eq!(debouncer.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_last_clone_closes() {
    let recorder = Recorder::started();
    let debouncer = debouncer(&recorder);
    let clone = debouncer.clone();

    debouncer.add("pod:default:web".to_string());
    drop(debouncer);
    assert_eq!(clone.pending(), 1, "a remaining clone keeps the debouncer open");

    drop(clone);
    time::sleep(WINDOW * 2).await;
    assert!(recorder.fired().is_empty());
    assert_eq!(
        Arc::strong_count(&recorder.fired),
        1,
        "timer tasks must release the dispatcher"
    );
}
