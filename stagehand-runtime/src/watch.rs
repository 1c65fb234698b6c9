//! `stagehand watch`: re-sync a service whenever its source tree settles.
//!
//! A watcher task collects filesystem events and debounces them per service;
//! once a service has been quiet for the debounce window it is handed to a
//! single processor task, which runs the sync on the blocking pool. Syncs
//! therefore never overlap. Ctrl-C stops both tasks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use stagehand_core::{ProjectConfig, ServiceName};
use stagehand_sync::ExclusionSet;

use crate::error::io_err;
use crate::DispatchError;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// One watched source root.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub service: ServiceName,
    pub source_root: PathBuf,
    pub exclusions: ExclusionSet,
}

impl WatchTarget {
    /// Targets for `services` (all configured services when empty).
    pub fn for_services(
        config: &ProjectConfig,
        services: &[ServiceName],
    ) -> Result<Vec<Self>, DispatchError> {
        let selected: Vec<_> = if services.is_empty() {
            config.services.iter().collect()
        } else {
            services
                .iter()
                .map(|name| config.service(Some(name.as_str())))
                .collect::<Result<_, _>>()?
        };

        selected
            .into_iter()
            .map(|service| -> Result<Self, DispatchError> {
                let root = config.resolve(&service.source);
                // FSEvents reports real paths (e.g. /private/var/...), so
                // compare against the canonical root.
                let source_root = fs::canonicalize(&root).map_err(|e| io_err(&root, e))?;
                Ok(Self {
                    service: service.name.clone(),
                    source_root,
                    exclusions: ExclusionSet::new(service.exclusions())?,
                })
            })
            .collect()
    }
}

/// Trailing-edge debounce keyed by service.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<ServiceName, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Note activity for `service`, pushing its deadline back.
    pub fn record(&mut self, service: ServiceName, now: Instant) {
        self.pending.insert(service, now);
    }

    /// Services quiet for at least the window; they are removed from pending.
    pub fn due(&mut self, now: Instant) -> Vec<ServiceName> {
        let window = self.window;
        let mut ready: Vec<ServiceName> = self
            .pending
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= window)
            .map(|(service, _)| service.clone())
            .collect();
        for service in &ready {
            self.pending.remove(service);
        }
        ready.sort();
        ready
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Build a runtime and watch until Ctrl-C.
pub fn start_blocking<F>(targets: Vec<WatchTarget>, on_burst: F) -> Result<(), DispatchError>
where
    F: Fn(&ServiceName) + Send + Sync + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(targets, DEBOUNCE_WINDOW, on_burst))
}

/// Watch `targets` and call `on_burst` once per settled burst of changes.
pub async fn run<F>(
    targets: Vec<WatchTarget>,
    window: Duration,
    on_burst: F,
) -> Result<(), DispatchError>
where
    F: Fn(&ServiceName) + Send + Sync + 'static,
{
    let (burst_tx, burst_rx) = mpsc::channel::<ServiceName>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let on_burst = Arc::new(on_burst);

    // Subscribe before spawning so an early failure still reaches every task.
    let watcher_rx = shutdown_tx.subscribe();
    let processor_rx = shutdown_tx.subscribe();
    let mut signal_rx = shutdown_tx.subscribe();

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(targets, window, burst_tx, watcher_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = processor_task(on_burst, burst_rx, processor_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, stopping watch");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => {
                        let _ = shutdown.send(());
                        Err(DispatchError::Watch(format!("ctrl-c handler failed: {err}")))
                    }
                },
            }
        })
    };

    let (watcher_result, processor_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("processor", processor_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    targets: Vec<WatchTarget>,
    window: Duration,
    burst_tx: mpsc::Sender<ServiceName>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DispatchError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    for target in &targets {
        watcher.watch(&target.source_root, RecursiveMode::Recursive)?;
        tracing::info!(
            service = %target.service,
            path = %target.source_root.display(),
            "watching"
        );
    }

    let mut debouncer = Debouncer::new(window);
    let mut tick = tokio::time::interval(window / 5);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in &event.paths {
                    if let Some(target) = target_for_path(&targets, path) {
                        debouncer.record(target.service.clone(), Instant::now());
                    }
                }
            }
            _ = tick.tick(), if !debouncer.is_idle() => {
                for service in debouncer.due(Instant::now()) {
                    if burst_tx.send(service).await.is_err() {
                        return Err(DispatchError::Watch("processor channel closed".into()));
                    }
                }
            }
        }
    }

    Ok(())
}

async fn processor_task<F>(
    on_burst: Arc<F>,
    mut burst_rx: mpsc::Receiver<ServiceName>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DispatchError>
where
    F: Fn(&ServiceName) + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_service = burst_rx.recv() => {
                let Some(service) = maybe_service else { break };
                let handler = on_burst.clone();
                tokio::task::spawn_blocking(move || handler(&service))
                    .await
                    .map_err(|err| DispatchError::Watch(format!("sync task join error: {err}")))?;
            }
        }
    }
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// The target whose source root most specifically contains `path`, unless
/// the path is excluded for that target.
fn target_for_path<'a>(targets: &'a [WatchTarget], path: &Path) -> Option<&'a WatchTarget> {
    let target = targets
        .iter()
        .filter(|t| path.starts_with(&t.source_root))
        .max_by_key(|t| t.source_root.components().count())?;
    let relative = path.strip_prefix(&target.source_root).ok()?;
    if target.exclusions.matches(relative) {
        return None;
    }
    Some(target)
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DispatchError>, tokio::task::JoinError>,
) -> Result<(), DispatchError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DispatchError::Watch(format!("{task} task join failure: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn target(service: &str, root: &str, excludes: &[&str]) -> WatchTarget {
        WatchTarget {
            service: ServiceName::from(service),
            source_root: PathBuf::from(root),
            exclusions: ExclusionSet::new(excludes.iter().copied()).unwrap(),
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_events_settles_into_one_trigger() {
        let window = Duration::from_millis(500);
        let mut debouncer = Debouncer::new(window);
        let api = ServiceName::from("api");
        let mut triggers = Vec::new();

        for _ in 0..5 {
            debouncer.record(api.clone(), Instant::now());
            triggers.extend(debouncer.due(Instant::now()));
            advance(Duration::from_millis(100)).await;
        }
        assert!(triggers.is_empty(), "still inside the burst");

        advance(Duration::from_millis(450)).await;
        triggers.extend(debouncer.due(Instant::now()));
        assert_eq!(triggers, vec![api]);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn services_are_debounced_independently() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.record(ServiceName::from("api"), Instant::now());
        advance(Duration::from_millis(300)).await;
        debouncer.record(ServiceName::from("web"), Instant::now());
        advance(Duration::from_millis(250)).await;

        assert_eq!(debouncer.due(Instant::now()), vec![ServiceName::from("api")]);
        advance(Duration::from_millis(300)).await;
        assert_eq!(debouncer.due(Instant::now()), vec![ServiceName::from("web")]);
    }

    #[test]
    fn events_map_to_most_specific_root() {
        let targets = vec![
            target("api", "/work/api", &[]),
            target("worker", "/work/api/worker", &[]),
        ];
        let hit = target_for_path(&targets, Path::new("/work/api/worker/job.py")).unwrap();
        assert_eq!(hit.service.as_str(), "worker");
        let hit = target_for_path(&targets, Path::new("/work/api/main.py")).unwrap();
        assert_eq!(hit.service.as_str(), "api");
        assert!(target_for_path(&targets, Path::new("/elsewhere/x.py")).is_none());
    }

    #[test]
    fn excluded_paths_do_not_trigger() {
        let targets = vec![target("api", "/work/api", &["__pycache__", "*.pyc"])];
        let cached = Path::new("/work/api/pkg/__pycache__/m.cpython.pyc");
        assert!(target_for_path(&targets, cached).is_none());
        assert!(target_for_path(&targets, Path::new("/work/api/pkg/m.py")).is_some());
    }

    #[test]
    fn access_events_are_ignored() {
        assert!(!is_relevant_event_kind(&EventKind::Access(notify::event::AccessKind::Any)));
        assert!(is_relevant_event_kind(&EventKind::Remove(notify::event::RemoveKind::File)));
    }
}
