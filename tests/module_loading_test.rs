//! Module loader integration tests
//! Run with: cargo test --test module_loading_test

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use carik_core::application::errors::ModuleError;
use carik_core::infrastructure::plugins::LoadOptions;
use carik_core::{
    EventKind, Layout, Manager, ManagerContext, ManagerDescriptor, ManagerEvent, Module, ModuleContext,
    ModuleEmitter, ModuleSignal,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Default)]
struct Tracker {
    initialized: AtomicUsize,
    shutdowns: AtomicUsize,
    config: Mutex<Value>,
}

struct Wallet {
    tracker: Arc<Tracker>,
}

#[async_trait]
impl Module for Wallet {
    fn name(&self) -> &str {
        "wallet"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        self.tracker.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        self.tracker.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_event_listeners(&self, emitter: ModuleEmitter) {
        emitter.custom("wallet.ready", json!({}));
    }
}

struct Flaky;

#[async_trait]
impl Module for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn status(&self) -> Result<Value, ModuleError> {
        Err(ModuleError::Status {
            module: "flaky".to_string(),
            reason: "upstream timeout".to_string(),
        })
    }
}

struct Sticky;

#[async_trait]
impl Module for Sticky {
    fn name(&self) -> &str {
        "sticky"
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        Err(ModuleError::Internal("connection still draining".to_string()))
    }
}

struct Faulty;

#[async_trait]
impl Module for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        Err(ModuleError::Internal("ledger offline".to_string()))
    }
}

fn write_manifest(root: &Path, source: &str, content: &str) {
    let dir = root.join("managers/economy/modules");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.yaml", source)), content).unwrap();
}

fn economy(root: &Path, tracker: Arc<Tracker>) -> Arc<Manager> {
    let descriptor = ManagerDescriptor::new("economy")
        .with_defaults(json!({
            "modules": { "wallet": { "limit": 10, "fee": 1 } }
        }))
        .with_module("wallet", move |ctx: ModuleContext| {
            *tracker.config.lock().unwrap() = ctx.config.clone();
            Ok(Arc::new(Wallet { tracker: tracker.clone() }) as Arc<dyn Module>)
        })
        .with_module("flaky", |_| Ok(Arc::new(Flaky) as Arc<dyn Module>))
        .with_module("sticky", |_| Ok(Arc::new(Sticky) as Arc<dyn Module>))
        .with_module("faulty", |_| Ok(Arc::new(Faulty) as Arc<dyn Module>));

    ManagerContext::builder(Layout::rooted(root))
        .register(descriptor)
        .build()
        .construct("economy")
        .unwrap()
}

#[tokio::test]
async fn test_loads_sources_and_isolates_failures() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "wallet", "config:\n  fee: 2\n");
    write_manifest(dir.path(), "broken", "factory: missing\n");
    write_manifest(dir.path(), "_shared", "");
    write_manifest(dir.path(), "paused", "factory: flaky\nenabled: false\n");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.events().subscribe_all(move |event| {
        sink.lock().unwrap().push(event.kind());
    });

    manager.initialize(None).await.unwrap();

    assert_eq!(manager.module_names(), vec!["wallet".to_string()]);
    assert_eq!(tracker.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(*tracker.config.lock().unwrap(), json!({"limit": 10, "fee": 2}));

    let events = events.lock().unwrap();
    assert_eq!(events.iter().filter(|k| **k == EventKind::ModuleError).count(), 1);
    assert_eq!(events.iter().filter(|k| **k == EventKind::ModuleLoaded).count(), 1);
    // initialized signal plus the custom `wallet.ready`
    assert_eq!(events.iter().filter(|k| **k == EventKind::Module).count(), 2);
}

#[tokio::test]
async fn test_reload_shuts_down_exactly_once() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "wallet", "");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());
    manager.initialize(None).await.unwrap();

    let report = manager.load_modules(LoadOptions::default()).await.unwrap();
    assert_eq!(report.skipped, vec!["wallet".to_string()]);
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 0);

    let report = manager.load_modules(LoadOptions { reload: true }).await.unwrap();
    assert_eq!(report.loaded, vec!["wallet".to_string()]);
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.initialized.load(Ordering::SeqCst), 2);

    manager.reload_module("wallet").await.unwrap();
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 2);
    assert!(manager.module("wallet").is_some());

    assert!(manager.unload_module("wallet").await);
    assert!(!manager.unload_module("wallet").await);
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_duplicate_module_name_rejected() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "wallet", "");
    write_manifest(dir.path(), "wallet_copy", "factory: wallet\n");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());
    manager.initialize(None).await.unwrap();

    let report = manager.load_modules(LoadOptions::default()).await.unwrap();
    assert_eq!(report.skipped, vec!["wallet".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "wallet_copy");

    // Both instances were initialized; the rejected ones were shut down again
    assert_eq!(manager.module_names(), vec!["wallet".to_string()]);
    assert_eq!(tracker.initialized.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_status_reports_module_errors() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "wallet", "");
    write_manifest(dir.path(), "flaky", "");

    let manager = economy(dir.path(), Arc::new(Tracker::default()));
    manager.initialize(None).await.unwrap();

    let status = manager.status().await;
    assert!(status.initialized);
    assert_eq!(status.modules["wallet"], json!({"name": "wallet", "version": "1.2.0"}));
    assert_eq!(
        status.modules["flaky"],
        json!({"error": "Module 'flaky' status unavailable: upstream timeout"})
    );
    assert_eq!(status.hooks["beforeInitialize"], 0);
}

#[tokio::test]
async fn test_shutdown_unloads_modules() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "wallet", "");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());
    manager.initialize(None).await.unwrap();

    let shutdown_signals = Arc::new(AtomicUsize::new(0));
    let seen = shutdown_signals.clone();
    manager.events().subscribe(EventKind::Module, move |event| {
        if let ManagerEvent::Module { signal: ModuleSignal::Shutdown, .. } = event {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    manager.shutdown().await.unwrap();
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(shutdown_signals.load(Ordering::SeqCst), 1);
    assert!(manager.module_names().is_empty());
}

#[tokio::test]
async fn test_failed_module_shutdown_does_not_stop_the_rest() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "sticky", "");
    write_manifest(dir.path(), "wallet", "");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());
    manager.initialize(None).await.unwrap();
    assert_eq!(manager.module_names(), vec!["sticky".to_string(), "wallet".to_string()]);

    let unloaded = Arc::new(AtomicUsize::new(0));
    let seen = unloaded.clone();
    manager.events().subscribe(EventKind::ModuleUnloaded, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    manager.shutdown().await.unwrap();
    assert!(!manager.is_initialized());
    assert_eq!(tracker.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(unloaded.load(Ordering::SeqCst), 2);
    assert!(manager.module_names().is_empty());
}

#[tokio::test]
async fn test_initialize_failure_names_the_module() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "faulty", "");
    write_manifest(dir.path(), "wallet", "");

    let tracker = Arc::new(Tracker::default());
    let manager = economy(dir.path(), tracker.clone());
    manager.initialize(None).await.unwrap();
    assert_eq!(manager.module_names(), vec!["wallet".to_string()]);

    let report = manager.load_modules(LoadOptions { reload: true }).await.unwrap();
    assert_eq!(
        report.failed,
        vec![(
            "faulty".to_string(),
            "Module 'faulty' failed to initialize: Internal error: ledger offline".to_string()
        )]
    );
    assert_eq!(report.loaded, vec!["wallet".to_string()]);
}

#[tokio::test]
async fn test_reload_module_requires_initialize() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let manager = economy(dir.path(), Arc::new(Tracker::default()));

    let err = manager.reload_module("wallet").await.unwrap_err();
    assert_eq!(err.to_string(), "Manager 'economy' is not initialized");
}
