//! End-to-end tests: session cycles over an in-memory host with fake
//! generators and in-memory stores.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use umbra_common::{NodeId, PatchId};
use umbra_config::Policy;
use umbra_core::collect::ScanScope;
use umbra_core::host::{HostTree, MemoryTree};
use umbra_core::monitor::{run_monitor, ChangeMonitor, MutationEvent, Trigger};
use umbra_core::session::{CycleStatus, Session, SessionRunner};
use umbra_core::store::{ImportMode, MemoryKvStore, PatternLifecycle, PatternStore, Rating};
use umbra_core::synth::{GenerationFailure, GenerationRequest, PatchGenerator, SourceKind};

// ============================================================================
// Helpers
// ============================================================================

const DROPDOWN_PAGE: &str = r#"{
    "viewport": { "width": 1920, "height": 1080 },
    "root": {
        "tag": "html",
        "box": { "width": 1920, "height": 1080 },
        "children": [{
            "tag": "body",
            "style": { "background_color": "rgb(18, 18, 18)", "color": "rgb(220, 220, 220)" },
            "box": { "width": 1920, "height": 1080 },
            "children": [{
                "tag": "div",
                "classes": ["dropdown-menu"],
                "text": "Settings",
                "style": {
                    "background_color": "rgba(0, 0, 0, 0)",
                    "color": "rgb(230, 230, 230)",
                    "position": "absolute",
                    "z_index": "500"
                },
                "box": { "x": 10, "y": 40, "width": 200, "height": 300 }
            }]
        }]
    }
}"#;

fn dropdown_page() -> MemoryTree {
    MemoryTree::from_json(DROPDOWN_PAGE).expect("fixture parses")
}

fn session(kv: &MemoryKvStore) -> Session {
    Session::new(Policy::default(), Box::new(kv.clone()))
}

struct FakeGenerator {
    reply: Result<String, GenerationFailure>,
    calls: AtomicUsize,
    seen: std::sync::Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(GenerationFailure::Transport("connection refused".to_string())),
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PatchGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        self.reply.clone()
    }
}

// ============================================================================
// Synthesis paths
// ============================================================================

#[tokio::test]
async fn generated_fix_for_dropdown_is_one_scoped_block() {
    let mut tree = dropdown_page();
    let generator = FakeGenerator::replying(
        "Here is a fix:\n```css\n.dropdown-menu { background-color: rgb(32, 32, 36); color: #eee }\n```",
    );
    let kv = MemoryKvStore::new();
    let mut s = session(&kv).with_generator(generator.clone());
    s.init(&mut tree).unwrap();

    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;

    assert_eq!(report.status, CycleStatus::Completed);
    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.patches[0].source_kind, SourceKind::Generated);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let blocks = tree.style_blocks();
    assert_eq!(blocks.len(), 1);
    let css = blocks.values().next().unwrap();
    assert!(css.contains(".dropdown-menu"));
    assert!(css.contains("background-color: rgb(32, 32, 36) !important;"));
    assert!(css.contains("color: #eee !important;"));

    let request = &generator.seen.lock().unwrap()[0];
    assert_eq!(request.tag, "div");
    assert!(request.description.contains("transparent background"));
}

#[tokio::test]
async fn generation_failure_leaves_issue_open_and_retries() {
    let mut tree = dropdown_page();
    let generator = FakeGenerator::failing();
    let kv = MemoryKvStore::new();
    let mut s = session(&kv).with_generator(generator.clone());
    s.init(&mut tree).unwrap();

    let first = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert!(first.patches.is_empty());
    assert_eq!(first.no_patch.len(), 1);
    assert!(tree.style_blocks().is_empty());

    // Same issue set, but the unpatched issue is retried.
    let second = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert_eq!(second.no_patch.len(), 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn good_ratings_promote_a_learned_pattern_across_sessions() {
    let kv = MemoryKvStore::new();

    let mut patch_ids = Vec::new();
    for _ in 0..3 {
        let mut tree = dropdown_page();
        let mut s = session(&kv);
        s.init(&mut tree).unwrap();
        let report = s.run_cycle(&mut tree, &ScanScope::Full).await;
        assert_eq!(report.patches[0].source_kind, SourceKind::Template);
        let id = report.patches[0].patch_id.clone();
        s.record_feedback(&id, Rating::Good, None).unwrap();
        patch_ids.push(id);
    }

    let mut tree = dropdown_page();
    let generator = FakeGenerator::replying("color: red");
    let mut s = session(&kv).with_generator(generator.clone());
    s.init(&mut tree).unwrap();
    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;

    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.patches[0].source_kind, SourceKind::Learned);
    assert!((report.patches[0].confidence - 1.0).abs() < 1e-12);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0, "learned path wins");
    assert_eq!(s.store().ledger().len(), 3);
}

#[tokio::test]
async fn bad_ratings_deprecate_and_close_the_template_gate() {
    let kv = MemoryKvStore::new();
    {
        let mut tree = dropdown_page();
        let mut s = session(&kv);
        s.init(&mut tree).unwrap();
        let report = s.run_cycle(&mut tree, &ScanScope::Full).await;
        let id = report.patches[0].patch_id.clone();
        for _ in 0..3 {
            s.record_feedback(&id, Rating::Bad, None).unwrap();
        }
    }

    let store = PatternStore::open(Box::new(kv.clone()), "umbra", Policy::default().synthesis);
    let record = store.records().next().unwrap();
    assert_eq!(record.lifecycle, PatternLifecycle::Deprecated);
    assert_eq!(record.confidence, 0.0);
    // (0+1)/(3+2) is under the template gate.
    assert!((store.element_confidence("div", None) - 0.2).abs() < 1e-12);

    let mut tree = dropdown_page();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert!(report.patches.is_empty());
    assert_eq!(report.no_patch.len(), 1);
    assert!(tree.style_blocks().is_empty());
}

// ============================================================================
// Degraded store
// ============================================================================

#[tokio::test]
async fn unreadable_store_serves_low_confidence_templates_only() {
    let kv = MemoryKvStore::new();
    kv.set_fail_reads(true);
    let mut tree = dropdown_page();
    let generator = FakeGenerator::replying("color: red");
    let mut s = session(&kv).with_generator(generator.clone());
    assert!(s.store().is_degraded());
    s.init(&mut tree).unwrap();

    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;

    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.patches[0].source_kind, SourceKind::Template);
    assert!((report.patches[0].confidence - 0.1).abs() < 1e-12);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn feedback_survives_a_failed_write() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;

    kv.set_fail_writes(true);
    let outcome = s
        .record_feedback(&report.patches[0].patch_id, Rating::Good, None)
        .unwrap();
    assert!(!outcome.persisted);
    assert_eq!(outcome.observations, 1);
    assert!(s.store().is_degraded());

    kv.set_fail_writes(false);
    s.store_mut().flush().unwrap();
    assert!(!s.store().is_degraded());
}

// ============================================================================
// Export / import
// ============================================================================

#[tokio::test]
async fn exported_store_imports_into_an_empty_one() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;
    let id = report.patches[0].patch_id.clone();
    s.record_feedback(&id, Rating::Good, None).unwrap();
    s.record_feedback(&id, Rating::Bad, None).unwrap();

    let json = s.store().export(None).to_json().unwrap();

    let other = MemoryKvStore::new();
    let mut target = PatternStore::open(Box::new(other.clone()), "umbra", Policy::default().synthesis);
    let doc = umbra_core::store::StoreDocument::from_json(&json).unwrap();
    let imported = target.import(doc.clone(), ImportMode::Merge).unwrap();
    assert_eq!(imported.entries_added, 2);
    assert!(imported.persisted);

    let again = target.import(doc, ImportMode::Merge).unwrap();
    assert_eq!(again.entries_added, 0);
    assert_eq!(again.entries_skipped, 2);

    let sig = s.store().records().next().unwrap().signature.clone();
    let original = s.store().record(&sig).unwrap();
    let copy = target.record(&sig).unwrap();
    assert_eq!(copy.success_count, original.success_count);
    assert_eq!(copy.failure_count, original.failure_count);
    assert_eq!(copy.rule_text, original.rule_text);

    // A reopened store sees the imported ledger.
    let reopened = PatternStore::open(Box::new(other), "umbra", Policy::default().synthesis);
    assert_eq!(reopened.ledger().len(), 2);
}

// ============================================================================
// Change monitor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn mutation_burst_triggers_a_single_rescan() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let menu = tree.find_by_class("dropdown-menu").unwrap();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();

    let (tx, rx) = mpsc::channel(128);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = ChangeMonitor::new(
        Duration::from_millis(500),
        Duration::from_secs(60),
        tokio::time::Instant::now().into_std(),
    );

    let producer = async move {
        for i in 0..50u64 {
            let scope = if i % 2 == 0 { menu } else { NodeId(1) };
            tx.send(MutationEvent::at(scope)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        stop_tx.send(true).unwrap();
        tx
    };

    let mut runner = SessionRunner::new(&mut s, &mut tree);
    let (stats, _tx) = tokio::join!(run_monitor(monitor, rx, stop_rx, &mut runner), producer);

    assert_eq!(stats.mutations, 50);
    assert_eq!(stats.scans, 1);
    assert_eq!(runner.reports.len(), 1);
    assert_eq!(runner.triggers.get(&Trigger::Mutation), Some(&1));
    assert_eq!(runner.reports[0].patches.len(), 1);
    drop(runner);

    assert_eq!(tree.style_blocks().len(), 1);
    assert!(tree.has_marker(menu));
}

// ============================================================================
// Disable / apply
// ============================================================================

#[tokio::test]
async fn disable_removes_every_block_and_marker() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let body = tree.children(tree.root())[0];
    let card = tree
        .append_child(
            body,
            serde_json::from_str(
                r#"{
                    "tag": "div",
                    "classes": ["card"],
                    "text": "Hello",
                    "style": { "background_color": "rgb(255, 255, 255)", "color": "rgb(250, 250, 250)" },
                    "box": { "width": 300, "height": 80 }
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    let report = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert_eq!(report.patches.len(), 2);
    assert!(tree.has_marker(card));
    assert_eq!(tree.style_blocks().len(), 2);

    let disabled = s.disable(&mut tree);
    assert!(disabled.is_clean());
    assert_eq!(disabled.removed, 2);
    assert!(tree.style_blocks().is_empty());
    assert!(tree.marked_nodes().is_empty());
    assert!(!tree.mode_marker());

    let after = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert_eq!(after.status, CycleStatus::Disabled);
}

#[tokio::test]
async fn rejected_writes_are_reported_and_retried() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    tree.set_reject_writes(true);

    let first = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert_eq!(first.apply_errors.len(), 1);
    assert!(tree.style_blocks().is_empty());

    tree.set_reject_writes(false);
    let second = s.run_cycle(&mut tree, &ScanScope::Full).await;
    assert_eq!(second.patches.len(), 1);
    assert_eq!(tree.style_blocks().len(), 1);
}

#[tokio::test]
async fn ask_without_generator_is_a_generation_error() {
    let kv = MemoryKvStore::new();
    let mut tree = dropdown_page();
    let menu = tree.find_by_class("dropdown-menu").unwrap();
    let mut s = session(&kv);
    s.init(&mut tree).unwrap();
    let err = s.ask(&mut tree, menu, "make it darker").await.unwrap_err();
    assert!(matches!(err, umbra_common::Error::Generation(_)));

    let unknown = PatchId("patch-missing".to_string());
    assert!(s.record_feedback(&unknown, Rating::Good, None).is_err());
}
