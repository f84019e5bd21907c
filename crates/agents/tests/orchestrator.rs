mod common;

use std::sync::{Arc, Mutex};

use agents::{names, AgentRegistry, AutoGenerateRequest, ChainOptions, Orchestrator};
use common::Harness;
use pipeline::{ProgressEvent, ProgressReporter};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressReporter for Recorder {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn orchestrator(ctx: agents::AgentContext) -> Orchestrator {
    Orchestrator::new(Arc::new(ctx), AgentRegistry::standard())
}

#[tokio::test]
async fn chain_halts_at_first_failing_stage() {
    let harness = Harness::new();
    let orchestrator = orchestrator(harness.context());

    let report = orchestrator
        .run_chain("A landing page with a FAQ", ChainOptions::default())
        .await
        .unwrap();

    assert!(!report.ok);
    assert_eq!(
        report.failed_agent.as_ref().map(|a| a.as_str()),
        Some(names::PUBLISHER)
    );
    let ran: Vec<_> = report.outcomes.iter().map(|o| o.agent.as_str()).collect();
    assert_eq!(
        ran,
        vec![
            names::ANALYST,
            names::BUILDER,
            names::REVIEWER,
            names::STYLE,
            names::TESTER,
            names::PUBLISHER
        ]
    );
    assert_eq!(report.outcomes.last().unwrap().stage.as_deref(), Some("env"));

    let bus = &orchestrator.context().bus;
    assert_eq!(bus.history(Some("pipeline:failed"), None).len(), 1);
    assert!(bus.history(Some("pipeline:complete"), None).is_empty());
}

#[tokio::test]
async fn chain_completes_with_cms_configured() {
    let harness = Harness::new();
    let orchestrator = orchestrator(harness.cms_context());

    let report = orchestrator
        .run_chain("pricing table", ChainOptions::default())
        .await
        .unwrap();

    assert!(report.ok, "{:?}", report.failure());
    assert_eq!(report.outcomes.len(), 7);
    let context_id = report.context_id.unwrap();
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.handover.as_ref().unwrap().context_id() == context_id));
    assert!(harness.cms.calls().is_empty(), "dry-run publishes nothing");
    assert!(!harness.exists("schemas/blocks/pricingBlock.ts"));
}

#[tokio::test]
async fn chain_builds_every_block_the_analyst_planned() {
    let harness = Harness::new();
    let orchestrator = orchestrator(harness.cms_context());

    let report = orchestrator
        .run_chain("A FAQ section and a pricing table", ChainOptions::default())
        .await
        .unwrap();

    assert!(report.ok, "{:?}", report.failure());
    let builder = report
        .outcomes
        .iter()
        .find(|o| o.agent.as_str() == names::BUILDER)
        .unwrap();
    let sources = builder.report["sources"].as_object().unwrap();
    assert!(sources.contains_key("schemas/blocks/faqBlock.ts"));
    assert!(sources.contains_key("schemas/blocks/pricingBlock.ts"));
    assert_eq!(builder.report["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(builder.report["blocks"][0]["detection"], "plan");

    let manifest = orchestrator
        .context()
        .manifests
        .load(report.context_id.unwrap())
        .await
        .unwrap();
    assert_eq!(manifest.blocks, vec!["faqBlock", "pricingBlock"]);
}

#[tokio::test]
async fn auto_generate_reports_each_step_then_completes() {
    let harness = Harness::new();
    let orchestrator = orchestrator(harness.context());
    let recorder = Recorder::default();

    let mut request = AutoGenerateRequest::new("Launch page");
    request.blocks = vec!["faqBlock".to_string(), "pricingBlock".to_string()];
    request.pages = vec!["home".to_string()];
    let report = orchestrator.auto_generate(request, &recorder).await.unwrap();

    assert!(report.ok, "{:?}", report.failure());
    let events = recorder.events.into_inner().unwrap();
    assert_eq!(events.len(), 8);
    let messages: Vec<String> = events[..7]
        .iter()
        .enumerate()
        .map(|(i, event)| match event {
            ProgressEvent::Progress {
                current,
                total,
                message,
            } => {
                assert_eq!(*current, i + 1);
                assert_eq!(*total, 7);
                message.clone()
            }
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(messages[0], "Building faqBlock");
    assert_eq!(messages[1], "Building pricingBlock");
    assert_eq!(messages[6], format!("Running {}", names::COMPAT));
    assert!(matches!(events[7], ProgressEvent::Complete { .. }));

    let outcomes: Vec<_> = report.outcomes.iter().map(|o| o.agent.as_str()).collect();
    assert_eq!(outcomes.last(), Some(&names::COMPAT));
}

#[tokio::test]
async fn auto_generate_ends_with_error_event_on_failure() {
    let harness = Harness::new();
    let orchestrator = orchestrator(harness.context());
    let recorder = Recorder::default();

    let mut request = AutoGenerateRequest::new("a countdown");
    request.publish = true;
    let report = orchestrator.auto_generate(request, &recorder).await.unwrap();

    assert!(!report.ok);
    let events = recorder.events.into_inner().unwrap();
    match events.last().unwrap() {
        ProgressEvent::Error { error } => {
            assert!(error.starts_with(names::PUBLISHER));
            assert!(error.contains("Missing environment variables"));
        }
        other => panic!("expected terminal error, got {other:?}"),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}
