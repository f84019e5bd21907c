mod common;

use std::sync::Arc;

use agents::stages::{
    BuilderAgent, CleanupAgent, CompatAgent, DiagnosticAgent, InitAgent, PageGeneratorAgent,
    PublisherAgent, ReviewerAgent, TesterAgent,
};
use agents::{names, run_agent, AgentInput};
use common::{FakeCms, FakeLlm, Harness};
use pipeline::{
    create_blocked_handover, AgentName, Artifacts, ContextId, Handover, HandoverData,
    HandoverStatus, LlmProvider, Stage,
};
use serde_json::json;

fn ready_from(stage: Stage, next: &'static str, context_id: ContextId) -> Handover {
    Handover::ready(
        context_id,
        Some(AgentName::from_static(next)),
        stage,
        HandoverData::default(),
    )
}

// ---------------------------------------------------------------------------
// publisher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publisher_upserts_blocks_and_pages_and_snapshots_ready_handover() {
    let harness = Harness::new();
    let ctx = harness.cms_context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "heroBlock").await.unwrap();
    ctx.manifests.add_page(context_id, "home").await.unwrap();

    let input = AgentInput::new()
        .with_handover(Some(ready_from(Stage::Test, names::PUBLISHER, context_id)))
        .with_dry_run(false);
    let outcome = run_agent(&PublisherAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(outcome.report["created"], 2);
    assert!(harness.cms.document("blockDefinition-heroBlock").is_some());
    assert_eq!(
        harness.cms.document("page-home").unwrap()["sections"][0]["_type"],
        "heroBlock"
    );

    let snapshot = harness
        .out()
        .join(context_id.to_string())
        .join("publisher-handover.json");
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(snapshot).unwrap()).unwrap();
    assert_eq!(written["status"], "ready");
    assert_eq!(written["nextAgent"], "cleanupAgent");
    assert_eq!(written["contextId"], context_id.to_string());

    let again = run_agent(
        &PublisherAgent,
        &ctx,
        AgentInput::new()
            .with_handover(Some(ready_from(Stage::Test, names::PUBLISHER, context_id)))
            .with_dry_run(false),
    )
    .await;
    assert_eq!(again.report["created"], 0);
    assert_eq!(again.report["updated"], 2);
}

#[tokio::test]
async fn publisher_keeps_page_titles_composed_by_the_page_generator() {
    let harness = Harness::new();
    let ctx = harness.cms_context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "heroBlock").await.unwrap();

    let composed = run_agent(
        &PageGeneratorAgent,
        &ctx,
        AgentInput::new()
            .with_config(json!({ "pages": ["Contact us", "À propos"] }))
            .with_handover(Some(ready_from(Stage::Build, names::PAGE_GENERATOR, context_id)))
            .with_dry_run(false),
    )
    .await;
    assert!(composed.ok, "{:?}", composed.error);

    let outcome = run_agent(
        &PublisherAgent,
        &ctx,
        AgentInput::new()
            .with_handover(Some(ready_from(Stage::Test, names::PUBLISHER, context_id)))
            .with_dry_run(false),
    )
    .await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(harness.cms.document("page-contact-us").unwrap()["title"], "Contact us");
    assert_eq!(harness.cms.document("page-a-propos").unwrap()["title"], "À propos");
}

#[tokio::test]
async fn publisher_takes_titles_from_incoming_pages() {
    let harness = Harness::new();
    let ctx = harness.cms_context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_page(context_id, "a-propos").await.unwrap();

    let handover = Handover::ready(
        context_id,
        Some(AgentName::from_static(names::PUBLISHER)),
        Stage::Pagegen,
        HandoverData::default().with_artifacts(Artifacts {
            pages: vec![json!({ "title": "À propos", "slug": { "current": "a-propos" } })],
            ..Default::default()
        }),
    );
    let outcome = run_agent(
        &PublisherAgent,
        &ctx,
        AgentInput::new().with_handover(Some(handover)).with_dry_run(false),
    )
    .await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(outcome.report["created"], 1);
    assert_eq!(harness.cms.document("page-a-propos").unwrap()["title"], "À propos");
}

#[tokio::test]
async fn publisher_dry_run_makes_no_cms_calls() {
    let harness = Harness::new();
    let ctx = harness.cms_context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "faqBlock").await.unwrap();

    let input = AgentInput::new()
        .with_handover(Some(ready_from(Stage::Test, names::PUBLISHER, context_id)));
    let outcome = run_agent(&PublisherAgent, &ctx, input).await;

    assert!(outcome.ok);
    assert_eq!(outcome.report["planned"], 1);
    assert!(harness.cms.calls().is_empty());
}

#[tokio::test]
async fn missing_cms_environment_fails_before_any_call() {
    let harness = Harness::new();
    let ctx = harness
        .context()
        .with_cms(Some(harness.cms.clone() as Arc<dyn pipeline::CmsClient>));

    let outcome = run_agent(&PublisherAgent, &ctx, AgentInput::new().with_dry_run(false)).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.stage.as_deref(), Some("env"));
    assert_eq!(outcome.missing.len(), 4);
    assert!(outcome.missing.contains(&"SANITY_API_TOKEN".to_string()));
    assert!(outcome.handover.is_none());
    assert!(harness.cms.calls().is_empty());
}

// ---------------------------------------------------------------------------
// builder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn builder_relays_blocked_handover_without_work() {
    let harness = Harness::new();
    let llm = Arc::new(FakeLlm::answering("unused"));
    let ctx = harness
        .context()
        .with_llm(Some(llm.clone() as Arc<dyn LlmProvider>));
    let context_id = ContextId::new_random();
    let blocked = create_blocked_handover(
        context_id,
        Some(AgentName::from_static(names::BUILDER)),
        Stage::Review,
        vec!["schema invalid".to_string()],
        HandoverData::default(),
    );

    let input = AgentInput::new()
        .with_prompt("a countdown")
        .with_handover(Some(blocked))
        .with_dry_run(false);
    let outcome = run_agent(&BuilderAgent, &ctx, input).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some("Handover blocked"));
    assert_eq!(llm.calls(), 0);
    assert!(!harness.exists("schemas/blocks/countdownBlock.ts"));

    let relayed = outcome.handover.unwrap();
    assert_eq!(relayed.status(), HandoverStatus::Blocked);
    assert_eq!(relayed.context_id(), context_id);
    assert_eq!(relayed.errors().to_vec(), vec!["schema invalid".to_string()]);
}

#[tokio::test]
async fn countdown_without_api_key_falls_back_to_templates() {
    let harness = Harness::new();
    let ctx = harness.context();

    let input = AgentInput::new()
        .with_prompt("Add a countdown until the launch")
        .with_dry_run(false);
    let outcome = run_agent(&BuilderAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert!(outcome.report["aiOut"].as_str().unwrap().contains("fallback"));
    assert_eq!(outcome.report["generation"]["kind"], "fallback_used");

    let schema = harness.read("schemas/blocks/countdownBlock.ts");
    assert!(schema.contains("export const countdownBlock = defineType("));
    assert!(schema.contains("validation: (Rule) => Rule.required()"));
    let component = harness.read("components/blocks/CountdownBlock.tsx");
    assert!(component.contains("export function CountdownBlock"));

    let handover = outcome.handover.unwrap();
    assert_eq!(handover.next_agent().map(AgentName::as_str), Some(names::REVIEWER));
    assert_eq!(handover.artifacts().manifest.blocks, vec!["countdownBlock"]);
}

#[tokio::test]
async fn named_countdown_block_without_api_key_uses_template() {
    let harness = Harness::new();
    let ctx = harness.context();

    let input = AgentInput::new()
        .with_prompt("Créer un countdownBlock")
        .with_dry_run(false);
    let outcome = run_agent(&BuilderAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(outcome.report["block"], "countdownBlock");
    assert!(outcome.report["aiOut"].as_str().unwrap().contains("fallback"));

    let schema = harness.read("schemas/blocks/countdownBlock.ts");
    assert!(schema.contains("export const countdownBlock = defineType("));
    assert!(!schema.contains("export default"));
    assert!(harness.exists("components/blocks/CountdownBlock.tsx"));

    let handover = outcome.handover.unwrap();
    assert_eq!(handover.status(), HandoverStatus::Ready);
    assert_eq!(handover.next_agent().map(AgentName::as_str), Some(names::REVIEWER));
}

#[tokio::test]
async fn builder_builds_each_block_in_the_incoming_plan() {
    let harness = Harness::new();
    let ctx = harness.context();
    let context_id = ContextId::new_random();
    let plan = Handover::ready(
        context_id,
        Some(AgentName::from_static(names::BUILDER)),
        Stage::Analysis,
        HandoverData::default().with_artifacts(Artifacts {
            plan: Some(json!({ "blocks": ["faqBlock", "ctaBlock", "faqBlock"] })),
            ..Default::default()
        }),
    );

    let input = AgentInput::new()
        .with_prompt("a FAQ and a call to action")
        .with_handover(Some(plan))
        .with_dry_run(false);
    let outcome = run_agent(&BuilderAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert!(harness.exists("schemas/blocks/faqBlock.ts"));
    assert!(harness.exists("schemas/blocks/ctaBlock.ts"));
    assert_eq!(outcome.report["plannedChanges"], 4);
    let handover = outcome.handover.unwrap();
    assert_eq!(handover.artifacts().manifest.blocks, vec!["faqBlock", "ctaBlock"]);
}

#[tokio::test]
async fn configured_block_overrides_the_plan() {
    let harness = Harness::new();
    let ctx = harness.context();
    let plan = Handover::ready(
        ContextId::new_random(),
        Some(AgentName::from_static(names::BUILDER)),
        Stage::Analysis,
        HandoverData::default().with_artifacts(Artifacts {
            plan: Some(json!({ "blocks": ["faqBlock", "ctaBlock"] })),
            ..Default::default()
        }),
    );

    let input = AgentInput::new()
        .with_config(json!({ "block": "galleryBlock" }))
        .with_handover(Some(plan));
    let outcome = run_agent(&BuilderAgent, &ctx, input).await;

    assert!(outcome.ok);
    assert_eq!(outcome.report["block"], "galleryBlock");
    assert_eq!(outcome.report["detection"], "config");
    assert_eq!(outcome.report["plannedChanges"], 2);
}

#[tokio::test]
async fn llm_error_also_falls_back() {
    let harness = Harness::new();
    let llm = Arc::new(FakeLlm::failing("overloaded"));
    let ctx = harness
        .context()
        .with_llm(Some(llm.clone() as Arc<dyn LlmProvider>));

    let outcome = run_agent(&BuilderAgent, &ctx, AgentInput::new().with_prompt("FAQ")).await;

    assert!(outcome.ok);
    assert_eq!(llm.calls(), 1);
    assert!(outcome.report["aiOut"].as_str().unwrap().contains("fallback"));
}

#[tokio::test]
async fn llm_answer_is_used_when_fenced() {
    let harness = Harness::new();
    let answer = "```schema\nexport const faqBlock = defineType({ name: 'faqBlock' })\n```\n\
                  ```component\nexport function FaqBlock() { return <div className=\"faq\" /> }\n```";
    let ctx = harness
        .context()
        .with_llm(Some(Arc::new(FakeLlm::answering(answer)) as Arc<dyn LlmProvider>));

    let outcome = run_agent(&BuilderAgent, &ctx, AgentInput::new().with_prompt("FAQ")).await;

    assert!(outcome.ok);
    assert_eq!(outcome.report["generation"]["kind"], "generated");
    assert_eq!(outcome.report["generation"]["model"], "fake-model");
    assert!(!outcome.report["aiOut"].as_str().unwrap().contains("fallback"));
}

#[tokio::test]
async fn builder_dry_run_writes_nothing() {
    let harness = Harness::new();
    let ctx = harness.context();

    let outcome = run_agent(&BuilderAgent, &ctx, AgentInput::new().with_prompt("pricing table")).await;

    assert!(outcome.ok);
    assert!(!harness.exists("schemas/blocks/pricingBlock.ts"));
    assert!(!harness.exists("components/blocks/PricingBlock.tsx"));
    let changes = outcome.report["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c["dryRun"] == true && c["applied"] == false));
    assert!(outcome.report["sources"]["schemas/blocks/pricingBlock.ts"].is_string());
}

// ---------------------------------------------------------------------------
// reviewer / tester
// ---------------------------------------------------------------------------

const DEFAULT_EXPORT_SCHEMA: &str = "import { defineField, defineType } from 'sanity'\n\n\
export default defineType({\n  name: 'promoBlock',\n  type: 'object',\n  fields: [],\n})\n";

#[tokio::test]
async fn reviewer_blocks_default_export_and_routes_to_builder() {
    let harness = Harness::new();
    harness.write("schemas/blocks/promoBlock.ts", DEFAULT_EXPORT_SCHEMA);
    let ctx = harness.context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "promoBlock").await.unwrap();

    let input = AgentInput::new()
        .with_handover(Some(ready_from(Stage::Build, names::REVIEWER, context_id)))
        .with_dry_run(false);
    let outcome = run_agent(&ReviewerAgent, &ctx, input).await;

    assert!(!outcome.ok);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .starts_with("reviewerAgent blocked:"));
    let handover = outcome.handover.unwrap();
    assert_eq!(handover.status(), HandoverStatus::Blocked);
    assert_eq!(handover.next_agent().map(AgentName::as_str), Some(names::BUILDER));
}

#[tokio::test]
async fn reviewer_auto_fix_rewrites_the_schema() {
    let harness = Harness::new();
    harness.write("schemas/blocks/promoBlock.ts", DEFAULT_EXPORT_SCHEMA);
    let ctx = harness.context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "promoBlock").await.unwrap();

    let input = AgentInput::new()
        .with_config(json!({ "autoFix": true }))
        .with_handover(Some(ready_from(Stage::Build, names::REVIEWER, context_id)))
        .with_dry_run(false);
    let outcome = run_agent(&ReviewerAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert!(harness
        .read("schemas/blocks/promoBlock.ts")
        .contains("export const promoBlock = defineType({"));
}

#[tokio::test]
async fn tester_failure_routes_to_diagnostic() {
    let harness = Harness::new();
    harness
        .runner
        .respond("npx tsc --noEmit", 2, "", "error TS2322: Type 'string' is not assignable");
    let ctx = harness.context();

    let outcome = run_agent(&TesterAgent, &ctx, AgentInput::new().with_dry_run(false)).await;

    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("TS2322"));
    assert_eq!(
        outcome.handover.unwrap().next_agent().map(AgentName::as_str),
        Some(names::DIAGNOSTIC)
    );
    assert_eq!(harness.runner.runs(), vec!["npx tsc --noEmit"]);
}

#[tokio::test]
async fn tester_dry_run_only_plans() {
    let harness = Harness::new();
    let ctx = harness.context();

    let outcome = run_agent(&TesterAgent, &ctx, AgentInput::new()).await;

    assert!(outcome.ok);
    assert_eq!(outcome.report["planned"].as_array().unwrap().len(), 2);
    assert!(harness.runner.runs().is_empty());
}

// ---------------------------------------------------------------------------
// diagnostic / cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn diagnostic_fixes_once_and_learns() {
    let harness = Harness::new();
    harness.write(
        "schemas/blocks/testimonialsBlock.ts",
        "defineField({ name: 'rating', type: 'number', validation: (Rule) => Rule.min(1).max(10) })\n",
    );
    let ctx = harness.context();

    let first = run_agent(&DiagnosticAgent, &ctx, AgentInput::new().with_dry_run(false)).await;
    assert!(first.ok, "{:?}", first.error);
    assert_eq!(first.report["fixedCount"], 1);
    assert!(harness
        .read("schemas/blocks/testimonialsBlock.ts")
        .contains("Rule.min(1).max(5)"));

    let second = run_agent(&DiagnosticAgent, &ctx, AgentInput::new().with_dry_run(false)).await;
    assert_eq!(second.report["fixedCount"], 0);
    assert_eq!(second.report["errored"], 0);

    let learned = ctx.patterns.load().await.unwrap();
    assert_eq!(learned.total_runs, 2);
    assert_eq!(learned.count("rating-max-bound"), 1);
}

#[tokio::test]
async fn cleanup_respects_risk_tolerance() {
    let harness = Harness::new();
    harness.write("lib/empty.ts", "");
    harness.write("lib/blank.ts", "  \n");
    harness.write("lib/gone.test.ts", "test('x', () => {})");
    harness.write("lib/used.ts", "export const used = 1");
    harness
        .runner
        .respond("npx ts-prune", 0, "lib/used.ts:1 - used\n", "");
    let ctx = harness.context();

    let prudent = run_agent(&CleanupAgent, &ctx, AgentInput::new().with_dry_run(false)).await;
    assert!(prudent.ok, "{:?}", prudent.error);
    assert_eq!(prudent.status(), Some(HandoverStatus::Done));
    assert!(!harness.exists("lib/empty.ts"));
    assert!(!harness.exists("lib/blank.ts"));
    assert!(harness.exists("lib/gone.test.ts"));
    assert!(harness.exists("lib/used.ts"));

    let medium = run_agent(
        &CleanupAgent,
        &ctx,
        AgentInput::new()
            .with_config(json!({ "riskTolerance": "medium" }))
            .with_dry_run(false),
    )
    .await;
    assert!(medium.ok);
    assert!(!harness.exists("lib/gone.test.ts"));
    assert!(harness.exists("lib/used.ts"));
}

#[tokio::test]
async fn cleanup_dry_run_deletes_nothing() {
    let harness = Harness::new();
    harness.write("lib/empty.ts", "");
    let ctx = harness.context();

    let outcome = run_agent(&CleanupAgent, &ctx, AgentInput::new()).await;

    assert!(outcome.ok);
    assert!(harness.exists("lib/empty.ts"));
    assert_eq!(outcome.report["candidates"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// init / pages / compat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_bootstraps_an_empty_dataset() {
    let harness = Harness::new();
    let ctx = harness.cms_context();

    let outcome = run_agent(&InitAgent, &ctx, AgentInput::new().with_dry_run(false)).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(outcome.report["status"]["empty"], true);
    for id in ["siteSettings", "header", "footer", "page-home"] {
        assert!(harness.cms.document(id).is_some(), "{id} missing");
    }
    let handover = outcome.handover.unwrap();
    assert_eq!(handover.stage().as_str(), "init");
    assert_eq!(handover.artifacts().manifest.pages, vec!["home"]);
}

#[tokio::test]
async fn init_syncs_navigation_on_existing_site() {
    let harness = Harness::new().with_cms(FakeCms::with_documents(vec![
        json!({ "_id": "header", "_type": "header", "title": "Acme" }),
        json!({ "_id": "page-about", "_type": "page", "title": "About", "slug": { "current": "about" } }),
    ]));
    let ctx = harness.cms_context();

    let outcome = run_agent(&InitAgent, &ctx, AgentInput::new().with_dry_run(false)).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(outcome.report["action"], "sync-navigation");
    let header = harness.cms.document("header").unwrap();
    assert_eq!(header["title"], "Acme");
    assert_eq!(header["navigation"][0]["href"], "/about");
    assert!(harness.cms.document("footer").is_some());
}

#[tokio::test]
async fn compat_blocks_on_sections_that_were_not_built() {
    let harness = Harness::new();
    let ctx = harness.context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "heroBlock").await.unwrap();

    let mut artifacts = Artifacts::default();
    artifacts.pages = vec![json!({
        "_id": "page-home",
        "sections": [{ "_type": "heroBlock" }, { "_type": "mysteryBlock" }]
    })];
    let incoming = Handover::ready(
        context_id,
        Some(AgentName::from_static(names::COMPAT)),
        Stage::Pagegen,
        HandoverData::default().with_artifacts(artifacts),
    );

    let outcome = run_agent(&CompatAgent, &ctx, AgentInput::new().with_handover(Some(incoming))).await;

    assert!(!outcome.ok);
    let error = outcome.error.unwrap();
    assert!(error.contains("mysteryBlock"));
    assert!(!error.contains("missing"), "dry-run file checks are warnings: {error}");
}

#[tokio::test]
async fn page_generator_records_pages_from_manifest_blocks() {
    let harness = Harness::new();
    let ctx = harness.cms_context();
    let context_id = ContextId::new_random();
    ctx.manifests.add_block(context_id, "heroBlock").await.unwrap();
    ctx.manifests.add_block(context_id, "faqBlock").await.unwrap();

    let input = AgentInput::new()
        .with_config(json!({ "pages": ["Home", "Contact us"] }))
        .with_handover(Some(ready_from(Stage::Build, names::PAGE_GENERATOR, context_id)))
        .with_dry_run(false);
    let outcome = run_agent(&PageGeneratorAgent, &ctx, input).await;

    assert!(outcome.ok, "{:?}", outcome.error);
    let handover = outcome.handover.unwrap();
    assert_eq!(handover.artifacts().pages.len(), 2);
    assert_eq!(handover.artifacts().manifest.pages, vec!["home", "contact-us"]);
    assert_eq!(
        harness.cms.document("page-contact-us").unwrap()["sections"][1]["_type"],
        "faqBlock"
    );
}
