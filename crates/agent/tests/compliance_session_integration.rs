//! Integration tests for compliance sessions (records -> engine -> report)
//!
//! These tests drive the engine the way the batch and live front ends do.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use sop_monitor_agent::{
    run_batch, run_live, ComplianceEngine, ComplianceEvent, LiveOptions, TranscriptRecord,
};
use sop_monitor_config::{EngineConfig, OrderingMode};
use sop_monitor_core::{
    InfoCategory, KnownCustomer, NoopAnnotator, PhaseKind, Result, Sentiment, SentimentAnnotator,
    SentimentLabel, Utterance,
};

fn engine_for(name: &str) -> ComplianceEngine {
    ComplianceEngine::builder(EngineConfig::default())
        .customer(&KnownCustomer(name.to_string()))
        .session_id("integration")
        .build()
        .unwrap()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ComplianceEvent>) -> Vec<ComplianceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Greeting, complaint, then acknowledgement with empathy
#[tokio::test]
async fn test_greeting_and_problem_identification() {
    let engine = engine_for("John");
    let mut rx = engine.subscribe();

    engine.ingest(Utterance::agent("Hello John, how can I help you today?", 0)).unwrap();
    let greeting = engine.snapshot();
    assert!(greeting.phase(PhaseKind::Greeting).unwrap().satisfied);

    engine
        .ingest(Utterance::customer("My headphones stopped working after a week", 3_000))
        .unwrap();
    engine.ingest(Utterance::agent("I understand, I'm sorry for the trouble", 7_000)).unwrap();

    let report = engine.snapshot();
    let problem = report.phase(PhaseKind::ProblemIdentification).unwrap();
    let satisfied: Vec<_> = problem.criteria.iter().filter(|c| c.satisfied).map(|c| c.id.as_str()).collect();
    assert_eq!(satisfied, vec!["acknowledge_concern", "empathy"]);
    assert!(!problem.satisfied);

    let events = drain(&mut rx);
    let ingested = events
        .iter()
        .filter(|e| matches!(e, ComplianceEvent::UtteranceIngested { .. }))
        .count();
    assert_eq!(ingested, 3);
    assert!(events.iter().any(|e| matches!(
        e,
        ComplianceEvent::CriterionSatisfied { phase: PhaseKind::ProblemIdentification, criterion, .. } if criterion == "empathy"
    )));
}

/// A prohibited phrase is recorded once and does not move the score
#[tokio::test]
async fn test_prohibited_phrase_tracked_separately() {
    let engine = engine_for("Ana");
    engine.ingest(Utterance::agent("Hi Ana, how can I help?", 0)).unwrap();
    let before = engine.score();

    let mut rx = engine.subscribe();
    engine.ingest(Utterance::agent("There's nothing I can do", 2_000)).unwrap();

    let report = engine.snapshot();
    assert_eq!(report.prohibited_phrases.len(), 1);
    assert_eq!(report.prohibited_phrases[0].timestamp_ms, 2_000);
    assert_eq!(engine.score(), before);

    let hits = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ComplianceEvent::ProhibitedPhrase { .. }))
        .count();
    assert_eq!(hits, 1);
}

/// One final agent turn covers every closing criterion
#[tokio::test]
async fn test_single_utterance_closing() {
    let engine = engine_for("Lee");
    engine.ingest(Utterance::customer("That works for me", 0)).unwrap();
    engine
        .ingest(Utterance::agent(
            "So to confirm, we'll replace your order within 3 business days. Thank you for your patience \u{2014} anything else I can help with?",
            4_000,
        ))
        .unwrap();

    let live = engine.snapshot();
    assert_eq!(live.phase(PhaseKind::Closing).unwrap().provisional.len(), 3);

    let report = engine.finalize();
    let closing = report.phase(PhaseKind::Closing).unwrap();
    assert!(closing.satisfied);
    assert_eq!(closing.evidence.len(), 1);
    assert_eq!(closing.evidence[0].seq, 1);
}

/// Greeting in the third agent turn is outside a two-turn window
#[tokio::test]
async fn test_greeting_window_boundary() {
    let engine = engine_for("Sam");
    engine.ingest(Utterance::agent("Support line.", 0)).unwrap();
    engine.ingest(Utterance::customer("Is anyone there?", 1_000)).unwrap();
    engine.ingest(Utterance::agent("One moment.", 2_000)).unwrap();
    engine
        .ingest(Utterance::agent("Hello Sam, how can I help you today?", 3_000))
        .unwrap();

    let report = engine.finalize();
    let greeting = report.phase(PhaseKind::Greeting).unwrap();
    assert!(!greeting.satisfied);
    assert_eq!(greeting.satisfied_criteria, 0);
}

/// Order number evidence is fixed by the first match
#[tokio::test]
async fn test_order_number_evidence_is_stable() {
    let engine = engine_for("Kim");
    engine.ingest(Utterance::agent("Could you provide your order number?", 0)).unwrap();
    engine.ingest(Utterance::customer("Sure, it's #40021", 2_000)).unwrap();
    engine.ingest(Utterance::customer("Oh wait, maybe #40022", 4_000)).unwrap();

    let report = engine.finalize();
    let order = &report.required_info[&InfoCategory::OrderNumber];
    assert!(order.collected);
    let evidence = order.evidence.as_ref().unwrap();
    assert_eq!(evidence.utterance.seq, 1);
    assert_eq!(evidence.value, "#40021");
}

/// Live scores never go down across a full call
#[tokio::test]
async fn test_live_scores_are_monotone() {
    let engine = engine_for("John");
    let turns = [
        Utterance::agent("Hello John, thanks for calling. How can I help?", 0),
        Utterance::customer("My order #77123 arrived damaged", 2_000),
        Utterance::agent("I'm so sorry. Could you describe the damage?", 4_000),
        Utterance::agent("Please provide a photo and we'll send a replacement within 2 days", 8_000),
        Utterance::agent("Thank you. Anything else?", 10_000),
        Utterance::customer("No, that's all", 12_000),
        Utterance::customer("Bye", 13_000),
        Utterance::customer("Hello?", 14_000),
    ];

    let mut previous = engine.score().overall;
    for utterance in turns {
        engine.ingest(utterance).unwrap();
        let current = engine.score().overall;
        assert!(current >= previous);
        previous = current;
    }

    // The thanks fell out of the closing window before finalize
    let report = engine.finalize();
    assert_eq!(report.phase(PhaseKind::Closing).unwrap().satisfied_criteria, 0);
    assert!(report.overall_score >= previous);
}

/// Batch replay of a Whisper-style JSON array
#[tokio::test]
async fn test_batch_json_array() {
    let config = EngineConfig::default();
    let engine = ComplianceEngine::builder(config.clone()).build().unwrap();

    let content = r#"[
        {"speaker": "SPEAKER_02", "text": "Good morning, how may I help you?", "start": 0.0},
        {"speaker": "SPEAKER_01", "text": "My email is pat@example.com and the item was damaged", "start": 2.5,
         "sentiment": {"label": "NEG", "confidence": 0.8}},
        {"speaker": "SPEAKER_02", "text": "I apologize for that", "start": 6.0}
    ]"#;
    let records = sop_monitor_agent::parse_transcript(content).unwrap();
    let report = run_batch(&engine, records, &config.speaker_labels);

    assert_eq!(report.total_utterances, 3);
    assert_eq!(report.skipped_utterances, 0);
    assert_eq!(report.sentiment.negative, 1);
    assert!(report.required_info[&InfoCategory::ContactInfo].collected);
    assert!(report.required_info[&InfoCategory::IssueDescription].collected);
    assert_eq!(report.phase(PhaseKind::Greeting).unwrap().satisfied_criteria, 2);
}

/// Buffered mode evaluates late-arriving utterances in timestamp order
#[tokio::test]
async fn test_buffered_reordering() {
    let mut config = EngineConfig::default();
    config.ordering.mode = OrderingMode::Buffered;
    config.ordering.reorder_window_ms = 2_000;
    let engine = ComplianceEngine::builder(config).build().unwrap();

    engine.ingest(Utterance::customer("It's broken", 1_500)).unwrap();
    engine.ingest(Utterance::agent("Hello, how can I help?", 1_000)).unwrap();
    assert_eq!(engine.pending(), 2);

    engine.ingest(Utterance::agent("I see.", 4_000)).unwrap();
    assert_eq!(engine.pending(), 1);
    assert_eq!(engine.utterances(), 2);

    // Older than what was already released
    assert!(engine.ingest(Utterance::customer("late", 1_200)).is_err());

    let report = engine.finalize();
    assert_eq!(report.total_utterances, 3);
    assert_eq!(report.skipped_utterances, 1);

    // The greeting was released first even though it arrived second
    let greeting = report.phase(PhaseKind::Greeting).unwrap();
    assert_eq!(greeting.evidence[0].seq, 0);
    assert_eq!(greeting.evidence[0].timestamp_ms, 1_000);
}

/// Snapshots taken during ingestion never observe a half-applied utterance
#[tokio::test]
async fn test_concurrent_snapshots_are_consistent() {
    let engine = Arc::new(engine_for("John"));

    let writer = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for i in 0..200u64 {
                let utterance = if i % 2 == 0 {
                    Utterance::agent("I understand, thank you", i * 10)
                } else {
                    Utterance::customer("ok", i * 10)
                };
                engine.ingest(utterance).unwrap();
            }
        })
    };

    for _ in 0..50 {
        let report = engine.snapshot();
        let by_speaker: usize = report.speakers.iter().map(|s| s.utterances).sum();
        assert_eq!(by_speaker, report.total_utterances);
        tokio::task::yield_now().await;
    }

    writer.join().unwrap();
    assert_eq!(engine.utterances(), 200);
}

struct KeywordAnnotator;

#[async_trait]
impl SentimentAnnotator for KeywordAnnotator {
    async fn annotate(&self, text: &str) -> Result<Option<Sentiment>> {
        let label = if text.to_lowercase().contains("terrible") {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        Ok(Some(Sentiment::new(label, 0.9)))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Live session runs to the end of its input and annotates sentiment
#[tokio::test]
async fn test_live_session_end_of_input() {
    let engine = Arc::new(engine_for("John"));
    let records = futures::stream::iter(vec![
        Ok(TranscriptRecord::new("agent", "Hello John, how can I help?", 0)),
        Ok(TranscriptRecord::new("customer", "This is terrible", 1_000)),
        Err(sop_monitor_core::Error::MalformedUtterance("bad line".to_string())),
    ]);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = timeout(
        Duration::from_secs(5),
        run_live(Arc::clone(&engine), records, Arc::new(KeywordAnnotator), shutdown_rx, LiveOptions::default()),
    )
    .await
    .expect("live session should finish");

    assert!(report.finalized);
    assert_eq!(report.total_utterances, 2);
    assert_eq!(report.skipped_utterances, 1);
    assert_eq!(report.sentiment.negative, 1);
    assert_eq!(report.sentiment.neutral, 1);
    assert_eq!(report.sentiment.unlabeled, 0);
}

/// Shutdown finalizes with whatever has been ingested
#[tokio::test]
async fn test_live_session_cancellation() {
    use futures::StreamExt;

    let engine = Arc::new(engine_for("John"));
    let records = futures::stream::iter(vec![
        Ok(TranscriptRecord::new("Speaker 2", "Hello John, how can I help?", 0)),
        Ok(TranscriptRecord::new("Speaker 1", "My order is late", 1_000)),
    ])
    .chain(futures::stream::pending());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(run_live(
        Arc::clone(&engine),
        records,
        Arc::new(NoopAnnotator),
        shutdown_rx,
        LiveOptions::default(),
    ));

    timeout(Duration::from_secs(5), async {
        while engine.utterances() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("records should be ingested");

    shutdown_tx.send(true).unwrap();
    let report = timeout(Duration::from_secs(5), handle)
        .await
        .expect("live session should stop")
        .unwrap();

    assert!(report.finalized);
    assert_eq!(report.total_utterances, 2);
    assert!(report.phase(PhaseKind::Greeting).unwrap().satisfied);
    assert!(engine.is_finalized());
}
