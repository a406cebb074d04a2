//! Memory manager integration tests.

mod common;

use std::sync::Arc;

use dieah_agents::{FactRecall, MemoryManager, SessionStore, Speaker, NO_RELEVANT_MEMORY};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

use common::{manager, manager_with, test_config, FailingEmbedder};

/// Every committed exchange adds a human turn and an assistant turn.
#[test]
fn transcript_grows_two_turns_per_exchange() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    manager.record_turn("hi", "hello");
    manager.record_turn("how are you?", "fine");
    manager.record_turn("bye", "goodbye");

    let transcript = manager.current_transcript();
    assert_eq!(transcript.len(), 6);
    assert_eq!(transcript[0].role, Speaker::Human);
    assert_eq!(transcript[5].text, "goodbye");
    assert_eq!(manager.session_info().message_count, 3);
}

/// Reset empties the transcript and starts a new session at zero.
#[test]
fn reset_rotates_the_session() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    let first = manager.current_session_id();
    manager.record_turn("hi", "hello");
    let second = manager.reset_session();

    assert_ne!(first, second);
    assert!(manager.current_transcript().is_empty());
    assert_eq!(manager.session_info().message_count, 0);

    // the earlier session keeps its count
    let sessions = SessionStore::open(test_config(temp.path()).session_table_path());
    assert_eq!(sessions.get_metadata(&first).message_count, 1);
}

#[tokio::test]
async fn empty_store_recalls_the_sentinel() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    let recall = manager.query_facts("anything at all").await;
    assert_eq!(recall, FactRecall::NoRelevantMemory);
    assert_eq!(recall.to_string(), NO_RELEVANT_MEMORY);
}

/// "Remember that I like pizza", then ask about food.
#[tokio::test]
async fn saved_fact_is_recalled() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    let confirmation = manager.save_fact("I like pizza").await;
    assert_eq!(confirmation, "Saved to long term memory: I like pizza");

    manager.save_fact("My cat is called Miso").await;
    let recall = manager.query_facts("what food do I like?").await;

    let hits = recall.hits();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].text, "I like pizza");
    assert!(recall.to_string().contains("I like pizza"));
    assert_eq!(hits[0].metadata.session_id, manager.current_session_id());
}

#[tokio::test]
async fn recall_returns_at_most_recall_k() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    for fact in ["I like pizza", "I like pasta", "I like sushi", "I like tacos", "I like curry"] {
        manager.save_fact(fact).await;
    }

    let recall = manager.query_facts("what do I like").await;
    assert_eq!(recall.hits().len(), manager.config().recall_k);
    let scores: Vec<f32> = recall.hits().iter().map(|hit| hit.score).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

/// A failed embedding leaves no trace in either store.
#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let manager = manager_with(temp.path(), Arc::new(FailingEmbedder));

    let reply = manager.save_fact("I like pizza").await;
    assert!(reply.starts_with("Error saving to memory"), "{reply}");

    let stats = manager.long_term().expect("long-term memory").stats().unwrap();
    assert_eq!(stats.facts, 0);

    let index_file = test_config(temp.path()).flat_index_path();
    let persisted = std::fs::read_to_string(index_file).unwrap_or_default();
    assert!(persisted.trim().is_empty());

    // recall degrades to "nothing found"
    assert!(manager.query_facts("pizza").await.is_empty());
}

#[tokio::test]
async fn facts_survive_restart() {
    let temp = tempdir().expect("tempdir");
    {
        let manager = manager(temp.path());
        manager.save_fact("The launch code is blue").await;
    }

    let reopened = manager(temp.path());
    let recall = reopened.query_facts("what is the launch code").await;
    assert_eq!(recall.hits()[0].text, "The launch code is blue");
}

#[tokio::test]
async fn documents_stay_out_of_fact_recall() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    let doc = temp.path().join("pizza.txt");
    std::fs::write(&doc, "Pizza originated in Naples. People like pizza.").unwrap();
    assert_ok!(manager.ingest_document(&doc).await);

    assert_eq!(manager.query_facts("do people like pizza").await, FactRecall::NoRelevantMemory);
    assert_eq!(manager.search_documents("pizza", 3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stats_cover_every_layer() {
    let temp = tempdir().expect("tempdir");
    let manager = manager(temp.path());

    manager.record_turn("abcd", "abcdefgh");
    manager.save_fact("I like pizza").await;

    let stats = manager.stats();
    assert_eq!(stats.session.session_id, manager.current_session_id());
    assert_eq!(stats.session.message_count, 1);
    assert_eq!(stats.short_term_exchanges, 1);
    assert!(stats.token_usage.total > 0);
    assert_eq!(stats.long_term.map(|lt| lt.facts), Some(1));
}

/// Without long-term memory the tools still answer in text.
#[tokio::test]
async fn missing_long_term_memory_is_not_fatal() {
    let temp = tempdir().expect("tempdir");
    let config = test_config(temp.path());
    config.ensure_dirs().unwrap();
    let sessions = SessionStore::open(config.session_table_path());
    let manager = MemoryManager::new(config, sessions, None).unwrap();

    assert!(manager.save_fact("I like pizza").await.starts_with("Error saving to memory"));
    assert_eq!(manager.query_facts("pizza").await, FactRecall::NoRelevantMemory);
    assert_err!(manager.ingest_document(temp.path().join("x.txt")).await);
    assert_eq!(manager.stats().long_term, None);
}

/// A corrupt session table degrades tracking but never the conversation.
#[test]
fn corrupt_session_table_keeps_the_conversation_going() {
    let temp = tempdir().expect("tempdir");
    let table = test_config(temp.path()).session_table_path();
    std::fs::write(&table, "{ not json").unwrap();

    let manager = manager(temp.path());
    assert!(manager.current_session_id().starts_with("session_"));

    manager.record_turn("hi", "hello");
    assert_eq!(manager.current_transcript().len(), 2);
    assert_eq!(manager.session_info().message_count, 1);
    assert_eq!(std::fs::read_to_string(&table).unwrap(), "{ not json");
}
