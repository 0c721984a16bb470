//! End-to-end flow through the public API: install a deck, review it with a
//! scripted sandbox, and check the persisted outcome.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shellcard_core::types::ExecutionResult as CardExecution;
use shellcard_core::{
    install_deck, CardState, ExecutionConfig, ExecutionResult, Rating, ReviewService, Sandbox,
    Scheduler, SessionOptions, ShellcardResult, SqliteStore, Store,
};

/// Sandbox double that replies per command string and records its configs.
struct ScriptedSandbox {
    replies: BTreeMap<String, (i32, &'static str)>,
    configs: Mutex<Vec<ExecutionConfig>>,
}

impl ScriptedSandbox {
    fn new(replies: BTreeMap<String, (i32, &'static str)>) -> Self {
        Self {
            replies,
            configs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn run(&self, config: ExecutionConfig) -> ShellcardResult<ExecutionResult> {
        config.validate()?;
        self.configs.lock().unwrap().push(config.clone());

        let script = config.command.last().cloned().unwrap_or_default();
        let (exit_code, stdout) = self.replies.get(&script).copied().unwrap_or((0, ""));
        Ok(ExecutionResult {
            exit_code,
            success: exit_code == 0,
            timed_out: exit_code == -1,
            stdout: stdout.to_string(),
            stderr: String::new(),
            started_at: Utc::now(),
            duration: Duration::from_millis(42),
            container_id: "scripted-container".to_string(),
            image_used: config.image.clone(),
            correlation_id: config.correlation_id.clone(),
        })
    }

    async fn cleanup(&self) -> ShellcardResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn write_deck_dir() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("deck.yaml"),
        "name: shell-basics\nversion: 1.0.0\nauthor: itest\ndescription: Shell basics\n\
         container:\n  image: alpine:3.18\n  timeout: 30\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("cards.csv"),
        "key,title,command,description,setup,cleanup,prerequisites,verify,hint,solution,explanation,difficulty,tags\n\
         echo-hello,Print hello,echo hello,Print the word hello,,,,,use echo,echo hello,echo writes to stdout,1,basics\n\
         sleepy,Sleep a bit,sleep 5,Wait five seconds,,,,,use sleep,sleep 5,sleep pauses,1,basics\n",
    )
    .unwrap();
    let path = dir.path().to_path_buf();
    (dir, path)
}

#[tokio::test]
async fn first_time_review_of_an_installed_deck() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let (_guard, deck_dir) = write_deck_dir();
    let report = install_deck(store.as_ref(), &deck_dir, false).unwrap();
    assert_eq!(report.cards_added, 2);

    let sandbox = Arc::new(ScriptedSandbox::new(BTreeMap::from([
        ("echo hello".to_string(), (0, "hello\n")),
        ("sleep 5".to_string(), (-1, "")),
    ])));
    let mut service = ReviewService::new(store.clone(), Scheduler::new(), sandbox.clone());

    let session = service
        .start_session(SessionOptions {
            max_cards: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(session.cards_remaining, 2);

    // Card 1: clean success, rated Good.
    let card = service.get_next_card(&session.id).unwrap();
    assert_eq!(card.card_key, "echo-hello");
    assert_eq!(card.image, "alpine:3.18");
    assert_eq!(card.timeout, Duration::from_secs(30));

    let result = service.execute_card(&session.id, &card).await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "hello\n");

    let execution = CardExecution::from_sandbox(&result, Duration::from_secs(2), card.network_enabled);
    service
        .submit_review(&session.id, card.id, Rating::Good, Some(&execution))
        .unwrap();

    let stored = store.get_card(card.id).unwrap();
    assert_eq!(stored.fsrs.reps, 1);
    assert!(matches!(stored.fsrs.state, CardState::Learning | CardState::Review));
    assert!(stored.fsrs.due > Utc::now());

    let history = store.get_reviews_by_card(card.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].rating, Rating::Good);
    assert!(history[0].execution_success);
    assert_eq!(history[0].exit_code, Some(0));

    // Card 2: timed out execution still admits a rating of Again.
    let card = service.get_next_card(&session.id).unwrap();
    assert_eq!(card.card_key, "sleepy");

    let result = service.execute_card(&session.id, &card).await.unwrap();
    assert!(!result.success);
    assert!(result.timed_out);

    let execution = CardExecution::from_sandbox(&result, Duration::from_secs(1), card.network_enabled);
    service
        .submit_review(&session.id, card.id, Rating::Again, Some(&execution))
        .unwrap();

    let history = store.get_reviews_by_card(card.id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].execution_success);
    assert_eq!(history[0].exit_code, Some(-1));

    let stats = service.end_session(&session.id).unwrap();
    assert_eq!(stats.cards_reviewed, 2);
    assert_eq!(stats.new_cards, 2);
    assert_eq!(stats.good_count, 1);
    assert_eq!(stats.again_count, 1);

    // Every exec used the resolved image and the shell wrapper.
    let configs = sandbox.configs.lock().unwrap();
    assert_eq!(configs.len(), 2);
    for config in configs.iter() {
        assert_eq!(config.image, "alpine:3.18");
        assert_eq!(config.command[0], "/bin/sh");
        assert_eq!(config.command[1], "-c");
        assert!(!config.network_enabled);
    }
}
