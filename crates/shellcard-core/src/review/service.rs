//! The review coordinator.

use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SessionError, ShellcardResult};
use crate::review::session::{
    ReviewCard, SandboxDefaults, Session, SessionOptions, SessionStats, Tally,
};
use crate::scheduler::{Parameters, Scheduler};
use crate::storage::{Card, Deck, Review, Store};
use crate::traits::{ExecutionConfig, ExecutionResult, Sandbox};
use crate::types::ExecutionResult as CardExecution;

struct SessionState {
    session: Session,
    options: SessionOptions,
    queue: VecDeque<i64>,
    scheduler: Scheduler,
    tally: Tally,
}

/// Coordinates review sessions over a store, a scheduler, and a sandbox.
///
/// One coordinator owns one store connection and one driver; sessions are
/// tracked in a single owned map and accessed through the session lifecycle,
/// not through locks.
pub struct ReviewService {
    store: Arc<dyn Store>,
    sandbox: Arc<dyn Sandbox>,
    base_scheduler: Scheduler,
    sandbox_defaults: SandboxDefaults,
    sessions: HashMap<String, SessionState>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>, scheduler: Scheduler, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            store,
            sandbox,
            base_scheduler: scheduler,
            sandbox_defaults: SandboxDefaults::default(),
            sessions: HashMap::new(),
        }
    }

    /// Set the application-wide image/timeout fallbacks (from configuration)
    /// used when neither a card override nor a deck default supplies one.
    pub fn with_sandbox_defaults(mut self, defaults: SandboxDefaults) -> Self {
        self.sandbox_defaults = defaults;
        self
    }

    /// Begin a new review session: build the queue per the options and
    /// snapshot the start time.
    pub fn start_session(&mut self, options: SessionOptions) -> ShellcardResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let cards = self.query_cards(&options)?;
        if cards.is_empty() {
            return Err(SessionError::NoCardsAvailable.into());
        }

        let mut queue: Vec<i64> = cards.iter().map(|card| card.id).collect();
        if options.shuffle {
            queue.shuffle(&mut rand::thread_rng());
        }
        if options.max_cards > 0 && queue.len() > options.max_cards {
            queue.truncate(options.max_cards);
        }

        let scheduler = self.session_scheduler(&options)?;

        let session = Session {
            id: session_id.clone(),
            started_at: now,
            deck_id: options.deck_id,
            cards_reviewed: 0,
            cards_remaining: queue.len(),
            current_card_id: None,
        };

        info!(
            session_id = %session_id,
            cards = queue.len(),
            deck_id = ?options.deck_id,
            shuffle = options.shuffle,
            network_enabled = options.network_enabled,
            "review session started"
        );

        self.sessions.insert(
            session_id,
            SessionState {
                session: session.clone(),
                options,
                queue: queue.into(),
                scheduler,
                tally: Tally::default(),
            },
        );

        Ok(session)
    }

    /// Peek the queue head and return it with deck-merged sandbox config.
    pub fn get_next_card(&mut self, session_id: &str) -> ShellcardResult<ReviewCard> {
        let state = self.state_mut(session_id)?;
        let card_id = *state
            .queue
            .front()
            .ok_or(SessionError::QueueExhausted)?;

        let card = self.store.get_card(card_id)?;
        let deck = self.store.get_deck(card.deck_id)?;
        let review_card = resolve_card(
            &card,
            &deck,
            self.sessions[session_id].options.network_enabled,
            &self.sandbox_defaults,
        );

        let state = self.state_mut(session_id)?;
        state.session.current_card_id = Some(card_id);

        Ok(review_card)
    }

    /// Execute the card's command in the sandbox with its resolved config.
    ///
    /// Deck assets ride along so the driver can materialize them into the
    /// container before exec. Execution failure is an outcome the caller can
    /// still rate, never a session-fatal event.
    pub async fn execute_card(
        &self,
        session_id: &str,
        card: &ReviewCard,
    ) -> ShellcardResult<ExecutionResult> {
        let state = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::ProtocolViolation(format!("session {session_id} not found")))?;
        debug_assert_eq!(state.session.current_card_id, Some(card.id));

        let mut config = ExecutionConfig::new()
            .with_image(&card.image)
            .with_command(shell_argv(&card.command))
            .with_working_dir(&card.working_dir)
            .with_environment(card.environment.clone())
            .with_networking(card.network_enabled)
            .with_timeout(card.timeout)
            .with_correlation_id(format!("{session_id}:{}", card.card_key));
        config.capabilities = card.capabilities.clone();

        let assets = self.store.list_deck_assets(card.deck_id)?;
        if !assets.is_empty() {
            config.assets = assets
                .into_iter()
                .map(|asset| (asset.filename, asset.content))
                .collect();
        }

        self.sandbox.run(config).await
    }

    /// Commit a rating for the current card: recompute FSRS, persist the card
    /// update and the history row in one transaction, and advance the queue.
    ///
    /// On a store failure the card remains current and the rating may be
    /// retried.
    pub fn submit_review(
        &mut self,
        session_id: &str,
        card_id: i64,
        rating: crate::types::Rating,
        execution: Option<&CardExecution>,
    ) -> ShellcardResult<()> {
        let state = self.state_mut(session_id)?;
        if state.session.current_card_id != Some(card_id) {
            return Err(SessionError::ProtocolViolation(format!(
                "card {card_id} is not the current card of session {session_id}"
            ))
            .into());
        }

        let card = self.store.get_card(card_id)?;
        let now = Utc::now();
        let was_new = card.fsrs.reps == 0;

        let state = self.state_mut(session_id)?;
        let info = state.scheduler.next(&card.fsrs, rating, now);

        let mut updated = card.clone();
        updated.fsrs = info.card;

        let review = build_review(&card, &updated, rating, execution, now);
        self.store.commit_review(&updated, &review)?;

        let state = self.state_mut(session_id)?;
        state.tally.record(rating, was_new);
        state.session.cards_reviewed += 1;
        state.session.cards_remaining = state.session.cards_remaining.saturating_sub(1);
        state.session.current_card_id = None;
        if state.queue.front() == Some(&card_id) {
            state.queue.pop_front();
        }

        info!(
            session_id = %session_id,
            card_id,
            rating = %rating,
            due = %updated.fsrs.due,
            state = %updated.fsrs.state,
            "review committed"
        );

        Ok(())
    }

    /// Finalize the session: return aggregate statistics and forget it.
    pub fn end_session(&mut self, session_id: &str) -> ShellcardResult<SessionStats> {
        let state = self.sessions.remove(session_id).ok_or_else(|| {
            SessionError::ProtocolViolation(format!("session {session_id} not found"))
        })?;

        let duration = (Utc::now() - state.session.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let reviewed = state.session.cards_reviewed;
        let tally = state.tally;

        Ok(SessionStats {
            session_id: session_id.to_string(),
            duration,
            cards_reviewed: reviewed,
            new_cards: tally.new_cards,
            review_cards: tally.review_cards,
            again_count: tally.again,
            hard_count: tally.hard,
            good_count: tally.good,
            easy_count: tally.easy,
            average_rating: if reviewed == 0 {
                0.0
            } else {
                tally.rating_sum as f64 / reviewed as f64
            },
        })
    }

    /// Live view of a session (primarily for the interactive shell).
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id).map(|state| &state.session)
    }

    fn state_mut(&mut self, session_id: &str) -> ShellcardResult<&mut SessionState> {
        self.sessions.get_mut(session_id).ok_or_else(|| {
            SessionError::ProtocolViolation(format!("session {session_id} not found")).into()
        })
    }

    fn query_cards(&self, options: &SessionOptions) -> ShellcardResult<Vec<Card>> {
        let cards = match options.deck_id {
            Some(deck_id) => self.store.get_cards_by_deck(deck_id)?,
            None => self.store.get_all_cards()?,
        };

        let now = Utc::now();
        Ok(cards
            .into_iter()
            .filter(|card| {
                if options.new_only && card.fsrs.reps > 0 {
                    return false;
                }
                if options.due_only && card.fsrs.reps == 0 {
                    return false;
                }
                // Reviewed cards must be due; new cards are always retained.
                if card.fsrs.reps > 0 && card.fsrs.due > now {
                    return false;
                }
                true
            })
            .collect())
    }

    /// Deck FSRS parameter overrides load at session start and are held
    /// immutably for the session. Only a single-deck session can carry an
    /// override.
    fn session_scheduler(&self, options: &SessionOptions) -> ShellcardResult<Scheduler> {
        let Some(deck_id) = options.deck_id else {
            return Ok(self.base_scheduler.clone());
        };
        let deck = self.store.get_deck(deck_id)?;
        let Some(blob) = deck.fsrs_parameters.filter(|blob| !blob.is_empty()) else {
            return Ok(self.base_scheduler.clone());
        };
        match Parameters::from_json(&blob) {
            Ok(params) => Ok(Scheduler::with_params(params)),
            Err(e) => {
                warn!(deck_id, error = %e, "invalid deck FSRS parameters, using defaults");
                Ok(self.base_scheduler.clone())
            }
        }
    }
}

/// Merge configuration into a ready-to-run card: card override, else deck
/// default, else the application-wide fallback.
///
/// Network resolution: an explicit card override always wins; otherwise the
/// deck default, raised by the session-wide opt-in.
fn resolve_card(
    card: &Card,
    deck: &Deck,
    session_network: bool,
    defaults: &SandboxDefaults,
) -> ReviewCard {
    let image = card
        .image
        .clone()
        .filter(|image| !image.is_empty())
        .or_else(|| (!deck.default_image.is_empty()).then(|| deck.default_image.clone()))
        .unwrap_or_else(|| defaults.image.clone());
    let timeout = card
        .timeout
        .filter(|&seconds| seconds > 0)
        .or_else(|| (deck.default_timeout > 0).then_some(deck.default_timeout))
        .map(|seconds| Duration::from_secs(seconds as u64))
        .unwrap_or(defaults.timeout);
    let network_enabled = match card.network_enabled {
        Some(explicit) => explicit,
        None => deck.default_network_enabled || session_network,
    };
    let capabilities = card
        .capabilities
        .clone()
        .unwrap_or_else(|| deck.default_capabilities.clone());

    ReviewCard {
        id: card.id,
        deck_id: card.deck_id,
        card_key: card.card_key.clone(),
        title: card.title.clone(),
        description: card.description.clone(),
        command: card.command.clone(),
        working_dir: card.working_dir.clone(),
        environment: card.environment.clone(),
        image,
        timeout,
        network_enabled,
        capabilities,
        difficulty_level: card.difficulty_level,
        tags: card.tags.clone(),
        fsrs: card.fsrs.clone(),
    }
}

/// Card commands are shell commands; run them through the container's shell
/// so quoting, pipes, and redirections behave as written.
fn shell_argv(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

fn build_review(
    before: &Card,
    after: &Card,
    rating: crate::types::Rating,
    execution: Option<&CardExecution>,
    now: chrono::DateTime<Utc>,
) -> Review {
    let mut review = Review {
        id: 0,
        card_id: before.id,
        reviewed_at: now,
        rating,
        execution_success: false,
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        thinking_time_ms: None,
        execution_time_ms: None,
        total_time_ms: None,
        attempts: 1,
        help_accessed: false,
        fsrs_due_before: before.fsrs.due,
        fsrs_due_after: after.fsrs.due,
        fsrs_stability_before: before.fsrs.stability,
        fsrs_stability_after: after.fsrs.stability,
        fsrs_difficulty_before: before.fsrs.difficulty,
        fsrs_difficulty_after: after.fsrs.difficulty,
    };

    if let Some(execution) = execution {
        review.execution_success = execution.success;
        review.exit_code = Some(execution.exit_code as i64);
        review.stdout = execution.stdout.clone();
        review.stderr = execution.stderr.clone();
        let thinking = execution.thinking_time.as_millis() as i64;
        let running = execution.duration.as_millis() as i64;
        review.thinking_time_ms = Some(thinking);
        review.execution_time_ms = Some(running);
        review.total_time_ms = Some(thinking + running);
    }

    debug!(card_id = before.id, rating = %rating, "review record assembled");
    review
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellcardError;
    use crate::storage::{DeckAsset, SqliteStore};
    use crate::types::{CardState, Rating};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    /// Records every exec config and answers with a canned success.
    struct MockSandbox {
        calls: Mutex<Vec<ExecutionConfig>>,
    }

    impl MockSandbox {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn last_config(&self) -> ExecutionConfig {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Sandbox for MockSandbox {
        async fn run(&self, config: ExecutionConfig) -> ShellcardResult<ExecutionResult> {
            config.validate()?;
            self.calls.lock().unwrap().push(config.clone());
            Ok(ExecutionResult {
                exit_code: 0,
                success: true,
                timed_out: false,
                stdout: "mock output".to_string(),
                stderr: String::new(),
                started_at: Utc::now(),
                duration: Duration::from_millis(100),
                container_id: "mock-container".to_string(),
                image_used: config.image.clone(),
                correlation_id: config.correlation_id.clone(),
            })
        }

        async fn cleanup(&self) -> ShellcardResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn seeded_store() -> (Arc<SqliteStore>, i64, i64) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let deck = store
            .create_deck(&crate::storage::Deck {
                name: "test-deck".to_string(),
                default_image: "alpine:3.18".to_string(),
                default_timeout: 30,
                ..Default::default()
            })
            .unwrap();

        let mut card = Card::new(deck.id, "echo-hello", Utc::now());
        card.title = "Echo hello".to_string();
        card.command = "echo hello".to_string();
        let card = store.create_card(&card).unwrap();

        (store, deck.id, card.id)
    }

    fn service_with(store: Arc<SqliteStore>) -> (ReviewService, Arc<MockSandbox>) {
        let sandbox = Arc::new(MockSandbox::new());
        let service = ReviewService::new(store, Scheduler::new(), sandbox.clone());
        (service, sandbox)
    }

    #[test]
    fn test_start_session_counts_cards() {
        let (store, _, _) = seeded_store();
        let (mut service, _) = service_with(store);

        let session = service
            .start_session(SessionOptions {
                max_cards: 10,
                ..Default::default()
            })
            .unwrap();

        assert!(!session.id.is_empty());
        assert_eq!(session.cards_remaining, 1);
        assert_eq!(session.cards_reviewed, 0);
        assert!(session.current_card_id.is_none());
    }

    #[test]
    fn test_start_session_without_cards_fails() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let (mut service, _) = service_with(store);

        let err = service.start_session(SessionOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ShellcardError::Session(SessionError::NoCardsAvailable)
        ));
    }

    #[test]
    fn test_queue_is_deterministic_without_shuffle() {
        let (store, deck_id, _) = seeded_store();
        for key in ["b-card", "a-card", "c-card"] {
            let mut card = Card::new(deck_id, key, Utc::now());
            card.title = key.to_string();
            card.command = "true".to_string();
            store.create_card(&card).unwrap();
        }

        // Two coordinators over the same store contents with identical
        // options must build identical queues.
        let (mut first_service, _) = service_with(store.clone());
        let (mut second_service, _) = service_with(store);

        let first_session = first_service.start_session(SessionOptions::default()).unwrap();
        let second_session = second_service.start_session(SessionOptions::default()).unwrap();

        let first_queue: Vec<i64> =
            first_service.sessions[&first_session.id].queue.iter().copied().collect();
        let second_queue: Vec<i64> =
            second_service.sessions[&second_session.id].queue.iter().copied().collect();

        assert_eq!(first_queue.len(), 4);
        assert_eq!(first_queue, second_queue);
    }

    #[test]
    fn test_filters_new_only_due_only_and_cap() {
        let (store, deck_id, new_card_id) = seeded_store();
        let now = Utc::now();

        // A reviewed, overdue card.
        let mut due = Card::new(deck_id, "due-card", now);
        due.command = "true".to_string();
        due.title = "due".to_string();
        let mut due = store.create_card(&due).unwrap();
        due.fsrs.reps = 2;
        due.fsrs.state = CardState::Review;
        due.fsrs.due = now - ChronoDuration::days(1);
        due.fsrs.last_review = Some(now - ChronoDuration::days(4));
        store.update_card_fsrs(&due).unwrap();

        // A reviewed card that is not due yet.
        let mut future = Card::new(deck_id, "future-card", now);
        future.command = "true".to_string();
        future.title = "future".to_string();
        let mut future = store.create_card(&future).unwrap();
        future.fsrs.reps = 2;
        future.fsrs.state = CardState::Review;
        future.fsrs.due = now + ChronoDuration::days(3);
        future.fsrs.last_review = Some(now - ChronoDuration::days(1));
        store.update_card_fsrs(&future).unwrap();

        let (mut service, _) = service_with(store);

        // Default: new + due, not the future card.
        let session = service.start_session(SessionOptions::default()).unwrap();
        assert_eq!(session.cards_remaining, 2);
        service.end_session(&session.id).unwrap();

        // new_only keeps just the new card.
        let session = service
            .start_session(SessionOptions { new_only: true, ..Default::default() })
            .unwrap();
        assert_eq!(session.cards_remaining, 1);
        let card = service.get_next_card(&session.id).unwrap();
        assert_eq!(card.id, new_card_id);
        service.end_session(&session.id).unwrap();

        // due_only keeps just the reviewed due card.
        let session = service
            .start_session(SessionOptions { due_only: true, ..Default::default() })
            .unwrap();
        assert_eq!(session.cards_remaining, 1);
        let card = service.get_next_card(&session.id).unwrap();
        assert_eq!(card.id, due.id);
        service.end_session(&session.id).unwrap();

        // The combination is an intersection, which is empty here.
        let err = service
            .start_session(SessionOptions {
                new_only: true,
                due_only: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ShellcardError::Session(SessionError::NoCardsAvailable)
        ));

        // max_cards truncates after filtering.
        let session = service
            .start_session(SessionOptions { max_cards: 1, ..Default::default() })
            .unwrap();
        assert_eq!(session.cards_remaining, 1);
        service.end_session(&session.id).unwrap();
    }

    #[test]
    fn test_get_next_card_resolves_deck_defaults() {
        let (store, _, _) = seeded_store();
        let (mut service, _) = service_with(store);

        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();

        assert_eq!(card.image, "alpine:3.18");
        assert_eq!(card.timeout, Duration::from_secs(30));
        assert!(!card.network_enabled);
        assert_eq!(card.working_dir, "/tmp");
    }

    #[test]
    fn test_config_defaults_are_the_final_fallback() {
        // A deck that supplies no image and no timeout inherits the
        // application-wide sandbox defaults.
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let deck = store
            .create_deck(&crate::storage::Deck {
                name: "bare-deck".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(deck.default_image.is_empty());
        assert_eq!(deck.default_timeout, 0);

        let mut card = Card::new(deck.id, "bare-card", Utc::now());
        card.title = "bare".to_string();
        card.command = "true".to_string();
        store.create_card(&card).unwrap();

        let sandbox = Arc::new(MockSandbox::new());
        let mut service = ReviewService::new(store, Scheduler::new(), sandbox)
            .with_sandbox_defaults(SandboxDefaults {
                image: "ubuntu:24.04".to_string(),
                timeout: Duration::from_secs(45),
            });

        let session = service.start_session(SessionOptions::default()).unwrap();
        let resolved = service.get_next_card(&session.id).unwrap();
        assert_eq!(resolved.image, "ubuntu:24.04");
        assert_eq!(resolved.timeout, Duration::from_secs(45));

        // Deck and card values still take precedence over the fallback.
        let mut deck = service.store.get_deck(deck.id).unwrap();
        deck.default_image = "alpine:3.18".to_string();
        deck.default_timeout = 10;
        service.store.update_deck(&deck).unwrap();
        let resolved = service.get_next_card(&session.id).unwrap();
        assert_eq!(resolved.image, "alpine:3.18");
        assert_eq!(resolved.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_card_overrides_beat_deck_defaults() {
        let (store, deck_id, _) = seeded_store();
        let mut card = Card::new(deck_id, "override", Utc::now());
        card.command = "true".to_string();
        card.title = "override".to_string();
        card.image = Some("ubuntu:22.04".to_string());
        card.timeout = Some(5);
        card.network_enabled = Some(false);
        let card = store.create_card(&card).unwrap();

        let (mut service, _) = service_with(store);
        // Session opt-in must NOT override the card's explicit opt-out.
        let session = service
            .start_session(SessionOptions {
                network_enabled: true,
                shuffle: false,
                ..Default::default()
            })
            .unwrap();

        let mut found = None;
        for _ in 0..session.cards_remaining {
            let next = service.get_next_card(&session.id).unwrap();
            if next.id == card.id {
                found = Some(next);
                break;
            }
            service
                .submit_review(&session.id, next.id, Rating::Good, None)
                .unwrap();
        }
        let resolved = found.expect("override card should be in the queue");
        assert_eq!(resolved.image, "ubuntu:22.04");
        assert_eq!(resolved.timeout, Duration::from_secs(5));
        assert!(!resolved.network_enabled, "explicit card opt-out must win");
    }

    #[tokio::test]
    async fn test_session_network_opt_in_reaches_driver() {
        let (store, _, _) = seeded_store();
        let (mut service, sandbox) = service_with(store);

        let session = service
            .start_session(SessionOptions {
                network_enabled: true,
                ..Default::default()
            })
            .unwrap();
        let card = service.get_next_card(&session.id).unwrap();
        assert!(card.network_enabled, "deck default false is raised by session opt-in");

        service.execute_card(&session.id, &card).await.unwrap();
        let config = sandbox.last_config();
        assert!(config.network_enabled);
        assert_eq!(config.image, "alpine:3.18");
        assert_eq!(config.command, vec!["/bin/sh", "-c", "echo hello"]);
        assert!(config.correlation_id.contains("echo-hello"));
    }

    #[tokio::test]
    async fn test_deck_assets_ride_along() {
        let (store, deck_id, _) = seeded_store();
        store
            .store_asset(&DeckAsset {
                id: 0,
                deck_id,
                filename: "data.txt".to_string(),
                content: b"payload".to_vec(),
                content_type: "text/plain".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        let (mut service, sandbox) = service_with(store);
        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();
        service.execute_card(&session.id, &card).await.unwrap();

        let config = sandbox.last_config();
        assert_eq!(config.assets.get("data.txt").map(Vec::as_slice), Some(&b"payload"[..]));
    }

    #[test]
    fn test_submit_review_updates_card_and_history() {
        let (store, _, card_id) = seeded_store();
        let (mut service, _) = service_with(store.clone());

        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();
        assert_eq!(card.id, card_id);

        let execution = CardExecution {
            success: true,
            exit_code: 0,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(80),
            thinking_time: Duration::from_millis(1500),
            timed_out: false,
            container_id: "abc".to_string(),
            image_used: "alpine:3.18".to_string(),
            network_enabled: false,
        };
        service
            .submit_review(&session.id, card_id, Rating::Good, Some(&execution))
            .unwrap();

        let updated = store.get_card(card_id).unwrap();
        assert_eq!(updated.fsrs.reps, 1);
        assert_ne!(updated.fsrs.state, CardState::New);
        assert!(updated.fsrs.due > Utc::now(), "due must advance strictly past now");

        let history = store.get_reviews_by_card(card_id).unwrap();
        assert_eq!(history.len(), 1);
        let row = &history[0];
        assert_eq!(row.rating, Rating::Good);
        assert!(row.execution_success);
        assert_eq!(row.exit_code, Some(0));
        assert_eq!(row.thinking_time_ms, Some(1500));
        assert_eq!(row.execution_time_ms, Some(80));
        assert_eq!(row.total_time_ms, Some(1580));
        // The before/after vector reflects the scheduler transition exactly.
        assert_eq!(row.fsrs_stability_before, 0.0);
        assert_eq!(row.fsrs_stability_after, updated.fsrs.stability);
        assert_eq!(row.fsrs_due_after, updated.fsrs.due);
    }

    #[test]
    fn test_failed_execution_still_admits_rating() {
        let (store, _, card_id) = seeded_store();
        let (mut service, _) = service_with(store.clone());

        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();

        // First drive the card into Review state so Again is a real lapse.
        service
            .submit_review(&session.id, card.id, Rating::Easy, None)
            .unwrap();
        service.end_session(&session.id).unwrap();

        // Make it due again and re-review with a timed-out execution.
        let mut stored = store.get_card(card_id).unwrap();
        assert_eq!(stored.fsrs.state, CardState::Review);
        stored.fsrs.due = Utc::now() - ChronoDuration::hours(1);
        store.update_card_fsrs(&stored).unwrap();
        let lapses_before = stored.fsrs.lapses;

        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();
        let execution = CardExecution {
            success: false,
            exit_code: -1,
            timed_out: true,
            ..Default::default()
        };
        service
            .submit_review(&session.id, card.id, Rating::Again, Some(&execution))
            .unwrap();

        let updated = store.get_card(card_id).unwrap();
        assert_eq!(updated.fsrs.lapses, lapses_before + 1);
        assert_eq!(updated.fsrs.state, CardState::Relearning);

        let history = store.get_reviews_by_card(card_id).unwrap();
        let last = history.last().unwrap();
        assert!(!last.execution_success);
        assert_eq!(last.exit_code, Some(-1));
    }

    #[test]
    fn test_submit_review_wrong_card_is_protocol_violation() {
        let (store, _, card_id) = seeded_store();
        let (mut service, _) = service_with(store);

        let session = service.start_session(SessionOptions::default()).unwrap();
        let _card = service.get_next_card(&session.id).unwrap();

        let err = service
            .submit_review(&session.id, card_id + 999, Rating::Good, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ShellcardError::Session(SessionError::ProtocolViolation(_))
        ));

        // The session is still on the same card.
        let card = service.get_next_card(&session.id).unwrap();
        assert_eq!(card.id, card_id);
        service
            .submit_review(&session.id, card_id, Rating::Good, None)
            .unwrap();
    }

    #[test]
    fn test_queue_exhaustion() {
        let (store, _, card_id) = seeded_store();
        let (mut service, _) = service_with(store);

        let session = service.start_session(SessionOptions::default()).unwrap();
        let _ = service.get_next_card(&session.id).unwrap();
        service
            .submit_review(&session.id, card_id, Rating::Good, None)
            .unwrap();

        let err = service.get_next_card(&session.id).unwrap_err();
        assert!(matches!(
            err,
            ShellcardError::Session(SessionError::QueueExhausted)
        ));
    }

    #[test]
    fn test_end_session_stats_agree_with_review_rows() {
        let (store, deck_id, first_card) = seeded_store();
        let mut second = Card::new(deck_id, "second", Utc::now());
        second.command = "true".to_string();
        second.title = "second".to_string();
        let second = store.create_card(&second).unwrap();

        let (mut service, _) = service_with(store.clone());
        let session = service.start_session(SessionOptions::default()).unwrap();

        let card = service.get_next_card(&session.id).unwrap();
        service
            .submit_review(&session.id, card.id, Rating::Good, None)
            .unwrap();
        let card = service.get_next_card(&session.id).unwrap();
        service
            .submit_review(&session.id, card.id, Rating::Again, None)
            .unwrap();

        let stats = service.end_session(&session.id).unwrap();
        assert_eq!(stats.cards_reviewed, 2);
        assert_eq!(stats.new_cards, 2);
        assert_eq!(stats.review_cards, 0);
        assert_eq!(stats.good_count, 1);
        assert_eq!(stats.again_count, 1);
        assert_eq!(stats.hard_count, 0);
        assert_eq!(stats.easy_count, 0);
        assert!((stats.average_rating - 2.0).abs() < f64::EPSILON);

        // Cross-check the in-memory tally against the written rows.
        let mut rows = store.get_reviews_by_card(first_card).unwrap();
        rows.extend(store.get_reviews_by_card(second.id).unwrap());
        assert_eq!(rows.len(), stats.cards_reviewed);
        let good = rows.iter().filter(|r| r.rating == Rating::Good).count();
        let again = rows.iter().filter(|r| r.rating == Rating::Again).count();
        assert_eq!(good, stats.good_count);
        assert_eq!(again, stats.again_count);

        // The session is gone afterwards.
        assert!(service.session(&session.id).is_none());
        assert!(service.end_session(&session.id).is_err());
    }

    /// Delegating store whose review commit can be made to fail once.
    struct FlakyStore {
        inner: Arc<SqliteStore>,
        fail_next_commit: Mutex<bool>,
    }

    impl Store for FlakyStore {
        fn create_deck(&self, deck: &crate::storage::Deck) -> ShellcardResult<crate::storage::Deck> {
            self.inner.create_deck(deck)
        }
        fn get_deck(&self, id: i64) -> ShellcardResult<crate::storage::Deck> {
            self.inner.get_deck(id)
        }
        fn get_deck_by_name(&self, name: &str) -> ShellcardResult<Option<crate::storage::Deck>> {
            self.inner.get_deck_by_name(name)
        }
        fn list_decks(&self) -> ShellcardResult<Vec<crate::storage::Deck>> {
            self.inner.list_decks()
        }
        fn update_deck(&self, deck: &crate::storage::Deck) -> ShellcardResult<()> {
            self.inner.update_deck(deck)
        }
        fn delete_deck(&self, id: i64) -> ShellcardResult<()> {
            self.inner.delete_deck(id)
        }
        fn create_card(&self, card: &Card) -> ShellcardResult<Card> {
            self.inner.create_card(card)
        }
        fn get_card(&self, id: i64) -> ShellcardResult<Card> {
            self.inner.get_card(id)
        }
        fn get_cards_by_deck(&self, deck_id: i64) -> ShellcardResult<Vec<Card>> {
            self.inner.get_cards_by_deck(deck_id)
        }
        fn get_all_cards(&self) -> ShellcardResult<Vec<Card>> {
            self.inner.get_all_cards()
        }
        fn get_due_cards(&self, now: chrono::DateTime<Utc>) -> ShellcardResult<Vec<Card>> {
            self.inner.get_due_cards(now)
        }
        fn update_card(&self, card: &Card) -> ShellcardResult<()> {
            self.inner.update_card(card)
        }
        fn update_card_fsrs(&self, card: &Card) -> ShellcardResult<()> {
            self.inner.update_card_fsrs(card)
        }
        fn delete_card(&self, id: i64) -> ShellcardResult<()> {
            self.inner.delete_card(id)
        }
        fn create_review(&self, review: &Review) -> ShellcardResult<i64> {
            self.inner.create_review(review)
        }
        fn commit_review(&self, card: &Card, review: &Review) -> ShellcardResult<i64> {
            if std::mem::take(&mut *self.fail_next_commit.lock().unwrap()) {
                return Err(ShellcardError::database("simulated commit failure"));
            }
            self.inner.commit_review(card, review)
        }
        fn get_reviews_by_card(&self, card_id: i64) -> ShellcardResult<Vec<Review>> {
            self.inner.get_reviews_by_card(card_id)
        }
        fn store_asset(&self, asset: &DeckAsset) -> ShellcardResult<i64> {
            self.inner.store_asset(asset)
        }
        fn get_asset(&self, deck_id: i64, filename: &str) -> ShellcardResult<DeckAsset> {
            self.inner.get_asset(deck_id, filename)
        }
        fn list_deck_assets(&self, deck_id: i64) -> ShellcardResult<Vec<DeckAsset>> {
            self.inner.list_deck_assets(deck_id)
        }
        fn record_deck_version(
            &self,
            deck_id: i64,
            version: &str,
            changes: &str,
        ) -> ShellcardResult<i64> {
            self.inner.record_deck_version(deck_id, version, changes)
        }
        fn get_deck_versions(&self, deck_id: i64) -> ShellcardResult<Vec<crate::storage::DeckVersion>> {
            self.inner.get_deck_versions(deck_id)
        }
        fn close(&self) -> ShellcardResult<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_failed_commit_keeps_card_current_for_retry() {
        let (inner, _, card_id) = seeded_store();
        let flaky = Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_next_commit: Mutex::new(false),
        });
        let sandbox = Arc::new(MockSandbox::new());
        let mut service = ReviewService::new(flaky.clone(), Scheduler::new(), sandbox);

        let session = service.start_session(SessionOptions::default()).unwrap();
        let card = service.get_next_card(&session.id).unwrap();

        *flaky.fail_next_commit.lock().unwrap() = true;
        let err = service
            .submit_review(&session.id, card.id, Rating::Good, None)
            .unwrap_err();
        assert!(err.is_retryable(), "a commit failure must be retryable: {err:?}");

        // The rating was not consumed: card unchanged, session still on it.
        assert_eq!(inner.get_card(card_id).unwrap().fsrs.reps, 0);
        let again = service.get_next_card(&session.id).unwrap();
        assert_eq!(again.id, card_id);

        // Retrying the same rating now succeeds.
        service
            .submit_review(&session.id, card_id, Rating::Good, None)
            .unwrap();
        assert_eq!(inner.get_card(card_id).unwrap().fsrs.reps, 1);
        let stats = service.end_session(&session.id).unwrap();
        assert_eq!(stats.cards_reviewed, 1);
    }

    #[test]
    fn test_deck_fsrs_override_loads_at_session_start() {
        let (store, deck_id, _) = seeded_store();
        let mut deck = store.get_deck(deck_id).unwrap();
        deck.fsrs_parameters = Some(r#"{"desired_retention": 0.95}"#.to_string());
        store.update_deck(&deck).unwrap();

        let (mut service, _) = service_with(store);
        let session = service
            .start_session(SessionOptions {
                deck_id: Some(deck_id),
                ..Default::default()
            })
            .unwrap();
        let state = service.sessions.get(&session.id).unwrap();
        assert!((state.scheduler.params().desired_retention - 0.95).abs() < f32::EPSILON);

        // A malformed blob degrades to defaults with a warning.
        let mut deck = service.store.get_deck(deck_id).unwrap();
        deck.fsrs_parameters = Some("{broken".to_string());
        service.store.update_deck(&deck).unwrap();
        let session = service
            .start_session(SessionOptions {
                deck_id: Some(deck_id),
                ..Default::default()
            })
            .unwrap();
        let state = service.sessions.get(&session.id).unwrap();
        assert!((state.scheduler.params().desired_retention - 0.9).abs() < f32::EPSILON);
    }
}
