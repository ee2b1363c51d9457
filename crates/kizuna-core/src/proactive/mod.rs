//! Proactive outreach evaluation.
//!
//! The scheduler hands this service a candidate user; a ladder of cheap
//! gates runs before any model call, and only a fully admitted candidate
//! reaches the proactive agent. The agent itself may still decline by
//! answering with the skip sentinel.

use tracing::{info, warn};
use uuid::Uuid;

use kizuna_types::chat::ChatMessage;
use kizuna_types::conversation::{ConversationLog, ConversationRole};
use kizuna_types::llm::ChatRequest;
use kizuna_types::proactive::{ProactiveMessage, ProactiveStatus, ProactiveUserState};
use kizuna_types::settings::RuntimeSettings;

use crate::agent::service::build_profile_snippet;
use crate::llm::box_provider::BoxChatProvider;
use crate::llm::traced_send;
use crate::notify::Notifier;
use crate::relationship::RelationshipEngine;
use crate::repository::conversation::{ConversationRepository, JobCandidate};
use crate::repository::diary::ProfileRepository;
use crate::repository::proactive::ProactiveRepository;
use crate::repository::state::UserStateRepository;
use crate::sanitize::{sanitize_reply, sanitize_text};
use crate::scheduler::JobError;
use crate::scheduler::clock::in_quiet_hours;
use crate::timefmt::{local_date, local_hour, local_time_hm, parse_zone};

/// Sentinel the model answers with when it chooses not to reach out.
pub const SKIP_SENTINEL: &str = "[SKIP]";

/// Longest proactive message we will send.
const MAX_PROACTIVE_CHARS: usize = 600;

/// Hours of history shown to the proactive agent.
const HISTORY_WINDOW_HOURS: i64 = 48;
const HISTORY_LIMIT: i64 = 120;

/// Pending messages expire after this many hours if never pulled.
const EXPIRY_HOURS: i64 = 72;

const HOUR_MS: i64 = 3_600_000;

/// Result of evaluating one user.
#[derive(Debug, Clone)]
pub struct ProactiveOutcome {
    pub triggered: bool,
    pub reason: &'static str,
    pub message_id: Option<String>,
}

impl ProactiveOutcome {
    fn skipped(reason: &'static str) -> Self {
        Self {
            triggered: false,
            reason,
            message_id: None,
        }
    }
}

/// Counters for one scheduler pass.
#[derive(Debug, Clone, Default)]
pub struct ProactivePassSummary {
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Evaluates and sends proactive messages.
pub struct ProactiveService<C, S, P, Pr, N>
where
    C: ConversationRepository,
    S: UserStateRepository,
    P: ProactiveRepository,
    Pr: ProfileRepository,
    N: Notifier,
{
    conversations: C,
    engine: RelationshipEngine<S>,
    proactive: P,
    profiles: Pr,
    notifier: N,
}

impl<C, S, P, Pr, N> ProactiveService<C, S, P, Pr, N>
where
    C: ConversationRepository,
    S: UserStateRepository,
    P: ProactiveRepository,
    Pr: ProfileRepository,
    N: Notifier,
{
    pub fn new(
        conversations: C,
        engine: RelationshipEngine<S>,
        proactive: P,
        profiles: Pr,
        notifier: N,
    ) -> Self {
        Self {
            conversations,
            engine,
            proactive,
            profiles,
            notifier,
        }
    }

    /// One pass over the candidate set. Per-user failures are isolated.
    pub async fn run_pass(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        now: i64,
    ) -> Result<ProactivePassSummary, JobError> {
        let since = now - settings.proactive.candidate_lookback_hours * HOUR_MS;
        let candidates = self
            .conversations
            .active_users_since(since, settings.proactive.candidate_limit)
            .await?;

        let mut summary = ProactivePassSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        info!(users = candidates.len(), "proactive pass starting");

        for candidate in &candidates {
            match self.evaluate_user(provider, settings, candidate, now).await {
                Ok(outcome) if outcome.triggered => summary.sent += 1,
                Ok(_) => {}
                Err(err) => {
                    summary.failed += 1;
                    warn!(user_id = %candidate.user_id, error = %err, "proactive user failed");
                }
            }
        }
        Ok(summary)
    }

    /// Run the gate ladder for one user and send if everything admits.
    ///
    /// Gates are ordered cheapest-first and all run before any model
    /// call; the returned reason names the first gate that refused.
    pub async fn evaluate_user(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        candidate: &JobCandidate,
        now: i64,
    ) -> Result<ProactiveOutcome, JobError> {
        let p = &settings.proactive;
        if !p.enabled {
            return Ok(ProactiveOutcome::skipped("disabled"));
        }

        let user_id = candidate.user_id.trim();
        if user_id.is_empty() {
            return Ok(ProactiveOutcome::skipped("empty_user"));
        }

        let zone_name = candidate
            .time_zone
            .clone()
            .filter(|z| !z.trim().is_empty())
            .unwrap_or_else(|| p.time_zone.clone());
        let zone = parse_zone(Some(&zone_name));

        let state = self.engine.load(user_id, now).await?;
        let pstate = self
            .proactive
            .get_state(user_id)
            .await?
            .unwrap_or_else(|| ProactiveUserState::initial(user_id, now));

        let hour = local_hour(now, zone);
        if in_quiet_hours(hour, p.quiet_start_hour, p.quiet_end_hour) {
            return Ok(ProactiveOutcome::skipped("quiet_hours"));
        }

        let today = local_date(now, zone);
        let daily_count = pstate.count_for(&today);
        if daily_count >= p.max_daily {
            return Ok(ProactiveOutcome::skipped("daily_limit"));
        }

        if p.cooldown_hours > 0
            && pstate.last_proactive_at > 0
            && now - pstate.last_proactive_at < p.cooldown_hours * HOUR_MS
        {
            return Ok(ProactiveOutcome::skipped("cooldown"));
        }

        if state.intimacy < p.intimacy_threshold {
            return Ok(ProactiveOutcome::skipped("intimacy_too_low"));
        }

        if state.last_interaction_at > 0
            && now - state.last_interaction_at < p.recent_active_minutes * 60_000
        {
            return Ok(ProactiveOutcome::skipped("recent_active"));
        }

        let hours_since = if state.last_interaction_at > 0 {
            ((now - state.last_interaction_at) / HOUR_MS).max(1)
        } else {
            24
        };

        let reply = match self
            .run_proactive_agent(provider, settings, user_id, zone_name.as_str(), state.intimacy, hours_since, now)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(user_id, error = %err, "proactive agent failed");
                return Ok(ProactiveOutcome::skipped("agent_failed"));
            }
        };
        let Some(content) = reply else {
            return Ok(ProactiveOutcome::skipped("agent_skip"));
        };

        let message_id = Uuid::new_v4().to_string();
        let log = ConversationLog {
            id: message_id.clone(),
            user_id: user_id.to_string(),
            date: today.clone(),
            role: ConversationRole::Companion,
            content: content.clone(),
            attachments: vec![],
            reply_to: None,
            timestamp: now,
            user_name: candidate.user_name.clone(),
            time_zone: Some(zone_name.clone()),
        };
        self.conversations.save(&log).await?;

        let notify_result = self
            .notifier
            .send(p.notification_channel, &p.notification_target, &content, user_id)
            .await;

        let trigger_context = serde_json::json!({
            "intimacy": state.intimacy,
            "hours_since": hours_since,
            "local_hour": hour,
            "time_zone": zone_name,
            "reason": "scheduler",
        })
        .to_string();

        let message = ProactiveMessage {
            id: format!("pm:{message_id}"),
            user_id: user_id.to_string(),
            content: content.clone(),
            trigger_context,
            status: ProactiveStatus::Pending,
            notification_channel: p.notification_channel,
            notification_sent: notify_result.sent,
            notification_error: notify_result.error.clone(),
            created_at: now,
            delivered_at: None,
            expires_at: now + EXPIRY_HOURS * HOUR_MS,
        };
        self.proactive.save_message(&message).await?;

        self.proactive
            .save_state(&ProactiveUserState {
                user_id: user_id.to_string(),
                last_proactive_at: now,
                daily_count: daily_count + 1,
                daily_count_date: today,
                updated_at: now,
            })
            .await?;

        info!(
            user_id,
            message_id = %message_id,
            notification_sent = notify_result.sent,
            "proactive message created"
        );
        Ok(ProactiveOutcome {
            triggered: true,
            reason: "sent",
            message_id: Some(message_id),
        })
    }

    /// Ask the model for one outreach line, honoring the skip sentinel.
    async fn run_proactive_agent(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        user_id: &str,
        zone_name: &str,
        intimacy: i32,
        hours_since: i64,
        now: i64,
    ) -> Result<Option<String>, JobError> {
        let zone = parse_zone(Some(zone_name));
        let profile_snippet = match self.profiles.get(user_id).await? {
            Some(profile) => profile
                .content
                .as_deref()
                .map(build_profile_snippet)
                .unwrap_or_default(),
            None => String::new(),
        };

        let logs = self
            .conversations
            .fetch_after(
                user_id,
                now - HISTORY_WINDOW_HOURS * HOUR_MS,
                HISTORY_LIMIT,
                Some(&[ConversationRole::User, ConversationRole::Companion]),
            )
            .await?;

        let system_prompt = format!(
            "You are the user's companion. They haven't messaged you in a while.\n\
             If this feels like a moment to speak up, write the one natural message you'd send.\n\
             If you'd rather not intrude, reply with exactly {SKIP_SENTINEL}.\n\
             Current time: {date} {time}\n\
             Hours since we last talked: {hours_since}\n\
             Relationship warmth: {intimacy}\n\
             About them:\n{profile}",
            date = local_date(now, zone),
            time = local_time_hm(now, zone),
            profile = if profile_snippet.is_empty() { "(none yet)" } else { &profile_snippet },
        );

        let mut messages = vec![ChatMessage::system(system_prompt)];
        let history: Vec<ChatMessage> = logs
            .iter()
            .filter_map(|log| {
                let text = sanitize_text(&log.content);
                if text.is_empty() {
                    return None;
                }
                let log_zone = parse_zone(log.time_zone.as_deref());
                let line = format!("[{}] {}", local_time_hm(log.timestamp, log_zone), text);
                Some(match log.role {
                    ConversationRole::Companion => ChatMessage::assistant(line),
                    ConversationRole::User => ChatMessage::user(line),
                })
            })
            .collect();
        if !history.is_empty() {
            messages.push(ChatMessage::system("--- the last two days ---"));
            messages.extend(history);
        }
        messages.push(ChatMessage::user(format!(
            "Send exactly the one message you want to send right now; if you shouldn't intrude, reply with only {SKIP_SENTINEL}."
        )));

        let request = ChatRequest::new(settings.provider.model.clone(), messages)
            .with_temperature(settings.agent.temperature)
            .with_max_tokens(256)
            .with_timeout(std::time::Duration::from_secs(90));

        let exchange = traced_send(provider, &request, "proactive", Some(user_id)).await
            .map_err(JobError::Provider)?;

        let Some(raw) = exchange.message.text().map(str::to_string) else {
            return Ok(None);
        };
        if raw.to_uppercase().contains(SKIP_SENTINEL) {
            return Ok(None);
        }
        let cleaned = sanitize_reply(&raw);
        if cleaned.is_empty() {
            return Ok(None);
        }
        Ok(Some(cleaned.chars().take(MAX_PROACTIVE_CHARS).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kizuna_types::chat::AssistantReply;
    use kizuna_types::conversation::{MessageVersion, UserProfile};
    use kizuna_types::error::RepositoryError;
    use kizuna_types::llm::{ChatExchange, ProviderError};
    use kizuna_types::proactive::{NotificationChannel, NotificationResult};
    use kizuna_types::settings::IntimacyTuning;
    use kizuna_types::state::UserState;

    use crate::llm::provider::ChatProvider;

    // ---- fakes -----------------------------------------------------------

    #[derive(Default)]
    struct FakeConversations {
        saved: Mutex<Vec<ConversationLog>>,
    }

    impl ConversationRepository for FakeConversations {
        async fn save(&self, log: &ConversationLog) -> Result<(), RepositoryError> {
            self.saved.lock().unwrap().push(log.clone());
            Ok(())
        }
        async fn get(&self, _u: &str, _l: &str) -> Result<Option<ConversationLog>, RepositoryError> {
            Ok(None)
        }
        async fn fetch_by_date(&self, _u: &str, _d: &str) -> Result<Vec<ConversationLog>, RepositoryError> {
            Ok(vec![])
        }
        async fn fetch_after(
            &self,
            _u: &str,
            _after: i64,
            _limit: i64,
            _roles: Option<&[ConversationRole]>,
        ) -> Result<Vec<ConversationLog>, RepositoryError> {
            Ok(vec![])
        }
        async fn log_date(&self, _u: &str, _l: &str) -> Result<Option<String>, RepositoryError> {
            Ok(None)
        }
        async fn last_date_before(&self, _u: &str, _b: &str) -> Result<Option<String>, RepositoryError> {
            Ok(None)
        }
        async fn first_timestamp(&self, _u: &str) -> Result<Option<i64>, RepositoryError> {
            Ok(None)
        }
        async fn pending_diary_users(&self, _d: &str) -> Result<Vec<JobCandidate>, RepositoryError> {
            Ok(vec![])
        }
        async fn active_users_since(&self, _s: i64, _l: i64) -> Result<Vec<JobCandidate>, RepositoryError> {
            Ok(vec![])
        }
        async fn delete_cascade(&self, _u: &str, _ids: &[String]) -> Result<u64, RepositoryError> {
            Ok(0)
        }
        async fn is_tombstoned(&self, _u: &str, _l: &str) -> Result<bool, RepositoryError> {
            Ok(false)
        }
        async fn push_version(&self, _l: &str, _c: &str, _n: i64) -> Result<i64, RepositoryError> {
            Ok(0)
        }
        async fn list_versions(&self, _l: &str) -> Result<Vec<MessageVersion>, RepositoryError> {
            Ok(vec![])
        }
    }

    struct FakeStateRepo {
        state: Mutex<Option<UserState>>,
    }

    impl crate::repository::state::UserStateRepository for FakeStateRepo {
        async fn get(&self, _user_id: &str) -> Result<Option<UserState>, RepositoryError> {
            Ok(self.state.lock().unwrap().clone())
        }
        async fn save(&self, state: &UserState) -> Result<(), RepositoryError> {
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProactiveRepo {
        state: Mutex<Option<ProactiveUserState>>,
        messages: Mutex<Vec<ProactiveMessage>>,
    }

    impl ProactiveRepository for FakeProactiveRepo {
        async fn get_state(&self, _u: &str) -> Result<Option<ProactiveUserState>, RepositoryError> {
            Ok(self.state.lock().unwrap().clone())
        }
        async fn save_state(&self, state: &ProactiveUserState) -> Result<(), RepositoryError> {
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }
        async fn save_message(&self, message: &ProactiveMessage) -> Result<(), RepositoryError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
        async fn pending_messages(&self, _u: &str, _n: i64) -> Result<Vec<ProactiveMessage>, RepositoryError> {
            Ok(vec![])
        }
        async fn mark_delivered(&self, _ids: &[String], _n: i64) -> Result<u64, RepositoryError> {
            Ok(0)
        }
        async fn expire_stale(&self, _n: i64) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FakeProfiles;

    impl ProfileRepository for FakeProfiles {
        async fn get(&self, _u: &str) -> Result<Option<UserProfile>, RepositoryError> {
            Ok(None)
        }
        async fn save(&self, _u: &str, _c: &str, _n: i64) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeNotifier;

    impl Notifier for FakeNotifier {
        async fn send(
            &self,
            _channel: NotificationChannel,
            _target: &str,
            _content: &str,
            _user_id: &str,
        ) -> NotificationResult {
            NotificationResult::sent()
        }
    }

    /// Provider that counts calls and always answers with fixed text.
    struct CountingProvider {
        calls: std::sync::Arc<AtomicUsize>,
        reply: &'static str,
    }

    impl ChatProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn send(&self, _request: &ChatRequest) -> Result<ChatExchange, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatExchange {
                message: AssistantReply {
                    content: Some(self.reply.to_string()),
                    tool_calls: vec![],
                },
                raw: serde_json::Value::Null,
            })
        }
    }

    // ---- helpers ---------------------------------------------------------

    // 2026-08-07 02:00:00 UTC -- local hour 2 in UTC.
    const TWO_AM: i64 = 1_786_068_000_000;
    // 2026-08-07 12:00:00 UTC.
    const NOON: i64 = 1_786_104_000_000;
    const DAY_MS: i64 = 86_400_000;

    fn service(
        state: UserState,
    ) -> ProactiveService<FakeConversations, FakeStateRepo, FakeProactiveRepo, FakeProfiles, FakeNotifier> {
        ProactiveService::new(
            FakeConversations::default(),
            RelationshipEngine::new(
                FakeStateRepo {
                    state: Mutex::new(Some(state)),
                },
                IntimacyTuning::default(),
            ),
            FakeProactiveRepo::default(),
            FakeProfiles,
            FakeNotifier,
        )
    }

    fn settings() -> RuntimeSettings {
        let mut settings = RuntimeSettings::default();
        settings.proactive.enabled = true;
        settings.proactive.time_zone = "UTC".to_string();
        settings.agent.time_zone = "UTC".to_string();
        settings
    }

    fn candidate() -> JobCandidate {
        JobCandidate {
            user_id: "u1".to_string(),
            user_name: Some("Rin".to_string()),
            time_zone: Some("UTC".to_string()),
        }
    }

    fn eligible_state(now: i64) -> UserState {
        let mut state = UserState::initial("u1", now - 10 * DAY_MS);
        state.intimacy = 40;
        state
    }

    fn provider(calls: &std::sync::Arc<AtomicUsize>, reply: &'static str) -> BoxChatProvider {
        BoxChatProvider::new(CountingProvider {
            calls: calls.clone(),
            reply,
        })
    }

    // ---- tests -----------------------------------------------------------

    #[tokio::test]
    async fn test_quiet_hours_gate_short_circuits_before_model() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let service = service(eligible_state(TWO_AM));

        let outcome = service
            .evaluate_user(&provider(&calls, "hello"), &settings(), &candidate(), TWO_AM)
            .await
            .unwrap();

        assert!(!outcome.triggered);
        assert_eq!(outcome.reason, "quiet_hours");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "model must not be called");
    }

    #[tokio::test]
    async fn test_daily_limit_gate() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let service = service(eligible_state(NOON));
        *service.proactive.state.lock().unwrap() = Some(ProactiveUserState {
            user_id: "u1".to_string(),
            last_proactive_at: 0,
            daily_count: 2,
            daily_count_date: "2026-08-07".to_string(),
            updated_at: 0,
        });

        let outcome = service
            .evaluate_user(&provider(&calls, "hello"), &settings(), &candidate(), NOON)
            .await
            .unwrap();
        assert_eq!(outcome.reason, "daily_limit");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_intimacy_gate() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let mut state = eligible_state(NOON);
        state.intimacy = 3;
        let service = service(state);

        let outcome = service
            .evaluate_user(&provider(&calls, "hello"), &settings(), &candidate(), NOON)
            .await
            .unwrap();
        assert_eq!(outcome.reason, "intimacy_too_low");
    }

    #[tokio::test]
    async fn test_recent_active_gate() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let mut state = eligible_state(NOON);
        state.last_interaction_at = NOON - 5 * 60_000;
        // Fresh interaction means no decay and intimacy stays eligible.
        let service = service(state);

        let outcome = service
            .evaluate_user(&provider(&calls, "hello"), &settings(), &candidate(), NOON)
            .await
            .unwrap();
        assert_eq!(outcome.reason, "recent_active");
    }

    #[tokio::test]
    async fn test_skip_sentinel_creates_nothing() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let service = service(eligible_state(NOON));

        let outcome = service
            .evaluate_user(&provider(&calls, "[SKIP]"), &settings(), &candidate(), NOON)
            .await
            .unwrap();

        assert_eq!(outcome.reason, "agent_skip");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(service.proactive.messages.lock().unwrap().is_empty());
        assert!(service.conversations.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admitted_user_gets_message_and_counters() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let service = service(eligible_state(NOON));

        let outcome = service
            .evaluate_user(&provider(&calls, "thinking of you"), &settings(), &candidate(), NOON)
            .await
            .unwrap();

        assert!(outcome.triggered);
        assert_eq!(outcome.reason, "sent");
        let message_id = outcome.message_id.unwrap();

        let logs = service.conversations.saved.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, message_id);
        assert_eq!(logs[0].role, ConversationRole::Companion);

        let messages = service.proactive.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, format!("pm:{message_id}"));
        assert_eq!(messages[0].status, ProactiveStatus::Pending);
        assert_eq!(messages[0].expires_at, NOON + EXPIRY_HOURS * HOUR_MS);
        assert!(messages[0].notification_sent);

        let pstate = service.proactive.state.lock().unwrap().clone().unwrap();
        assert_eq!(pstate.daily_count, 1);
        assert_eq!(pstate.daily_count_date, "2026-08-07");
        assert_eq!(pstate.last_proactive_at, NOON);
    }

    #[tokio::test]
    async fn test_cooldown_gate() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let service = service(eligible_state(NOON));
        *service.proactive.state.lock().unwrap() = Some(ProactiveUserState {
            user_id: "u1".to_string(),
            last_proactive_at: NOON - HOUR_MS,
            daily_count: 0,
            daily_count_date: String::new(),
            updated_at: 0,
        });

        let outcome = service
            .evaluate_user(&provider(&calls, "hello"), &settings(), &candidate(), NOON)
            .await
            .unwrap();
        assert_eq!(outcome.reason, "cooldown");
    }
}
