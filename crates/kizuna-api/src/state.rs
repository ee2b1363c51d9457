//! Application state: database pool, settings handle, and the wired
//! service graph.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use kizuna_core::agent::{AgentToolbox, ChatService};
use kizuna_core::diary::DiaryService;
use kizuna_core::proactive::ProactiveService;
use kizuna_core::relationship::RelationshipEngine;
use kizuna_core::settings_cache::SettingsHandle;
use kizuna_types::settings::RuntimeSettings;

use kizuna_infra::embeddings::HttpEmbedder;
use kizuna_infra::notify::HttpNotifier;
use kizuna_infra::search::TavilySearcher;
use kizuna_infra::sqlite::{
    DatabasePool, SqliteConversationRepository, SqliteDiaryRepository, SqliteFactRepository,
    SqliteHighlightStore, SqliteProactiveRepository, SqliteProfileRepository,
    SqliteUserStateRepository, default_database_url,
};

/// Settings snapshot TTL; admin-driven changes show up within this window.
const SETTINGS_TTL_MS: i64 = 60_000;

pub type Toolbox = AgentToolbox<
    SqliteConversationRepository,
    SqliteDiaryRepository,
    SqliteUserStateRepository,
    SqliteFactRepository,
    HttpEmbedder,
    SqliteHighlightStore,
    TavilySearcher,
>;

pub type Chat = ChatService<
    SqliteConversationRepository,
    SqliteProfileRepository,
    SqliteUserStateRepository,
    SqliteFactRepository,
    Toolbox,
>;

pub type Diary = DiaryService<
    SqliteConversationRepository,
    SqliteDiaryRepository,
    SqliteProfileRepository,
    HttpEmbedder,
    SqliteHighlightStore,
>;

pub type Proactive = ProactiveService<
    SqliteConversationRepository,
    SqliteUserStateRepository,
    SqliteProactiveRepository,
    SqliteProfileRepository,
    HttpNotifier,
>;

pub struct AppStateInner {
    pub pool: DatabasePool,
    pub settings: SettingsHandle,
    pub config_path: Option<PathBuf>,
    pub chat: Chat,
    pub diary: Diary,
    pub proactive: Proactive,
    pub conversations: SqliteConversationRepository,
    pub diaries: SqliteDiaryRepository,
    pub proactive_repo: SqliteProactiveRepository,
    pub engine: RelationshipEngine<SqliteUserStateRepository>,
}

#[derive(Clone)]
pub struct AppState(pub Arc<AppStateInner>);

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AppState {
    /// Connect the database, run migrations, and wire the service graph.
    pub async fn init(settings: RuntimeSettings, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let pool = DatabasePool::new(&default_database_url()).await?;
        Ok(Self::from_pool(pool, settings, config_path))
    }

    /// Current settings snapshot, reloading from the config file when the
    /// TTL has lapsed. A failed reload keeps the cached snapshot.
    pub async fn settings_snapshot(&self) -> RuntimeSettings {
        let now = Utc::now().timestamp_millis();
        if self.settings.is_expired(now).await {
            match crate::config::load_settings(self.config_path.as_deref()) {
                Ok(fresh) => self.settings.replace(fresh, now).await,
                Err(err) => {
                    tracing::warn!(error = %err, "settings reload failed, keeping cached snapshot")
                }
            }
        }
        self.settings.current().await
    }

    pub fn from_pool(pool: DatabasePool, settings: RuntimeSettings, config_path: Option<PathBuf>) -> Self {
        let tuning = settings.intimacy.clone();

        let toolbox = AgentToolbox::new(
            SqliteConversationRepository::new(pool.clone()),
            SqliteDiaryRepository::new(pool.clone()),
            RelationshipEngine::new(SqliteUserStateRepository::new(pool.clone()), tuning.clone()),
            SqliteFactRepository::new(pool.clone()),
            HttpEmbedder::from_settings(&settings.embeddings),
            SqliteHighlightStore::new(pool.clone()),
            TavilySearcher::from_settings(&settings.web_search),
        );

        let chat = ChatService::new(
            SqliteConversationRepository::new(pool.clone()),
            SqliteProfileRepository::new(pool.clone()),
            RelationshipEngine::new(SqliteUserStateRepository::new(pool.clone()), tuning.clone()),
            SqliteFactRepository::new(pool.clone()),
            toolbox,
        );

        let diary = DiaryService::new(
            SqliteConversationRepository::new(pool.clone()),
            SqliteDiaryRepository::new(pool.clone()),
            SqliteProfileRepository::new(pool.clone()),
            HttpEmbedder::from_settings(&settings.embeddings),
            SqliteHighlightStore::new(pool.clone()),
        );

        let email_api_key = std::env::var("KIZUNA_EMAIL_API_KEY").ok();
        let email_from = std::env::var("KIZUNA_EMAIL_FROM").ok();
        let proactive = ProactiveService::new(
            SqliteConversationRepository::new(pool.clone()),
            RelationshipEngine::new(SqliteUserStateRepository::new(pool.clone()), tuning.clone()),
            SqliteProactiveRepository::new(pool.clone()),
            SqliteProfileRepository::new(pool.clone()),
            HttpNotifier::new(email_api_key, email_from),
        );

        let now = Utc::now().timestamp_millis();
        AppState(Arc::new(AppStateInner {
            settings: SettingsHandle::new(settings, now, SETTINGS_TTL_MS),
            config_path,
            chat,
            diary,
            proactive,
            conversations: SqliteConversationRepository::new(pool.clone()),
            diaries: SqliteDiaryRepository::new(pool.clone()),
            proactive_repo: SqliteProactiveRepository::new(pool.clone()),
            engine: RelationshipEngine::new(SqliteUserStateRepository::new(pool.clone()), tuning),
            pool,
        }))
    }
}
