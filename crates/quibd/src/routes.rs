//! API routes for quibd

use crate::auth::{self, AuthUser};
use crate::chain::TokenInfo;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use quib_common::personality::{self, PersonalityProfile, VisualTraits};
use quib_common::types::{
    ConversationRecord, CreatureState, EvolutionLogEntry, ProgressSnapshot, TaskRecord, TaskType,
    TokenClaim, User,
};
use quib_common::{EvolutionStage, QuibError, StageRequirements, STAGE_ORDER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;
type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Map a domain error onto an HTTP status.
fn error_response(e: QuibError) -> (StatusCode, String) {
    let status = match &e {
        QuibError::UserNotFound | QuibError::CreatureNotFound | QuibError::ClaimNotFound => {
            StatusCode::NOT_FOUND
        }
        QuibError::RequirementsNotMet
        | QuibError::AlreadyMaxStage
        | QuibError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        QuibError::ConcurrentModification
        | QuibError::ClaimAlreadyProcessed
        | QuibError::DuplicateAccount(_) => StatusCode::CONFLICT,
        QuibError::InvalidCredentials | QuibError::Auth(_) => StatusCode::UNAUTHORIZED,
        QuibError::Upstream(_) => StatusCode::BAD_GATEWAY,
        QuibError::Storage(_) | QuibError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("  Internal error: {}", e);
    }
    (status, e.to_string())
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Pagination {
    fn clamped(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, 100))
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

// ============================================================================
// Auth Routes
// ============================================================================

pub fn auth_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/wallet", post(wallet_auth))
        .route("/v1/auth/profile", get(get_profile).put(update_profile))
        .route("/v1/auth/password", put(change_password))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user: User,
    creature: CreatureState,
}

async fn register(
    State(state): State<AppStateArc>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "A valid email is required".into()));
    }
    if username.len() < 3 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Username must be at least 3 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".into(),
        ));
    }

    let hash = auth::hash_password(&req.password).map_err(error_response)?;
    // Every account gets exactly one creature, born at Hatchling with an
    // AI-generated personality and random visual traits, in the same
    // transaction as the account row.
    let profile = state.ai.initial_personality().await;
    let user = state
        .store
        .create_account(
            Some(&email),
            Some(&username),
            Some(&hash),
            None,
            &profile,
            &personality::random_visual_traits(),
        )
        .map_err(error_response)?;
    info!("  Registered account {} ({})", username, user.id);

    let token = state
        .tokens
        .issue(&user.id, None, Some(&email), Some(&username))
        .map_err(error_response)?;
    let creature = state.engine.creature_state(&user.id).map_err(error_response)?;

    Ok(Json(AuthResponse {
        token,
        user,
        creature,
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    /// Email or username.
    identity: String,
    password: String,
}

async fn login(
    State(state): State<AppStateArc>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let user = state
        .store
        .find_user_by_identity(req.identity.trim())
        .map_err(error_response)?
        .ok_or_else(|| error_response(QuibError::InvalidCredentials))?;

    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| error_response(QuibError::InvalidCredentials))?;
    if !auth::verify_password(&req.password, hash).map_err(error_response)? {
        warn!("  Failed login attempt for {}", req.identity.trim());
        return Err(error_response(QuibError::InvalidCredentials));
    }

    let token = state
        .tokens
        .issue(
            &user.id,
            user.wallet.as_deref(),
            user.email.as_deref(),
            user.username.as_deref(),
        )
        .map_err(error_response)?;
    let creature = state.engine.creature_state(&user.id).map_err(error_response)?;

    Ok(Json(AuthResponse {
        token,
        user,
        creature,
    }))
}

#[derive(Debug, Deserialize)]
struct WalletAuthRequest {
    address: String,
}

async fn wallet_auth(
    State(state): State<AppStateArc>,
    Json(req): Json<WalletAuthRequest>,
) -> ApiResult<AuthResponse> {
    let address = req.address.trim().to_lowercase();
    if !auth::is_valid_wallet_address(&address) {
        return Err((StatusCode::BAD_REQUEST, "Invalid wallet address".into()));
    }

    let user = match state
        .store
        .find_user_by_wallet(&address)
        .map_err(error_response)?
    {
        Some(user) => user,
        None => {
            let profile = state.ai.initial_personality().await;
            let user = state
                .store
                .create_account(
                    None,
                    None,
                    None,
                    Some(&address),
                    &profile,
                    &personality::random_visual_traits(),
                )
                .map_err(error_response)?;
            info!("  New wallet account {} for {}", user.id, address);
            user
        }
    };

    let token = state
        .tokens
        .issue(&user.id, Some(&address), None, None)
        .map_err(error_response)?;
    let creature = state.engine.creature_state(&user.id).map_err(error_response)?;

    Ok(Json(AuthResponse {
        token,
        user,
        creature,
    }))
}

async fn get_profile(State(state): State<AppStateArc>, user: AuthUser) -> ApiResult<User> {
    state
        .store
        .get_user(&user.user_id)
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    email: Option<String>,
    username: Option<String>,
}

async fn update_profile(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    let email = req.email.as_deref().map(str::trim);
    let username = req.username.as_deref().map(str::trim);

    if state
        .store
        .identity_taken(&user.user_id, email, username)
        .map_err(error_response)?
    {
        return Err(error_response(QuibError::DuplicateAccount(
            "email or username already registered".into(),
        )));
    }

    state
        .store
        .update_user_profile(&user.user_id, email, username)
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<serde_json::Value> {
    if req.new_password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".into(),
        ));
    }

    let account = state.store.get_user(&user.user_id).map_err(error_response)?;
    let hash = account
        .password_hash
        .as_deref()
        .ok_or_else(|| error_response(QuibError::InvalidCredentials))?;
    if !auth::verify_password(&req.current_password, hash).map_err(error_response)? {
        return Err(error_response(QuibError::InvalidCredentials));
    }

    let new_hash = auth::hash_password(&req.new_password).map_err(error_response)?;
    state
        .store
        .update_password(&user.user_id, &new_hash)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

// ============================================================================
// Creature Routes
// ============================================================================

pub fn creature_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/creature", get(get_creature))
        .route("/v1/creature/stats", get(creature_stats))
        .route("/v1/creature/personality", get(get_personality))
        .route("/v1/creature/traits", get(get_visual_traits))
        .route("/v1/creature/conversations", get(list_conversations))
        .route("/v1/creature/challenge", post(generate_challenge))
}

async fn get_creature(State(state): State<AppStateArc>, user: AuthUser) -> ApiResult<CreatureState> {
    state
        .engine
        .creature_state(&user.user_id)
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Serialize)]
struct CreatureStats {
    current_stage: EvolutionStage,
    xp: i64,
    mood_score: f64,
    engagement_level: quib_common::types::EngagementLevel,
    total_chats: i64,
    daily_chat_count: i64,
    missed_days: i64,
    daily_challenges_completed: i64,
    conversations: i64,
    account_age_hours: i64,
    user_keywords: Vec<String>,
}

async fn creature_stats(State(state): State<AppStateArc>, user: AuthUser) -> ApiResult<CreatureStats> {
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let age = creature.account_age_hours(Utc::now());
    let snapshot = state
        .engine
        .progress_snapshot(&user.user_id, age)
        .map_err(error_response)?;

    Ok(Json(CreatureStats {
        current_stage: creature.current_stage,
        xp: creature.xp,
        mood_score: creature.mood_score,
        engagement_level: creature.engagement_level,
        total_chats: creature.total_chats,
        daily_chat_count: creature.daily_chat_count,
        missed_days: creature.missed_days,
        daily_challenges_completed: snapshot.daily_challenges,
        conversations: snapshot.chat_interactions,
        account_age_hours: age,
        user_keywords: creature.user_keywords,
    }))
}

async fn get_personality(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<serde_json::Value> {
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    Ok(Json(creature.personality))
}

async fn get_visual_traits(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<serde_json::Value> {
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    Ok(Json(creature.visual_traits))
}

async fn list_conversations(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<ConversationRecord>> {
    let (page, per_page) = pagination.clamped();
    let (items, total) = state
        .store
        .list_conversations(&user.user_id, page, per_page)
        .map_err(error_response)?;
    Ok(Json(Paginated {
        items,
        page,
        per_page,
        total,
    }))
}

#[derive(Debug, Serialize)]
struct ChallengeResponse {
    challenge: String,
    stage: EvolutionStage,
    xp_reward: i64,
}

async fn generate_challenge(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<ChallengeResponse> {
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let challenge = state.ai.daily_challenge(creature.current_stage).await;
    Ok(Json(ChallengeResponse {
        challenge,
        stage: creature.current_stage,
        xp_reward: TaskType::DailyChallenge.xp_reward(),
    }))
}

// ============================================================================
// Chat Routes
// ============================================================================

pub fn chat_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/chat", post(chat))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    sentiment_score: f64,
    mood_score: f64,
    evolved: bool,
    evolution_message: Option<String>,
    creature: CreatureState,
}

/// A chat turn: generate the reply, persist the conversation, then feed
/// mood, engagement, keywords and XP. Enrichment failures degrade to
/// defaults inside the AI client; only persistence errors abort.
async fn chat(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message must not be empty".into()));
    }

    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let profile: PersonalityProfile =
        serde_json::from_value(creature.personality.clone()).unwrap_or_default();
    let history = state
        .store
        .recent_conversations(&user.user_id, 5)
        .map_err(error_response)?;

    let reply = state
        .ai
        .creature_reply(
            message,
            &profile,
            creature.current_stage,
            creature.mood_score,
            &history,
        )
        .await;

    state
        .store
        .create_conversation(&user.user_id, message, &reply.response, Some(reply.sentiment_score))
        .map_err(error_response)?;

    let mood_score = state
        .engine
        .apply_interaction_mood(&user.user_id, reply.sentiment_score)
        .map_err(error_response)?;
    state
        .engine
        .update_engagement(&user.user_id)
        .map_err(error_response)?;
    state
        .store
        .merge_keywords(&user.user_id, &reply.keywords)
        .map_err(error_response)?;
    state
        .engine
        .grant_xp(&user.user_id, TaskType::ChatInteraction.xp_reward())
        .map_err(error_response)?;

    // Every tenth chat, reflect on recent history and refine the
    // personality. Enrichment only; a failed reflection or write leaves
    // the current profile in place.
    if (creature.total_chats + 1) % 10 == 0 {
        let recent = state
            .store
            .recent_conversations(&user.user_id, 10)
            .map_err(error_response)?;
        if let Some(refined) = state.ai.reflect_personality(&profile, &recent).await {
            if let Err(e) = state.store.set_personality(&user.user_id, &refined) {
                warn!("  Personality refinement not persisted: {}", e);
            }
        }
    }

    let evolved_state = state
        .engine
        .try_natural_advance(&user.user_id)
        .map_err(error_response)?;
    let evolution_message = match &evolved_state {
        Some(evolved) => Some(
            state
                .ai
                .evolution_message(creature.current_stage, evolved.current_stage)
                .await,
        ),
        None => None,
    };

    let current = match evolved_state {
        Some(evolved) => evolved,
        None => state.engine.creature_state(&user.user_id).map_err(error_response)?,
    };

    Ok(Json(ChatResponse {
        response: reply.response,
        sentiment_score: reply.sentiment_score,
        mood_score,
        evolved: evolution_message.is_some(),
        evolution_message,
        creature: current,
    }))
}

// ============================================================================
// Task Routes
// ============================================================================

pub fn task_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/tasks", post(submit_task).get(list_tasks))
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    task_type: TaskType,
    title: String,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitTaskResponse {
    task: TaskRecord,
    xp_granted: i64,
    evolved: bool,
    creature: CreatureState,
}

async fn submit_task(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Json(req): Json<SubmitTaskRequest>,
) -> ApiResult<SubmitTaskResponse> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Task title must not be empty".into()));
    }

    let task = state
        .store
        .create_task(&user.user_id, req.task_type, title, req.description.as_deref())
        .map_err(error_response)?;

    let xp = req.task_type.xp_reward();
    state
        .engine
        .grant_xp(&user.user_id, xp)
        .map_err(error_response)?;
    info!(
        "  Task {} completed by {} (+{} XP)",
        req.task_type, user.user_id, xp
    );

    let evolved_state = state
        .engine
        .try_natural_advance(&user.user_id)
        .map_err(error_response)?;
    let evolved = evolved_state.is_some();
    let creature = match evolved_state {
        Some(evolved) => evolved,
        None => state.engine.creature_state(&user.user_id).map_err(error_response)?,
    };

    Ok(Json(SubmitTaskResponse {
        task,
        xp_granted: xp,
        evolved,
        creature,
    }))
}

async fn list_tasks(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<TaskRecord>> {
    let (page, per_page) = pagination.clamped();
    let (items, total) = state
        .store
        .list_tasks(&user.user_id, page, per_page)
        .map_err(error_response)?;
    Ok(Json(Paginated {
        items,
        page,
        per_page,
        total,
    }))
}

// ============================================================================
// Evolution Routes
// ============================================================================

pub fn evolution_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/evolution/check", get(check_evolution))
        .route("/v1/evolution/history", get(evolution_history))
        .route("/v1/evolution/stages", get(list_stages))
        .route("/v1/evolution/trigger", post(trigger_evolution))
}

#[derive(Debug, Serialize)]
struct EvolutionCheckResponse {
    can_evolve: bool,
    current_stage: EvolutionStage,
    next_stage: Option<EvolutionStage>,
    requirements: Option<StageRequirements>,
    progress: ProgressSnapshot,
}

async fn check_evolution(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<EvolutionCheckResponse> {
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let age = creature.account_age_hours(Utc::now());
    let progress = state
        .engine
        .progress_snapshot(&user.user_id, age)
        .map_err(error_response)?;
    let can_evolve = state
        .engine
        .can_advance(&user.user_id, creature.current_stage, age)
        .map_err(error_response)?;
    let next_stage = creature.current_stage.next();

    Ok(Json(EvolutionCheckResponse {
        can_evolve,
        current_stage: creature.current_stage,
        next_stage,
        requirements: next_stage.map(EvolutionStage::requirements),
        progress,
    }))
}

async fn evolution_history(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<EvolutionLogEntry>> {
    let (page, per_page) = pagination.clamped();
    let (items, total) = state
        .store
        .list_evolution_log(&user.user_id, page, per_page)
        .map_err(error_response)?;
    Ok(Json(Paginated {
        items,
        page,
        per_page,
        total,
    }))
}

#[derive(Debug, Serialize)]
struct StageInfo {
    stage: EvolutionStage,
    name: &'static str,
    description: &'static str,
    requirements: StageRequirements,
    xp_bonus: i64,
    token_reward: u64,
}

async fn list_stages() -> Json<Vec<StageInfo>> {
    Json(
        STAGE_ORDER
            .iter()
            .map(|&stage| StageInfo {
                stage,
                name: stage.display_name(),
                description: stage.description(),
                requirements: stage.requirements(),
                xp_bonus: stage.xp_bonus(),
                token_reward: stage.token_reward(),
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize, Default)]
struct TriggerEvolutionRequest {
    #[serde(default)]
    override_gates: bool,
}

#[derive(Debug, Serialize)]
struct TriggerEvolutionResponse {
    creature: CreatureState,
    evolution_message: String,
}

/// Dev-only forced advancement, gated by config flag and wallet list.
async fn trigger_evolution(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Json(req): Json<TriggerEvolutionRequest>,
) -> ApiResult<TriggerEvolutionResponse> {
    if !state.config.auth.enable_evolution_test {
        return Err((StatusCode::FORBIDDEN, "Evolution trigger disabled".into()));
    }
    require_dev_wallet(&state, &user)?;

    let before = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let creature = state
        .engine
        .advance(&user.user_id, req.override_gates)
        .map_err(error_response)?;
    let evolution_message = state
        .ai
        .evolution_message(before.current_stage, creature.current_stage)
        .await;

    Ok(Json(TriggerEvolutionResponse {
        creature,
        evolution_message,
    }))
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/admin/personality/reset", post(reset_personality))
        .route("/v1/admin/personality/reflect", post(force_reflection))
        .route("/v1/admin/traits/reroll", post(reroll_visual_traits))
}

fn require_dev_wallet(state: &AppState, user: &AuthUser) -> Result<(), (StatusCode, String)> {
    let wallet = user
        .wallet
        .as_deref()
        .ok_or((StatusCode::FORBIDDEN, "Dev wallet required".to_string()))?;
    if !state.config.is_dev_wallet(wallet) {
        warn!("  Admin call refused for wallet {}", wallet);
        return Err((StatusCode::FORBIDDEN, "Dev wallet required".into()));
    }
    Ok(())
}

async fn reset_personality(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<PersonalityProfile> {
    require_dev_wallet(&state, &user)?;
    let profile = PersonalityProfile::default();
    state
        .store
        .set_personality(&user.user_id, &profile)
        .map_err(error_response)?;
    info!("  Personality reset for {}", user.user_id);
    Ok(Json(profile))
}

/// Run the reflection pass immediately instead of waiting for the next
/// chat milestone. Returns the current profile unchanged when there is
/// too little history or the generation fails.
async fn force_reflection(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<PersonalityProfile> {
    require_dev_wallet(&state, &user)?;
    let creature = state.store.get_creature(&user.user_id).map_err(error_response)?;
    let profile: PersonalityProfile =
        serde_json::from_value(creature.personality).unwrap_or_default();
    let recent = state
        .store
        .recent_conversations(&user.user_id, 10)
        .map_err(error_response)?;

    match state.ai.reflect_personality(&profile, &recent).await {
        Some(refined) => {
            state
                .store
                .set_personality(&user.user_id, &refined)
                .map_err(error_response)?;
            info!("  Personality reflected for {}", user.user_id);
            Ok(Json(refined))
        }
        None => Ok(Json(profile)),
    }
}

async fn reroll_visual_traits(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<VisualTraits> {
    require_dev_wallet(&state, &user)?;
    let traits = personality::random_visual_traits();
    state
        .store
        .set_visual_traits(&user.user_id, &traits)
        .map_err(error_response)?;
    info!("  Visual traits rerolled for {}", user.user_id);
    Ok(Json(traits))
}

// ============================================================================
// Token Routes
// ============================================================================

pub fn token_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/token/balance", get(token_balance))
        .route("/v1/token/info", get(token_info))
        .route("/v1/token/claims", get(list_claims))
        .route("/v1/token/claims/history", get(claims_history))
        .route("/v1/token/claims/:id/process", post(process_claim))
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    wallet: Option<String>,
    on_chain: f64,
    claimable: u64,
}

async fn token_balance(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<BalanceResponse> {
    let account = state.store.get_user(&user.user_id).map_err(error_response)?;
    let on_chain = match account.wallet.as_deref() {
        Some(wallet) => state.chain.balance_or_zero(wallet).await,
        None => 0.0,
    };
    let claimable = state
        .store
        .total_claimable(&user.user_id)
        .map_err(error_response)?;

    Ok(Json(BalanceResponse {
        wallet: account.wallet,
        on_chain,
        claimable,
    }))
}

async fn token_info(State(state): State<AppStateArc>) -> ApiResult<TokenInfo> {
    state.chain.token_info().await.map(Json).map_err(error_response)
}

#[derive(Debug, Serialize)]
struct ClaimsResponse {
    pending: Vec<TokenClaim>,
    total_claimable: u64,
}

async fn list_claims(State(state): State<AppStateArc>, user: AuthUser) -> ApiResult<ClaimsResponse> {
    let pending = state
        .store
        .pending_claims(&user.user_id)
        .map_err(error_response)?;
    let total_claimable = state
        .store
        .total_claimable(&user.user_id)
        .map_err(error_response)?;
    Ok(Json(ClaimsResponse {
        pending,
        total_claimable,
    }))
}

async fn claims_history(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<Vec<TokenClaim>> {
    state
        .store
        .claim_history(&user.user_id)
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ProcessClaimRequest {
    tx_hash: String,
}

async fn process_claim(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(claim_id): Path<String>,
    Json(req): Json<ProcessClaimRequest>,
) -> ApiResult<TokenClaim> {
    let tx_hash = req.tx_hash.trim();
    if tx_hash.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "tx_hash must not be empty".into()));
    }

    let claim = state
        .store
        .process_claim(&claim_id, &user.user_id, tx_hash)
        .map_err(error_response)?;
    info!(
        "  Claim {} settled for {} ({} tokens)",
        claim.id, user.user_id, claim.amount
    );
    Ok(Json(claim))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
