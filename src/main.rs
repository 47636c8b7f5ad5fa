//! LeagueKook simulator: plays one scripted game between in-process devices
//! sharing an in-memory room store.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaguekook_core::{
    clock::SystemClock,
    config::AppConfig,
    dao::{models::QuestionEntity, room_store::memory::MemoryRoomStore},
    identity::AnonymousIdentity,
    services::{
        admin_service::AdminCoordinator, baron_service::BaronParticipant, lobby_service,
        mcq_service::McqParticipant, question_bank, room_service, waitlist_service,
    },
    state::{AppContext, SharedContext, state_machine::GameState},
};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ROUNDS: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = MemoryRoomStore::new();
    let device = |name: &str| {
        AppContext::for_device(
            Arc::new(store.clone()),
            Arc::new(AnonymousIdentity::with_id(name)),
            Arc::new(SystemClock),
            config.clone(),
        )
    };

    let admin_ctx = device("admin");
    seed_question_bank(&admin_ctx, &config.game.question_bank_id).await?;

    let room = room_service::create_room(&admin_ctx).await?;
    info!(room_id = %room.room_id, "room ready");
    let admin = AdminCoordinator::new(&admin_ctx, &room.room_id).await?;
    admin.start_admission().await?;

    let baron_ctx = device("baron");
    let mcq_ctxs: Vec<SharedContext> = (1..=config.room.min_mcq_role_count)
        .map(|n| device(&format!("mcq{n}")))
        .collect();

    for ctx in std::iter::once(&baron_ctx).chain(&mcq_ctxs) {
        waitlist_service::join_wait_list(ctx, &room.room_id, &room.room_passcode).await?;
        let admitted = tokio::time::timeout(
            STEP_TIMEOUT,
            waitlist_service::wait_for_admission(ctx, &room.room_id),
        )
        .await
        .context("admission timed out")??;
        anyhow::ensure!(admitted, "wait-list request vanished");
        lobby_service::update_participant_ready(ctx, &room.room_id, true).await?;
    }
    lobby_service::update_participant_role(&admin_ctx, &room.room_id, "baron", "baron").await?;

    let baron = BaronParticipant::join(&baron_ctx, &room.room_id).await?;
    let mut mcqs = Vec::with_capacity(mcq_ctxs.len());
    for ctx in &mcq_ctxs {
        mcqs.push(McqParticipant::join(ctx, &room.room_id).await?);
    }

    admin.initialize_game().await?;
    let coordinator = admin.as_ref();
    wait_for("game start", || async move {
        coordinator.game_state().await == GameState::GameStarted
    })
    .await?;

    for round in 0..MAX_ROUNDS {
        if admin.winning_team().await.is_some() {
            break;
        }
        for mcq in &mcqs {
            play_turn(mcq, &baron).await?;
            if admin.winning_team().await.is_some() {
                break;
            }
        }
        debug!(round, health = ?admin.baron_health().await, "round played");
    }

    match admin.winning_team().await {
        Some(team) => info!(%team, codes = admin.code_history().await.len(), "game finished"),
        None => warn!("no winner after {MAX_ROUNDS} rounds"),
    }
    admin.close().await?;
    Ok(())
}

/// One MCQ turn: unlock the question, answer it right, carry the code to the
/// Baron and ask for the next question.
async fn play_turn(mcq: &McqParticipant, baron: &BaronParticipant) -> anyhow::Result<()> {
    let view = mcq.snapshot();
    let (Some(team), Some(question)) = (view.team, view.question) else {
        return Ok(());
    };
    let code = view.team_codes.get(&team).cloned().unwrap_or_default();
    if !mcq.submit_team_code(&code).await? {
        warn!(%team, "team code refused");
        return Ok(());
    }

    mcq.submit_answer(question.answer).await?;
    wait_for("answer verdict", || async move { !mcq.snapshot().awaiting_verdict }).await?;

    if let Some(baron_code) = mcq.snapshot().baron_code {
        baron.submit_code(&baron_code).await?;
        wait_for("baron report", || async move { !baron.snapshot().awaiting_verdict }).await?;
        if let Some(report) = baron.snapshot().last_report {
            info!(
                team = ?report.team,
                damage = report.damage_amount,
                health = report.health_after_damage,
                "baron hit"
            );
        }
    }

    if mcq.snapshot().game_ended {
        return Ok(());
    }
    mcq.request_next_question().await?;
    wait_for("next question", || async move { !mcq.snapshot().awaiting_question }).await
}

async fn wait_for<F, Fut>(what: &str, check: F) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + STEP_TIMEOUT;
    while !check().await {
        anyhow::ensure!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

async fn seed_question_bank(ctx: &SharedContext, bank_id: &str) -> anyhow::Result<()> {
    let questions = [
        ("q1", "Which lane does the jungler not farm?", "a"),
        ("q2", "How many dragons grant the soul?", "c"),
        ("q3", "Which buff grants mana regeneration?", "b"),
        ("q4", "What spawns at twenty minutes?", "d"),
    ]
    .into_iter()
    .map(|(id, title, answer)| {
        (
            id.to_owned(),
            QuestionEntity {
                title: Some(title.to_owned()),
                answer: Some(answer.to_owned()),
                image_url: Some(format!("img/{id}.png")),
            },
        )
    })
    .collect::<Vec<_>>();
    question_bank::publish_questions(ctx, bank_id, &questions).await?;
    Ok(())
}

/// Initialise tracing with an env-filter driven configuration.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,leaguekook_core=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
