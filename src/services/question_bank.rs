use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    dao::{
        client::decode,
        models::QuestionEntity,
        path::{StorePath, question_bank_questions},
    },
    error::ServiceError,
    state::{SharedContext, game::Question},
};

/// Read every usable question of `bank_id`.
///
/// Entries that fail to decode or miss a field are logged and skipped; an
/// absent bank yields an empty list.
pub async fn load_questions(
    ctx: &SharedContext,
    bank_id: &str,
) -> Result<Vec<Question>, ServiceError> {
    let path = question_bank_questions(bank_id);
    let entries: Option<Map<String, Value>> = ctx.client().get_optional(&path).await?;
    let questions = parse_questions(&path, entries.unwrap_or_default());
    info!(bank_id, count = questions.len(), "question bank loaded");
    Ok(questions)
}

fn parse_questions(path: &StorePath, entries: Map<String, Value>) -> Vec<Question> {
    entries
        .into_iter()
        .filter_map(|(id, value)| {
            let parsed = decode::<QuestionEntity>(&path.child(id.as_str()), value)
                .map_err(ServiceError::from)
                .and_then(|entity| Question::from_entity(&id, entity));
            match parsed {
                Ok(question) => Some(question),
                Err(err) => {
                    warn!(question = %id, error = %err, "skipping malformed question");
                    None
                }
            }
        })
        .collect()
}

/// Store `questions` under `bank_id`, keyed by their ids. Used to seed banks
/// for local play and tests.
pub async fn publish_questions(
    ctx: &SharedContext,
    bank_id: &str,
    questions: &[(String, QuestionEntity)],
) -> Result<(), ServiceError> {
    let path = question_bank_questions(bank_id);
    for (id, entity) in questions {
        ctx.client().set(&path.child(id.as_str()), entity).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        clock::ManualClock, config::AppConfig, dao::room_store::memory::MemoryRoomStore,
        identity::AnonymousIdentity, state::{AppContext, game::Answer},
    };

    #[test]
    fn malformed_entries_are_skipped() {
        let path = question_bank_questions("default");
        let entries = json!({
            "q1": {"title": "Who jungles?", "answer": "B", "imageUrl": "img/q1.png"},
            "q2": {"title": "No picture", "answer": "a"},
            "q3": {"title": "Odd answer", "answer": "e", "imageUrl": "img/q3.png"},
            "q4": "not an object"
        });
        let Value::Object(entries) = entries else {
            unreachable!()
        };

        let questions = parse_questions(&path, entries);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].answer, Answer::B);
    }

    #[tokio::test]
    async fn published_questions_load_back() {
        let ctx = AppContext::for_device(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(AnonymousIdentity::with_id("curator")),
            Arc::new(ManualClock::new(0)),
            AppConfig::default(),
        );
        assert!(load_questions(&ctx, "empty").await.unwrap().is_empty());

        let entity = QuestionEntity {
            title: Some("Which dragon?".into()),
            answer: Some("d".into()),
            image_url: Some("img/dragon.png".into()),
        };
        publish_questions(&ctx, "lol", &[("q7".to_owned(), entity)])
            .await
            .unwrap();

        let questions = load_questions(&ctx, "lol").await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].image_url, "img/dragon.png");
    }
}
