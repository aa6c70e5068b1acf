use crate::app::poll::models::{Choice, Group, PollModel, Question, UserRecord};
use crate::app::poll::store::PollStore;
use crate::domain::fields::NativeBuilder;
use crate::domain::model::{Invalidation, ModelRef, Native, Pk};
use crate::domain::ports::ModelCache;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Aggregate key dropped whenever any user changes.
pub const USER_COUNT_KEY: &str = "drfc_user_count";

pub fn user_ref() -> ModelRef {
    ModelRef::new("auth", "user")
}

pub fn question_ref() -> ModelRef {
    ModelRef::new("polls", "question")
}

pub fn choice_ref() -> ModelRef {
    ModelRef::new("polls", "choice")
}

fn pks(ids: &[i64]) -> Vec<Pk> {
    ids.iter().copied().map(Pk::Int).collect()
}

pub struct UserHandler {
    store: Arc<PollStore>,
}

impl UserHandler {
    pub fn new(store: Arc<PollStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelCache for UserHandler {
    type Object = UserRecord;

    async fn load(&self, pk: &Pk) -> Result<Option<UserRecord>> {
        match pk.as_int() {
            Some(id) => Ok(self.store.user_with_votes(id).await),
            None => Ok(None),
        }
    }

    fn serialize(&self, object: &UserRecord) -> Result<Option<Native>> {
        NativeBuilder::new()
            .value("id", object.user.id)
            .value("username", object.user.username.as_str())
            .datetime("date_joined", object.user.date_joined)
            .pk_list("votes", choice_ref(), pks(&object.votes))
            .build()
            .map(Some)
    }

    async fn invalidate(&self, _object: &UserRecord) -> Result<Vec<Invalidation>> {
        Ok(vec![Invalidation::key(USER_COUNT_KEY)])
    }
}

/// Groups are not cached themselves; a change refreshes every cached user.
pub struct GroupHandler {
    store: Arc<PollStore>,
}

impl GroupHandler {
    pub fn new(store: Arc<PollStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelCache for GroupHandler {
    type Object = Group;

    async fn load(&self, pk: &Pk) -> Result<Option<Group>> {
        match pk.as_int() {
            Some(id) => Ok(self.store.group(id).await),
            None => Ok(None),
        }
    }

    fn serializes(&self) -> bool {
        false
    }

    fn serialize(&self, _object: &Group) -> Result<Option<Native>> {
        Ok(None)
    }

    async fn invalidate(&self, _object: &Group) -> Result<Vec<Invalidation>> {
        let user_ids = self.store.pks(PollModel::User, 0, None).await;
        Ok(user_ids
            .into_iter()
            .map(|id| Invalidation::instance("User", id, false))
            .collect())
    }
}

pub struct QuestionHandler {
    store: Arc<PollStore>,
}

impl QuestionHandler {
    pub fn new(store: Arc<PollStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelCache for QuestionHandler {
    type Object = Question;

    async fn load(&self, pk: &Pk) -> Result<Option<Question>> {
        match pk.as_int() {
            Some(id) => Ok(self.store.question(id).await),
            None => Ok(None),
        }
    }

    fn serialize(&self, object: &Question) -> Result<Option<Native>> {
        NativeBuilder::new()
            .value("id", object.id)
            .value("question_text", object.question_text.as_str())
            .datetime("pub_date", object.pub_date)
            .build()
            .map(Some)
    }

    async fn invalidate(&self, _object: &Question) -> Result<Vec<Invalidation>> {
        Ok(Vec::new())
    }
}

/// A choice change drops its question right away and refreshes its voters,
/// whose `votes` list may have changed.
pub struct ChoiceHandler {
    store: Arc<PollStore>,
}

impl ChoiceHandler {
    pub fn new(store: Arc<PollStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelCache for ChoiceHandler {
    type Object = Choice;

    async fn load(&self, pk: &Pk) -> Result<Option<Choice>> {
        match pk.as_int() {
            Some(id) => Ok(self.store.choice(id).await),
            None => Ok(None),
        }
    }

    fn serialize(&self, object: &Choice) -> Result<Option<Native>> {
        NativeBuilder::new()
            .value("id", object.id)
            .value("choice_text", object.choice_text.as_str())
            .pk("question", question_ref(), object.question)
            .pk_list("voters", user_ref(), pks(&object.voters))
            .build()
            .map(Some)
    }

    async fn invalidate(&self, object: &Choice) -> Result<Vec<Invalidation>> {
        let mut invalid = vec![Invalidation::instance("Question", object.question, true)];
        invalid.extend(
            object
                .voters
                .iter()
                .map(|voter| Invalidation::instance("User", *voter, false)),
        );
        Ok(invalid)
    }
}
