use crate::app::poll::models::{Choice, Group, PollData, PollModel, Question, User, UserRecord};
use crate::domain::model::Pk;
use crate::domain::ports::PkQuery;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory stand-in for the poll database.
///
/// Every read method counts as one query, so tests can assert how many
/// round trips a cache operation cost.
#[derive(Debug, Default)]
pub struct PollStore {
    data: RwLock<PollData>,
    queries: AtomicUsize,
}

impl PollStore {
    pub fn new(data: PollData) -> Self {
        Self {
            data: RwLock::new(data),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let data: PollData = serde_json::from_str(content)?;
        Ok(Self::new(data))
    }

    pub fn from_fixture<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Acquire)
    }

    pub fn reset_queries(&self) {
        self.queries.store(0, Ordering::Release);
    }

    fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::AcqRel);
    }

    // 讀取：每個方法計為一次查詢

    pub async fn user_with_votes(&self, id: i64) -> Option<UserRecord> {
        self.record_query();
        let data = self.data.read().await;
        let user = data.users.iter().find(|u| u.id == id)?.clone();
        let mut votes: Vec<i64> = data
            .choices
            .iter()
            .filter(|c| c.voters.contains(&id))
            .map(|c| c.id)
            .collect();
        votes.sort_unstable();
        Some(UserRecord { user, votes })
    }

    pub async fn group(&self, id: i64) -> Option<Group> {
        self.record_query();
        let data = self.data.read().await;
        data.groups.iter().find(|g| g.id == id).cloned()
    }

    pub async fn question(&self, id: i64) -> Option<Question> {
        self.record_query();
        let data = self.data.read().await;
        data.questions.iter().find(|q| q.id == id).cloned()
    }

    pub async fn choice(&self, id: i64) -> Option<Choice> {
        self.record_query();
        let data = self.data.read().await;
        data.choices.iter().find(|c| c.id == id).cloned()
    }

    /// Primary keys in ascending order, windowed by `offset` / `limit`.
    pub async fn pks(&self, model: PollModel, offset: usize, limit: Option<usize>) -> Vec<i64> {
        self.record_query();
        let data = self.data.read().await;
        let mut ids = Self::ids(&data, model);
        ids.sort_unstable();
        ids.into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub async fn count(&self, model: PollModel) -> usize {
        self.record_query();
        let data = self.data.read().await;
        Self::ids(&data, model).len()
    }

    fn ids(data: &PollData, model: PollModel) -> Vec<i64> {
        match model {
            PollModel::User => data.users.iter().map(|u| u.id).collect(),
            PollModel::Group => data.groups.iter().map(|g| g.id).collect(),
            PollModel::Question => data.questions.iter().map(|q| q.id).collect(),
            PollModel::Choice => data.choices.iter().map(|c| c.id).collect(),
        }
    }

    // 寫入：不計入查詢次數，呼叫端負責之後更新快取

    pub async fn save_user(&self, user: User) {
        let mut data = self.data.write().await;
        match data.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => data.users.push(user),
        }
    }

    /// Removes the user along with their votes and group memberships.
    pub async fn delete_user(&self, id: i64) -> bool {
        let mut data = self.data.write().await;
        let before = data.users.len();
        data.users.retain(|u| u.id != id);
        for choice in &mut data.choices {
            choice.voters.retain(|voter| *voter != id);
        }
        for group in &mut data.groups {
            group.users.retain(|member| *member != id);
        }
        data.users.len() != before
    }

    pub async fn save_group(&self, group: Group) {
        let mut data = self.data.write().await;
        match data.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => data.groups.push(group),
        }
    }

    pub async fn save_question(&self, question: Question) {
        let mut data = self.data.write().await;
        match data.questions.iter_mut().find(|q| q.id == question.id) {
            Some(existing) => *existing = question,
            None => data.questions.push(question),
        }
    }

    pub async fn save_choice(&self, choice: Choice) {
        let mut data = self.data.write().await;
        match data.choices.iter_mut().find(|c| c.id == choice.id) {
            Some(existing) => *existing = choice,
            None => data.choices.push(choice),
        }
    }

    /// Returns false when the choice does not exist.
    pub async fn add_vote(&self, choice_id: i64, user_id: i64) -> bool {
        let mut data = self.data.write().await;
        match data.choices.iter_mut().find(|c| c.id == choice_id) {
            Some(choice) => {
                if !choice.voters.contains(&user_id) {
                    choice.voters.push(user_id);
                }
                true
            }
            None => false,
        }
    }
}

/// Primary-key query over one poll model.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    store: Arc<PollStore>,
    model: PollModel,
    offset: usize,
    limit: Option<usize>,
}

impl StoreQuery {
    pub fn new(store: Arc<PollStore>, model: PollModel) -> Self {
        Self {
            store,
            model,
            offset: 0,
            limit: None,
        }
    }
}

#[async_trait]
impl PkQuery for StoreQuery {
    async fn fetch_pks(&self) -> Result<Vec<Pk>> {
        let ids = self.store.pks(self.model, self.offset, self.limit).await;
        Ok(ids.into_iter().map(Pk::Int).collect())
    }

    async fn count(&self) -> Result<usize> {
        let total = self.store.count(self.model).await;
        Ok(total
            .saturating_sub(self.offset)
            .min(self.limit.unwrap_or(usize::MAX)))
    }

    fn slice(&self, offset: usize, limit: Option<usize>) -> Arc<dyn PkQuery> {
        let remaining = self.limit.map(|l| l.saturating_sub(offset));
        let limit = match (remaining, limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };
        Arc::new(Self {
            store: Arc::clone(&self.store),
            model: self.model,
            offset: self.offset.saturating_add(offset),
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users(n: i64) -> Arc<PollStore> {
        let users = (1..=n)
            .map(|id| User {
                id,
                username: format!("user{}", id),
                date_joined: chrono::Utc::now(),
            })
            .collect();
        Arc::new(PollStore::new(PollData {
            users,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_every_read_is_one_query() {
        let store = store_with_users(3);
        store.user_with_votes(1).await;
        store.count(PollModel::User).await;
        assert_eq!(store.query_count(), 2);
        store.reset_queries();
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_query_slice_windows() {
        let store = store_with_users(10);
        let query = StoreQuery::new(Arc::clone(&store), PollModel::User);
        let sliced = query.slice(2, Some(5)).slice(1, None);
        let pks = sliced.fetch_pks().await.unwrap();
        assert_eq!(pks, vec![Pk::Int(4), Pk::Int(5), Pk::Int(6), Pk::Int(7)]);
        assert_eq!(sliced.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_delete_user_removes_votes() {
        let store = store_with_users(2);
        store
            .save_choice(Choice {
                id: 1,
                question: 1,
                choice_text: "Yes".to_string(),
                voters: vec![1, 2],
            })
            .await;
        assert!(store.delete_user(1).await);
        let choice = store.choice(1).await.unwrap();
        assert_eq!(choice.voters, vec![2]);
        assert!(!store.delete_user(1).await);
    }
}
