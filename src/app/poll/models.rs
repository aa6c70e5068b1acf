//! Sample poll models: questions, choices and the users who vote on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub users: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question: i64,
    pub choice_text: String,
    #[serde(default)]
    pub voters: Vec<i64>,
}

/// A user loaded together with the primary keys of the choices they voted
/// for, so serializing does not need a second query.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user: User,
    pub votes: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollModel {
    User,
    Group,
    Question,
    Choice,
}

impl PollModel {
    pub const ALL: [PollModel; 4] = [
        PollModel::User,
        PollModel::Group,
        PollModel::Question,
        PollModel::Choice,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PollModel::User => "User",
            PollModel::Group => "Group",
            PollModel::Question => "Question",
            PollModel::Choice => "Choice",
        }
    }
}
