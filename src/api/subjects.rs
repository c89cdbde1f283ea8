use serde::Deserialize;
use std::fmt;

use crate::api::client::ApiClient;
use crate::api::error::Result;

const ELDERLY_PATH: &str = "api/users/elderly";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
}

/// A monitored person, as listed by the user service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subject {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user: UserRef,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user.fullname, self.user.email)
    }
}

/// Fetch the selectable subjects.
pub fn list_subjects(client: &ApiClient) -> Result<Vec<Subject>> {
    let subjects: Vec<Subject> = client.get_json("load subjects", &client.users_url(ELDERLY_PATH))?;
    tracing::info!("loaded {} subject(s)", subjects.len());
    Ok(subjects)
}

/// Find a subject by id in a previously loaded list.
pub fn find_subject<'a>(subjects: &'a [Subject], id: &str) -> Option<&'a Subject> {
    subjects.iter().find(|s| s.id == id)
}
