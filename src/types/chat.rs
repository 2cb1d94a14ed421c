use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub title: Option<String>,
}
