use async_trait::async_trait;

/// Source of the access token for the current login session.
///
/// An empty string means the session is gone (logged out or forcibly
/// disconnected); engines stop advancing when they see it.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn valid_access_token(&self) -> String;
}

/// A token handed over by the login layer, valid for the whole process.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn valid_access_token(&self) -> String {
        self.0.clone()
    }
}
