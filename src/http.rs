use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::ClientError;
use crate::model::GatewayBotResponse;

/// The one REST call the gateway client needs: where to connect.
pub struct Http {
    client: reqwest::Client,
    pub base_url: String,
    token: String,
}

impl Http {
    pub fn new(token: &str, base_url: String) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bot {}", token);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth_value)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url,
            token: token.to_string(),
        })
    }

    pub fn get_token(&self) -> &str {
        &self.token
    }

    pub async fn get_gateway(&self) -> Result<GatewayBotResponse, ClientError> {
        let url = format!("{}/gateway/bot", self.base_url);
        let res = self.client.get(&url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }
}
