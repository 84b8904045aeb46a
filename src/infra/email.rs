use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::domain::ports::{EmailRequest, EmailSink, SinkError};

/// Hands email delivery to the brief-approval email function over HTTP.
#[derive(Clone)]
pub struct FunctionEmailSink {
    client: reqwest::Client,
    endpoint: Option<Url>,
    service_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailFunctionBody<'a> {
    brief_id: Option<Uuid>,
    brief_title: &'a str,
    user_id: Uuid,
    notification_type: &'a str,
    is_user_notification: bool,
}

impl FunctionEmailSink {
    pub fn new(
        endpoint: Option<Url>,
        service_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            service_key,
        })
    }
}

#[async_trait]
impl EmailSink for FunctionEmailSink {
    async fn send(&self, request: &EmailRequest) -> Result<(), SinkError> {
        let endpoint = self.endpoint.clone().ok_or(SinkError::NotConfigured)?;
        let body = EmailFunctionBody {
            brief_id: request.brief_id,
            brief_title: &request.brief_title,
            user_id: request.user_id,
            notification_type: request.notification_type.as_str(),
            is_user_notification: true,
        };

        let mut builder = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.service_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| SinkError::Transport {
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                reason: format!("status={}, body={}", status, body),
            });
        }

        tracing::debug!(user_id = %request.user_id, "email function accepted notification");
        Ok(())
    }
}
