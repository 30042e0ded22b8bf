//! Remote flag evaluation against a go-feature-flag relay proxy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::features::{EvaluationContext, FeatureError, FeatureProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RelayProvider {
    client: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvalRequest<'a> {
    user: User<'a>,
    default_value: &'a Value,
}

#[derive(Serialize)]
struct User<'a> {
    key: &'a str,
    anonymous: bool,
    custom: &'a std::collections::BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EvalResponse {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    failed: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl RelayProvider {
    pub fn new(base: Url) -> Result<Self, FeatureError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base })
    }

    fn eval_url(&self, flag: &str) -> Result<Url, FeatureError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| FeatureError::InvalidUrl {
                url: self.base.to_string(),
                reason: "cannot be a base url".to_string(),
            })?;
            segments.pop_if_empty().extend(["v1", "feature", flag, "eval"]);
        }
        Ok(url)
    }
}

#[async_trait]
impl FeatureProvider for RelayProvider {
    fn name(&self) -> &str {
        "go-feature-flag"
    }

    async fn evaluate(
        &self,
        flag: &str,
        default: &Value,
        ctx: &EvaluationContext,
    ) -> Result<Option<Value>, FeatureError> {
        let body = EvalRequest {
            user: User {
                key: &ctx.targeting_key,
                anonymous: ctx.targeting_key.is_empty(),
                custom: &ctx.attributes,
            },
            default_value: default,
        };

        let response: EvalResponse = self
            .client
            .post(self.eval_url(flag)?)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.failed {
            return Err(FeatureError::Evaluation {
                flag: flag.to_string(),
                reason: response.reason.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(response.value)
    }
}
