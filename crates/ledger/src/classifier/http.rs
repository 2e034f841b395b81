//! Remote classifier: POSTs the label to a `process-ingredients` service.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Only the response's `status` field decides
//! the verdict; `ingredients` and `alerts` are carried along when present.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Alert, Amount, Classification, ClassifierError, IngredientClassifier, IngredientStatus};

#[derive(Debug, Deserialize)]
struct RemoteVerdict {
    status: String,
    #[serde(default)]
    ingredients: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    alerts: Vec<serde_json::Value>,
}

impl RemoteVerdict {
    fn into_classification(self) -> Result<Classification, ClassifierError> {
        let status = match self.status.as_str() {
            "Permitted" => IngredientStatus::Permitted,
            "Not Permitted" => IngredientStatus::NotPermitted,
            other => {
                return Err(ClassifierError::InvalidResponse {
                    message: format!("unknown status '{other}'"),
                })
            }
        };
        let ingredients = self
            .ingredients
            .into_iter()
            .map(|(name, amount)| {
                let amount = amount.as_str().and_then(|s| s.parse::<Amount>().ok());
                (name, amount)
            })
            .collect();
        let alerts = self
            .alerts
            .into_iter()
            .map(|a| Alert::Remote {
                message: a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()),
            })
            .collect();
        Ok(Classification {
            status,
            ingredients,
            alerts,
        })
    }
}

/// Classifier backed by an HTTP service.
pub struct HttpClassifier {
    url: String,
}

impl HttpClassifier {
    /// `url` is the full endpoint, e.g. `http://127.0.0.1:5000/process-ingredients`.
    pub fn new(url: impl Into<String>) -> Self {
        HttpClassifier { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IngredientClassifier for HttpClassifier {
    async fn classify(&self, label_text: &str) -> Result<Classification, ClassifierError> {
        if label_text.trim().is_empty() {
            return Err(ClassifierError::NoText);
        }

        let url = self.url.clone();
        let body = serde_json::json!({ "label_text": label_text });

        let verdict = tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .send_json(&body)
                .map_err(|e| ClassifierError::Remote {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

            response
                .into_body()
                .read_json::<RemoteVerdict>()
                .map_err(|e| ClassifierError::InvalidResponse {
                    message: format!("failed to parse response as JSON: {}", e),
                })
        })
        .await
        .map_err(|e| ClassifierError::Remote {
            url: self.url.clone(),
            message: format!("task join error: {}", e),
        })??;

        verdict.into_classification()
    }

    fn classifier_id(&self) -> &str {
        "http"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(json: serde_json::Value) -> Result<Classification, ClassifierError> {
        serde_json::from_value::<RemoteVerdict>(json)
            .unwrap()
            .into_classification()
    }

    #[test]
    fn status_only_response() {
        let c = verdict(serde_json::json!({ "status": "Permitted" })).unwrap();
        assert!(c.is_permitted());
        assert!(c.ingredients.is_empty());
    }

    #[test]
    fn full_response_is_carried() {
        let c = verdict(serde_json::json!({
            "status": "Not Permitted",
            "ingredients": { "Caffeine": "200mg", "Water": "" },
            "alerts": ["Caffeine: Exceeded (Amount: 200)"]
        }))
        .unwrap();
        assert!(!c.is_permitted());
        assert_eq!(c.ingredients["Caffeine"].as_ref().unwrap().unit, "mg");
        assert_eq!(c.ingredients["Water"], None);
        assert_eq!(c.alerts.len(), 1);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            verdict(serde_json::json!({ "status": "Maybe" })),
            Err(ClassifierError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn empty_label_short_circuits() {
        let c = HttpClassifier::new("http://127.0.0.1:1/process-ingredients");
        assert!(matches!(c.classify("").await, Err(ClassifierError::NoText)));
    }

    #[tokio::test]
    async fn unreachable_service_is_remote_error() {
        let c = HttpClassifier::new("http://127.0.0.1:1/process-ingredients");
        assert!(matches!(
            c.classify("Water").await,
            Err(ClassifierError::Remote { .. })
        ));
    }
}
