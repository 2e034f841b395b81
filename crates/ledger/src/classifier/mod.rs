//! Ingredient classification: label text in, permitted / not permitted out.
//!
//! [`LabelRules`] evaluates a label locally against a banned list and
//! per-ingredient thresholds. `HttpClassifier` (feature `remote`) delegates
//! to an external `process-ingredients` service.

#[cfg(feature = "remote")]
mod http;
mod label;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[cfg(feature = "remote")]
pub use http::HttpClassifier;
pub use label::LabelRules;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s?([A-Za-z%]*)$").expect("invalid amount pattern")
});

/// Errors from a classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The label contained no text to classify.
    #[error("no label text to classify")]
    NoText,

    /// The remote classifier could not be reached or answered with an error.
    #[error("classifier at '{url}' failed: {message}")]
    Remote { url: String, message: String },

    /// The remote classifier answered with a body we cannot interpret.
    #[error("invalid classifier response: {message}")]
    InvalidResponse { message: String },
}

/// A quantity printed next to an ingredient, e.g. `12.5mg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    pub value: Decimal,
    /// Free-form unit as printed (`mg`, `g`, `%`); may be empty.
    pub unit: String,
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = AMOUNT
            .captures(s.trim())
            .ok_or_else(|| format!("'{s}' is not an amount"))?;
        let value = Decimal::from_str(&caps[1]).map_err(|e| format!("'{s}': {e}"))?;
        Ok(Amount {
            value,
            unit: caps[2].to_string(),
        })
    }
}

impl TryFrom<String> for Amount {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Amount> for String {
    fn from(a: Amount) -> String {
        a.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Why a label was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Alert {
    Banned {
        ingredient: String,
    },
    Exceeded {
        ingredient: String,
        amount: Decimal,
        limit: Decimal,
    },
    /// An amount was printed but could not be read.
    Unparseable {
        ingredient: String,
        raw: String,
    },
    /// Reported verbatim by a remote classifier.
    Remote {
        message: String,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::Banned { ingredient } => write!(f, "{ingredient}: Banned"),
            Alert::Exceeded {
                ingredient,
                amount,
                limit,
            } => write!(f, "{ingredient}: Exceeded (Amount: {amount}, limit {limit})"),
            Alert::Unparseable { ingredient, raw } => {
                write!(f, "{ingredient}: unreadable amount '{raw}'")
            }
            Alert::Remote { message } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientStatus {
    Permitted,
    #[serde(rename = "Not Permitted")]
    NotPermitted,
}

impl IngredientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngredientStatus::Permitted => "Permitted",
            IngredientStatus::NotPermitted => "Not Permitted",
        }
    }
}

impl fmt::Display for IngredientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub status: IngredientStatus,
    /// Ingredient name → printed amount, if any.
    pub ingredients: BTreeMap<String, Option<Amount>>,
    pub alerts: Vec<Alert>,
}

impl Classification {
    /// Status follows from the alerts: any alert refuses the label.
    pub fn from_alerts(ingredients: BTreeMap<String, Option<Amount>>, alerts: Vec<Alert>) -> Self {
        let status = if alerts.is_empty() {
            IngredientStatus::Permitted
        } else {
            IngredientStatus::NotPermitted
        };
        Classification {
            status,
            ingredients,
            alerts,
        }
    }

    /// The verdict stored on a new cold drink.
    pub fn is_permitted(&self) -> bool {
        self.status == IngredientStatus::Permitted
    }
}

/// Something that can judge a label's ingredient list.
#[async_trait]
pub trait IngredientClassifier: Send + Sync {
    async fn classify(&self, label_text: &str) -> Result<Classification, ClassifierError>;

    /// Short identifier for logs (`"label_rules"`, `"http"`).
    fn classifier_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parses_value_and_unit() {
        let a: Amount = "12.5mg".parse().unwrap();
        assert_eq!(a.value, Decimal::new(125, 1));
        assert_eq!(a.unit, "mg");
        let b: Amount = "40 %".parse().unwrap();
        assert_eq!(b.unit, "%");
        let c: Amount = "150".parse().unwrap();
        assert_eq!(c.unit, "");
    }

    #[test]
    fn amount_rejects_garbage() {
        assert!("lots".parse::<Amount>().is_err());
        assert!("#4mg".parse::<Amount>().is_err());
    }

    #[test]
    fn status_uses_display_spelling_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&IngredientStatus::NotPermitted).unwrap(),
            "\"Not Permitted\""
        );
        let c = Classification::from_alerts(BTreeMap::new(), vec![]);
        assert!(c.is_permitted());
    }

    #[test]
    fn alert_is_tagged_by_type() {
        let alert = Alert::Banned {
            ingredient: "Aspartame".into(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "Banned");
        assert_eq!(alert.to_string(), "Aspartame: Banned");
    }
}
