use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Alert, Amount, Classification, ClassifierError, IngredientClassifier};

/// `Name` or `Name (amount)`.
static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z\s]*?)\s*(?:\(\s*([^()]*?)\s*\))?$")
        .expect("invalid ingredient pattern")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*ingredients?\s*:").expect("invalid heading pattern"));

fn default_banned() -> Vec<String> {
    vec!["Aspartame".to_string(), "Red Dye".to_string()]
}

fn default_thresholds() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        ("Polydextrose".to_string(), Decimal::from(150)),
        ("Caffeine".to_string(), Decimal::from(30)),
        ("SodiumBenzoate".to_string(), Decimal::from(100)),
    ])
}

/// Ingredient names compare case- and whitespace-insensitively, so
/// `Sodium Benzoate` meets the `SodiumBenzoate` threshold.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Local label classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRules {
    #[serde(default = "default_banned")]
    pub banned: Vec<String>,
    /// Ingredient → maximum permitted amount, unit-agnostic.
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Decimal>,
}

impl Default for LabelRules {
    fn default() -> Self {
        LabelRules {
            banned: default_banned(),
            thresholds: default_thresholds(),
        }
    }
}

impl LabelRules {
    pub fn new(banned: Vec<String>, thresholds: BTreeMap<String, Decimal>) -> Self {
        LabelRules { banned, thresholds }
    }

    fn is_banned(&self, name: &str) -> bool {
        let key = normalize(name);
        self.banned.iter().any(|b| normalize(b) == key)
    }

    fn limit_for(&self, name: &str) -> Option<Decimal> {
        let key = normalize(name);
        self.thresholds
            .iter()
            .find(|(n, _)| normalize(n) == key)
            .map(|(_, limit)| *limit)
    }

    /// Classify a label synchronously.
    ///
    /// Entries are separated by commas, semicolons or newlines; an optional
    /// leading `Ingredients:` heading is ignored. Fragments that are not an
    /// ingredient name are skipped.
    pub fn evaluate(&self, label_text: &str) -> Result<Classification, ClassifierError> {
        if label_text.trim().is_empty() {
            return Err(ClassifierError::NoText);
        }
        let body = HEADING.replace(label_text, "");

        let mut order: Vec<String> = Vec::new();
        let mut ingredients: BTreeMap<String, Option<Amount>> = BTreeMap::new();
        let mut alerts = Vec::new();

        for fragment in body.split([',', ';', '\n']) {
            let fragment = fragment.trim().trim_end_matches('.').trim();
            let Some(caps) = ENTRY.captures(fragment) else {
                continue;
            };
            let name = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
            let amount = match caps.get(2).map(|m| m.as_str()).filter(|raw| !raw.is_empty()) {
                None => None,
                Some(raw) => match raw.parse::<Amount>() {
                    Ok(amount) => Some(amount),
                    Err(_) => {
                        alerts.push(Alert::Unparseable {
                            ingredient: name.clone(),
                            raw: raw.to_string(),
                        });
                        None
                    }
                },
            };
            match ingredients.get_mut(&name) {
                Some(existing) => {
                    if existing.is_none() {
                        *existing = amount;
                    }
                }
                None => {
                    order.push(name.clone());
                    ingredients.insert(name, amount);
                }
            }
        }

        for name in &order {
            if self.is_banned(name) {
                alerts.push(Alert::Banned {
                    ingredient: name.clone(),
                });
            }
            let printed = ingredients.get(name).and_then(|a| a.as_ref());
            if let (Some(amount), Some(limit)) = (printed, self.limit_for(name)) {
                if amount.value > limit {
                    alerts.push(Alert::Exceeded {
                        ingredient: name.clone(),
                        amount: amount.value,
                        limit,
                    });
                }
            }
        }

        Ok(Classification::from_alerts(ingredients, alerts))
    }
}

#[async_trait]
impl IngredientClassifier for LabelRules {
    async fn classify(&self, label_text: &str) -> Result<Classification, ClassifierError> {
        self.evaluate(label_text)
    }

    fn classifier_id(&self) -> &str {
        "label_rules"
    }
}
