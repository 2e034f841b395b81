//! Script runner for `coldchain run`.
//!
//! A script is a JSON array of steps replayed in order against a fresh
//! in-memory chain owned by the configured owner:
//!
//! ```json
//! [
//!   {"as": "0xowner", "op": "addParticipant", "identity": "0xR", "role": 1},
//!   {"as": "0xowner", "op": "addColdDrink", "name": "Cola", "description": "fizzy", "ingredients_permitted": true},
//!   {"as": "0xM", "op": "manufactureColdDrink", "id": 1, "expect": "invalid_stage"}
//! ]
//! ```
//!
//! `as` defaults to the owner. `expect` is `"ok"` or an error kind code;
//! a step without `expect` is reported but never counts as a mismatch.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use coldchain_core::{ChainError, ColdDrinkDraft, Identity, Role, Stage, Transition};
use coldchain_ledger::{IngredientClassifier, SupplyChain, SupplyChainError};
use coldchain_storage::MemoryStorage;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::OutputFormat;

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(rename = "as", default)]
    caller: Option<String>,
    op: String,
    #[serde(default)]
    expect: Option<String>,
    #[serde(flatten)]
    args: Map<String, Value>,
}

pub struct RunResult {
    /// Steps whose outcome differed from `expect`.
    pub failed: usize,
}

/// Outcome of one step: `"ok"` or the error's kind code.
fn outcome_code(outcome: &Result<Value, SupplyChainError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

fn bad_arg(op: &str, message: impl std::fmt::Display) -> SupplyChainError {
    ChainError::invalid_argument(format!("{op}: {message}")).into()
}

fn arg<'a>(step: &'a Step, key: &str) -> Result<&'a Value, SupplyChainError> {
    step.args
        .get(key)
        .ok_or_else(|| bad_arg(&step.op, format!("missing '{key}'")))
}

fn str_arg<'a>(step: &'a Step, key: &str) -> Result<&'a str, SupplyChainError> {
    arg(step, key)?
        .as_str()
        .ok_or_else(|| bad_arg(&step.op, format!("'{key}' must be a string")))
}

fn id_arg(step: &Step) -> Result<u64, SupplyChainError> {
    arg(step, "id")?
        .as_u64()
        .ok_or_else(|| bad_arg(&step.op, "'id' must be a non-negative integer"))
}

fn identity_arg(step: &Step, key: &str) -> Result<Identity, SupplyChainError> {
    Ok(Identity::new(str_arg(step, key)?)?)
}

/// Roles may be given by code (`1`) or by name (`"Manufacturer"`).
fn role_arg(step: &Step) -> Result<Role, SupplyChainError> {
    match arg(step, "role")? {
        Value::Number(n) => {
            let code = n
                .as_u64()
                .and_then(|c| u8::try_from(c).ok())
                .ok_or_else(|| bad_arg(&step.op, format!("role code {n} is not in 1..=4")))?;
            Ok(Role::from_code(code)?)
        }
        Value::String(s) => Ok(Role::from_str(s)?),
        other => Err(bad_arg(&step.op, format!("unsupported role value {other}"))),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "serialization_error": e.to_string() }))
}

async fn execute(
    chain: &SupplyChain<MemoryStorage>,
    classifier: &dyn IngredientClassifier,
    caller: &Identity,
    step: &Step,
) -> Result<Value, SupplyChainError> {
    if let Some(transition) = Transition::from_wire(&step.op) {
        let item = chain.advance(caller, id_arg(step)?, transition).await?;
        return Ok(to_value(&item));
    }
    match step.op.as_str() {
        "addParticipant" => {
            let record = chain
                .add_participant(caller, &identity_arg(step, "identity")?, role_arg(step)?)
                .await?;
            Ok(to_value(&record))
        }
        "checkRole" => {
            let identity = identity_arg(step, "identity")?;
            let role = chain.check_role_name(&identity).await?;
            Ok(json!({ "identity": identity, "role": role }))
        }
        "addColdDrink" => {
            let permitted = arg(step, "ingredients_permitted")?
                .as_bool()
                .ok_or_else(|| bad_arg(&step.op, "'ingredients_permitted' must be a boolean"))?;
            let draft = ColdDrinkDraft::new(
                str_arg(step, "name")?,
                str_arg(step, "description")?,
                permitted,
            );
            let id = chain.add_cold_drink(caller, draft).await?;
            Ok(json!({ "id": id }))
        }
        "admitColdDrink" => {
            let admission = chain
                .admit_cold_drink(
                    caller,
                    str_arg(step, "name")?,
                    str_arg(step, "description")?,
                    str_arg(step, "label_text")?,
                    classifier,
                )
                .await?;
            Ok(to_value(&admission))
        }
        "getColdDrink" => Ok(to_value(&chain.get_item(id_arg(step)?).await?)),
        "listColdDrinks" => {
            let stage = match step.args.get("stage").and_then(Value::as_str) {
                Some(s) => Some(Stage::from_str(s)?),
                None => None,
            };
            Ok(to_value(&chain.list_items(stage).await?))
        }
        "history" => Ok(to_value(&chain.history(id_arg(step)?).await?)),
        "verifyHistory" => Ok(to_value(&chain.verify_history(id_arg(step)?).await?)),
        "actions" => {
            let identity = match step.args.get("identity") {
                Some(_) => identity_arg(step, "identity")?,
                None => caller.clone(),
            };
            Ok(to_value(&chain.action_space(&identity).await?))
        }
        other => Err(bad_arg(other, "unknown operation")),
    }
}

/// Load and replay a script, printing one line (or JSON object) per step.
pub async fn run_script(
    path: &Path,
    chain: SupplyChain<MemoryStorage>,
    classifier: &dyn IngredientClassifier,
    output: OutputFormat,
    quiet: bool,
) -> Result<RunResult, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading script '{}': {}", path.display(), e))?;
    let steps: Vec<Step> = serde_json::from_str(&text)
        .map_err(|e| format!("error parsing script '{}': {}", path.display(), e))?;

    let owner = chain.owner().clone();
    let mut failed = 0;
    let mut reports = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        let caller = match &step.caller {
            Some(raw) => Identity::new(raw.as_str()).map_err(SupplyChainError::from),
            None => Ok(owner.clone()),
        };
        let outcome = match &caller {
            Ok(caller) => execute(&chain, classifier, caller, step).await,
            Err(_) => Err(bad_arg(&step.op, "'as' must not be blank")),
        };
        let code = outcome_code(&outcome);
        let matched = step.expect.as_deref().map_or(true, |want| want == code);
        if !matched {
            failed += 1;
        }
        let caller_name = caller.map(|c| c.to_string()).unwrap_or_default();

        match output {
            OutputFormat::Text => {
                if quiet && matched {
                    continue;
                }
                let status = if matched { "ok" } else { "not ok" };
                let detail = match (&outcome, step.expect.as_deref()) {
                    (_, Some(want)) if !matched => format!("expected {want}, got {code}"),
                    (Ok(value), _) => value.to_string(),
                    (Err(e), _) => format!("{code}: {e}"),
                };
                println!("{status} {number} - {} as {caller_name}: {detail}", step.op);
            }
            OutputFormat::Json => {
                let mut report = json!({
                    "step": number,
                    "op": step.op,
                    "as": caller_name,
                    "outcome": code,
                    "matched": matched,
                });
                match &outcome {
                    Ok(value) => report["result"] = value.clone(),
                    Err(e) => report["error"] = Value::String(e.to_string()),
                }
                if let Some(want) = &step.expect {
                    report["expect"] = Value::String(want.clone());
                }
                reports.push(report);
            }
        }
    }

    match output {
        OutputFormat::Text => {
            if !quiet {
                println!("# {} steps, {} mismatched", steps.len(), failed);
            }
        }
        OutputFormat::Json => {
            let summary = json!({
                "steps": reports,
                "total": steps.len(),
                "failed": failed,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
        }
    }

    Ok(RunResult { failed })
}

/// Fresh chain for a script run.
pub fn fresh_chain(
    owner: Identity,
    policy: coldchain_core::ChainPolicy,
) -> SupplyChain<MemoryStorage> {
    SupplyChain::new(Arc::new(MemoryStorage::new()), owner, policy)
}
