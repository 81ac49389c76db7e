//! `tactician rule`

use anyhow::{bail, Result};
use serde::Serialize;

use super::{finish, open_engine};
use crate::cli::output::{output, percent, CommandOutput};
use crate::cli::types::RuleCommands;
use crate::domain::models::{Config, ContextValue, DecisionRule, RuleContext};
use crate::services::RuleUpdate;

/// Parse repeated `key=value` arguments into a rule context. Values are
/// typed: `true`/`false`, integers and floats are recognised.
pub fn parse_context(pairs: &[String]) -> Result<RuleContext> {
    let mut context = RuleContext::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid context entry '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid context entry '{pair}': key is empty");
        }
        context.insert(key, ContextValue::parse_literal(value.trim()));
    }
    Ok(context)
}

#[derive(Debug, Serialize)]
pub struct LearnOutput {
    pub rule_id: String,
    pub pruned: bool,
    pub rule: Option<DecisionRule>,
}

impl CommandOutput for LearnOutput {
    fn to_human(&self) -> String {
        match &self.rule {
            Some(rule) => format!(
                "Rule {} -> {}: {} effective over {} attempt(s)",
                self.rule_id,
                rule.decision,
                percent(rule.effectiveness),
                rule.attempts
            ),
            None => format!("Rule {} pruned (ineffective and stale)", self.rule_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BestOutput {
    pub context: RuleContext,
    pub rule: Option<DecisionRule>,
}

impl CommandOutput for BestOutput {
    fn to_human(&self) -> String {
        match &self.rule {
            Some(rule) => format!(
                "Best decision: {} ({} effective over {} attempt(s))",
                rule.decision,
                percent(rule.effectiveness),
                rule.attempts
            ),
            None => "No recommendation for this context.".to_string(),
        }
    }
}

pub async fn execute(config: &Config, command: RuleCommands, json_mode: bool) -> Result<()> {
    match command {
        RuleCommands::Learn {
            decision,
            context,
            outcome,
        } => {
            let context = parse_context(&context)?;
            let engine = open_engine(config).await?;
            let update = engine
                .learn_decision_rule(context, &decision, outcome.is_success())
                .await?;
            finish(&engine).await?;

            let out = match update {
                RuleUpdate::Kept(rule) => LearnOutput {
                    rule_id: rule.rule_id.clone(),
                    pruned: false,
                    rule: Some(rule),
                },
                RuleUpdate::Pruned { rule_id } => LearnOutput {
                    rule_id,
                    pruned: true,
                    rule: None,
                },
            };
            output(&out, json_mode);
        }

        RuleCommands::Best { context } => {
            let context = parse_context(&context)?;
            let engine = open_engine(config).await?;
            let rule = engine.get_best_rule(&context).await;
            output(&BestOutput { context, rule }, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_types_values() {
        let pairs = vec!["pages=12".to_string(), "urgent=true".to_string(), "court=ny".to_string()];
        let context = parse_context(&pairs).unwrap();

        assert_eq!(context.len(), 3);
        assert_eq!(context.get("pages"), Some(&ContextValue::Integer(12)));
        assert_eq!(context.get("urgent"), Some(&ContextValue::Bool(true)));
        assert_eq!(context.get("court"), Some(&ContextValue::Text("ny".to_string())));
    }

    #[test]
    fn test_parse_context_rejects_malformed_pairs() {
        assert!(parse_context(&["novalue".to_string()]).is_err());
        assert!(parse_context(&["=x".to_string()]).is_err());
    }
}
