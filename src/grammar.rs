//! Turning captured output into a structured tree with a runtime grammar.
//!
//! The engine is behind [`GrammarEngine`]; [`PestGrammar`] interprets
//! [pest](https://pest.rs) grammar text at run time, so grammars can come
//! from configuration instead of being compiled in.

use crate::error::ExpectError;
use pest::iterators::Pair;
use pest_vm::Vm;
use serde::Serialize;
use serde_json::Value;

/// Parses `text` starting at rule `entry` of `grammar`.
pub trait GrammarEngine {
    fn parse(&self, text: &str, grammar: &str, entry: &str) -> Result<Value, ExpectError>;
}

/// One matched rule in the parse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseNode {
    pub rule: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    fn from_pair(pair: Pair<'_, &str>) -> Self {
        Self {
            rule: pair.as_rule().to_string(),
            text: pair.as_str().to_string(),
            children: pair.into_inner().map(Self::from_pair).collect(),
        }
    }
}

/// [`GrammarEngine`] backed by the pest grammar interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PestGrammar;

impl GrammarEngine for PestGrammar {
    fn parse(&self, text: &str, grammar: &str, entry: &str) -> Result<Value, ExpectError> {
        let (_, rules) = pest_meta::parse_and_optimize(grammar).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ExpectError::Grammar(format!("Invalid grammar:\n{}", messages.join("\n")))
        })?;
        if !rules.iter().any(|rule| rule.name == entry) {
            return Err(ExpectError::Grammar(format!(
                "Entry rule '{entry}' is not defined in the grammar"
            )));
        }

        let vm = Vm::new(rules);
        let pairs = vm
            .parse(entry, text)
            .map_err(|e| ExpectError::Grammar(e.to_string()))?;
        let mut nodes: Vec<ParseNode> = pairs.map(ParseNode::from_pair).collect();

        // A single top-level match is the usual case; return it bare.
        let tree = if nodes.len() == 1 {
            serde_json::to_value(nodes.remove(0))
        } else {
            serde_json::to_value(nodes)
        };
        tree.map_err(|e| ExpectError::Grammar(e.to_string()))
    }
}
