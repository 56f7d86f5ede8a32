//! Prompt text transforms applied before dispatch.

use crate::core::types::{FewShotExample, GenerationRequest};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*\}\}").expect("placeholder pattern is valid")
});

const CHAIN_OF_THOUGHT_PREFIX: &str = "Let's think step by step. Break the problem down, \
reason through each part carefully, and then give the final answer.\n\n";

/// Replaces `{{ name }}` placeholders. Unknown names are left untouched so
/// a half-filled template stays recognizable.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Distinct placeholder names, in order of first appearance.
pub fn template_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn chain_of_thought(prompt: &str) -> String {
    format!("{}{}", CHAIN_OF_THOUGHT_PREFIX, prompt)
}

pub fn few_shot(examples: &[FewShotExample], prompt: &str) -> String {
    let mut text = String::new();
    for example in examples {
        text.push_str("Input: ");
        text.push_str(&example.input);
        text.push_str("\nOutput: ");
        text.push_str(&example.output);
        text.push_str("\n\n");
    }
    text.push_str(prompt);
    text
}

/// Final prompt text for `request`: few-shot blocks first, then the
/// chain-of-thought prefix on top of them.
pub fn compose(request: &GenerationRequest) -> String {
    let mut prompt = if request.examples.is_empty() {
        request.prompt.clone()
    } else {
        few_shot(&request.examples, &request.prompt)
    };
    if request.chain_of_thought {
        prompt = chain_of_thought(&prompt);
    }
    prompt
}
