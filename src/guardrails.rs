//! Validación a posteriori de respuestas: anclaje en el contexto,
//! especificidad y contenido mínimo. Sin estado ni efectos secundarios.

use std::collections::HashSet;

use crate::models::{GuardrailCheck, GuardrailReport};

pub const CONTEXT_RELEVANCE: &str = "context_relevance";
pub const SPECIFICITY: &str = "specificity";
pub const HAS_CONTENT: &str = "has_content";

const MIN_RELEVANCE: f64 = 0.1;
const MIN_CONTENT_CHARS: usize = 10;

const GENERIC_PHRASES: &[&str] = &[
    "i don't know",
    "i cannot answer",
    "no information",
    "not available",
    "unable to provide",
];

#[derive(Debug, Clone, Copy)]
pub struct Guardrails {
    enabled: bool,
}

impl Guardrails {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ejecuta los tres checks; `all_passed` es el AND de todos. Desactivado,
    /// devuelve `all_passed = true` sin checks ni puntuación.
    pub fn validate(&self, answer: &str, context: &str) -> GuardrailReport {
        if !self.enabled {
            return GuardrailReport { all_passed: true, checks: Vec::new(), relevance_score: None };
        }

        let answer_lower = answer.to_lowercase();
        let relevance_score = relevance(&answer_lower, &context.to_lowercase());

        let checks = vec![
            context_relevance_check(relevance_score, answer.trim().is_empty()),
            specificity_check(&answer_lower),
            has_content_check(answer),
        ];

        GuardrailReport {
            all_passed: checks.iter().all(|c| c.passed),
            checks,
            relevance_score: Some(relevance_score),
        }
    }
}

/// |palabras(respuesta) ∩ palabras(contexto)| / max(|palabras(respuesta)|, 1)
fn relevance(answer: &str, context: &str) -> f64 {
    let answer_words: HashSet<&str> = answer.split_whitespace().collect();
    let context_words: HashSet<&str> = context.split_whitespace().collect();
    let common = answer_words.intersection(&context_words).count();
    common as f64 / answer_words.len().max(1) as f64
}

fn context_relevance_check(score: f64, empty_answer: bool) -> GuardrailCheck {
    let passed = score > MIN_RELEVANCE;
    let message = if empty_answer {
        "Answer is empty; relevance cannot be established"
    } else if passed {
        "Answer references context"
    } else {
        "Answer may not be grounded in context"
    };
    GuardrailCheck {
        name: CONTEXT_RELEVANCE.to_string(),
        passed,
        score: Some(score),
        message: message.to_string(),
    }
}

fn specificity_check(answer_lower: &str) -> GuardrailCheck {
    let generic = GENERIC_PHRASES.iter().any(|p| answer_lower.contains(p));
    GuardrailCheck {
        name: SPECIFICITY.to_string(),
        passed: !generic,
        score: None,
        message: if generic { "Answer is too generic" } else { "Answer is specific" }.to_string(),
    }
}

fn has_content_check(answer: &str) -> GuardrailCheck {
    let passed = answer.trim().chars().count() > MIN_CONTENT_CHARS;
    GuardrailCheck {
        name: HAS_CONTENT.to_string(),
        passed,
        score: None,
        message: if passed { "Answer has content" } else { "Answer is too short" }.to_string(),
    }
}
