//! Prompt Composer: builds the system and user prompts the
//! generation dispatcher sends to a provider.

use crate::model::{Language, RetrievalResult};
use std::fmt::Write as _;

/// The two prompt strings a generation call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBundle {
    /// Assembled system prompt.
    pub system_prompt: String,
    /// Assembled user prompt, including the numbered context block.
    pub user_prompt: String,
}

const SYSTEM_PROMPT_EN: &str = "Every factual sentence in your answer must end with a citation marker \
like [1] or [2], referring to the numbered context entry it is drawn from. \
Never state a fact without one.\n\n\
You are a neutral product-comparison advisor for wearable-device documentation. \
You are not affiliated with any manufacturer; do not favor one product over another \
beyond what the provided context supports. Your audience is a prospective buyer \
deciding between products, not a technician.\n\n\
Answer in English only.\n\n\
Match your answer's length to the question: 1-3 sentences for a single factual \
question, 4-6 sentences when comparing products, and a numbered step-by-step list \
for a procedural \"how do I...\" question.";

const SYSTEM_PROMPT_DE: &str = "Jeder Tatsachensatz in deiner Antwort muss mit einer Quellenangabe \
wie [1] oder [2] enden, die sich auf den entsprechenden nummerierten Kontextabschnitt bezieht. \
Nenne niemals eine Tatsache ohne Quellenangabe.\n\n\
Du bist ein neutraler Berater für den Vergleich von Wearable-Produkten. Du bist mit keinem \
Hersteller verbunden und bevorzugst kein Produkt über ein anderes, soweit es der gegebene \
Kontext nicht stützt. Dein Publikum ist ein potenzieller Käufer, der sich zwischen Produkten \
entscheidet, nicht ein Techniker.\n\n\
Antworte ausschließlich auf Deutsch.\n\n\
Passe die Länge deiner Antwort an die Frage an: 1-3 Sätze für eine einzelne Sachfrage, \
4-6 Sätze bei einem Produktvergleich, und eine nummerierte Schritt-für-Schritt-Liste bei einer \
Vorgehensfrage (\"wie mache ich...\").";

const MULTI_PRODUCT_COVERAGE_EN: &str = " When the question concerns more than one product, cover every mentioned product for which the context has information.";
const MULTI_PRODUCT_COVERAGE_DE: &str = " Wenn sich die Frage auf mehrere Produkte bezieht, behandle jedes genannte Produkt, zu dem der Kontext Informationen enthält.";

const CITATION_REMINDER_EN: &str = "Remember: every factual sentence needs a [n] citation referring to the context entry above, e.g. \"The battery lasts 18 hours [1].\"";
const CITATION_REMINDER_DE: &str = "Denk daran: Jeder Tatsachensatz braucht eine [n]-Quellenangabe, die sich auf den obigen Kontextabschnitt bezieht, z. B. \"Der Akku hält 18 Stunden [1].\"";

/// Builds the numbered context block, one entry per retrieved chunk in
/// selection order, 1-indexed.
#[must_use]
pub fn build_context_block(chunks: &[RetrievalResult]) -> String {
    let mut block = String::new();
    for (idx, result) in chunks.iter().enumerate() {
        let n = idx + 1;
        let _ = writeln!(block, "[{n}] {}, {}, page {}", result.chunk.product_name, result.chunk.doc_type, result.chunk.page_num);
        let _ = writeln!(block, "{}", result.chunk.text);
        if idx + 1 != chunks.len() {
            block.push('\n');
        }
    }
    block
}

/// Composes the system and user prompts for one generation call.
#[must_use]
pub fn compose(question: &str, chunks: &[RetrievalResult], language: Language, target_product_count: usize) -> PromptBundle {
    let mut system_prompt = match language {
        Language::En => SYSTEM_PROMPT_EN.to_string(),
        Language::De => SYSTEM_PROMPT_DE.to_string(),
    };
    if target_product_count >= 2 {
        system_prompt.push_str(match language {
            Language::En => MULTI_PRODUCT_COVERAGE_EN,
            Language::De => MULTI_PRODUCT_COVERAGE_DE,
        });
    }

    let context_block = build_context_block(chunks);
    let citation_reminder = match language {
        Language::En => CITATION_REMINDER_EN,
        Language::De => CITATION_REMINDER_DE,
    };

    let mut user_prompt = String::new();
    let _ = writeln!(user_prompt, "Context:\n{context_block}");
    let _ = writeln!(user_prompt, "Question: {question}");
    let _ = writeln!(user_prompt, "\n{citation_reminder}");

    PromptBundle { system_prompt, user_prompt }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, DocType};

    fn result(chunk_id: &str, product: &str, text: &str) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                chunk_id: chunk_id.to_string(),
                product_name: product.to_string(),
                doc_type: DocType::Specifications,
                page_num: 9,
                source_file: "specifications.pdf".to_string(),
                source_url: None,
                source_name: None,
                chunk_index: 0,
                text: text.to_string(),
            },
            fused_score: 0.1,
        }
    }

    #[test]
    fn context_block_numbers_entries_from_one() {
        let chunks = vec![result("a", "Apple Watch Series 11", "battery"), result("b", "Garmin Forerunner 970", "gps")];
        let block = build_context_block(&chunks);
        assert!(block.starts_with("[1] Apple Watch Series 11"));
        assert!(block.contains("[2] Garmin Forerunner 970"));
    }

    #[test]
    fn german_prompt_uses_german_templates() {
        let bundle = compose("Wie lange hält der Akku?", &[], Language::De, 1);
        assert!(bundle.system_prompt.contains("ausschließlich auf Deutsch"));
        assert!(bundle.user_prompt.contains("Denk daran"));
    }

    #[test]
    fn multi_product_question_adds_coverage_clause() {
        let bundle = compose("Compare them", &[], Language::En, 2);
        assert!(bundle.system_prompt.contains("cover every mentioned product"));
    }

    #[test]
    fn single_product_question_omits_coverage_clause() {
        let bundle = compose("What is the battery life?", &[], Language::En, 1);
        assert!(!bundle.system_prompt.contains("cover every mentioned product"));
    }
}
