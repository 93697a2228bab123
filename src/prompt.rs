//! Extraction prompt.

use crate::models::RawArticle;

pub const DATE_NOT_PROVIDED: &str = "Not provided";

const RULES: &str = "\
You are a structured data extraction engine for a Bengali news aggregator.

RULES:
- Never invent or infer information not explicitly present in the article.
- All text output must be in English. Translate or transliterate from Bengali.
- For casualties, monetary figures, and statements: only extract what is
  explicitly written. Do not estimate or assume.
- Array fields default to an empty array, never null.
- For government_action: return null if the article is not primarily about
  a government decision, policy, or regulatory action.
- For statements: skip any statement where the speaker is not named.
- sentiment reflects the factual tone of the content, not moral judgment.
  A corruption arrest is neutral. A flood with deaths is negative.
- tags must match the category you select. Do not mix tag structures.
  Use null tags for international articles.
- For publish_date: convert Bengali numerals if needed (১=1, ২=2, ৩=3,
  ৪=4, ৫=5, ৬=6, ৭=7, ৮=8, ৯=9, ০=0). Return YYYY-MM-DD format.";

/// Interpolate an article into the fixed instruction template.
pub fn build_prompt(article: &RawArticle) -> String {
    let published = article
        .published_at
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DATE_NOT_PROVIDED);
    let content = article.content.as_deref().unwrap_or_default();
    format!(
        "{RULES}\n\n---\n\nARTICLE:\n\nTITLE: {}\nPUBLISH DATE: {published}\nCONTENT:\n{}",
        article.title.trim(),
        content.trim()
    )
}
