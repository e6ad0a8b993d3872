//! Response payload assembly: flattens a finished execution context into the
//! JSON shape clients receive from `/write` and from job results.

use serde_json::{json, Map, Value};

use blogsmith_engine::ExecutionContext;

fn get<'a>(map: &'a Map<String, Value>, key: &str) -> Value {
    map.get(key).cloned().unwrap_or(Value::Null)
}

/// Build the client-facing result payload from a completed context.
pub fn build_response(ctx: &ExecutionContext, job_id: &str, duration_seconds: f64) -> Value {
    let empty = Map::new();
    let validated = ctx.validated_article.as_ref().unwrap_or(&empty);

    let quality = ctx
        .quality_report
        .as_ref()
        .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);

    let aeo_score = quality
        .get("metrics")
        .and_then(|m| m.get("aeo_score"))
        .cloned()
        .unwrap_or(Value::Null);

    json!({
        "job_id": job_id,
        "success": true,
        "duration_seconds": duration_seconds,
        "headline": get(validated, "Headline"),
        "subtitle": get(validated, "Subtitle"),
        "teaser": get(validated, "Teaser"),
        "direct_answer": get(validated, "Direct_Answer"),
        "intro": get(validated, "Intro"),
        "meta_title": get(validated, "Meta_Title"),
        "meta_description": get(validated, "Meta_Description"),
        "slug": get(validated, "slug"),
        "article_url": get(validated, "article_url"),
        "content": get(validated, "content"),
        "html_content": ctx.final_article.clone().unwrap_or_default(),
        "toc": get(validated, "toc_items"),
        "faq": get(validated, "faq_items"),
        "paa": get(validated, "paa_items"),
        "citations": get(validated, "citations_list"),
        "citations_html": get(validated, "citations_html"),
        "citation_map": get(validated, "citation_map"),
        "internal_links": get(validated, "internal_links"),
        "image_url": get(validated, "image_url"),
        "image_alt_text": get(validated, "image_alt_text"),
        "word_count": get(validated, "word_count"),
        "read_time": get(validated, "read_time"),
        "publication_date": get(validated, "publication_date"),
        "quality_report": quality,
        "aeo_score": aeo_score,
        "similarity_report": get(validated, "similarity_report"),
        "storage_result": ctx
            .storage_result
            .as_ref()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsmith_common::JobConfig;

    #[test]
    fn response_flattens_validated_fields() {
        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        let mut validated = Map::new();
        validated.insert("Headline".to_string(), json!("The Headline"));
        validated.insert("slug".to_string(), json!("the-headline"));
        validated.insert("word_count".to_string(), json!(1500));
        ctx.validated_article = Some(validated);
        ctx.final_article = Some("<article/>".to_string());

        let response = build_response(&ctx, "job-1", 42.0);
        assert_eq!(response["headline"], "The Headline");
        assert_eq!(response["slug"], "the-headline");
        assert_eq!(response["html_content"], "<article/>");
        assert_eq!(response["duration_seconds"], 42.0);
        assert_eq!(response["success"], true);
    }

    #[test]
    fn missing_fields_serialize_as_null() {
        let ctx = ExecutionContext::new("j", JobConfig::default());
        let response = build_response(&ctx, "job-1", 1.0);
        assert!(response["headline"].is_null());
        assert_eq!(response["html_content"], "");
    }
}
