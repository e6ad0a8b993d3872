//! Final HTML assembly from the flat validated article. Layout mirrors the
//! downstream consumer's expectations: header block, TOC, hero image, body
//! sections with anchored headings, mid/bottom images, key takeaways, FAQ,
//! PAA, and the sources footer.

use serde_json::{Map, Value};

use blogsmith_common::slugify;

fn get<'a>(article: &'a Map<String, Value>, key: &str) -> &'a str {
    article.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

pub fn render_article(article: &Map<String, Value>, citations_html: &str) -> String {
    let mut html = String::with_capacity(16 * 1024);

    let headline = get(article, "Headline");
    html.push_str("<article>\n");
    html.push_str(&format!("<h1>{headline}</h1>\n"));

    let subtitle = get(article, "Subtitle");
    if !subtitle.is_empty() {
        html.push_str(&format!("<p class=\"subtitle\">{subtitle}</p>\n"));
    }

    let publication_date = get(article, "publication_date");
    let read_time = article.get("read_time").and_then(|v| v.as_u64()).unwrap_or(0);
    if !publication_date.is_empty() || read_time > 0 {
        html.push_str(&format!(
            "<div class=\"article-meta\"><time datetime=\"{publication_date}\">{publication_date}</time> · {read_time} min read</div>\n"
        ));
    }

    let direct_answer = get(article, "Direct_Answer");
    if !direct_answer.is_empty() {
        html.push_str(&format!(
            "<div class=\"direct-answer\"><p>{direct_answer}</p></div>\n"
        ));
    }

    let image_url = get(article, "image_url");
    if !image_url.is_empty() {
        let alt = get(article, "image_alt_text");
        html.push_str(&format!(
            "<img class=\"hero\" src=\"{image_url}\" alt=\"{alt}\">\n"
        ));
    }

    if let Some(Value::Array(toc)) = article.get("toc_items") {
        if !toc.is_empty() {
            html.push_str("<nav class=\"toc\"><ul>\n");
            for item in toc {
                let title = item.get("title").and_then(|v| v.as_str()).unwrap_or_default();
                let anchor = item.get("anchor").and_then(|v| v.as_str()).unwrap_or_default();
                html.push_str(&format!("<li><a href=\"#{anchor}\">{title}</a></li>\n"));
            }
            html.push_str("</ul></nav>\n");
        }
    }

    let intro = get(article, "Intro");
    if !intro.is_empty() {
        html.push_str(&format!("<div class=\"intro\">{intro}</div>\n"));
    }

    for n in 1..=9 {
        let title = get(article, &format!("section_{n:02}_title"));
        if title.trim().is_empty() {
            break;
        }
        let content = get(article, &format!("section_{n:02}_content"));
        html.push_str(&format!(
            "<section><h2 id=\"{}\">{title}</h2>\n{content}\n</section>\n",
            slugify(title)
        ));

        // Mid-article image after section 3, bottom image after section 7.
        if n == 3 {
            let mid = get(article, "mid_image_url");
            if !mid.is_empty() {
                let alt = get(article, "mid_image_alt_text");
                html.push_str(&format!("<img src=\"{mid}\" alt=\"{alt}\">\n"));
            }
        }
        if n == 7 {
            let bottom = get(article, "bottom_image_url");
            if !bottom.is_empty() {
                let alt = get(article, "bottom_image_alt_text");
                html.push_str(&format!("<img src=\"{bottom}\" alt=\"{alt}\">\n"));
            }
        }
    }

    if let Some(Value::Array(tables)) = article.get("tables") {
        for table in tables {
            let headers = table
                .get("headers")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if headers.is_empty() {
                continue;
            }
            let title = table.get("title").and_then(|v| v.as_str()).unwrap_or_default();
            if !title.is_empty() {
                html.push_str(&format!("<h3>{title}</h3>\n"));
            }
            html.push_str("<table><thead><tr>");
            for header in &headers {
                html.push_str(&format!("<th>{}</th>", header.as_str().unwrap_or_default()));
            }
            html.push_str("</tr></thead><tbody>\n");
            for row in table
                .get("rows")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
            {
                let cells = row.as_array().cloned().unwrap_or_default();
                // Rows must match the header arity; anything else is noise
                // from the generator and is skipped.
                if cells.len() != headers.len() {
                    continue;
                }
                html.push_str("<tr>");
                for cell in &cells {
                    html.push_str(&format!("<td>{}</td>", cell.as_str().unwrap_or_default()));
                }
                html.push_str("</tr>\n");
            }
            html.push_str("</tbody></table>\n");
        }
    }

    let takeaways: Vec<&str> = (1..=3)
        .map(|n| get(article, &format!("key_takeaway_{n:02}")))
        .filter(|t| !t.trim().is_empty())
        .collect();
    if !takeaways.is_empty() {
        html.push_str("<section class=\"key-takeaways\"><h2>Key Takeaways</h2><ul>\n");
        for takeaway in takeaways {
            html.push_str(&format!("<li>{takeaway}</li>\n"));
        }
        html.push_str("</ul></section>\n");
    }

    if let Some(Value::Array(faq)) = article.get("faq_items") {
        if !faq.is_empty() {
            html.push_str("<section class=\"faq\"><h2>Frequently Asked Questions</h2>\n");
            for item in faq {
                let q = item.get("question").and_then(|v| v.as_str()).unwrap_or_default();
                let a = item.get("answer").and_then(|v| v.as_str()).unwrap_or_default();
                html.push_str(&format!("<h3>{q}</h3><p>{a}</p>\n"));
            }
            html.push_str("</section>\n");
        }
    }

    if let Some(Value::Array(paa)) = article.get("paa_items") {
        if !paa.is_empty() {
            html.push_str("<section class=\"paa\"><h2>People Also Ask</h2>\n");
            for item in paa {
                let q = item.get("question").and_then(|v| v.as_str()).unwrap_or_default();
                let a = item.get("answer").and_then(|v| v.as_str()).unwrap_or_default();
                html.push_str(&format!("<h3>{q}</h3><p>{a}</p>\n"));
            }
            html.push_str("</section>\n");
        }
    }

    if !citations_html.is_empty() {
        html.push_str("<section class=\"sources\"><h2>Sources</h2>\n");
        html.push_str(citations_html);
        html.push_str("\n</section>\n");
    }

    html.push_str("</article>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_sections_with_anchored_headings() {
        let mut article = Map::new();
        article.insert("Headline".to_string(), json!("The Guide"));
        article.insert("section_01_title".to_string(), json!("What Is It?"));
        article.insert("section_01_content".to_string(), json!("<p>body</p>"));

        let html = render_article(&article, "");
        assert!(html.contains("<h1>The Guide</h1>"));
        assert!(html.contains("<h2 id=\"what-is-it\">What Is It?</h2>"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn sections_stop_at_first_empty_title() {
        let mut article = Map::new();
        article.insert("Headline".to_string(), json!("H"));
        article.insert("section_01_title".to_string(), json!("One"));
        article.insert("section_01_content".to_string(), json!("<p>1</p>"));
        article.insert("section_03_title".to_string(), json!("Orphan"));
        article.insert("section_03_content".to_string(), json!("<p>3</p>"));

        let html = render_article(&article, "");
        assert!(html.contains("One"));
        assert!(!html.contains("Orphan"));
    }

    #[test]
    fn tables_render_only_well_formed_rows() {
        let mut article = Map::new();
        article.insert("Headline".to_string(), json!("H"));
        article.insert(
            "tables".to_string(),
            json!([{
                "title": "Comparison",
                "headers": ["Feature", "Legacy", "Zero Trust"],
                "rows": [
                    ["Perimeter", "Implicit trust", "Continuous verification"],
                    ["Too", "short"],
                ],
            }]),
        );

        let html = render_article(&article, "");
        assert!(html.contains("<h3>Comparison</h3>"));
        assert_eq!(html.matches("<tr>").count(), 2); // header row + one valid row
        assert!(!html.contains("Too"));
    }

    #[test]
    fn citations_footer_rendered_when_present() {
        let mut article = Map::new();
        article.insert("Headline".to_string(), json!("H"));
        let html = render_article(&article, "<p id=\"source-1\">src</p>");
        assert!(html.contains("class=\"sources\""));
        assert!(html.contains("source-1"));

        let html_empty = render_article(&article, "");
        assert!(!html_empty.contains("class=\"sources\""));
    }
}
