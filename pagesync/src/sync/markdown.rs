use std::sync::LazyLock;

use regex::{Captures, Regex};

static IMAGE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("image pattern compiles"));

/// Points every `![alt](url)` at `<assets_rel>/<page_id>-<file name>`.
pub fn rewrite_image_refs(markdown: &str, page_id: &str, assets_rel: &str) -> String {
    IMAGE_REF
        .replace_all(markdown, |caps: &Captures| {
            let alt = &caps[1];
            let name = file_name_from_url(&caps[2]);
            format!("![{alt}]({assets_rel}/{page_id}-{name})")
        })
        .into_owned()
}

/// Local markdown document for a converted page body.
pub fn render_page(title: &str, page_id: &str, body: &str, assets_rel: &str) -> String {
    with_title_heading(title, &rewrite_image_refs(body, page_id, assets_rel))
}

fn with_title_heading(title: &str, body: &str) -> String {
    format!("# {title}\n\n{body}")
}

fn file_name_from_url(url: &str) -> &str {
    let last = url.rsplit('/').next().unwrap_or(url);
    last.split('?').next().unwrap_or(last)
}
