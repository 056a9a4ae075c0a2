use htmd::HtmlToMarkdown;
use pulldown_cmark::{Options, Parser, html};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("html to markdown conversion failed: {0}")]
    Html(#[from] std::io::Error),
}

/// Text conversion between the store's HTML storage format and local markdown.
pub trait Converter {
    fn to_markdown(&self, html: &str) -> Result<String, ConvertError>;

    fn to_html(&self, markdown: &str) -> String;
}

pub struct HtmlMarkdown {
    html_to_markdown: HtmlToMarkdown,
}

impl HtmlMarkdown {
    pub fn new() -> Self {
        Self {
            html_to_markdown: HtmlToMarkdown::builder()
                .skip_tags(vec!["script", "style"])
                .build(),
        }
    }
}

impl Default for HtmlMarkdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for HtmlMarkdown {
    fn to_markdown(&self, html: &str) -> Result<String, ConvertError> {
        Ok(self.html_to_markdown.convert(html)?)
    }

    fn to_html(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        let parser = Parser::new_ext(markdown, options);
        let mut out = String::new();
        html::push_html(&mut out, parser);
        out
    }
}
