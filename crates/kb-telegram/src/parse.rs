//! Channel preview HTML.

use kb_core::{KbError, Post, Result};
use scraper::{ElementRef, Html, Node, Selector};

use crate::PROVIDER_NAME;

/// Posts of one preview page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelPage {
    /// Posts with text, in page order.
    pub posts: Vec<Post>,
    /// Smallest post id on the page, including posts without text.
    pub min_id: Option<u64>,
}

struct Selectors {
    message: Selector,
    text: Selector,
    time: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| KbError::Other(format!("invalid selector {css}: {e}")))
        };
        Ok(Self {
            message: parse("div.tgme_widget_message[data-post]")?,
            text: parse("div.tgme_widget_message_text")?,
            time: parse("time[datetime]")?,
        })
    }
}

/// Post id from a `data-post` attribute (`channel/123`).
#[must_use]
pub fn post_id(data_post: &str) -> Option<u64> {
    let (_, id) = data_post.rsplit_once('/')?;
    id.trim().parse().ok()
}

/// Plain text of a message body; `<br>` becomes a line break.
fn message_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(chunk) => text.push_str(chunk),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text.trim().to_string()
}

/// Parses one preview page.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the document is not a channel preview
/// (no message widgets and no channel header).
pub fn parse_page(html: &str) -> Result<ChannelPage> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);

    let mut page = ChannelPage::default();
    let mut widgets = 0usize;
    for message in document.select(&selectors.message) {
        widgets += 1;
        let Some(id) = message.value().attr("data-post").and_then(post_id) else {
            continue;
        };
        page.min_id = Some(page.min_id.map_or(id, |min| min.min(id)));

        // reply previews carry a second text block
        let Some(body) = message
            .select(&selectors.text)
            .find(|e| !e.value().classes().any(|c| c == "js-message_reply_text"))
        else {
            continue;
        };
        let text = message_text(body);
        if text.is_empty() {
            continue;
        }
        let mut post = Post::new(id, text);
        if let Some(datetime) = message
            .select(&selectors.time)
            .find_map(|t| t.value().attr("datetime"))
        {
            post = post.with_datetime(datetime);
        }
        page.posts.push(post);
    }

    if widgets == 0
        && !html.contains("tgme_channel_info")
        && !html.contains("tgme_widget_message")
    {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: "not a channel preview page".into(),
        });
    }
    Ok(page)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn message(id: u64, datetime: &str, body: &str) -> String {
        format!(
            "<div class=\"tgme_widget_message_wrap\">\
             <div class=\"tgme_widget_message text_not_supported_wrap js-widget_message\" \
             data-post=\"investopit/{id}\">\n\
             <div class=\"tgme_widget_message_bubble\">\
             <div class=\"tgme_widget_message_text js-message_text\" dir=\"auto\">{body}</div>\n\
             <div class=\"tgme_widget_message_footer\">\
             <a class=\"tgme_widget_message_date\" href=\"https://t.me/investopit/{id}\">\
             <time datetime=\"{datetime}\" class=\"time\">12:00</time></a>\
             </div></div></div></div>"
        )
    }

    pub(crate) fn page(messages: &[String]) -> String {
        format!(
            "<html><body><div class=\"tgme_channel_info\"></div>\
             <section class=\"tgme_channel_history\">{}</section></body></html>",
            messages.concat()
        )
    }

    #[test]
    fn test_post_id() {
        assert_eq!(post_id("investopit/3100"), Some(3100));
        assert_eq!(post_id("3100"), None);
        assert_eq!(post_id("investopit/x"), None);
    }

    #[test]
    fn test_parse_page_text_and_dates() {
        let html = page(&[
            message(
                101,
                "2025-03-04T09:15:00+00:00",
                "Сбер &amp; ВТБ: <b>дивиденды</b><br/>вторая строка",
            ),
            message(102, "2025-03-05T10:00:00+00:00", "   "),
            message(103, "2025-03-06T11:00:00+00:00", "&#8381; цель 350"),
        ]);
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed.min_id, Some(101));
        assert_eq!(parsed.posts.len(), 2);

        let first = &parsed.posts[0];
        assert_eq!(first.id, 101);
        assert_eq!(first.text, "Сбер & ВТБ: дивиденды\nвторая строка");
        assert_eq!(first.date.as_deref(), Some("2025-03-04"));
        assert_eq!(first.year, Some(2025));
        assert_eq!(first.datetime.as_deref(), Some("2025-03-04T09:15:00+00:00"));
        assert_eq!(parsed.posts[1].text, "₽ цель 350");
    }

    #[test]
    fn test_reply_preview_is_skipped() {
        let html = page(&[
            "<div class=\"tgme_widget_message\" data-post=\"investopit/7\">\
             <a class=\"tgme_widget_message_reply\">\
             <div class=\"tgme_widget_message_text js-message_reply_text\">старый пост</div></a>\
             <div class=\"tgme_widget_message_text js-message_text\">ответ</div></div>"
                .to_string(),
        ]);
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed.posts[0].text, "ответ");
        assert_eq!(parsed.posts[0].date, None);
    }

    #[test]
    fn test_empty_preview_and_garbage() {
        let parsed = parse_page(&page(&[])).unwrap();
        assert!(parsed.posts.is_empty());
        assert_eq!(parsed.min_id, None);
        assert!(parse_page("<html><body>Access denied</body></html>").is_err());
    }
}
