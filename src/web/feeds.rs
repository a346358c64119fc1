use chrono::DateTime;

use crate::db::PostWithLikes;

/// Channel metadata for the served feed.
#[derive(Debug, Clone)]
pub struct FeedChannel<'a> {
    pub title: &'a str,
    pub description: &'a str,
    /// Public base URL without trailing slash.
    pub base_url: &'a str,
}

/// Stored RFC 3339 timestamps become RFC 2822 for `<pubDate>`.
fn rss_date(stored: &str) -> String {
    DateTime::parse_from_rfc3339(stored).map_or_else(|_| stored.to_string(), |dt| dt.to_rfc2822())
}

/// Generate RSS 2.0 feed XML for posts in the given order.
pub fn generate_rss(posts: &[PostWithLikes], channel: &FeedChannel<'_>) -> String {
    let base_url = channel.base_url;
    let items: String = posts
        .iter()
        .map(|post| {
            let title = xml_escape(&post.title);
            let link = post.link.as_deref().map_or_else(
                || format!("{base_url}/post/{}", post.normalized_title),
                xml_escape,
            );
            let description = post.description.as_deref().unwrap_or("");
            // Posts without a body carry their summary instead.
            let content = cdata(&post.content.clone().unwrap_or_else(|| {
                format!("<p>{}</p>", xml_escape(description))
            }));
            let description = cdata(description);
            let pub_date = rss_date(&post.pub_date);

            let mut item = format!(
                r#"    <item>
      <title>{title}</title>
      <link>{link}</link>
      <guid isPermaLink="true">{link}</guid>
      <description>{description}</description>
      <content:encoded>{content}</content:encoded>
      <pubDate>{pub_date}</pubDate>"#
            );

            if let Some(category) = post.category.as_deref() {
                for name in category.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    item.push_str(&format!("\n      <category>{}</category>", xml_escape(name)));
                }
            }
            if let Some(enclosure) = post.enclosure.as_deref().or(post.image_url.as_deref()) {
                item.push_str(&format!(
                    "\n      <enclosure url=\"{}\" length=\"0\" type=\"image/jpeg\"/>",
                    xml_escape(enclosure)
                ));
            }
            item.push_str("\n    </item>");
            item
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>{title}</title>
    <link>{base_url}</link>
    <description>{description}</description>
    <language>en-us</language>
    <atom:link href="{base_url}/blog-feed.xml" rel="self" type="application/rss+xml"/>
{items}
  </channel>
</rss>"#,
        title = xml_escape(channel.title),
        description = xml_escape(channel.description),
    )
}

/// Wrap text in a CDATA section, splitting any embedded terminator.
fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

/// Escape XML special characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
