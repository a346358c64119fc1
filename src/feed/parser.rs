use rss::Channel;

/// One `<item>` of an RSS channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Raw `<pubDate>` text, parsed by the caller.
    pub pub_date: Option<String>,
    pub description: Option<String>,
    /// First `<category>` only.
    pub category: Option<String>,
    /// `<content:encoded>` body.
    pub content: Option<String>,
    /// `url` attribute of `<enclosure>`.
    pub enclosure: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Parse an RSS document into its items, in document order.
///
/// # Errors
///
/// Returns an error if the document is not well-formed RSS. A channel without
/// items is not an error.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<FeedItem>, rss::Error> {
    let channel = Channel::read_from(xml)?;

    Ok(channel
        .items()
        .iter()
        .map(|item| FeedItem {
            title: non_empty(item.title()),
            link: non_empty(item.link()),
            pub_date: non_empty(item.pub_date()),
            description: non_empty(item.description()),
            category: item.categories().first().and_then(|c| non_empty(Some(c.name()))),
            content: non_empty(item.content()),
            enclosure: item.enclosure().and_then(|e| non_empty(Some(e.url()))),
        })
        .collect())
}
