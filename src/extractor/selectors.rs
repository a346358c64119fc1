//! Selector-based field extraction over HTML snapshots of rendered pages.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Extracted, PostDetail, RawPost};

static LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)").expect("valid regex"));

/// CSS selectors for a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    /// One match per post summary; the field selectors run inside it.
    pub item: String,
    pub title: String,
    pub likes: String,
    pub description: String,
    pub image: String,
    pub link: String,
    pub pub_date: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item: ".item-link-wrapper".to_string(),
            title: ".post-title".to_string(),
            likes: ".like-button-with-count__like-count".to_string(),
            description: ".post-description".to_string(),
            image: ".gallery-item-visible".to_string(),
            link: "a".to_string(),
            pub_date: ".post-metadata__date.time-ago".to_string(),
        }
    }
}

/// CSS selectors for a post detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSelectors {
    pub content: String,
    pub category: String,
    pub enclosure: String,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            content: ".post-content__body".to_string(),
            category: ".blog-link-hover-color.blog-text-color.post-categories-list__link"
                .to_string(),
            enclosure: r#"figure[data-hook="imageViewer"] img"#.to_string(),
        }
    }
}

/// Which detail selectors appeared before their timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorWaits {
    pub content: bool,
    pub category: bool,
    pub enclosure: bool,
}

impl SelectorWaits {
    #[must_use]
    pub const fn all_appeared() -> Self {
        Self {
            content: true,
            category: true,
            enclosure: true,
        }
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow::anyhow!("Invalid selector '{selector}': {e:?}"))
}

/// Parse the leading integer of a likes label ("12", "12 likes").
#[must_use]
pub fn parse_likes(text: &str) -> Option<i64> {
    LEADING_INT
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn select_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().and_then(element_text)
}

fn select_url(scope: ElementRef<'_>, selector: &Selector, attr: &str, base: &Url) -> Option<String> {
    scope
        .select(selector)
        .find_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| base.join(v).ok())
        .map(String::from)
}

/// Extract post summaries from a rendered listing page.
///
/// Each field is independently optional; a missing match leaves that field
/// empty without dropping the record.
pub fn parse_listing(html: &str, page_url: &Url, selectors: &ListingSelectors) -> Result<Vec<RawPost>> {
    let item = compile(&selectors.item)?;
    let title = compile(&selectors.title)?;
    let likes = compile(&selectors.likes)?;
    let description = compile(&selectors.description)?;
    let image = compile(&selectors.image)?;
    let link = compile(&selectors.link)?;
    let pub_date = compile(&selectors.pub_date)?;

    let document = Html::parse_document(html);

    let posts = document
        .select(&item)
        .map(|el| RawPost {
            title: select_text(el, &title),
            likes: select_text(el, &likes).as_deref().and_then(parse_likes),
            description: select_text(el, &description),
            image_url: select_url(el, &image, "src", page_url),
            link: select_url(el, &link, "href", page_url),
            pub_date_text: select_text(el, &pub_date),
        })
        .collect();

    Ok(posts)
}

/// Extract body, categories and enclosure from a rendered detail page.
///
/// Fields whose selector did not appear in time are reported as
/// [`Extracted::TimedOut`] regardless of the snapshot contents.
pub fn parse_detail(
    html: &str,
    page_url: &Url,
    selectors: &DetailSelectors,
    waits: SelectorWaits,
) -> Result<PostDetail> {
    let content_sel = compile(&selectors.content)?;
    let category_sel = compile(&selectors.category)?;
    let enclosure_sel = compile(&selectors.enclosure)?;

    let document = Html::parse_document(html);
    let root = document.root_element();

    let content = if waits.content {
        Extracted::from_option(
            document
                .select(&content_sel)
                .next()
                .map(|el| el.inner_html().trim().to_string())
                .filter(|body| !body.is_empty()),
        )
    } else {
        Extracted::TimedOut
    };

    let category = if waits.category {
        let names: Vec<String> = document.select(&category_sel).filter_map(element_text).collect();
        Extracted::from_option((!names.is_empty()).then(|| names.join(", ")))
    } else {
        Extracted::TimedOut
    };

    let enclosure = if waits.enclosure {
        Extracted::from_option(select_url(root, &enclosure_sel, "src", page_url))
    } else {
        Extracted::TimedOut
    };

    Ok(PostDetail {
        content,
        category,
        enclosure,
    })
}

/// Check that every configured selector compiles.
pub fn validate(listing: &ListingSelectors, detail: &DetailSelectors) -> Result<()> {
    for selector in [
        &listing.item,
        &listing.title,
        &listing.likes,
        &listing.description,
        &listing.image,
        &listing.link,
        &listing.pub_date,
        &detail.content,
        &detail.category,
        &detail.enclosure,
    ] {
        compile(selector).with_context(|| format!("Bad scrape selector: {selector}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_HTML: &str = r#"
        <html><body>
          <div class="item-link-wrapper">
            <a href="/post/hello-world">
              <h2 class="post-title"> Hello, World! </h2>
            </a>
            <p class="post-description">A first post</p>
            <img class="gallery-item-visible" src="https://static.example.com/hello.jpg">
            <span class="post-metadata__date time-ago">Mar 29</span>
            <span class="like-button-with-count__like-count">12</span>
          </div>
          <div class="item-link-wrapper">
            <a href="https://blog.example.com/post/bare">
              <h2 class="post-title">Bare Post</h2>
            </a>
          </div>
        </body></html>
    "#;

    const DETAIL_HTML: &str = r#"
        <html><body>
          <div class="post-content__body"> <p>Body <b>text</b></p> </div>
          <ul>
            <li><a class="blog-link-hover-color blog-text-color post-categories-list__link">Travel</a></li>
            <li><a class="blog-link-hover-color blog-text-color post-categories-list__link">Food</a></li>
          </ul>
          <figure data-hook="imageViewer"><img src="/media/cover.png"></figure>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://blog.example.com/blog/page/2").unwrap()
    }

    #[test]
    fn test_parse_listing_fields() {
        let posts = parse_listing(LISTING_HTML, &base(), &ListingSelectors::default()).unwrap();
        assert_eq!(posts.len(), 2);

        let first = &posts[0];
        assert_eq!(first.title.as_deref(), Some("Hello, World!"));
        assert_eq!(first.likes, Some(12));
        assert_eq!(first.description.as_deref(), Some("A first post"));
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://static.example.com/hello.jpg")
        );
        assert_eq!(
            first.link.as_deref(),
            Some("https://blog.example.com/post/hello-world")
        );
        assert_eq!(first.pub_date_text.as_deref(), Some("Mar 29"));
    }

    #[test]
    fn test_parse_listing_missing_fields_are_none() {
        let posts = parse_listing(LISTING_HTML, &base(), &ListingSelectors::default()).unwrap();
        let bare = &posts[1];
        assert_eq!(bare.title.as_deref(), Some("Bare Post"));
        assert_eq!(bare.likes, None);
        assert_eq!(bare.description, None);
        assert_eq!(bare.image_url, None);
        assert_eq!(bare.pub_date_text, None);
    }

    #[test]
    fn test_parse_listing_empty_page() {
        let posts =
            parse_listing("<html><body></body></html>", &base(), &ListingSelectors::default())
                .unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn test_parse_detail_all_fields() {
        let detail = parse_detail(
            DETAIL_HTML,
            &base(),
            &DetailSelectors::default(),
            SelectorWaits::all_appeared(),
        )
        .unwrap();

        assert_eq!(
            detail.content,
            Extracted::Present("<p>Body <b>text</b></p>".to_string())
        );
        assert_eq!(detail.category, Extracted::Present("Travel, Food".to_string()));
        assert_eq!(
            detail.enclosure,
            Extracted::Present("https://blog.example.com/media/cover.png".to_string())
        );
    }

    #[test]
    fn test_parse_detail_timeouts_are_kept_apart_from_missing() {
        let waits = SelectorWaits {
            content: true,
            category: false,
            enclosure: true,
        };
        let html = r#"<div class="post-content__body">x</div>"#;
        let detail = parse_detail(html, &base(), &DetailSelectors::default(), waits).unwrap();

        assert!(detail.content.is_present());
        assert_eq!(detail.category, Extracted::TimedOut);
        assert_eq!(detail.enclosure, Extracted::NotFound);
    }

    #[test]
    fn test_parse_detail_blank_body_is_not_found() {
        let html = r#"<div class="post-content__body">   </div>"#;
        let detail = parse_detail(
            html,
            &base(),
            &DetailSelectors::default(),
            SelectorWaits::all_appeared(),
        )
        .unwrap();
        assert_eq!(detail.content, Extracted::NotFound);
    }

    #[test]
    fn test_parse_likes() {
        assert_eq!(parse_likes("12"), Some(12));
        assert_eq!(parse_likes(" 7 likes"), Some(7));
        assert_eq!(parse_likes("likes"), None);
        assert_eq!(parse_likes(""), None);
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        let selectors = ListingSelectors {
            item: "[[[".to_string(),
            ..ListingSelectors::default()
        };
        assert!(parse_listing("<html></html>", &base(), &selectors).is_err());
        assert!(validate(&selectors, &DetailSelectors::default()).is_err());
    }

    #[test]
    fn test_default_selectors_compile() {
        assert!(validate(&ListingSelectors::default(), &DetailSelectors::default()).is_ok());
    }
}
