//! Link-preview pages for social crawlers.
//!
//! Crawlers do not run the blog's JavaScript, so `/post/:title` serves them a
//! small page carrying Open Graph and Twitter card tags. Everyone else is
//! redirected to the post on the public site.

use maud::{html, Markup, DOCTYPE};

use crate::db::Post;

/// Lowercase user-agent fragments of link-preview and search crawlers.
const CRAWLER_AGENTS: &[&str] = &[
    "facebookexternalhit",
    "twitterbot",
    "whatsapp",
    "slackbot",
    "linkedinbot",
    "discordbot",
    "telegrambot",
    "skypeuripreview",
    "applebot",
    "googlebot",
    "bingbot",
    "yandexbot",
    "slack",
    "teams",
    "discord",
];

#[must_use]
pub fn is_crawler(user_agent: &str) -> bool {
    let agent = user_agent.to_lowercase();
    CRAWLER_AGENTS.iter().any(|pattern| agent.contains(pattern))
}

/// Site identity shown on preview pages.
#[derive(Debug, Clone, Copy)]
pub struct ShareSite<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub base_url: &'a str,
}

impl ShareSite<'_> {
    #[must_use]
    pub fn post_url(&self, slug: &str) -> String {
        format!("{}/post/{slug}", self.base_url.trim_end_matches('/'))
    }

    fn fallback_image(&self) -> String {
        format!("{}/logo192.png", self.base_url.trim_end_matches('/'))
    }
}

/// Preview page for one post.
#[must_use]
pub fn render_post_preview(post: &Post, site: &ShareSite<'_>) -> Markup {
    let url = site.post_url(&post.normalized_title);
    let description = post.description.as_deref().unwrap_or(site.description);
    let image = post
        .enclosure
        .clone()
        .or_else(|| post.image_url.clone())
        .unwrap_or_else(|| site.fallback_image());
    let published = post.pub_date.get(..10).unwrap_or(&post.pub_date);

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="description" content=(description);

                meta property="og:type" content="article";
                meta property="og:url" content=(url);
                meta property="og:title" content=(post.title);
                meta property="og:description" content=(description);
                meta property="og:image" content=(image);
                meta property="og:site_name" content=(site.title);

                meta name="twitter:card" content="summary_large_image";
                meta name="twitter:url" content=(url);
                meta name="twitter:title" content=(post.title);
                meta name="twitter:description" content=(description);
                meta name="twitter:image" content=(image);

                meta property="article:published_time" content=(post.pub_date);
                meta property="article:section" content=(post.category.as_deref().unwrap_or("Blog"));

                title { (post.title) " - " (site.title) }
            }
            body {
                main style="font-family: Arial, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px;" {
                    h1 { (post.title) }
                    @if let Some(description) = &post.description {
                        p { (description) }
                    }
                    p { "Published: " (published) }
                    @if let Some(enclosure) = &post.enclosure {
                        img src=(enclosure) alt=(post.title) style="max-width: 100%; height: auto;";
                    }
                    p { a href=(url) { "Continue reading..." } }
                }
            }
        }
    }
}

#[must_use]
pub fn render_not_found(site: &ShareSite<'_>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="description" content="The requested post was not found.";
                title { "Post Not Found - " (site.title) }
            }
            body {
                h1 { "Post Not Found" }
                p { "The requested post could not be found." }
                p { a href=(site.base_url) { "Go back to blog" } }
            }
        }
    }
}
