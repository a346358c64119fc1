//! Email bodies rendered with maud.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::db::{Post, Subscriber};

/// Inline styles applied to every message. Mail clients ignore linked CSS.
const EMAIL_STYLE: &str = "\
body{font-family:Georgia,serif;color:#222;max-width:600px;margin:0 auto;padding:16px;}\
h1,h2,h3{font-family:Helvetica,Arial,sans-serif;}\
img{width:100%;max-width:480px;height:auto;display:block;margin:24px auto;border-radius:6px;}\
.post{border-bottom:1px solid #eee;padding-bottom:24px;margin-bottom:24px;}\
.footer{color:#888;font-size:12px;margin-top:32px;}";

/// A rendered message: subject plus HTML and plain text alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Link building for rendered emails.
#[derive(Debug, Clone)]
pub struct EmailLinks {
    public_base_url: String,
    blog_title: String,
}

impl EmailLinks {
    #[must_use]
    pub fn new(public_base_url: &str, blog_title: &str) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            blog_title: blog_title.to_string(),
        }
    }

    /// Page where a subscriber can change preferences or unsubscribe.
    #[must_use]
    pub fn manage_subscription(&self, email: &str) -> String {
        format!(
            "{}/manage-subscription/{}",
            self.public_base_url,
            urlencoding::encode(email)
        )
    }

    /// Public URL of a stored post.
    #[must_use]
    pub fn post(&self, post: &Post) -> String {
        format!("{}/post/{}", self.public_base_url, post.normalized_title)
    }
}

fn layout(links: &EmailLinks, subscriber: &Subscriber, body: Markup) -> String {
    let manage = links.manage_subscription(&subscriber.email);
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                style { (PreEscaped(EMAIL_STYLE)) }
            }
            body {
                (body)
                p class="footer" {
                    "You are receiving this because you subscribed to " (links.blog_title) ". "
                    a href=(manage) { "Manage your subscription or unsubscribe" }
                    "."
                }
            }
        }
    }
    .into_string()
}

fn post_block(links: &EmailLinks, post: &Post, full_content: bool) -> Markup {
    html! {
        div class="post" {
            h2 { a href=(links.post(post)) { (post.title) } }
            @if let Some(image) = post.enclosure.as_ref().or(post.image_url.as_ref()) {
                img src=(image) alt=(post.title);
            }
            @if full_content {
                @if let Some(ref content) = post.content {
                    div { (PreEscaped(content)) }
                }
            } @else if let Some(ref description) = post.description {
                p { (description) }
            }
            p { a href=(links.post(post)) { "Read on the blog" } }
        }
    }
}

fn footer_text(links: &EmailLinks, subscriber: &Subscriber) -> String {
    format!(
        "\n--\nManage your subscription or unsubscribe: {}\n",
        links.manage_subscription(&subscriber.email)
    )
}

/// Greeting sent once to a brand-new subscriber.
#[must_use]
pub fn welcome(links: &EmailLinks, subscriber: &Subscriber) -> RenderedEmail {
    let subject = format!("Welcome to the {} newsletter", links.blog_title);
    let body = html! {
        h1 { "Hi " (subscriber.name) "," }
        p { "Thanks for subscribing to " (links.blog_title) ". New posts will arrive in this inbox." }
    };

    RenderedEmail {
        html: layout(links, subscriber, body),
        text: format!(
            "Hi {},\n\nThanks for subscribing to {}. New posts will arrive in this inbox.\n{}",
            subscriber.name,
            links.blog_title,
            footer_text(links, subscriber)
        ),
        subject,
    }
}

/// Digest of posts discovered by one ingestion run.
#[must_use]
pub fn new_posts(links: &EmailLinks, subscriber: &Subscriber, posts: &[Post]) -> RenderedEmail {
    let subject = match posts {
        [single] => format!("New on {}: {}", links.blog_title, single.title),
        _ => format!("{} new posts on {}", posts.len(), links.blog_title),
    };
    let body = html! {
        h1 { "Hi " (subscriber.name) "," }
        p { "Here is what's new on " (links.blog_title) ":" }
        @for post in posts {
            (post_block(links, post, posts.len() == 1))
        }
    };

    let mut text = format!("Hi {},\n\nNew on {}:\n\n", subscriber.name, links.blog_title);
    for post in posts {
        text.push_str(&format!("* {}\n  {}\n", post.title, links.post(post)));
    }
    text.push_str(&footer_text(links, subscriber));

    RenderedEmail {
        subject,
        html: layout(links, subscriber, body),
        text,
    }
}

/// One stored post, sent on request.
#[must_use]
pub fn single_post(links: &EmailLinks, subscriber: &Subscriber, post: &Post) -> RenderedEmail {
    let body = html! {
        p { "Hi " (subscriber.name) "," }
        (post_block(links, post, true))
    };

    RenderedEmail {
        subject: post.title.clone(),
        html: layout(links, subscriber, body),
        text: format!(
            "Hi {},\n\n{}\n{}\n{}",
            subscriber.name,
            post.title,
            links.post(post),
            footer_text(links, subscriber)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> Subscriber {
        Subscriber {
            id: 1,
            email: "reader+blog@example.com".to_string(),
            name: "Reader".to_string(),
            categories: "[]".to_string(),
            frequency: None,
            status: "active".to_string(),
            unsubscribe_token: "tok".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            title: title.to_string(),
            normalized_title: crate::slug::normalize_title(title),
            description: Some("A short summary".to_string()),
            image_url: None,
            link: None,
            pub_date: "2024-01-01T00:00:00Z".to_string(),
            content: Some("<p>Body <b>text</b></p>".to_string()),
            category: Some("Travel".to_string()),
            enclosure: Some("https://cdn.example.com/a.jpg".to_string()),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn links() -> EmailLinks {
        EmailLinks::new("https://blog.example.com/", "Example Blog")
    }

    #[test]
    fn test_manage_link_is_encoded() {
        assert_eq!(
            links().manage_subscription("reader+blog@example.com"),
            "https://blog.example.com/manage-subscription/reader%2Bblog%40example.com"
        );
    }

    #[test]
    fn test_new_posts_subject() {
        let one = new_posts(&links(), &subscriber(), &[post(1, "Hello World")]);
        assert_eq!(one.subject, "New on Example Blog: Hello World");

        let two = new_posts(&links(), &subscriber(), &[post(1, "A"), post(2, "B")]);
        assert_eq!(two.subject, "2 new posts on Example Blog");
    }

    #[test]
    fn test_new_posts_body() {
        let email = new_posts(&links(), &subscriber(), &[post(1, "Hello World")]);
        assert!(email.html.contains("https://blog.example.com/post/hello-world"));
        assert!(email.html.contains("<p>Body <b>text</b></p>"));
        assert!(email.html.contains("manage-subscription/reader%2Bblog%40example.com"));
        assert!(email.text.contains("* Hello World"));
    }

    #[test]
    fn test_name_is_escaped() {
        let mut sub = subscriber();
        sub.name = "<script>".to_string();
        let email = welcome(&links(), &sub);
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }
}
